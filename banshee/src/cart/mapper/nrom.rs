use serde::{Deserialize, Serialize};

use super::MapperChip;
use crate::cart::Board;

/// The board without a mapper. 16 or 32 KiB of program ROM (a 16 KiB ROM appears twice), 8 KiB
/// of character ROM or RAM, and optionally RAM at 0x6000.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nrom;

impl Nrom {
    pub fn new() -> Self {
        Self
    }
}

impl MapperChip for Nrom {
    fn cpu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => board.sram_read(addr),
            0x8000..=0xFFFF => board.prg_byte(0, 0, (addr - 0x8000) as usize),
            _ => 0,
        }
    }

    fn cpu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        if let 0x6000..=0x7FFF = addr {
            board.sram_write(addr, val)
        }
    }

    fn ppu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => board.chr_byte(0, 0, addr as usize),
            _ => 0,
        }
    }

    fn ppu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        if let 0x0000..=0x1FFF = addr {
            board.write_chr_ram(0, 0, addr as usize, val)
        }
    }
}
