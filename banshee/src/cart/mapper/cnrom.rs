use serde::{Deserialize, Serialize};
use tracing::trace;

use super::MapperChip;
use crate::cart::{Board, CHR_BANK_SIZE};

/// Fixed program ROM like NROM, with the whole 8 KiB of character ROM switchable.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cnrom {
    chr_bank: u8,
}

impl Cnrom {
    pub fn new() -> Self {
        Self { chr_bank: 0 }
    }
}

impl MapperChip for Cnrom {
    fn cpu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => board.sram_read(addr),
            0x8000..=0xFFFF => board.prg_byte(0, 0, (addr - 0x8000) as usize),
            _ => 0,
        }
    }

    fn cpu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        match addr {
            0x6000..=0x7FFF => board.sram_write(addr, val),
            0x8000..=0xFFFF => {
                trace!("CNROM CHR bank {val}");
                self.chr_bank = val;
            }
            _ => {}
        }
    }

    fn ppu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => board.chr_byte(CHR_BANK_SIZE, self.chr_bank as usize, addr as usize),
            _ => 0,
        }
    }

    fn ppu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        if let 0x0000..=0x1FFF = addr {
            board.write_chr_ram(CHR_BANK_SIZE, self.chr_bank as usize, addr as usize, val)
        }
    }
}
