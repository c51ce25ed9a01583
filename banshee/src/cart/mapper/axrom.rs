use serde::{Deserialize, Serialize};
use tracing::trace;

use super::MapperChip;
use crate::cart::{Board, Mirroring, CHR_BANK_SIZE};

const BANK_SIZE: usize = 32 * 1024;

/// 32 KiB program banks and a register bit that picks which nametable the single-screen
/// mirroring uses.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axrom {
    prg_bank: u8,
}

impl Axrom {
    pub fn new(board: &mut Board) -> Self {
        board.mirroring = Mirroring::SingleScreenLower;
        Self { prg_bank: 0 }
    }
}

impl MapperChip for Axrom {
    fn cpu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x8000..=0xFFFF => {
                board.prg_byte(BANK_SIZE, self.prg_bank as usize, (addr & 0x7FFF) as usize)
            }
            _ => 0,
        }
    }

    fn cpu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        if let 0x8000..=0xFFFF = addr {
            self.prg_bank = val & 0x07;
            board.mirroring = if val & 0x10 == 0 {
                Mirroring::SingleScreenLower
            } else {
                Mirroring::SingleScreenUpper
            };
            trace!("AxROM PRG bank {}, {}", self.prg_bank, board.mirroring);
        }
    }

    fn ppu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => board.chr_byte(CHR_BANK_SIZE, 0, addr as usize),
            _ => 0,
        }
    }

    fn ppu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        if let 0x0000..=0x1FFF = addr {
            board.write_chr_ram(CHR_BANK_SIZE, 0, addr as usize, val)
        }
    }
}
