use serde::{Deserialize, Serialize};
use tracing::trace;

use super::MapperChip;
use crate::cart::{Board, CHR_BANK_SIZE};

const PRG_SIZE: usize = 32 * 1024;

/// Color Dreams boards. One register: the low two bits select a 32 KiB program bank and the high
/// nibble an 8 KiB character bank.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorDreams {
    prg_bank: u8,
    chr_bank: u8,
}

impl ColorDreams {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MapperChip for ColorDreams {
    fn cpu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x8000..=0xFFFF => {
                board.prg_byte(PRG_SIZE, self.prg_bank as usize, (addr & 0x7FFF) as usize)
            }
            _ => 0,
        }
    }

    fn cpu_write(&mut self, _board: &mut Board, addr: u16, val: u8) {
        if let 0x8000..=0xFFFF = addr {
            self.prg_bank = val & 0x03;
            self.chr_bank = val >> 4;
            trace!("Color Dreams PRG {} CHR {}", self.prg_bank, self.chr_bank);
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
