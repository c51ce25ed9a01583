use serde::{Deserialize, Serialize};
use tracing::trace;

use super::MapperChip;
use crate::cart::{Board, CHR_BANK_SIZE};

/// Mapper 87, used by Jaleco, Konami and Taito boards. Program ROM is not banked at all. A write
/// anywhere in 0x6000..=0x7FFF selects the 8 KiB character bank from the two low bits of the
/// value, wired to the chip in swapped order.
///
/// The pattern tables are writable on this board. Any character data the image ships is moved
/// into CHR RAM at power-on so that writes land in a region snapshots capture.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jaleco87 {
    pub(crate) chr_bank: u8,
}

impl Jaleco87 {
    pub fn new(board: &mut Board) -> Self {
        if !board.chr_rom.is_empty() {
            board.chr_ram = std::mem::take(&mut board.chr_rom);
        }
        Self { chr_bank: 0 }
    }

    pub fn chr_bank(&self) -> u8 {
        self.chr_bank
    }
}

impl MapperChip for Jaleco87 {
    fn cpu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x8000..=0xFFFF => board.prg_byte(0, 0, (addr - 0x8000) as usize),
            _ => 0,
        }
    }

    fn cpu_write(&mut self, _board: &mut Board, addr: u16, val: u8) {
        if let 0x6000..=0x7FFF = addr {
            self.chr_bank = ((val & 0x1) << 1) | ((val & 0x2) >> 1);
            trace!("Mapper 87 CHR bank {}", self.chr_bank);
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
            board.set_chr_byte(CHR_BANK_SIZE, self.chr_bank as usize, addr as usize, val)
        }
    }
}
