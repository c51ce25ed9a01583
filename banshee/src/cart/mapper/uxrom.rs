use serde::{Deserialize, Serialize};
use tracing::trace;

use super::MapperChip;
use crate::cart::{Board, CHR_BANK_SIZE, PRG_BANK_SIZE};

/// A 16 KiB switchable bank at 0x8000 and the last 16 KiB bank fixed at 0xC000. Character memory
/// is a single unbanked 8 KiB (almost always RAM).
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uxrom {
    prg_bank: u8,
    last_bank: u8,
}

impl Uxrom {
    pub fn new(board: &Board) -> Self {
        Self {
            prg_bank: 0,
            last_bank: (board.prg_rom.len() / PRG_BANK_SIZE).saturating_sub(1) as u8,
        }
    }
}

impl MapperChip for Uxrom {
    fn cpu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => board.sram_read(addr),
            0x8000..=0xBFFF => {
                board.prg_byte(PRG_BANK_SIZE, self.prg_bank as usize, (addr & 0x3FFF) as usize)
            }
            0xC000..=0xFFFF => {
                board.prg_byte(PRG_BANK_SIZE, self.last_bank as usize, (addr & 0x3FFF) as usize)
            }
            _ => 0,
        }
    }

    fn cpu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        match addr {
            0x6000..=0x7FFF => board.sram_write(addr, val),
            0x8000..=0xFFFF => {
                trace!("UxROM PRG bank {val}");
                self.prg_bank = val;
            }
            _ => {}
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

#[cfg(test)]
mod tests {
    use super::Uxrom;
    use crate::cart::mapper::tests::numbered_board;
    use crate::cart::MapperChip;

    #[test]
    fn switches_low_window_only() {
        let mut board = numbered_board(8, 0);
        let mut chip = Uxrom::new(&board);
        assert_eq!(chip.cpu_read(&board, 0x8000), 0);
        assert_eq!(chip.cpu_read(&board, 0xFFFF), 7);
        chip.cpu_write(&mut board, 0x8000, 5);
        assert_eq!(chip.cpu_read(&board, 0x9000), 5);
        assert_eq!(chip.cpu_read(&board, 0xC000), 7);
    }
}
