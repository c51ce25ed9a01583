use serde::{Deserialize, Serialize};
use tracing::trace;

use super::MapperChip;
use crate::cart::{Board, Mirroring, CHR_BANK_SIZE, PRG_BANK_SIZE};

/// Mapper 225, found on the 52/58/64/72-in-1 multicarts. The chip has no data register: every
/// write to 0x8000..=0xFFFF latches its *address* lines.
///
/// | Address bits | Meaning                                          |
/// |--------------|--------------------------------------------------|
/// | 14           | Outer bank, bit 6 of both the PRG and CHR bank   |
/// | 13           | Mirroring, clear for vertical, set for horizontal |
/// | 12           | Set for one 32 KiB PRG bank, clear for two 16 KiB |
/// | 11-6         | PRG bank                                         |
/// | 5-0          | CHR bank                                         |
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multicart225 {
    pub(crate) chr_bank: u8,
    pub(crate) prg_bank0: u8,
    pub(crate) prg_bank1: u8,
    /// The number of 16 KiB banks in the program ROM.
    pub(crate) prg_banks: u16,
}

impl Multicart225 {
    /// Power-on state: the first bank in the low window and the last bank in the high window, so
    /// the reset vector resolves.
    pub fn new(board: &Board) -> Self {
        let prg_banks = (board.prg_rom.len() / PRG_BANK_SIZE) as u16;
        Self {
            chr_bank: 0,
            prg_bank0: 0,
            prg_bank1: prg_banks.saturating_sub(1) as u8,
            prg_banks,
        }
    }

    pub fn chr_bank(&self) -> u8 {
        self.chr_bank
    }

    pub fn prg_banks(&self) -> (u8, u8) {
        (self.prg_bank0, self.prg_bank1)
    }

    pub fn prg_bank_count(&self) -> u16 {
        self.prg_banks
    }
}

impl MapperChip for Multicart225 {
    fn cpu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => board.sram_read(addr),
            0x8000..=0xBFFF => board.prg_byte(
                PRG_BANK_SIZE,
                self.prg_bank0 as usize,
                (addr - 0x8000) as usize,
            ),
            0xC000..=0xFFFF => board.prg_byte(
                PRG_BANK_SIZE,
                self.prg_bank1 as usize,
                (addr - 0xC000) as usize,
            ),
            _ => 0,
        }
    }

    fn cpu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        match addr {
            0x6000..=0x7FFF => board.sram_write(addr, val),
            0x8000..=0xFFFF => {
                let bank = ((addr >> 14) & 0x1) as u8;
                let prg = ((addr >> 6) & 0x3F) as u8 | (bank << 6);
                self.chr_bank = (addr & 0x3F) as u8 | (bank << 6);
                if (addr >> 12) & 0x1 != 0 {
                    self.prg_bank0 = prg;
                    self.prg_bank1 = prg;
                } else {
                    self.prg_bank0 = prg;
                    self.prg_bank1 = prg + 1;
                }
                board.mirroring = if (addr >> 13) & 0x1 != 0 {
                    Mirroring::Horizontal
                } else {
                    Mirroring::Vertical
                };
                trace!(
                    "Mapper 225 PRG {}/{} CHR {} {}",
                    self.prg_bank0,
                    self.prg_bank1,
                    self.chr_bank,
                    board.mirroring
                );
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

    fn ppu_write(&mut self, _board: &mut Board, _addr: u16, _val: u8) {}
}

#[cfg(test)]
mod tests {
    use super::Multicart225;
    use crate::cart::mapper::tests::numbered_board;
    use crate::cart::{MapperChip, Mirroring};

    #[test]
    fn power_on_state() {
        let board = numbered_board(16, 8);
        let chip = Multicart225::new(&board);
        assert_eq!(chip.prg_banks(), (0, 15));
        assert_eq!(chip.chr_bank(), 0);
        assert_eq!(chip.prg_bank_count(), 16);
        assert_eq!(chip.cpu_read(&board, 0x8000), 0);
        assert_eq!(chip.cpu_read(&board, 0xFFFC), 15);
    }

    #[test]
    fn thirty_two_kib_mode() {
        let mut board = numbered_board(16, 8);
        let mut chip = Multicart225::new(&board);
        chip.cpu_write(&mut board, 0x9000, 0x00);
        assert_eq!(chip.prg_banks(), (0, 0));
        assert_eq!(board.mirroring, Mirroring::Vertical);
    }

    #[test]
    fn sixteen_kib_mode() {
        // A13 set, A12 clear, PRG bank 5, CHR bank 3
        let addr = 0x8000 | 0x2000 | (5 << 6) | 3;
        let mut board = numbered_board(16, 8);
        let mut chip = Multicart225::new(&board);
        chip.cpu_write(&mut board, addr, 0xFF);
        assert_eq!(chip.prg_banks(), (5, 6));
        assert_eq!(chip.chr_bank(), 3);
        assert_eq!(board.mirroring, Mirroring::Horizontal);
        assert_eq!(chip.cpu_read(&board, 0xA000), 5);
        assert_eq!(chip.cpu_read(&board, 0xE000), 6);
        assert_eq!(chip.ppu_read(&board, 0x1000), 3);
    }

    #[test]
    fn outer_bank_bit() {
        let mut board = numbered_board(16, 8);
        let mut chip = Multicart225::new(&board);
        chip.cpu_write(&mut board, 0xC000 | (2 << 6) | 1, 0);
        assert_eq!(chip.prg_banks(), (66, 67));
        assert_eq!(chip.chr_bank(), 65);
    }

    #[test]
    fn chr_rom_ignores_writes() {
        let mut board = numbered_board(2, 1);
        let mut chip = Multicart225::new(&board);
        chip.ppu_write(&mut board, 0x0000, 0x77);
        assert_eq!(chip.ppu_read(&board, 0x0000), 0);
    }

    #[test]
    fn save_ram() {
        let mut board = numbered_board(2, 1);
        let mut chip = Multicart225::new(&board);
        chip.cpu_write(&mut board, 0x7ABC, 0x31);
        assert_eq!(chip.cpu_read(&board, 0x7ABC), 0x31);
    }
}
