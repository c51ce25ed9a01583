use serde::{Deserialize, Serialize};
use tracing::trace;

use super::MapperChip;
use crate::cart::{Board, Mirroring, PRG_BANK_SIZE};

const CHR_HALF_SIZE: usize = 4 * 1024;

/// The MMC1 (SxROM boards). The CPU loads its four internal registers one bit at a time through
/// a five-bit shift register; the fifth write commits the value to the register picked by
/// address bits 13-14.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mmc1 {
    shift: u8,
    shift_count: u8,
    /// Bits 0-1 mirroring, bits 2-3 PRG mode, bit 4 CHR mode.
    control: u8,
    chr_bank0: u8,
    chr_bank1: u8,
    /// Bits 0-3 select the bank, bit 4 disables the work RAM.
    prg_bank: u8,
    prg_banks: u16,
}

impl Mmc1 {
    pub fn new(board: &Board) -> Self {
        Self {
            shift: 0,
            shift_count: 0,
            control: 0x0C,
            chr_bank0: 0,
            chr_bank1: 0,
            prg_bank: 0,
            prg_banks: (board.prg_rom.len() / PRG_BANK_SIZE) as u16,
        }
    }

    fn prg_mode(&self) -> u8 {
        (self.control >> 2) & 0x03
    }

    fn ram_enabled(&self) -> bool {
        self.prg_bank & 0x10 == 0
    }

    /// The 16 KiB bank visible in the given half of 0x8000..=0xFFFF.
    fn prg_window(&self, high: bool) -> usize {
        let bank = (self.prg_bank & 0x0F) as usize;
        let last = (self.prg_banks as usize).saturating_sub(1);
        match (self.prg_mode(), high) {
            (0 | 1, false) => bank & !1,
            (0 | 1, true) => (bank & !1) + 1,
            (2, false) => 0,
            (2, true) => bank,
            (_, false) => bank,
            (_, true) => last,
        }
    }

    /// The 4 KiB bank visible in the given half of the pattern tables.
    fn chr_window(&self, high: bool) -> usize {
        if self.control & 0x10 == 0 {
            (self.chr_bank0 & !1) as usize + high as usize
        } else if high {
            self.chr_bank1 as usize
        } else {
            self.chr_bank0 as usize
        }
    }

    fn commit(&mut self, board: &mut Board, addr: u16, val: u8) {
        match (addr >> 13) & 0x03 {
            0 => {
                self.control = val;
                board.mirroring = match val & 0x03 {
                    0 => Mirroring::SingleScreenLower,
                    1 => Mirroring::SingleScreenUpper,
                    2 => Mirroring::Vertical,
                    _ => Mirroring::Horizontal,
                };
            }
            1 => self.chr_bank0 = val,
            2 => self.chr_bank1 = val,
            _ => self.prg_bank = val,
        }
        trace!(
            "MMC1 control 0x{:0>2X} CHR {}/{} PRG 0x{:0>2X}",
            self.control,
            self.chr_bank0,
            self.chr_bank1,
            self.prg_bank
        );
    }
}

impl MapperChip for Mmc1 {
    fn cpu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF if self.ram_enabled() => board.sram_read(addr),
            0x8000..=0xFFFF => board.prg_byte(
                PRG_BANK_SIZE,
                self.prg_window(addr >= 0xC000),
                (addr & 0x3FFF) as usize,
            ),
            _ => 0,
        }
    }

    fn cpu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        match addr {
            0x6000..=0x7FFF if self.ram_enabled() => board.sram_write(addr, val),
            0x8000..=0xFFFF if val & 0x80 != 0 => {
                self.shift = 0;
                self.shift_count = 0;
                self.control |= 0x0C;
            }
            0x8000..=0xFFFF => {
                self.shift |= (val & 0x01) << self.shift_count;
                self.shift_count += 1;
                if self.shift_count == 5 {
                    let value = self.shift;
                    self.shift = 0;
                    self.shift_count = 0;
                    self.commit(board, addr, value);
                }
            }
            _ => {}
        }
    }

    fn ppu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => board.chr_byte(
                CHR_HALF_SIZE,
                self.chr_window(addr >= 0x1000),
                (addr & 0x0FFF) as usize,
            ),
            _ => 0,
        }
    }

    fn ppu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        if let 0x0000..=0x1FFF = addr {
            let bank = self.chr_window(addr >= 0x1000);
            board.write_chr_ram(CHR_HALF_SIZE, bank, (addr & 0x0FFF) as usize, val)
        }
    }
}
