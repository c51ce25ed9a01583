use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{MapperChip, PpuTick};
use crate::cart::{Board, Mirroring};

const PRG_WINDOW: usize = 8 * 1024;
const CHR_WINDOW: usize = 1024;

/// The MMC3 (TxROM boards): eight bank registers, two PRG and CHR layouts, and a scanline counter
/// that raises an IRQ.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mmc3 {
    /// Bits 0-2 pick the register the next odd write updates. Bit 6 swaps the PRG windows at
    /// 0x8000 and 0xC000, bit 7 swaps the CHR halves.
    bank_select: u8,
    /// R0 and R1 select 2 KiB CHR banks, R2-R5 select 1 KiB CHR banks, R6 and R7 select 8 KiB PRG
    /// banks.
    banks: [u8; 8],
    /// The number of 8 KiB program banks.
    prg_banks: u16,
    /// Bit 7 enables the work RAM, bit 6 protects it from writes.
    ram_protect: u8,
    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,
    /// Four-screen boards hard-wire their mirroring and ignore 0xA000.
    four_screen: bool,
}

impl Mmc3 {
    pub fn new(board: &Board) -> Self {
        Self {
            bank_select: 0,
            banks: [0, 2, 4, 5, 6, 7, 0, 1],
            prg_banks: (board.prg_rom.len() / PRG_WINDOW) as u16,
            ram_protect: 0x80,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
            four_screen: board.mirroring.is_four_screen(),
        }
    }

    fn prg_window(&self, addr: u16) -> usize {
        let second_last = (self.prg_banks as usize).saturating_sub(2);
        let last = (self.prg_banks as usize).saturating_sub(1);
        let swapped = self.bank_select & 0x40 != 0;
        match ((addr - 0x8000) / 0x2000, swapped) {
            (0, false) | (2, true) => self.banks[6] as usize & 0x3F,
            (0, true) | (2, false) => second_last,
            (1, _) => self.banks[7] as usize & 0x3F,
            _ => last,
        }
    }

    fn chr_window(&self, addr: u16) -> usize {
        let addr = if self.bank_select & 0x80 != 0 {
            addr ^ 0x1000
        } else {
            addr
        };
        match addr / 0x400 {
            0 => (self.banks[0] & 0xFE) as usize,
            1 => (self.banks[0] | 0x01) as usize,
            2 => (self.banks[1] & 0xFE) as usize,
            3 => (self.banks[1] | 0x01) as usize,
            slot => self.banks[slot as usize - 2] as usize,
        }
    }

    /// Clocks the scanline counter once. Reloading (or reaching zero) with IRQs enabled asserts
    /// the IRQ line.
    fn clock_counter(&mut self) {
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }
        if self.irq_counter == 0 && self.irq_enabled {
            trace!("MMC3 IRQ asserted");
            self.irq_pending = true;
        }
    }

    fn ram_enabled(&self) -> bool {
        self.ram_protect & 0x80 != 0
    }
}

impl MapperChip for Mmc3 {
    fn cpu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF if self.ram_enabled() => board.sram_read(addr),
            0x8000..=0xFFFF => {
                board.prg_byte(PRG_WINDOW, self.prg_window(addr), (addr & 0x1FFF) as usize)
            }
            _ => 0,
        }
    }

    fn cpu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        let even = addr & 0x01 == 0;
        match addr {
            0x6000..=0x7FFF => {
                if self.ram_enabled() && self.ram_protect & 0x40 == 0 {
                    board.sram_write(addr, val)
                }
            }
            0x8000..=0x9FFF if even => self.bank_select = val,
            0x8000..=0x9FFF => {
                let reg = (self.bank_select & 0x07) as usize;
                trace!("MMC3 R{reg} = {val}");
                self.banks[reg] = val;
            }
            0xA000..=0xBFFF if even => {
                if !self.four_screen {
                    board.mirroring = if val & 0x01 == 0 {
                        Mirroring::Vertical
                    } else {
                        Mirroring::Horizontal
                    };
                }
            }
            0xA000..=0xBFFF => self.ram_protect = val,
            0xC000..=0xDFFF if even => self.irq_latch = val,
            0xC000..=0xDFFF => {
                self.irq_counter = 0;
                self.irq_reload = true;
            }
            0xE000..=0xFFFF if even => {
                self.irq_enabled = false;
                self.irq_pending = false;
            }
            0xE000..=0xFFFF => self.irq_enabled = true,
            _ => {}
        }
    }

    fn ppu_read(&self, board: &Board, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => {
                board.chr_byte(CHR_WINDOW, self.chr_window(addr), (addr & 0x03FF) as usize)
            }
            _ => 0,
        }
    }

    fn ppu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        if let 0x0000..=0x1FFF = addr {
            let bank = self.chr_window(addr);
            board.write_chr_ram(CHR_WINDOW, bank, (addr & 0x03FF) as usize, val)
        }
    }

    // The counter is clocked by A12 rising during sprite fetches, which with the usual pattern
    // table setup happens once per rendered line around dot 260.
    fn ppu_step(&mut self, tick: PpuTick) {
        if tick.rendering && tick.dot == 260 && (tick.scanline < 240 || tick.pre_render) {
            self.clock_counter();
        }
    }

    fn irq(&self) -> bool {
        self.irq_pending
    }
}

#[cfg(test)]
mod tests {
    use super::Mmc3;
    use crate::cart::mapper::tests::numbered_board;
    use crate::cart::{MapperChip, Mirroring, PpuTick};

    fn line(chip: &mut Mmc3, scanline: u16) {
        chip.ppu_step(PpuTick {
            scanline,
            dot: 260,
            pre_render: false,
            rendering: true,
        });
    }

    #[test]
    fn prg_layouts() {
        // 8 x 16 KiB is 16 x 8 KiB; every 8 KiB window reads its 16 KiB bank number
        let mut board = numbered_board(8, 8);
        let mut chip = Mmc3::new(&board);
        chip.cpu_write(&mut board, 0x8000, 6);
        chip.cpu_write(&mut board, 0x8001, 4);
        chip.cpu_write(&mut board, 0x8000, 7);
        chip.cpu_write(&mut board, 0x8001, 7);
        assert_eq!(chip.cpu_read(&board, 0x8000), 2);
        assert_eq!(chip.cpu_read(&board, 0xA000), 3);
        assert_eq!(chip.cpu_read(&board, 0xC000), 7);
        assert_eq!(chip.cpu_read(&board, 0xE000), 7);

        chip.cpu_write(&mut board, 0x8000, 0x40);
        assert_eq!(chip.cpu_read(&board, 0x8000), 7);
        assert_eq!(chip.cpu_read(&board, 0xC000), 2);
    }

    #[test]
    fn chr_layouts() {
        let mut board = numbered_board(2, 8);
        let mut chip = Mmc3::new(&board);
        // R2 = 1 KiB bank 8, which is the first KiB of 8 KiB bank 1
        chip.cpu_write(&mut board, 0x8000, 2);
        chip.cpu_write(&mut board, 0x8001, 8);
        assert_eq!(chip.ppu_read(&board, 0x1000), 1);
        chip.cpu_write(&mut board, 0x8000, 0x82);
        assert_eq!(chip.ppu_read(&board, 0x0000), 1);
    }

    #[test]
    fn mirroring_register() {
        let mut board = numbered_board(2, 1);
        let mut chip = Mmc3::new(&board);
        chip.cpu_write(&mut board, 0xA000, 1);
        assert_eq!(board.mirroring, Mirroring::Horizontal);
        chip.cpu_write(&mut board, 0xA000, 0);
        assert_eq!(board.mirroring, Mirroring::Vertical);
    }

    #[test]
    fn scanline_irq() {
        let mut board = numbered_board(2, 1);
        let mut chip = Mmc3::new(&board);
        chip.cpu_write(&mut board, 0xC000, 2);
        chip.cpu_write(&mut board, 0xC001, 0);
        chip.cpu_write(&mut board, 0xE001, 0);

        line(&mut chip, 0);
        assert!(!chip.irq());
        line(&mut chip, 1);
        assert!(!chip.irq());
        line(&mut chip, 2);
        assert!(chip.irq());

        // rendering disabled or vblank lines do not clock
        chip.cpu_write(&mut board, 0xE000, 0);
        chip.cpu_write(&mut board, 0xE001, 0);
        line(&mut chip, 245);
        assert!(!chip.irq());

        chip.cpu_write(&mut board, 0xE000, 0);
        assert!(!chip.irq());
    }
}
