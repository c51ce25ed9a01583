//! Mapper chips. Every physical board decodes the CPU and PPU address buses differently, but all
//! of them are driven through the same [`MapperChip`] operations. [`Mapper`] is the closed set of
//! supported chips; it owns exactly one chip's register block, so a cartridge can never pair one
//! chip's decoding with another chip's registers.
//!
//! Address ranges a chip does not decode read as zero and ignore writes (open bus).

use serde::{Deserialize, Serialize};

use super::Board;
use crate::error::LoadError;

mod axrom;
mod cnrom;
mod color_dreams;
mod gxrom;
mod jaleco87;
mod mmc1;
mod mmc3;
mod multicart225;
mod nrom;
mod uxrom;

pub use axrom::*;
pub use cnrom::*;
pub use color_dreams::*;
pub use gxrom::*;
pub use jaleco87::*;
pub use mmc1::*;
pub use mmc3::*;
pub use multicart225::*;
pub use nrom::*;
pub use uxrom::*;

/// The PPU's position, handed to a mapper once per PPU step. Boards with a scanline counter use
/// this to drive their IRQ line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpuTick {
    pub scanline: u16,
    pub dot: u16,
    /// The scanline before the first visible one, where the PPU prefetches the next frame.
    pub pre_render: bool,
    /// Background or sprite rendering is enabled.
    pub rendering: bool,
}

/// The operations every cartridge chip provides. `cpu_*` covers 0x4020..=0xFFFF of the CPU bus,
/// `ppu_*` covers the pattern tables at 0x0000..=0x1FFF of the PPU bus.
pub trait MapperChip {
    fn cpu_read(&self, board: &Board, addr: u16) -> u8;

    fn cpu_write(&mut self, board: &mut Board, addr: u16, val: u8);

    fn ppu_read(&self, board: &Board, addr: u16) -> u8;

    fn ppu_write(&mut self, board: &mut Board, addr: u16, val: u8);

    /// Called once per PPU step.
    fn ppu_step(&mut self, _tick: PpuTick) {}

    /// Called once per APU step, i.e. once per CPU cycle.
    fn apu_step(&mut self) {}

    /// The level of the chip's IRQ output.
    fn irq(&self) -> bool {
        false
    }
}

#[derive(
    Debug,
    Clone,
    Hash,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::From,
    derive_more::IsVariant,
)]
pub enum Mapper {
    Nrom(Nrom),
    Mmc1(Mmc1),
    Uxrom(Uxrom),
    Cnrom(Cnrom),
    Mmc3(Mmc3),
    Axrom(Axrom),
    ColorDreams(ColorDreams),
    Gxrom(Gxrom),
    Jaleco87(Jaleco87),
    Multicart225(Multicart225),
}

impl Mapper {
    /// Constructs the chip for the given iNES mapper number in its power-on state. Chips that
    /// drive the mirroring lines set the board's initial mirroring.
    pub fn new(number: u16, board: &mut Board) -> Result<Self, LoadError> {
        let digest = match number {
            0 => Nrom::new().into(),
            1 => Mmc1::new(board).into(),
            2 => Uxrom::new(board).into(),
            3 => Cnrom::new().into(),
            4 => Mmc3::new(board).into(),
            7 => Axrom::new(board).into(),
            11 => ColorDreams::new().into(),
            66 => Gxrom::new().into(),
            87 => Jaleco87::new(board).into(),
            225 => Multicart225::new(board).into(),
            number => return Err(LoadError::UnsupportedMapper { number }),
        };
        Ok(digest)
    }

    /// The iNES mapper number of this chip.
    pub fn number(&self) -> u16 {
        match self {
            Mapper::Nrom(_) => 0,
            Mapper::Mmc1(_) => 1,
            Mapper::Uxrom(_) => 2,
            Mapper::Cnrom(_) => 3,
            Mapper::Mmc3(_) => 4,
            Mapper::Axrom(_) => 7,
            Mapper::ColorDreams(_) => 11,
            Mapper::Gxrom(_) => 66,
            Mapper::Jaleco87(_) => 87,
            Mapper::Multicart225(_) => 225,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mapper::Nrom(_) => "NROM",
            Mapper::Mmc1(_) => "MMC1",
            Mapper::Uxrom(_) => "UxROM",
            Mapper::Cnrom(_) => "CNROM",
            Mapper::Mmc3(_) => "MMC3",
            Mapper::Axrom(_) => "AxROM",
            Mapper::ColorDreams(_) => "Color Dreams",
            Mapper::Gxrom(_) => "GxROM",
            Mapper::Jaleco87(_) => "Jaleco JF-87",
            Mapper::Multicart225(_) => "BMC 225 multicart",
        }
    }

    fn chip(&self) -> &dyn MapperChip {
        match self {
            Mapper::Nrom(chip) => chip,
            Mapper::Mmc1(chip) => chip,
            Mapper::Uxrom(chip) => chip,
            Mapper::Cnrom(chip) => chip,
            Mapper::Mmc3(chip) => chip,
            Mapper::Axrom(chip) => chip,
            Mapper::ColorDreams(chip) => chip,
            Mapper::Gxrom(chip) => chip,
            Mapper::Jaleco87(chip) => chip,
            Mapper::Multicart225(chip) => chip,
        }
    }

    fn chip_mut(&mut self) -> &mut dyn MapperChip {
        match self {
            Mapper::Nrom(chip) => chip,
            Mapper::Mmc1(chip) => chip,
            Mapper::Uxrom(chip) => chip,
            Mapper::Cnrom(chip) => chip,
            Mapper::Mmc3(chip) => chip,
            Mapper::Axrom(chip) => chip,
            Mapper::ColorDreams(chip) => chip,
            Mapper::Gxrom(chip) => chip,
            Mapper::Jaleco87(chip) => chip,
            Mapper::Multicart225(chip) => chip,
        }
    }
}

impl MapperChip for Mapper {
    fn cpu_read(&self, board: &Board, addr: u16) -> u8 {
        self.chip().cpu_read(board, addr)
    }

    fn cpu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        self.chip_mut().cpu_write(board, addr, val)
    }

    fn ppu_read(&self, board: &Board, addr: u16) -> u8 {
        self.chip().ppu_read(board, addr)
    }

    fn ppu_write(&mut self, board: &mut Board, addr: u16, val: u8) {
        self.chip_mut().ppu_write(board, addr, val)
    }

    fn ppu_step(&mut self, tick: PpuTick) {
        self.chip_mut().ppu_step(tick)
    }

    fn apu_step(&mut self) {
        self.chip_mut().apu_step()
    }

    fn irq(&self) -> bool {
        self.chip().irq()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{Mapper, MapperChip};
    use crate::cart::Board;
    use crate::error::LoadError;

    /// A board whose every PRG byte holds its 16 KiB bank number and every CHR byte holds its
    /// 8 KiB bank number.
    pub(crate) fn numbered_board(prg_banks: usize, chr_banks: usize) -> Board {
        Board {
            prg_rom: (0..prg_banks)
                .flat_map(|bank| std::iter::repeat_n(bank as u8, 0x4000))
                .collect(),
            chr_rom: (0..chr_banks)
                .flat_map(|bank| std::iter::repeat_n(bank as u8, 0x2000))
                .collect(),
            chr_ram: if chr_banks == 0 { vec![0; 0x2000] } else { Vec::new() },
            prg_ram: vec![0; 0x2000],
            ..Default::default()
        }
    }

    #[test]
    fn factory_matches_numbers() {
        for number in [0, 1, 2, 3, 4, 7, 11, 66, 87, 225] {
            let mut board = numbered_board(8, 8);
            let mapper = Mapper::new(number, &mut board).unwrap();
            assert_eq!(mapper.number(), number);
        }
        let mut board = numbered_board(2, 1);
        assert_eq!(
            Mapper::new(5, &mut board),
            Err(LoadError::UnsupportedMapper { number: 5 })
        );
    }

    #[test]
    fn unmapped_ranges_are_open_bus() {
        for number in [0, 1, 2, 3, 4, 7, 11, 66, 87, 225] {
            let mut board = numbered_board(8, 8);
            board.prg_rom.iter_mut().for_each(|b| *b = 0xAA);
            let mut mapper = Mapper::new(number, &mut board).unwrap();
            assert_eq!(mapper.cpu_read(&board, 0x4020), 0, "mapper {number}");
            assert_eq!(mapper.cpu_read(&board, 0x5FFF), 0, "mapper {number}");
            assert_eq!(mapper.ppu_read(&board, 0x2000), 0, "mapper {number}");
            let before = mapper.clone();
            mapper.cpu_write(&mut board, 0x5000, 0xFF);
            assert_eq!(mapper, before, "mapper {number}");
        }
    }
}
