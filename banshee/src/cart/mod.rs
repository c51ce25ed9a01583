//! The cartridge: its storage regions, the mapper chip that decodes addresses into them, and the
//! clock rate the board was built for.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::LoadError;
use crate::rom::{Region, RomHeader};

pub mod mapper;

pub use mapper::{Mapper, MapperChip, PpuTick};

/// The size of a switchable program ROM bank, 16 KiB.
pub const PRG_BANK_SIZE: usize = 16 * 1024;

/// The size of a switchable character bank, 8 KiB.
pub const CHR_BANK_SIZE: usize = 8 * 1024;

/// The start of the save RAM window in the CPU address space.
pub const SRAM_START: u16 = 0x6000;

/// How the four logical nametables are folded onto the console's 2 KiB of nametable RAM (or onto
/// the extra 2 KiB some boards carry).
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    Hash,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::IsVariant,
)]
pub enum Mirroring {
    /// 0x2000 and 0x2400 share a table, as do 0x2800 and 0x2C00.
    #[default]
    Horizontal,
    /// 0x2000 and 0x2800 share a table, as do 0x2400 and 0x2C00.
    Vertical,
    /// Every table is backed by its own memory.
    FourScreen,
    SingleScreenLower,
    SingleScreenUpper,
}

impl Mirroring {
    /// Maps a PPU address in 0x2000..=0x3EFF onto an offset into 4 KiB of nametable memory.
    pub fn nametable_offset(self, addr: u16) -> usize {
        let addr = (addr as usize) & 0x0FFF;
        let table = addr / 0x400;
        let offset = addr % 0x400;
        let physical = match self {
            Mirroring::Horizontal => table / 2,
            Mirroring::Vertical => table % 2,
            Mirroring::FourScreen => table,
            Mirroring::SingleScreenLower => 0,
            Mirroring::SingleScreenUpper => 1,
        };
        physical * 0x400 + offset
    }
}

/// All of the memory a cartridge carries plus its current mirroring. Mappers decode addresses
/// into this; they never own any of it.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq)]
pub struct Board {
    pub prg_rom: Vec<u8>,
    pub chr_rom: Vec<u8>,
    pub chr_ram: Vec<u8>,
    pub chr_nvram: Vec<u8>,
    pub prg_ram: Vec<u8>,
    pub prg_nvram: Vec<u8>,
    pub mirroring: Mirroring,
}

impl Board {
    /// Reads `prg_rom[bank * bank_size + offset]`. Bank numbers past the end of the ROM wrap, as
    /// the unconnected high address lines would on hardware.
    pub fn prg_byte(&self, bank_size: usize, bank: usize, offset: usize) -> u8 {
        wrapping_get(&self.prg_rom, bank * bank_size + offset)
    }

    /// The memory that backs the PPU pattern tables: character ROM when the board has it,
    /// otherwise character RAM.
    pub fn chr(&self) -> &[u8] {
        if !self.chr_rom.is_empty() {
            &self.chr_rom
        } else if !self.chr_ram.is_empty() {
            &self.chr_ram
        } else {
            &self.chr_nvram
        }
    }

    pub fn chr_mut(&mut self) -> &mut [u8] {
        if !self.chr_rom.is_empty() {
            &mut self.chr_rom
        } else if !self.chr_ram.is_empty() {
            &mut self.chr_ram
        } else {
            &mut self.chr_nvram
        }
    }

    pub fn chr_is_ram(&self) -> bool {
        self.chr_rom.is_empty()
    }

    pub fn chr_byte(&self, bank_size: usize, bank: usize, offset: usize) -> u8 {
        wrapping_get(self.chr(), bank * bank_size + offset)
    }

    pub fn set_chr_byte(&mut self, bank_size: usize, bank: usize, offset: usize, val: u8) {
        wrapping_set(self.chr_mut(), bank * bank_size + offset, val)
    }

    /// Writes into character memory only when it is RAM. Most boards ignore writes to CHR ROM.
    pub fn write_chr_ram(&mut self, bank_size: usize, bank: usize, offset: usize, val: u8) {
        if self.chr_is_ram() {
            self.set_chr_byte(bank_size, bank, offset, val)
        }
    }

    /// The memory behind 0x6000..=0x7FFF. Battery-backed RAM wins when a board has both.
    pub fn sram(&self) -> &[u8] {
        if self.prg_nvram.is_empty() {
            &self.prg_ram
        } else {
            &self.prg_nvram
        }
    }

    pub fn sram_mut(&mut self) -> &mut [u8] {
        if self.prg_nvram.is_empty() {
            &mut self.prg_ram
        } else {
            &mut self.prg_nvram
        }
    }

    pub fn sram_read(&self, addr: u16) -> u8 {
        wrapping_get(self.sram(), addr.wrapping_sub(SRAM_START) as usize)
    }

    pub fn sram_write(&mut self, addr: u16, val: u8) {
        wrapping_set(self.sram_mut(), addr.wrapping_sub(SRAM_START) as usize, val)
    }
}

/// Open bus: reading an absent region yields zero.
fn wrapping_get(data: &[u8], index: usize) -> u8 {
    match data.len() {
        0 => 0,
        len => data[index % len],
    }
}

fn wrapping_set(data: &mut [u8], index: usize, val: u8) {
    let len = data.len();
    if len != 0 {
        data[index % len] = val;
    }
}

/// The fixed-size part of a cartridge that is captured by a snapshot: everything except the
/// storage regions, which are captured separately and only when they are writable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CartridgeState {
    pub mapper: Mapper,
    pub mirroring: Mirroring,
    pub cpu_rate_adjusted: f64,
    pub cpu_period_adjusted: u64,
}

/// The sizes of the writable regions of a cartridge. Two cartridges with the same layout (and
/// mapper) can exchange snapshots.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct RegionLayout {
    pub mapper: u16,
    pub prg_ram: usize,
    pub prg_nvram: usize,
    pub chr_ram: usize,
    pub chr_nvram: usize,
}

impl RegionLayout {
    pub fn total(&self) -> usize {
        self.prg_ram + self.prg_nvram + self.chr_ram + self.chr_nvram
    }
}

/// A cartridge with its mapper attached. Constructed once from a ROM image; afterwards only the
/// mapper's registers, the RAM regions, and the mirroring change.
#[derive(Debug, Clone, PartialEq)]
pub struct Cartridge {
    pub board: Board,
    mapper: Mapper,
    region: Region,
    battery: bool,
    /// The base CPU clock rate in Hz for the cartridge's region.
    cpu_rate: u32,
    /// `cpu_rate` scaled by the speed multiplier.
    cpu_rate_adjusted: f64,
    /// The length of one adjusted CPU cycle in nanoseconds.
    cpu_period_adjusted: u64,
}

impl Cartridge {
    pub fn from_rom(rom: &[u8]) -> Result<Self, LoadError> {
        let header = RomHeader::parse(rom)?;
        let expected = header.image_len().ok_or(LoadError::TooLarge)?;
        if rom.len() < expected {
            return Err(LoadError::Truncated {
                expected,
                found: rom.len(),
            });
        }
        let prg_start = header.prg_rom_offset();
        let chr_start = prg_start + header.prg_rom_size;
        let mut board = Board {
            prg_rom: rom[prg_start..chr_start].to_vec(),
            chr_rom: rom[chr_start..chr_start + header.chr_rom_size].to_vec(),
            chr_ram: vec![0; header.chr_ram_size],
            chr_nvram: vec![0; header.chr_nvram_size],
            prg_ram: vec![0; header.prg_ram_size],
            prg_nvram: vec![0; header.prg_nvram_size],
            mirroring: header.mirroring,
        };
        let mapper = Mapper::new(header.mapper, &mut board)?;
        info!(
            "Loaded cartridge: mapper {} ({}), {} KiB PRG ROM, {} KiB CHR ROM, region {}",
            header.mapper,
            mapper.name(),
            board.prg_rom.len() / 1024,
            board.chr_rom.len() / 1024,
            header.region,
        );
        Ok(Self::with_board(board, mapper, header.region, header.battery))
    }

    /// Builds a cartridge around storage that was populated elsewhere.
    pub fn with_board(board: Board, mapper: Mapper, region: Region, battery: bool) -> Self {
        let cpu_rate = region.cpu_rate();
        let mut digest = Self {
            board,
            mapper,
            region,
            battery,
            cpu_rate,
            cpu_rate_adjusted: 0.0,
            cpu_period_adjusted: 0,
        };
        digest.set_speed(1.0);
        digest
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn mirroring(&self) -> Mirroring {
        self.board.mirroring
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn has_battery(&self) -> bool {
        self.battery
    }

    pub fn cpu_rate(&self) -> u32 {
        self.cpu_rate
    }

    pub fn cpu_rate_adjusted(&self) -> f64 {
        self.cpu_rate_adjusted
    }

    pub fn cpu_period_adjusted(&self) -> u64 {
        self.cpu_period_adjusted
    }

    /// Rescales the wall-clock pacing. Emulated logic is unaffected.
    pub fn set_speed(&mut self, multiplier: f32) {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            warn!("Ignoring speed multiplier {multiplier}");
            return;
        }
        self.cpu_rate_adjusted = f64::from(self.cpu_rate) * f64::from(multiplier);
        self.cpu_period_adjusted = (1_000_000_000.0 / self.cpu_rate_adjusted) as u64;
    }

    pub fn layout(&self) -> RegionLayout {
        RegionLayout {
            mapper: self.mapper.number(),
            prg_ram: self.board.prg_ram.len(),
            prg_nvram: self.board.prg_nvram.len(),
            chr_ram: self.board.chr_ram.len(),
            chr_nvram: self.board.chr_nvram.len(),
        }
    }

    /// The save RAM a battery keeps alive between sessions, if the board has one.
    pub fn battery_ram(&self) -> Option<&[u8]> {
        (self.battery && !self.board.prg_nvram.is_empty()).then_some(&self.board.prg_nvram[..])
    }

    /// Restores battery-backed save RAM. Extra bytes are ignored and missing bytes keep their
    /// current value.
    pub fn load_battery_ram(&mut self, data: &[u8]) {
        let len = data.len().min(self.board.prg_nvram.len());
        self.board.prg_nvram[..len].copy_from_slice(&data[..len]);
    }

    pub fn cpu_read(&self, addr: u16) -> u8 {
        self.mapper.cpu_read(&self.board, addr)
    }

    pub fn cpu_write(&mut self, addr: u16, val: u8) {
        self.mapper.cpu_write(&mut self.board, addr, val)
    }

    pub fn ppu_read(&self, addr: u16) -> u8 {
        self.mapper.ppu_read(&self.board, addr)
    }

    pub fn ppu_write(&mut self, addr: u16, val: u8) {
        self.mapper.ppu_write(&mut self.board, addr, val)
    }

    pub fn ppu_step(&mut self, tick: PpuTick) {
        self.mapper.ppu_step(tick)
    }

    pub fn apu_step(&mut self) {
        self.mapper.apu_step()
    }

    /// The level of the cartridge's IRQ line.
    pub fn irq(&self) -> bool {
        self.mapper.irq()
    }

    pub(crate) fn state(&self) -> CartridgeState {
        CartridgeState {
            mapper: self.mapper.clone(),
            mirroring: self.board.mirroring,
            cpu_rate_adjusted: self.cpu_rate_adjusted,
            cpu_period_adjusted: self.cpu_period_adjusted,
        }
    }

    pub(crate) fn restore(&mut self, state: CartridgeState) {
        let CartridgeState {
            mapper,
            mirroring,
            cpu_rate_adjusted,
            cpu_period_adjusted,
        } = state;
        self.mapper = mapper;
        self.board.mirroring = mirroring;
        self.cpu_rate_adjusted = cpu_rate_adjusted;
        self.cpu_period_adjusted = cpu_period_adjusted;
    }
}

#[cfg(test)]
mod tests {
    use super::{Board, Cartridge, Mirroring};
    use crate::cart::Mapper;
    use crate::rom::Region;

    #[test]
    fn nametable_mirroring() {
        assert_eq!(Mirroring::Horizontal.nametable_offset(0x2000), 0);
        assert_eq!(Mirroring::Horizontal.nametable_offset(0x2400), 0);
        assert_eq!(Mirroring::Horizontal.nametable_offset(0x2800), 0x400);
        assert_eq!(Mirroring::Vertical.nametable_offset(0x2400), 0x400);
        assert_eq!(Mirroring::Vertical.nametable_offset(0x2800), 0);
        assert_eq!(Mirroring::Vertical.nametable_offset(0x2C05), 0x405);
        assert_eq!(Mirroring::FourScreen.nametable_offset(0x2C00), 0xC00);
        assert_eq!(Mirroring::SingleScreenUpper.nametable_offset(0x2000), 0x400);
        // 0x3000..=0x3EFF mirrors 0x2000..=0x2EFF
        assert_eq!(Mirroring::Vertical.nametable_offset(0x3401), 0x401);
    }

    #[test]
    fn empty_regions_read_as_open_bus() {
        let board = Board::default();
        assert_eq!(board.prg_byte(0x4000, 3, 0x123), 0);
        assert_eq!(board.chr_byte(0x2000, 1, 0x10), 0);
        assert_eq!(board.sram_read(0x6000), 0);
    }

    #[test]
    fn speed_rescales_period() {
        let mut board = Board {
            prg_rom: vec![0; 0x4000],
            ..Default::default()
        };
        let mapper = Mapper::new(0, &mut board).unwrap();
        let mut cart = Cartridge::with_board(board, mapper, Region::Ntsc, false);
        assert_eq!(cart.cpu_rate(), 1_789_773);
        assert_eq!(cart.cpu_period_adjusted(), 558);

        cart.set_speed(2.0);
        assert_eq!(cart.cpu_period_adjusted(), 279);
        assert_eq!(cart.cpu_rate_adjusted(), 3_579_546.0);

        cart.set_speed(0.0);
        cart.set_speed(f32::NAN);
        assert_eq!(cart.cpu_period_adjusted(), 279);
    }
}
