use serde::{Deserialize, Serialize};

use crate::cart::Mirroring;
use crate::error::LoadError;

/// The size of the iNES trainer block that may sit between the header and the program ROM.
pub const TRAINER_SIZE: usize = 512;

/// The television standard a cartridge was built for. This decides the CPU clock rate and how
/// many scanlines the PPU draws per frame.
#[derive(
    Debug, Default, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize, derive_more::Display,
)]
pub enum Region {
    #[default]
    Ntsc,
    Pal,
    Dendy,
}

impl Region {
    /// The base CPU clock rate in Hz.
    pub const fn cpu_rate(self) -> u32 {
        match self {
            Region::Ntsc => 1_789_773,
            Region::Pal => 1_662_607,
            Region::Dendy => 1_773_448,
        }
    }

    /// The index of the last (pre-render) scanline.
    pub const fn pre_render_scanline(self) -> u16 {
        match self {
            Region::Ntsc => 261,
            Region::Pal | Region::Dendy => 311,
        }
    }
}

/// This struct represents an iNES header. Both the original format and NES 2.0 are understood.
/// The header occupies the first 16 bytes of the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomHeader {
    /// The mapper number. Only NES 2.0 images can carry numbers above 255.
    pub mapper: u16,
    /// The NES 2.0 submapper. Always zero for original iNES images.
    pub submapper: u8,
    /// The length of the program ROM in bytes.
    pub prg_rom_size: usize,
    /// The length of the character ROM in bytes. Zero means the board carries CHR RAM.
    pub chr_rom_size: usize,
    pub prg_ram_size: usize,
    pub prg_nvram_size: usize,
    pub chr_ram_size: usize,
    pub chr_nvram_size: usize,
    /// Hard-wired nametable mirroring. Mappers with a mirroring register override this.
    pub mirroring: Mirroring,
    /// Byte 6, bit 1. The save RAM is kept alive by a battery.
    pub battery: bool,
    /// Byte 6, bit 2. A 512 byte trainer precedes the program ROM.
    pub trainer: bool,
    pub region: Region,
    pub nes2: bool,
}

impl RomHeader {
    pub const LENGTH: usize = 16;

    const MAGIC: [u8; 4] = *b"NES\x1A";

    pub fn parse(rom: &[u8]) -> Result<Self, LoadError> {
        if rom.len() < Self::LENGTH {
            return Err(LoadError::TooShort { len: rom.len() });
        }
        if rom[0..4] != Self::MAGIC {
            return Err(LoadError::BadMagic);
        }
        let flags6 = rom[6];
        let flags7 = rom[7];
        let nes2 = (flags7 & 0x0C) == 0x08;

        let mirroring = if flags6 & 0x08 != 0 {
            Mirroring::FourScreen
        } else if flags6 & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };
        let battery = flags6 & 0x02 != 0;
        let trainer = flags6 & 0x04 != 0;
        let mut mapper = u16::from((flags6 >> 4) | (flags7 & 0xF0));

        let header = if nes2 {
            mapper |= u16::from(rom[8] & 0x0F) << 8;
            let prg_rom_size = nes2_rom_size(rom[4], rom[9] & 0x0F, 16 * 1024);
            let chr_rom_size = nes2_rom_size(rom[5], rom[9] >> 4, 8 * 1024);
            let region = match rom[12] & 0x03 {
                1 => Region::Pal,
                3 => Region::Dendy,
                _ => Region::Ntsc,
            };
            Self {
                mapper,
                submapper: rom[8] >> 4,
                prg_rom_size,
                chr_rom_size,
                prg_ram_size: nes2_ram_size(rom[10] & 0x0F),
                prg_nvram_size: nes2_ram_size(rom[10] >> 4),
                chr_ram_size: nes2_ram_size(rom[11] & 0x0F),
                chr_nvram_size: nes2_ram_size(rom[11] >> 4),
                mirroring,
                battery,
                trainer,
                region,
                nes2,
            }
        } else {
            // Original iNES images do not describe their RAM, so every board gets the 8 KiB
            // window at 0x6000. A battery moves that window into non-volatile RAM.
            let chr_rom_size = rom[5] as usize * 8 * 1024;
            let (prg_ram_size, prg_nvram_size) = if battery {
                (0, 8 * 1024)
            } else {
                (8 * 1024, 0)
            };
            Self {
                mapper,
                submapper: 0,
                prg_rom_size: rom[4] as usize * 16 * 1024,
                chr_rom_size,
                prg_ram_size,
                prg_nvram_size,
                chr_ram_size: if chr_rom_size == 0 { 8 * 1024 } else { 0 },
                chr_nvram_size: 0,
                mirroring,
                battery,
                trainer,
                region: if rom[9] & 0x01 != 0 {
                    Region::Pal
                } else {
                    Region::Ntsc
                },
                nes2,
            }
        };
        if header.prg_rom_size == 0 {
            return Err(LoadError::EmptyPrgRom);
        }
        if header.image_len().is_none() {
            return Err(LoadError::TooLarge);
        }
        Ok(header)
    }

    /// The offset of the program ROM within the image.
    pub fn prg_rom_offset(&self) -> usize {
        Self::LENGTH + if self.trainer { TRAINER_SIZE } else { 0 }
    }

    /// The total image length the header declares, or `None` if it does not fit in memory.
    pub fn image_len(&self) -> Option<usize> {
        self.prg_rom_offset()
            .checked_add(self.prg_rom_size)?
            .checked_add(self.chr_rom_size)
    }
}

/// NES 2.0 ROM sizes either use the plain LSB/MSB bank count or, when the MSB nibble is 0xF, the
/// exponent-multiplier form `2^E * (MM * 2 + 1)`.
fn nes2_rom_size(lsb: u8, msb: u8, unit: usize) -> usize {
    if msb == 0x0F {
        let exponent = u32::from(lsb >> 2);
        let multiplier = (lsb & 0x03) as usize * 2 + 1;
        2usize.saturating_pow(exponent).saturating_mul(multiplier)
    } else {
        ((msb as usize) << 8 | lsb as usize) * unit
    }
}

/// NES 2.0 RAM sizes are shift counts: `64 << n`, with zero meaning "none".
fn nes2_ram_size(shift: u8) -> usize {
    match shift {
        0 => 0,
        n => 64 << n,
    }
}
