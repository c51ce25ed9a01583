#![allow(dead_code)]

/// The address the test program starts at.
pub const PROGRAM_START: u16 = 0xC000;
/// The idle loop the program spins in.
pub const IDLE_LOOP: u16 = 0xC006;
pub const NMI_HANDLER: u16 = 0xC009;
/// Work RAM byte the NMI handler increments.
pub const NMI_COUNTER: u16 = 0x0010;
/// Every PRG bank holds its own bank number at this offset.
pub const BANK_MARKER: usize = 0x3000;

/// Enables the vblank NMI and spins; the NMI handler counts frames.
const PROGRAM: &[u8] = &[
    0x78, // SEI
    0xA9, 0x80, // LDA #$80
    0x8D, 0x00, 0x20, // STA $2000
    0x4C, 0x06, 0xC0, // JMP $C006
    0xE6, 0x10, // NMI: INC $10
    0x40, // RTI
    0x40, // IRQ: RTI
];

/// Builds iNES images in memory. Every 16 KiB PRG bank carries the same test program and
/// vectors, so the program runs whichever bank is mapped at 0xC000. Every 8 KiB CHR bank is
/// filled with its bank number.
#[derive(Debug, Clone)]
pub struct RomBuilder {
    mapper: u8,
    prg_banks: u8,
    chr_banks: u8,
    battery: bool,
    vertical: bool,
}

impl RomBuilder {
    pub fn new(mapper: u8) -> Self {
        Self {
            mapper,
            prg_banks: 2,
            chr_banks: 1,
            battery: false,
            vertical: false,
        }
    }

    pub fn prg_banks(mut self, banks: u8) -> Self {
        self.prg_banks = banks;
        self
    }

    pub fn chr_banks(mut self, banks: u8) -> Self {
        self.chr_banks = banks;
        self
    }

    pub fn battery(mut self) -> Self {
        self.battery = true;
        self
    }

    pub fn vertical(mut self) -> Self {
        self.vertical = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let flags6 = (self.mapper << 4) | (self.battery as u8) << 1 | self.vertical as u8;
        let flags7 = self.mapper & 0xF0;
        let mut rom = vec![
            b'N',
            b'E',
            b'S',
            0x1A,
            self.prg_banks,
            self.chr_banks,
            flags6,
            flags7,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
        ];
        for bank in 0..self.prg_banks {
            let mut data = vec![0xEA; 0x4000];
            data[..PROGRAM.len()].copy_from_slice(PROGRAM);
            data[BANK_MARKER] = bank;
            let [nmi_lo, nmi_hi] = NMI_HANDLER.to_le_bytes();
            let [reset_lo, reset_hi] = PROGRAM_START.to_le_bytes();
            let [irq_lo, irq_hi] = (NMI_HANDLER + 3).to_le_bytes();
            data[0x3FFA..].copy_from_slice(&[nmi_lo, nmi_hi, reset_lo, reset_hi, irq_lo, irq_hi]);
            rom.extend(data);
        }
        for bank in 0..self.chr_banks {
            rom.extend(std::iter::repeat_n(bank, 0x2000));
        }
        rom
    }
}
