use banshee::cart::mapper::{Jaleco87, Multicart225};
use banshee::mem::MemoryLike;
use banshee::{LoadError, Mapper, Mirroring, Nes};

mod common;

use common::{RomBuilder, BANK_MARKER, NMI_COUNTER};

fn multicart(nes: &Nes) -> &Multicart225 {
    match nes.cartridge().mapper() {
        Mapper::Multicart225(chip) => chip,
        other => panic!("expected mapper 225, found {}", other.name()),
    }
}

fn jaleco(nes: &Nes) -> &Jaleco87 {
    match nes.cartridge().mapper() {
        Mapper::Jaleco87(chip) => chip,
        other => panic!("expected mapper 87, found {}", other.name()),
    }
}

/// The bank marker visible in the low and high PRG windows.
fn windows(nes: &Nes) -> (u8, u8) {
    let marker = BANK_MARKER as u16;
    (
        nes.bus().peek(0x8000 + marker),
        nes.bus().peek(0xC000 + marker),
    )
}

#[test_log::test]
fn multicart_power_on() {
    let nes = Nes::new(&RomBuilder::new(225).prg_banks(16).chr_banks(8).build()).unwrap();
    let chip = multicart(&nes);
    assert_eq!(chip.prg_banks(), (0, 15));
    assert_eq!(chip.chr_bank(), 0);
    assert_eq!(windows(&nes), (0, 15));
}

#[test]
fn multicart_thirty_two_kib_mode() {
    let mut nes = Nes::new(&RomBuilder::new(225).prg_banks(16).chr_banks(8).build()).unwrap();
    nes.bus_mut().write_byte(0x9000, 0x00);
    let (low, high) = multicart(&nes).prg_banks();
    assert_eq!(low, high);
    assert_eq!(nes.cartridge().mirroring(), Mirroring::Vertical);
    assert_eq!(windows(&nes), (0, 0));
}

#[test]
fn multicart_sixteen_kib_mode() {
    let mut nes = Nes::new(&RomBuilder::new(225).prg_banks(16).chr_banks(8).build()).unwrap();
    nes.bus_mut().write_byte(0xA000 | (3 << 6) | 2, 0x00);
    assert_eq!(multicart(&nes).prg_banks(), (3, 4));
    assert_eq!(multicart(&nes).chr_bank(), 2);
    assert_eq!(nes.cartridge().mirroring(), Mirroring::Horizontal);
    assert_eq!(windows(&nes), (3, 4));
    assert_eq!(nes.cartridge().ppu_read(0x0123), 2);
}

#[test]
fn multicart_keeps_running_after_a_switch() {
    let mut nes = Nes::new(&RomBuilder::new(225).prg_banks(16).chr_banks(8).build()).unwrap();
    nes.bus_mut().write_byte(0x8000 | (5 << 6), 0x00);
    (0..3).for_each(|_| {
        nes.step_frame();
    });
    assert_eq!(nes.bus().peek(NMI_COUNTER), 3);
}

#[test_log::test]
fn jaleco_chr_bank_swap() {
    let mut nes = Nes::new(&RomBuilder::new(87).chr_banks(4).build()).unwrap();
    assert_eq!(jaleco(&nes).chr_bank(), 0);

    nes.bus_mut().write_byte(0x6000, 0b10);
    assert_eq!(jaleco(&nes).chr_bank(), 1);
    assert_eq!(nes.cartridge().ppu_read(0x0000), 1);

    nes.bus_mut().write_byte(0x7FFF, 0b01);
    assert_eq!(jaleco(&nes).chr_bank(), 2);
    assert_eq!(nes.cartridge().ppu_read(0x1FFF), 2);

    // Unbanked program ROM, nothing readable at 0x6000
    assert_eq!(windows(&nes), (0, 1));
    assert_eq!(nes.bus().peek(0x6000), 0);
}

#[test]
fn jaleco_chr_writes_through_the_ppu() {
    let mut nes = Nes::new(&RomBuilder::new(87).chr_banks(4).build()).unwrap();
    let bus = nes.bus_mut();
    bus.write_byte(0x6000, 0b11);
    bus.write_byte(0x2006, 0x00);
    bus.write_byte(0x2006, 0x20);
    bus.write_byte(0x2007, 0x5A);
    assert_eq!(nes.cartridge().ppu_read(0x0020), 0x5A);
    let board = &nes.cartridge().board;
    assert!(board.chr_rom.is_empty());
    assert_eq!(board.chr_ram[3 * 0x2000 + 0x20], 0x5A);
}

#[test]
fn catalog_loads() {
    for number in [0, 1, 2, 3, 4, 7, 11, 66, 87, 225] {
        let nes = Nes::new(&RomBuilder::new(number).prg_banks(4).chr_banks(2).build())
            .unwrap_or_else(|err| panic!("mapper {number}: {err}"));
        assert_eq!(nes.cartridge().mapper().number(), number as u16);
    }
}

#[test]
fn rejects_bad_images() {
    assert_eq!(
        Nes::new(&RomBuilder::new(5).build()).err(),
        Some(LoadError::UnsupportedMapper { number: 5 })
    );
    let mut rom = RomBuilder::new(0).build();
    rom.truncate(rom.len() - 1);
    assert_eq!(
        Nes::new(&rom).err(),
        Some(LoadError::Truncated {
            expected: 16 + 0x8000 + 0x2000,
            found: 16 + 0x8000 + 0x2000 - 1,
        })
    );
    assert_eq!(Nes::new(b"NES").err(), Some(LoadError::TooShort { len: 3 }));

    let mut huge = vec![b'N', b'E', b'S', 0x1A, 0xFF, 0xFF, 0x00, 0x08, 0x00, 0xFF];
    huge.resize(16 + 64, 0);
    assert_eq!(Nes::new(&huge).err(), Some(LoadError::TooLarge));
}

#[test]
fn battery_ram() {
    let mut nes = Nes::new(&RomBuilder::new(0).battery().build()).unwrap();
    assert!(nes.cartridge().has_battery());
    nes.bus_mut().write_byte(0x6010, 0x99);
    let saved = nes.cartridge().battery_ram().unwrap().to_vec();
    assert_eq!(saved[0x10], 0x99);

    let mut fresh = Nes::new(&RomBuilder::new(0).battery().build()).unwrap();
    fresh.cartridge_mut().load_battery_ram(&saved);
    assert_eq!(fresh.bus().peek(0x6010), 0x99);

    let plain = Nes::new(&RomBuilder::new(0).build()).unwrap();
    assert!(plain.cartridge().battery_ram().is_none());
}
