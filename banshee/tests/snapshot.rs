use banshee::mem::MemoryLike;
use banshee::snapshot::{load_state, save_state};
use banshee::{Button, Mapper, Nes, SnapshotBuffer};

mod common;

use common::{RomBuilder, NMI_COUNTER};

fn run(nes: &mut Nes, frames: usize) {
    (0..frames).for_each(|_| {
        nes.step_frame();
    });
}

#[test_log::test]
fn push_then_pop_restores_everything() {
    let mut nes = Nes::new(&RomBuilder::new(225).prg_banks(8).chr_banks(4).build()).unwrap();
    nes.bus_mut().write_byte(0xA000 | (2 << 6) | 1, 0);
    run(&mut nes, 5);

    let mut ring = SnapshotBuffer::new(&nes, 4).unwrap();
    ring.push(&nes).unwrap();
    let cpu = nes.cpu().clone();
    let ppu = nes.bus().ppu.clone();
    let apu = nes.bus().apu.clone();
    let mapper = nes.cartridge().mapper().clone();
    let state = save_state(&nes).unwrap();

    nes.bus_mut().write_byte(0x9000 | (6 << 6), 0);
    nes.bus_mut().write_byte(0x6000, 0xEE);
    run(&mut nes, 10);
    assert_ne!(nes.cpu(), &cpu);
    assert_ne!(nes.cartridge().mapper(), &mapper);

    assert!(ring.pop(&mut nes).unwrap());
    assert_eq!(nes.cpu(), &cpu);
    assert_eq!(nes.bus().ppu, ppu);
    assert_eq!(nes.bus().apu, apu);
    assert_eq!(nes.cartridge().mapper(), &mapper);
    assert_eq!(nes.cartridge().mirroring(), banshee::Mirroring::Horizontal);
    assert_eq!(nes.frame(), 5);
    assert_eq!(save_state(&nes).unwrap(), state);
    assert!(ring.is_empty());

    // The restored machine carries on exactly as it did the first time
    run(&mut nes, 1);
    assert_eq!(nes.bus().peek(NMI_COUNTER), 6);
}

#[test]
fn full_ring_keeps_the_newest() {
    let mut nes = Nes::new(&RomBuilder::new(0).build()).unwrap();
    let mut ring = SnapshotBuffer::new(&nes, 2).unwrap();
    for _ in 0..3 {
        run(&mut nes, 1);
        ring.push(&nes).unwrap();
    }
    assert_eq!(ring.len(), 2);
    assert_eq!(ring.capacity(), 2);

    assert!(ring.pop(&mut nes).unwrap());
    assert_eq!(nes.frame(), 3);
    assert!(ring.pop(&mut nes).unwrap());
    assert_eq!(nes.frame(), 2);
    assert!(!ring.pop(&mut nes).unwrap());
    assert_eq!(nes.frame(), 2);
}

#[test]
fn rewind_releases_the_pads() {
    let mut nes = Nes::new(&RomBuilder::new(0).build()).unwrap();
    let mut ring = SnapshotBuffer::new(&nes, 1).unwrap();
    nes.press(0, Button::A);
    ring.push(&nes).unwrap();
    assert!(ring.pop(&mut nes).unwrap());
    assert!(!nes.bus().controller.buttons(0).contains(Button::A));
}

#[test]
fn save_state_round_trip_across_machines() {
    let rom = RomBuilder::new(87).chr_banks(4).build();
    let mut original = Nes::new(&rom).unwrap();
    original.bus_mut().write_byte(0x6000, 0b01);
    run(&mut original, 2);
    let state = save_state(&original).unwrap();

    let mut copy = Nes::new(&rom).unwrap();
    load_state(&mut copy, &state).unwrap();
    assert_eq!(copy.cpu(), original.cpu());
    assert!(matches!(copy.cartridge().mapper(), Mapper::Jaleco87(chip) if chip.chr_bank() == 2));

    run(&mut original, 3);
    run(&mut copy, 3);
    assert_eq!(save_state(&copy).unwrap(), save_state(&original).unwrap());
}

#[test]
fn snapshots_do_not_fit_other_cartridges() {
    let nes = Nes::new(&RomBuilder::new(0).build()).unwrap();
    let mut other = Nes::new(&RomBuilder::new(87).build()).unwrap();
    let state = save_state(&nes).unwrap();
    assert!(load_state(&mut other, &state).is_err());

    let mut ring = SnapshotBuffer::new(&nes, 1).unwrap();
    assert!(ring.push(&other).is_err());
}

fn write_chr(nes: &mut Nes, addr: u16, val: u8) {
    let bus = nes.bus_mut();
    bus.write_byte(0x2006, (addr >> 8) as u8);
    bus.write_byte(0x2006, addr as u8);
    bus.write_byte(0x2007, val);
}

#[test]
fn pattern_table_writes_are_rewound() {
    let mut nes = Nes::new(&RomBuilder::new(87).chr_banks(4).build()).unwrap();
    let mut ring = SnapshotBuffer::new(&nes, 2).unwrap();
    write_chr(&mut nes, 0x0010, 0x11);
    ring.push(&nes).unwrap();

    write_chr(&mut nes, 0x0010, 0x99);
    assert_eq!(nes.cartridge().ppu_read(0x0010), 0x99);

    assert!(ring.pop(&mut nes).unwrap());
    assert_eq!(nes.cartridge().ppu_read(0x0010), 0x11);
}

#[test]
fn clear_drops_every_snapshot() {
    let mut nes = Nes::new(&RomBuilder::new(0).build()).unwrap();
    let mut ring = SnapshotBuffer::new(&nes, 3).unwrap();
    assert!(ring.newest().is_none());

    run(&mut nes, 1);
    ring.push(&nes).unwrap();
    assert_eq!(ring.newest(), Some(&save_state(&nes).unwrap()[..]));

    ring.push(&nes).unwrap();
    ring.clear();
    assert!(ring.is_empty());
    assert!(ring.newest().is_none());
    assert!(!ring.pop(&mut nes).unwrap());

    // Cleared slots are reused
    run(&mut nes, 1);
    ring.push(&nes).unwrap();
    assert_eq!(ring.len(), 1);
    assert!(ring.pop(&mut nes).unwrap());
    assert_eq!(nes.frame(), 2);
}
