//! Wisp is a headless runner for banshee. It loads a ROM, runs it for a number of frames, and
//! reports what happened. Along the way it exercises rewinding, breakpoints, audio output and
//! battery-backed saves.

use std::cell::Cell;
use std::error::Error;
use std::path::PathBuf;
use std::rc::Rc;

use banshee::{Breakpoints, Nes, SnapshotBuffer};
use clap::Parser;
use tracing::{info, warn};

mod config;

use config::Config;

#[derive(Debug, Parser)]
#[command(version, about = "Runs a ROM without a display")]
struct Args {
    /// The iNES image to run.
    rom: PathBuf,
    /// How many frames to run.
    #[arg(short, long, default_value_t = 60)]
    frames: u64,
    /// A TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    speed: Option<f32>,
    #[arg(long)]
    rewind_slots: Option<usize>,
    /// How many snapshots to rewind through once the run is over.
    #[arg(long, default_value_t = 0)]
    rewind: usize,
    /// Stop and report the CPU whenever PC reaches this address (hex). May be repeated.
    #[arg(long, value_parser = parse_hex)]
    break_at: Vec<u16>,
    /// Battery-backed save RAM is loaded from and written back to this file.
    #[arg(long)]
    battery: Option<PathBuf>,
    #[arg(long)]
    log_level: Option<String>,
    /// Writes the merged config (file plus flags) to this path.
    #[arg(long)]
    save_config: Option<PathBuf>,
}

fn parse_hex(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches('$');
    u16::from_str_radix(digits, 16).map_err(|err| format!("{s:?} is not a 16-bit address: {err}"))
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(speed) = args.speed {
        config.speed = speed;
    }
    if let Some(slots) = args.rewind_slots {
        config.rewind_slots = slots;
    }
    if let Some(level) = args.log_level.clone() {
        config.log_level = level;
    }

    tracing_subscriber::fmt()
        .compact()
        .with_max_level(config.level()?)
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = args.save_config.as_deref() {
        config.save(path)?;
        info!("Saved config to {}", path.display());
    }

    let rom = std::fs::read(&args.rom)?;
    let mut nes = Nes::new(&rom)?;
    nes.set_speed(config.speed);

    if let Some(path) = args.battery.as_deref() {
        match std::fs::read(path) {
            Ok(data) => nes.cartridge_mut().load_battery_ram(&data),
            Err(err) => warn!("No battery RAM loaded from {}: {err}", path.display()),
        }
    }

    let samples = Rc::new(Cell::new(0u64));
    let counter = Rc::clone(&samples);
    nes.set_audio(
        Some(Box::new(move |_: f32| counter.set(counter.get() + 1))),
        config.sample_rate,
    );

    if !args.break_at.is_empty() {
        nes.set_debugger(Some(Box::new(
            args.break_at.iter().copied().collect::<Breakpoints>(),
        )));
    }

    let mut rewind = SnapshotBuffer::new(&nes, config.rewind_slots);
    let interval = config.snapshot_interval.max(1);
    let target = nes.frame() + args.frames;
    let mut nanos = 0u64;
    let mut breaks = 0u64;
    while nes.frame() < target {
        nanos += nes.step_frame();
        if nes.is_suspended() {
            breaks += 1;
            info!("Break at frame {}: {}", nes.frame(), nes.cpu());
            continue;
        }
        if let Some(rewind) = rewind.as_mut() {
            if nes.frame() % interval == 0 {
                rewind.push(&nes)?;
            }
        }
    }

    if let Some(rewind) = rewind.as_mut() {
        for _ in 0..args.rewind {
            if !rewind.pop(&mut nes)? {
                break;
            }
            info!("Rewound to frame {}", nes.frame());
        }
    }

    if let (Some(path), Some(data)) = (args.battery.as_deref(), nes.cartridge().battery_ram()) {
        std::fs::write(path, data)?;
        info!("Saved {} bytes of battery RAM to {}", data.len(), path.display());
    }

    let cart = nes.cartridge();
    println!(
        "{} ({}): {} frames, {:.3} s at {}x, {} breaks, {} audio samples, {} snapshots held",
        args.rom.display(),
        cart.mapper().name(),
        nes.frame(),
        nanos as f64 / 1e9,
        config.speed,
        breaks,
        samples.get(),
        rewind.as_ref().map_or(0, SnapshotBuffer::len),
    );
    println!("{}", nes.cpu());
    Ok(())
}
