//! Banshee is the core crate of the project. It contains all of the logic needed to emulate the
//! 8-bit console with a cartridge inserted: the CPU, the picture and audio units, the DMA unit,
//! the pads, and the cartridge with its mapper chip. It is free of any presentation concerns;
//! hosts drive it one frame (or one instruction) at a time and pace it themselves.
//!
//! # Timing
//! The CPU is the master clock. After every instruction the PPU is stepped three times and the APU
//! once for each CPU cycle the instruction took. A frame ends when the PPU wraps from the
//! pre-render line back to the first visible line.

use tracing::debug;

pub mod apu;
pub mod cart;
pub mod cpu;
pub mod debug;
pub mod error;
pub mod mem;
pub mod ppu;
pub mod rom;
pub mod snapshot;

pub use apu::AudioSink;
pub use cart::{Cartridge, Mapper, MapperChip, Mirroring};
pub use cpu::Cpu;
pub use debug::{Breakpoints, DebugAction, Debuggee, Debugger};
pub use error::{LoadError, SnapshotError};
pub use mem::{Bus, Button, Buttons};
pub use rom::Region;
pub use snapshot::SnapshotBuffer;

use crate::mem::Dma;

/// PPU dots per CPU cycle.
pub const PPU_STEPS_PER_CYCLE: u32 = 3;

/// Represents a console with a cartridge inserted. This is the core emulation primitive: it holds
/// the entire machine state and is agnostic to how (or whether) it is presented. It must be
/// stepped forward by the host.
pub struct Nes {
    cpu: Cpu,
    bus: Bus,
    debugger: Option<Box<dyn Debugger>>,
    /// The debugger stopped the machine before the instruction at PC.
    suspended: bool,
}

impl Nes {
    /// Parses a ROM image and powers the console on.
    pub fn new(rom: &[u8]) -> Result<Self, LoadError> {
        Ok(Self::from_cartridge(Cartridge::from_rom(rom)?))
    }

    pub fn from_cartridge(cart: Cartridge) -> Self {
        let mut digest = Self {
            cpu: Cpu::new(),
            bus: Bus::new(cart),
            debugger: None,
            suspended: false,
        };
        digest.reset();
        digest
    }

    /// Presses the reset button. The CPU is reset first (which loads the reset vector through the
    /// cartridge), then the DMA unit, the PPU, the APU and the pads. Work RAM and the cartridge
    /// are left alone.
    pub fn reset(&mut self) {
        self.cpu.reset(&mut self.bus);
        self.bus.dma.reset();
        self.bus.ppu.reset();
        self.bus.apu.reset();
        self.bus.controller.reset();
        self.suspended = false;
        debug!("Reset, PC at 0x{:0>4X}", self.cpu.pc);
    }

    pub fn set_debugger(&mut self, debugger: Option<Box<dyn Debugger>>) {
        self.debugger = debugger;
    }

    /// Installs the audio sink. A `None` sink or a rate of zero turns audio output off.
    pub fn set_audio(&mut self, sink: Option<Box<dyn AudioSink>>, sample_rate: u32) {
        self.bus.set_audio(sink, sample_rate);
    }

    /// Scales the pacing [`Nes::step_frame`] reports. The emulation itself is unaffected.
    pub fn set_speed(&mut self, multiplier: f32) {
        self.bus.cart.set_speed(multiplier);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Executes one instruction (or interrupt entry) and catches the other devices up. Returns
    /// the cycles spent, or `None` if the debugger suspended before the instruction.
    pub fn step(&mut self) -> Option<u32> {
        if !std::mem::take(&mut self.suspended) {
            if let Some(debugger) = self.debugger.as_mut() {
                let mut debuggee = Debuggee {
                    cpu: &mut self.cpu,
                    bus: &mut self.bus,
                };
                if debugger.on_instruction(&mut debuggee).is_suspend() {
                    self.suspended = true;
                    return None;
                }
            }
        }

        let mut cycles = self.cpu.step(&mut self.bus);
        if let Some(page) = self.bus.dma.take_request() {
            let stall = Dma::stall_cycles(self.cpu.cycles);
            self.bus.oam_dma(page);
            self.cpu.cycles += u64::from(stall);
            cycles += stall;
        }
        for _ in 0..cycles {
            self.bus.tick();
        }
        Some(cycles)
    }

    /// Runs until the PPU finishes the current frame. Returns how long that takes in wall-clock
    /// nanoseconds at the current speed. If the debugger suspends, this returns early with the
    /// time of the cycles that did run; the next call picks up where it left off.
    pub fn step_frame(&mut self) -> u64 {
        let target = self.bus.ppu.frame() + 1;
        let mut cycles = 0u64;
        while self.bus.ppu.frame() < target {
            match self.step() {
                Some(spent) => cycles += u64::from(spent),
                None => break,
            }
        }
        self.bus.cart.cpu_period_adjusted() * cycles
    }

    /// Completed frames since power-on.
    pub fn frame(&self) -> u64 {
        self.bus.ppu.frame()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.bus.cart
    }

    pub fn cartridge_mut(&mut self) -> &mut Cartridge {
        &mut self.bus.cart
    }

    pub fn set_buttons(&mut self, port: usize, buttons: Buttons) {
        self.bus.controller.set_buttons(port, buttons);
    }

    pub fn press(&mut self, port: usize, button: Button) {
        self.bus.controller.press(port, button);
    }

    pub fn release(&mut self, port: usize, button: Button) {
        self.bus.controller.release(port, button);
    }
}
