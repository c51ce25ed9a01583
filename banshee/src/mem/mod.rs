//! The CPU's view of the machine. [`Bus`] owns every device except the CPU and decodes the CPU
//! address space onto them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::apu::{Apu, AudioSink};
use crate::cart::Cartridge;
use crate::ppu::Ppu;

pub mod controller;
pub mod dma;

pub use controller::{Button, Buttons, Controller};
pub use dma::Dma;

/// The CPU's memory interface. Abstracted so the CPU can be tested against flat memory.
pub trait MemoryLike {
    fn read_byte(&mut self, addr: u16) -> u8;

    fn write_byte(&mut self, addr: u16, val: u8);

    /// Consumes a pending NMI edge.
    fn take_nmi(&mut self) -> bool {
        false
    }

    /// The level of the shared IRQ line.
    fn irq(&self) -> bool {
        false
    }
}

/// The generic helpers in here would make `MemoryLike` non-object safe.
pub trait MemoryLikeExt: MemoryLike {
    fn read_word(&mut self, addr: u16) -> u16 {
        let lo = self.read_byte(addr);
        let hi = self.read_byte(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Read-modify-write. Returns the written value.
    fn update_byte(&mut self, addr: u16, op: impl FnOnce(&mut u8)) -> u8 {
        let mut val = self.read_byte(addr);
        op(&mut val);
        self.write_byte(addr, val);
        val
    }
}

impl<M: MemoryLike + ?Sized> MemoryLikeExt for M {}

/// The console's 2 KiB of work RAM, mirrored through 0x0000..=0x1FFF.
#[serde_as]
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRam(#[serde_as(as = "serde_with::Bytes")] [u8; 0x800]);

impl WorkRam {
    pub fn new() -> Self {
        Self([0; 0x800])
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.0[(addr & 0x07FF) as usize]
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        self.0[(addr & 0x07FF) as usize] = val;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Default for WorkRam {
    fn default() -> Self {
        Self::new()
    }
}

/// Host audio output. Configuration, not machine state: it survives resets and restores.
#[derive(Default)]
struct AudioOut {
    sink: Option<Box<dyn AudioSink>>,
    sample_rate: u32,
    /// Bresenham-style accumulator: grows by `sample_rate` per CPU cycle and emits a sample every
    /// time it passes the CPU clock rate.
    clock: u64,
}

impl fmt::Debug for AudioOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioOut")
            .field("sink", &self.sink.is_some())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[derive(Debug)]
pub struct Bus {
    pub ram: WorkRam,
    pub ppu: Ppu,
    pub apu: Apu,
    pub dma: Dma,
    pub controller: Controller,
    pub cart: Cartridge,
    audio: AudioOut,
}

impl Bus {
    pub fn new(cart: Cartridge) -> Self {
        Self {
            ram: WorkRam::new(),
            ppu: Ppu::new(cart.region()),
            apu: Apu::new(),
            dma: Dma::new(),
            controller: Controller::new(),
            cart,
            audio: AudioOut::default(),
        }
    }

    pub(crate) fn set_audio(&mut self, sink: Option<Box<dyn AudioSink>>, sample_rate: u32) {
        self.audio = AudioOut {
            sink,
            sample_rate,
            clock: 0,
        };
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    /// One CPU cycle's worth of the other devices: three PPU dots and one APU step.
    pub fn tick(&mut self) {
        for _ in 0..3 {
            self.ppu.step(&mut self.cart);
        }
        self.apu.step();
        self.cart.apu_step();

        let audio = &mut self.audio;
        if let Some(sink) = audio.sink.as_mut() {
            if audio.sample_rate == 0 {
                return;
            }
            audio.clock += u64::from(audio.sample_rate);
            let cpu_rate = u64::from(self.cart.cpu_rate());
            if audio.clock >= cpu_rate {
                audio.clock -= cpu_rate;
                sink.push_sample(self.apu.output());
            }
        }
    }

    /// Copies one page into OAM, as the DMA unit does.
    pub fn oam_dma(&mut self, page: u8) {
        let base = (page as u16) << 8;
        for offset in 0..dma::OAM_DMA_LEN {
            let val = self.read_byte(base | offset);
            self.ppu.write_oam(val);
        }
    }

    /// Reads without the side effects registers have on real reads.
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram.read(addr),
            0x2000..=0x3FFF => self.ppu.peek_register(addr),
            0x4015 => self.apu.peek_status(),
            0x4016 => self.controller.peek(0),
            0x4017 => self.controller.peek(1),
            0x4000..=0x401F => 0,
            _ => self.cart.cpu_read(addr),
        }
    }
}

impl MemoryLike for Bus {
    fn read_byte(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram.read(addr),
            0x2000..=0x3FFF => self.ppu.read_register(addr, &self.cart),
            0x4015 => self.apu.read_status(),
            0x4016 => self.controller.read(0),
            0x4017 => self.controller.read(1),
            // Write-only APU registers and the disabled test registers.
            0x4000..=0x401F => 0,
            _ => self.cart.cpu_read(addr),
        }
    }

    fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram.write(addr, val),
            0x2000..=0x3FFF => self.ppu.write_register(addr, val, &mut self.cart),
            0x4014 => self.dma.request(val),
            0x4016 => self.controller.write(val),
            0x4000..=0x4013 | 0x4015 | 0x4017 => self.apu.write_register(addr, val),
            0x4018..=0x401F => {}
            _ => self.cart.cpu_write(addr, val),
        }
    }

    fn take_nmi(&mut self) -> bool {
        self.ppu.take_nmi()
    }

    fn irq(&self) -> bool {
        self.apu.irq() || self.cart.irq()
    }
}
