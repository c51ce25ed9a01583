//! The audio processing unit. The two pulse channels and the frame sequencer are modelled; the
//! triangle, noise and DMC registers are latched so software can write them, but they stay silent.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Length counter reload values, indexed by the top five bits of 0x4003/0x4007.
const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 1, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 0, 0, 0, 0, 0],
    [0, 1, 1, 1, 1, 0, 0, 0],
    [1, 0, 0, 1, 1, 1, 1, 1],
];

/// Frame sequencer steps, in CPU cycles since the sequence started.
const STEP_1: u32 = 7457;
const STEP_2: u32 = 14913;
const STEP_3: u32 = 22371;
const STEP_4: u32 = 29829;
const FOUR_STEP_PERIOD: u32 = 29830;
const STEP_5: u32 = 37281;
const FIVE_STEP_PERIOD: u32 = 37282;

/// Receives audio samples from inside the step loop, one call per sample, in the range 0.0..1.0.
pub trait AudioSink {
    fn push_sample(&mut self, sample: f32);
}

impl<F: FnMut(f32)> AudioSink for F {
    fn push_sample(&mut self, sample: f32) {
        self(sample)
    }
}

#[derive(Debug, Default, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pulse {
    enabled: bool,
    duty: u8,
    /// Also the envelope loop flag.
    halt: bool,
    constant_volume: bool,
    /// The constant volume, or the envelope period. Either way it sets the output level here.
    volume: u8,
    /// 0x4001/0x4005, latched only.
    sweep: u8,
    timer_period: u16,
    timer: u16,
    sequence: u8,
    length: u8,
}

impl Pulse {
    fn write(&mut self, reg: u16, val: u8) {
        match reg {
            0 => {
                self.duty = val >> 6;
                self.halt = val & 0x20 != 0;
                self.constant_volume = val & 0x10 != 0;
                self.volume = val & 0x0F;
            }
            1 => self.sweep = val,
            2 => self.timer_period = (self.timer_period & 0x0700) | val as u16,
            _ => {
                self.timer_period = (self.timer_period & 0x00FF) | (((val & 0x07) as u16) << 8);
                if self.enabled {
                    self.length = LENGTH_TABLE[(val >> 3) as usize];
                }
                self.sequence = 0;
            }
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length = 0;
        }
    }

    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.sequence = (self.sequence + 1) & 0x07;
        } else {
            self.timer -= 1;
        }
    }

    fn clock_length(&mut self) {
        if !self.halt && self.length > 0 {
            self.length -= 1;
        }
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    /// The channel's current level, 0-15.
    pub fn output(&self) -> u8 {
        let audible = self.enabled && self.length > 0 && self.timer_period >= 8;
        if audible && DUTY_TABLE[self.duty as usize][self.sequence as usize] == 1 {
            self.volume
        } else {
            0
        }
    }
}

#[derive(Debug, Default, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apu {
    pulse: [Pulse; 2],
    /// Every register in 0x4000..=0x4013 as last written.
    registers: [u8; 0x14],
    five_step: bool,
    irq_inhibit: bool,
    frame_irq: bool,
    /// CPU cycles into the current frame sequence.
    sequencer: u32,
    /// CPU cycles since reset. Pulse timers tick on every other one.
    cycle: u64,
}

impl Apu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn pulse(&self, channel: usize) -> &Pulse {
        &self.pulse[channel & 1]
    }

    pub fn registers(&self) -> &[u8; 0x14] {
        &self.registers
    }

    pub fn five_step(&self) -> bool {
        self.five_step
    }

    /// The level of the frame counter's IRQ line.
    pub fn irq(&self) -> bool {
        self.frame_irq
    }

    /// The 0x4015 value without the read side effect.
    pub fn peek_status(&self) -> u8 {
        (self.pulse[0].length > 0) as u8
            | ((self.pulse[1].length > 0) as u8) << 1
            | (self.frame_irq as u8) << 6
    }

    /// A read of 0x4015. Acknowledges the frame IRQ.
    pub fn read_status(&mut self) -> u8 {
        let status = self.peek_status();
        self.frame_irq = false;
        status
    }

    /// A write to 0x4000..=0x4013, 0x4015 or 0x4017.
    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0x4000..=0x4013 => {
                self.registers[(addr - 0x4000) as usize] = val;
                if addr < 0x4008 {
                    let channel = ((addr - 0x4000) / 4) as usize;
                    self.pulse[channel].write(addr & 0x03, val);
                }
            }
            0x4015 => {
                self.pulse[0].set_enabled(val & 0x01 != 0);
                self.pulse[1].set_enabled(val & 0x02 != 0);
            }
            0x4017 => {
                self.five_step = val & 0x80 != 0;
                self.irq_inhibit = val & 0x40 != 0;
                if self.irq_inhibit {
                    self.frame_irq = false;
                }
                self.sequencer = 0;
                trace!(
                    "APU frame counter: {} step, IRQ inhibit {}",
                    if self.five_step { 5 } else { 4 },
                    self.irq_inhibit
                );
                if self.five_step {
                    self.half_frame();
                }
            }
            _ => {}
        }
    }

    /// Advances the APU by one CPU cycle.
    pub fn step(&mut self) {
        self.cycle += 1;
        if self.cycle % 2 == 0 {
            self.pulse.iter_mut().for_each(Pulse::clock_timer);
        }

        self.sequencer += 1;
        match (self.five_step, self.sequencer) {
            (_, STEP_1) | (_, STEP_3) => {}
            (_, STEP_2) => self.half_frame(),
            (false, STEP_4) => {
                self.half_frame();
                self.raise_irq();
            }
            (false, FOUR_STEP_PERIOD) => {
                self.raise_irq();
                self.sequencer = 0;
            }
            (true, STEP_5) => self.half_frame(),
            (true, FIVE_STEP_PERIOD) => self.sequencer = 0,
            _ => {}
        }
    }

    fn raise_irq(&mut self) {
        if !self.irq_inhibit {
            self.frame_irq = true;
        }
    }

    /// Quarter frames clock the envelopes, which are not modelled, so only half frames matter.
    fn half_frame(&mut self) {
        self.pulse.iter_mut().for_each(Pulse::clock_length);
    }

    /// The mixed output level, using the nonlinear pulse mixing formula.
    pub fn output(&self) -> f32 {
        let pulses = self.pulse[0].output() as f32 + self.pulse[1].output() as f32;
        if pulses == 0.0 {
            0.0
        } else {
            95.88 / (8128.0 / pulses + 100.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Apu;

    fn run(apu: &mut Apu, cycles: u32) {
        (0..cycles).for_each(|_| apu.step());
    }

    #[test]
    fn four_step_irq() {
        let mut apu = Apu::new();
        run(&mut apu, 29828);
        assert!(!apu.irq());
        run(&mut apu, 1);
        assert!(apu.irq());
        assert_eq!(apu.read_status() & 0x40, 0x40);
        assert!(!apu.irq());
        // The flag is raised again on the last cycle of the sequence.
        run(&mut apu, 1);
        assert!(apu.irq());
    }

    #[test]
    fn inhibit_and_five_step_never_raise() {
        let mut apu = Apu::new();
        apu.write_register(0x4017, 0x40);
        run(&mut apu, 40_000);
        assert!(!apu.irq());

        let mut apu = Apu::new();
        apu.write_register(0x4017, 0x80);
        run(&mut apu, 40_000);
        assert!(!apu.irq());
    }

    #[test]
    fn length_counters() {
        let mut apu = Apu::new();
        // Loading a length while disabled does nothing
        apu.write_register(0x4003, 0x08);
        assert_eq!(apu.pulse(0).length(), 0);

        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4003, 0x08);
        assert_eq!(apu.pulse(0).length(), 254);
        assert_eq!(apu.read_status() & 0x03, 0x01);

        // Two half frames per four-step sequence
        run(&mut apu, 29830);
        assert_eq!(apu.pulse(0).length(), 252);

        apu.write_register(0x4015, 0x00);
        assert_eq!(apu.pulse(0).length(), 0);
    }

    #[test]
    fn pulse_output_and_mix() {
        let mut apu = Apu::new();
        assert_eq!(apu.output(), 0.0);
        apu.write_register(0x4015, 0x01);
        // 75% duty, constant volume 15, period 0x100
        apu.write_register(0x4000, 0xDF);
        apu.write_register(0x4002, 0x00);
        apu.write_register(0x4003, 0x09);
        assert_eq!(apu.pulse(0).output(), 15);
        let level = apu.output();
        assert!((level - 95.88 / (8128.0 / 15.0 + 100.0)).abs() < 1e-6);
        assert_eq!(apu.registers()[0], 0xDF);
    }
}
