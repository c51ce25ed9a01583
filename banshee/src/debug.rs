//! Per-instruction debugger hooks.

use std::collections::BTreeSet;

use tracing::debug;

use crate::cpu::Cpu;
use crate::mem::{Bus, MemoryLike};

/// What the orchestrator should do after consulting the debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum DebugAction {
    Continue,
    /// Stop before the instruction at PC executes. The next step runs it without consulting the
    /// debugger again.
    Suspend,
}

/// The machine as the debugger sees it between two instructions.
pub struct Debuggee<'a> {
    pub(crate) cpu: &'a mut Cpu,
    pub(crate) bus: &'a mut Bus,
}

impl Debuggee<'_> {
    pub fn cpu(&self) -> &Cpu {
        self.cpu
    }

    /// Registers can be rewritten; the pending instruction is fetched from the new PC.
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        self.cpu
    }

    /// Reads a byte without triggering register side effects.
    pub fn peek(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    /// Writes a byte as the CPU would.
    pub fn poke(&mut self, addr: u16, val: u8) {
        self.bus.write_byte(addr, val)
    }

    pub fn frame(&self) -> u64 {
        self.bus.ppu.frame()
    }
}

/// Consulted at every instruction boundary.
pub trait Debugger {
    fn on_instruction(&mut self, debuggee: &mut Debuggee<'_>) -> DebugAction;
}

impl<F> Debugger for F
where
    F: FnMut(&mut Debuggee<'_>) -> DebugAction,
{
    fn on_instruction(&mut self, debuggee: &mut Debuggee<'_>) -> DebugAction {
        self(debuggee)
    }
}

/// Suspends whenever PC reaches one of a set of addresses.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Breakpoints {
    addrs: BTreeSet<u16>,
    hits: u64,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, addr: u16) -> bool {
        self.addrs.insert(addr)
    }

    pub fn remove(&mut self, addr: u16) -> bool {
        self.addrs.remove(&addr)
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }
}

impl FromIterator<u16> for Breakpoints {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self {
            addrs: iter.into_iter().collect(),
            hits: 0,
        }
    }
}

impl Debugger for Breakpoints {
    fn on_instruction(&mut self, debuggee: &mut Debuggee<'_>) -> DebugAction {
        let pc = debuggee.cpu().pc;
        if self.addrs.contains(&pc) {
            self.hits += 1;
            debug!("Breakpoint at 0x{pc:0>4X}, {}", debuggee.cpu());
            DebugAction::Suspend
        } else {
            DebugAction::Continue
        }
    }
}
