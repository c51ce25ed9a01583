use serde::{Deserialize, Serialize};

/// The number of bytes one OAM DMA transfer copies.
pub const OAM_DMA_LEN: u16 = 0x100;

/// The cycles the CPU is halted for while an OAM DMA runs, plus one when the transfer starts on an
/// odd cycle.
pub const OAM_DMA_STALL: u32 = 513;

/// The sprite DMA unit at 0x4014. A write latches the source page; the transfer itself is run by
/// the orchestrator once the writing instruction has finished.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dma {
    page: u8,
    pending: bool,
}

impl Dma {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn request(&mut self, page: u8) {
        self.page = page;
        self.pending = true;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Hands out the requested page once.
    pub fn take_request(&mut self) -> Option<u8> {
        std::mem::take(&mut self.pending).then_some(self.page)
    }

    /// The stall length for a transfer that starts at the given CPU cycle.
    pub fn stall_cycles(cpu_cycle: u64) -> u32 {
        OAM_DMA_STALL + (cpu_cycle % 2) as u32
    }
}
