//! Whole-machine snapshots and the rewind ring buffer.
//!
//! A snapshot is laid out as the postcard encoding of the CPU with work RAM, then the DMA unit,
//! the PPU, the APU and the cartridge's mapper registers, mirroring and clock, followed by the raw
//! bytes of the cartridge's PRG RAM, PRG NVRAM, CHR RAM and CHR NVRAM, in that order. Regions the
//! cartridge does not have take no space. ROM is never captured, nor are the pads.

use tracing::debug;

use crate::apu::Apu;
use crate::cart::{CartridgeState, RegionLayout};
use crate::cpu::Cpu;
use crate::error::SnapshotError;
use crate::mem::{Dma, WorkRam};
use crate::ppu::Ppu;
use crate::Nes;

/// Appends the snapshot of `nes` to `out`.
fn encode(nes: &Nes, out: Vec<u8>) -> Result<Vec<u8>, SnapshotError> {
    let bus = &nes.bus;
    let board = &bus.cart.board;
    let out = postcard::to_extend(&(&nes.cpu, &bus.ram), out)?;
    let out = postcard::to_extend(&bus.dma, out)?;
    let out = postcard::to_extend(&bus.ppu, out)?;
    let out = postcard::to_extend(&bus.apu, out)?;
    let mut out = postcard::to_extend(&bus.cart.state(), out)?;
    for region in [
        &board.prg_ram,
        &board.prg_nvram,
        &board.chr_ram,
        &board.chr_nvram,
    ] {
        out.extend_from_slice(region);
    }
    Ok(out)
}

/// A snapshot decoded in full, ready to be applied.
struct Decoded<'a> {
    cpu: Cpu,
    ram: WorkRam,
    dma: Dma,
    ppu: Ppu,
    apu: Apu,
    cart: CartridgeState,
    regions: &'a [u8],
}

fn decode(data: &[u8], layout: RegionLayout) -> Result<Decoded<'_>, SnapshotError> {
    let ((cpu, ram), rest) = postcard::take_from_bytes::<(Cpu, WorkRam)>(data)?;
    let (dma, rest) = postcard::take_from_bytes::<Dma>(rest)?;
    let (ppu, rest) = postcard::take_from_bytes::<Ppu>(rest)?;
    let (apu, rest) = postcard::take_from_bytes::<Apu>(rest)?;
    let (cart, regions) = postcard::take_from_bytes::<CartridgeState>(rest)?;
    if cart.mapper.number() != layout.mapper {
        return Err(SnapshotError::LayoutMismatch);
    }
    match regions.len().cmp(&layout.total()) {
        std::cmp::Ordering::Less => Err(SnapshotError::Truncated {
            missing: layout.total() - regions.len(),
        }),
        std::cmp::Ordering::Greater => Err(SnapshotError::LayoutMismatch),
        std::cmp::Ordering::Equal => Ok(Decoded {
            cpu,
            ram,
            dma,
            ppu,
            apu,
            cart,
            regions,
        }),
    }
}

impl Decoded<'_> {
    fn apply(self, nes: &mut Nes) {
        let Decoded {
            cpu,
            ram,
            dma,
            ppu,
            apu,
            cart,
            mut regions,
        } = self;
        nes.cpu = cpu;
        nes.bus.ram = ram;
        nes.bus.dma = dma;
        nes.bus.ppu = ppu;
        nes.bus.apu = apu;
        nes.bus.cart.restore(cart);
        let board = &mut nes.bus.cart.board;
        for region in [
            &mut board.prg_ram,
            &mut board.prg_nvram,
            &mut board.chr_ram,
            &mut board.chr_nvram,
        ] {
            let (head, tail) = regions.split_at(region.len());
            region.copy_from_slice(head);
            regions = tail;
        }
    }
}

/// Encodes the whole machine into a fresh buffer.
pub fn save_state(nes: &Nes) -> Result<Vec<u8>, SnapshotError> {
    encode(nes, Vec::new())
}

/// Restores a state produced by [`save_state`] for the same cartridge. Nothing is changed unless
/// the whole state decodes.
pub fn load_state(nes: &mut Nes, data: &[u8]) -> Result<(), SnapshotError> {
    let decoded = decode(data, nes.cartridge().layout())?;
    nes.bus.controller.reset();
    decoded.apply(nes);
    Ok(())
}

/// A fixed number of snapshot slots used as a ring. `head` counts every push and `tail` counts
/// every slot that has been overwritten; both only grow, and `head - tail` never exceeds the
/// slot count. The newest snapshot lives in slot `(head - 1) % count`.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    slots: Box<[Vec<u8>]>,
    /// The encoded size of the state this buffer was created from. Slots start with this much
    /// capacity.
    length: usize,
    layout: RegionLayout,
    /// The buffer the next push encodes into. It only replaces a slot once encoding succeeded,
    /// so a failed push never disturbs a stored snapshot.
    scratch: Vec<u8>,
    head: u64,
    tail: u64,
}

impl SnapshotBuffer {
    /// Creates a buffer of `count` slots sized for `nes`. Returns `None` if `count` is zero.
    pub fn new(nes: &Nes, count: usize) -> Option<Self> {
        if count == 0 {
            return None;
        }
        let length = encode(nes, Vec::new()).ok()?.len();
        if length == 0 {
            return None;
        }
        let slots = (0..count).map(|_| Vec::with_capacity(length)).collect();
        debug!("Snapshot buffer: {count} slots of {length} bytes");
        Some(Self {
            slots,
            length,
            layout: nes.cartridge().layout(),
            scratch: Vec::with_capacity(length),
            head: 0,
            tail: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The number of snapshots that can currently be popped.
    pub fn len(&self) -> usize {
        (self.head - self.tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn slot_len(&self) -> usize {
        self.length
    }

    fn slot_index(&self, cursor: u64) -> usize {
        (cursor % self.slots.len() as u64) as usize
    }

    /// Records the current state of `nes`. When the buffer is full, the oldest snapshot is
    /// overwritten.
    pub fn push(&mut self, nes: &Nes) -> Result<(), SnapshotError> {
        if nes.cartridge().layout() != self.layout {
            return Err(SnapshotError::LayoutMismatch);
        }
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        let encoded = encode(nes, scratch)?;
        let index = self.slot_index(self.head);
        self.scratch = std::mem::replace(&mut self.slots[index], encoded);
        if self.len() == self.capacity() {
            self.tail += 1;
        }
        self.head += 1;
        debug!("Pushed snapshot {} (frame {})", self.head, nes.frame());
        Ok(())
    }

    /// Restores the newest snapshot into `nes` and drops it from the buffer. Returns `false` if
    /// the buffer is empty. The pads are released since held input is not part of a snapshot.
    ///
    /// A slot that fails to decode is still dropped, and `nes` is left untouched.
    pub fn pop(&mut self, nes: &mut Nes) -> Result<bool, SnapshotError> {
        if self.is_empty() {
            return Ok(false);
        }
        if nes.cartridge().layout() != self.layout {
            return Err(SnapshotError::LayoutMismatch);
        }
        self.head -= 1;
        let index = self.slot_index(self.head);
        let decoded = decode(&self.slots[index], self.layout)?;
        nes.bus.controller.reset();
        decoded.apply(nes);
        debug!("Popped snapshot {} (frame {})", self.head + 1, nes.frame());
        Ok(true)
    }

    /// The raw bytes of the newest snapshot.
    pub fn newest(&self) -> Option<&[u8]> {
        (!self.is_empty()).then(|| &self.slots[self.slot_index(self.head - 1)][..])
    }

    pub fn clear(&mut self) {
        self.tail = self.head;
    }
}
