//! The picture processing unit. Only the parts of the PPU that software can observe through its
//! registers and its timing are modelled; no pixels are produced.
//!
//! A frame is 341 dots by 262 scanlines (312 on PAL and Dendy). Scanlines 0-239 are visible,
//! vblank begins on scanline 241, and the last scanline is the pre-render line.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use tracing::trace;

use crate::cart::{Cartridge, PpuTick};
use crate::rom::Region;

pub const DOTS_PER_SCANLINE: u16 = 341;
pub const VISIBLE_SCANLINES: u16 = 240;
pub const VBLANK_SCANLINE: u16 = 241;

/// PPUCTRL bit 7.
const CTRL_NMI: u8 = 0x80;
/// PPUCTRL bit 2, the VRAM address increment.
const CTRL_INCREMENT: u8 = 0x04;
/// PPUMASK bits 3 and 4.
const MASK_RENDERING: u8 = 0x18;

const STATUS_VBLANK: u8 = 0x80;
const STATUS_SPRITE_ZERO: u8 = 0x40;
const STATUS_OVERFLOW: u8 = 0x20;

#[serde_as]
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ppu {
    /// 0x2000
    ctrl: u8,
    /// 0x2001
    mask: u8,
    /// 0x2002. Only the top three bits are real.
    status: u8,
    /// 0x2003
    oam_addr: u8,
    /// The current VRAM address.
    v: u16,
    /// The temporary VRAM address, loaded into `v` by the second 0x2006 write.
    t: u16,
    fine_x: u8,
    /// The shared first/second write toggle of 0x2005 and 0x2006.
    w: bool,
    /// 0x2007 reads lag one access behind, except in palette memory.
    read_buffer: u8,
    /// The last value driven on the register bus.
    open_bus: u8,
    #[serde_as(as = "serde_with::Bytes")]
    oam: [u8; 0x100],
    /// Nametable memory. The console has 2 KiB; four-screen boards supply the other 2 KiB, which
    /// is kept here as well.
    #[serde_as(as = "serde_with::Bytes")]
    vram: [u8; 0x1000],
    #[serde_as(as = "serde_with::Bytes")]
    palette: [u8; 0x20],
    scanline: u16,
    dot: u16,
    /// Completed frames since power-on.
    frame: u64,
    odd_frame: bool,
    /// Set on the rising edge of "vblank and NMI enabled", cleared when the CPU takes it.
    nmi_pending: bool,
    pre_render: u16,
}

impl Ppu {
    pub fn new(region: Region) -> Self {
        Self {
            ctrl: 0,
            mask: 0,
            status: 0,
            oam_addr: 0,
            v: 0,
            t: 0,
            fine_x: 0,
            w: false,
            read_buffer: 0,
            open_bus: 0,
            oam: [0; 0x100],
            vram: [0; 0x1000],
            palette: [0; 0x20],
            scanline: 0,
            dot: 0,
            frame: 0,
            odd_frame: false,
            nmi_pending: false,
            pre_render: region.pre_render_scanline(),
        }
    }

    /// Clears the registers and restarts the frame. Memory and the frame count are kept.
    pub fn reset(&mut self) {
        self.ctrl = 0;
        self.mask = 0;
        self.status = 0;
        self.oam_addr = 0;
        self.v = 0;
        self.t = 0;
        self.fine_x = 0;
        self.w = false;
        self.read_buffer = 0;
        self.open_bus = 0;
        self.scanline = 0;
        self.dot = 0;
        self.odd_frame = false;
        self.nmi_pending = false;
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn dot(&self) -> u16 {
        self.dot
    }

    pub fn ctrl(&self) -> u8 {
        self.ctrl
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn vram_addr(&self) -> u16 {
        self.v
    }

    pub fn oam(&self) -> &[u8; 0x100] {
        &self.oam
    }

    pub fn nametables(&self) -> &[u8; 0x1000] {
        &self.vram
    }

    pub fn palette(&self) -> &[u8; 0x20] {
        &self.palette
    }

    pub fn in_vblank(&self) -> bool {
        self.status & STATUS_VBLANK != 0
    }

    pub fn rendering(&self) -> bool {
        self.mask & MASK_RENDERING != 0
    }

    /// Consumes the pending NMI edge, if any.
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_pending)
    }

    /// Advances the PPU by one dot.
    pub fn step(&mut self, cart: &mut Cartridge) {
        let rendering = self.rendering();
        cart.ppu_step(PpuTick {
            scanline: self.scanline,
            dot: self.dot,
            pre_render: self.scanline == self.pre_render,
            rendering,
        });

        if self.dot == 1 {
            if self.scanline == VBLANK_SCANLINE {
                self.status |= STATUS_VBLANK;
                if self.ctrl & CTRL_NMI != 0 {
                    self.nmi_pending = true;
                }
            } else if self.scanline == self.pre_render {
                self.status &= !(STATUS_VBLANK | STATUS_SPRITE_ZERO | STATUS_OVERFLOW);
            }
        }
        if rendering && self.scanline < VISIBLE_SCANLINES {
            self.check_sprite_zero();
        }

        self.dot += 1;
        // Odd frames drop the last dot of the pre-render line while rendering.
        if self.odd_frame && rendering && self.scanline == self.pre_render && self.dot == 340 {
            self.dot = DOTS_PER_SCANLINE;
        }
        if self.dot >= DOTS_PER_SCANLINE {
            self.dot = 0;
            self.scanline += 1;
            if self.scanline > self.pre_render {
                self.scanline = 0;
                self.frame += 1;
                self.odd_frame = !self.odd_frame;
            }
        }
    }

    /// Nothing is drawn, so the hit is reported when the beam reaches sprite zero's top-left
    /// corner with both layers enabled.
    fn check_sprite_zero(&mut self) {
        let y = self.oam[0] as u16 + 1;
        let x = self.oam[3] as u16 + 1;
        if self.mask & MASK_RENDERING == MASK_RENDERING && self.scanline == y && self.dot == x {
            self.status |= STATUS_SPRITE_ZERO;
        }
    }

    /// The value a read of `addr` would return, without side effects.
    pub fn peek_register(&self, addr: u16) -> u8 {
        match addr & 0x07 {
            2 => (self.status & 0xE0) | (self.open_bus & 0x1F),
            4 => self.oam[self.oam_addr as usize],
            _ => self.open_bus,
        }
    }

    /// A CPU read of 0x2000..=0x3FFF.
    pub fn read_register(&mut self, addr: u16, cart: &Cartridge) -> u8 {
        let val = match addr & 0x07 {
            2 => {
                let val = (self.status & 0xE0) | (self.open_bus & 0x1F);
                self.status &= !STATUS_VBLANK;
                self.w = false;
                val
            }
            4 => self.oam[self.oam_addr as usize],
            7 => {
                let addr = self.v & 0x3FFF;
                let val = if addr >= 0x3F00 {
                    // The buffer picks up the nametable byte underneath the palette.
                    self.read_buffer = self.read_vram(addr - 0x1000, cart);
                    self.palette[palette_index(addr)]
                } else {
                    let fetched = self.read_vram(addr, cart);
                    std::mem::replace(&mut self.read_buffer, fetched)
                };
                self.increment_v();
                val
            }
            _ => self.open_bus,
        };
        self.open_bus = val;
        val
    }

    /// A CPU write of 0x2000..=0x3FFF.
    pub fn write_register(&mut self, addr: u16, val: u8, cart: &mut Cartridge) {
        self.open_bus = val;
        match addr & 0x07 {
            0 => {
                let was_enabled = self.ctrl & CTRL_NMI != 0;
                self.ctrl = val;
                self.t = (self.t & 0xF3FF) | (((val & 0x03) as u16) << 10);
                if !was_enabled && val & CTRL_NMI != 0 && self.in_vblank() {
                    self.nmi_pending = true;
                }
            }
            1 => self.mask = val,
            3 => self.oam_addr = val,
            4 => self.write_oam(val),
            5 => {
                if self.w {
                    self.t = (self.t & 0x8C1F)
                        | (((val & 0x07) as u16) << 12)
                        | (((val & 0xF8) as u16) << 2);
                } else {
                    self.t = (self.t & !0x001F) | (val >> 3) as u16;
                    self.fine_x = val & 0x07;
                }
                self.w = !self.w;
            }
            6 => {
                if self.w {
                    self.t = (self.t & 0xFF00) | val as u16;
                    self.v = self.t;
                } else {
                    self.t = (self.t & 0x00FF) | (((val & 0x3F) as u16) << 8);
                }
                self.w = !self.w;
            }
            7 => {
                self.write_vram(self.v & 0x3FFF, val, cart);
                self.increment_v();
            }
            _ => {}
        }
    }

    /// One byte of an OAM DMA transfer.
    pub fn write_oam(&mut self, val: u8) {
        self.oam[self.oam_addr as usize] = val;
        self.oam_addr = self.oam_addr.wrapping_add(1);
    }

    fn increment_v(&mut self) {
        let step = if self.ctrl & CTRL_INCREMENT != 0 { 32 } else { 1 };
        self.v = self.v.wrapping_add(step) & 0x7FFF;
    }

    fn read_vram(&self, addr: u16, cart: &Cartridge) -> u8 {
        match addr {
            0x0000..=0x1FFF => cart.ppu_read(addr),
            0x2000..=0x3EFF => self.vram[cart.mirroring().nametable_offset(addr)],
            _ => self.palette[palette_index(addr)],
        }
    }

    fn write_vram(&mut self, addr: u16, val: u8, cart: &mut Cartridge) {
        match addr {
            0x0000..=0x1FFF => cart.ppu_write(addr, val),
            0x2000..=0x3EFF => self.vram[cart.mirroring().nametable_offset(addr)] = val,
            _ => {
                trace!("Palette 0x{addr:0>4X} = 0x{val:0>2X}");
                self.palette[palette_index(addr)] = val & 0x3F;
            }
        }
    }
}

/// 0x3F10, 0x3F14, 0x3F18 and 0x3F1C mirror the background entries below them.
fn palette_index(addr: u16) -> usize {
    let index = (addr & 0x1F) as usize;
    if index & 0x13 == 0x10 {
        index & !0x10
    } else {
        index
    }
}

#[cfg(test)]
mod tests {
    use super::{palette_index, Ppu};
    use crate::cart::mapper::tests::numbered_board;
    use crate::cart::{Cartridge, Mapper, Mirroring};
    use crate::rom::Region;

    fn cartridge() -> Cartridge {
        let mut board = numbered_board(2, 0);
        board.mirroring = Mirroring::Vertical;
        let mapper = Mapper::new(0, &mut board).unwrap();
        Cartridge::with_board(board, mapper, Region::Ntsc, false)
    }

    fn run_to(ppu: &mut Ppu, cart: &mut Cartridge, scanline: u16, dot: u16) {
        while ppu.scanline() != scanline || ppu.dot() != dot {
            ppu.step(cart);
        }
    }

    #[test]
    fn frame_timing() {
        let mut cart = cartridge();
        let mut ppu = Ppu::new(Region::Ntsc);
        let mut dots = 0u32;
        while ppu.frame() == 0 {
            ppu.step(&mut cart);
            dots += 1;
        }
        assert_eq!(dots, 341 * 262);
        assert_eq!((ppu.scanline(), ppu.dot()), (0, 0));
    }

    #[test]
    fn odd_frames_skip_a_dot_while_rendering() {
        let mut cart = cartridge();
        let mut ppu = Ppu::new(Region::Ntsc);
        ppu.write_register(0x2001, 0x08, &mut cart);
        (0..341 * 262).for_each(|_| ppu.step(&mut cart));
        assert_eq!(ppu.frame(), 1);
        let mut dots = 0u32;
        while ppu.frame() == 1 {
            ppu.step(&mut cart);
            dots += 1;
        }
        assert_eq!(dots, 341 * 262 - 1);
    }

    #[test]
    fn pal_frames_are_longer() {
        let mut cart = cartridge();
        let mut ppu = Ppu::new(Region::Pal);
        (0..341 * 262).for_each(|_| ppu.step(&mut cart));
        assert_eq!(ppu.frame(), 0);
        assert_eq!(ppu.scanline(), 262);
    }

    #[test]
    fn vblank_and_nmi() {
        let mut cart = cartridge();
        let mut ppu = Ppu::new(Region::Ntsc);
        ppu.write_register(0x2000, 0x80, &mut cart);
        run_to(&mut ppu, &mut cart, 241, 2);
        assert!(ppu.in_vblank());
        assert!(ppu.take_nmi());
        assert!(!ppu.take_nmi());

        // Reading the status clears vblank and reports it once.
        assert_eq!(ppu.read_register(0x2002, &cart) & 0x80, 0x80);
        assert_eq!(ppu.read_register(0x2002, &cart) & 0x80, 0);

        run_to(&mut ppu, &mut cart, 261, 2);
        assert!(!ppu.in_vblank());
    }

    #[test]
    fn enabling_nmi_during_vblank() {
        let mut cart = cartridge();
        let mut ppu = Ppu::new(Region::Ntsc);
        run_to(&mut ppu, &mut cart, 250, 0);
        assert!(!ppu.take_nmi());
        ppu.write_register(0x2000, 0x80, &mut cart);
        assert!(ppu.take_nmi());
    }

    #[test]
    fn buffered_vram_reads() {
        let mut cart = cartridge();
        let mut ppu = Ppu::new(Region::Ntsc);
        ppu.write_register(0x2006, 0x24, &mut cart);
        ppu.write_register(0x2006, 0x00, &mut cart);
        ppu.write_register(0x2007, 0xAB, &mut cart);
        ppu.write_register(0x2007, 0xCD, &mut cart);
        // Vertical mirroring: 0x2400 is the second physical table
        assert_eq!(ppu.nametables()[0x400], 0xAB);

        ppu.write_register(0x2006, 0x2C, &mut cart);
        ppu.write_register(0x2006, 0x00, &mut cart);
        let _ = ppu.read_register(0x2007, &cart);
        assert_eq!(ppu.read_register(0x2007, &cart), 0xAB);
        assert_eq!(ppu.read_register(0x2007, &cart), 0xCD);
    }

    #[test]
    fn palette_reads_are_immediate() {
        let mut cart = cartridge();
        let mut ppu = Ppu::new(Region::Ntsc);
        ppu.write_register(0x2006, 0x3F, &mut cart);
        ppu.write_register(0x2006, 0x10, &mut cart);
        ppu.write_register(0x2007, 0x21, &mut cart);
        assert_eq!(ppu.palette()[0], 0x21);
        ppu.write_register(0x2006, 0x3F, &mut cart);
        ppu.write_register(0x2006, 0x00, &mut cart);
        assert_eq!(ppu.read_register(0x2007, &cart), 0x21);
        assert_eq!(palette_index(0x3F14), 0x04);
        assert_eq!(palette_index(0x3F11), 0x11);
    }

    #[test]
    fn chr_ram_through_the_mapper() {
        let mut cart = cartridge();
        let mut ppu = Ppu::new(Region::Ntsc);
        ppu.write_register(0x2006, 0x00, &mut cart);
        ppu.write_register(0x2006, 0x10, &mut cart);
        ppu.write_register(0x2007, 0x99, &mut cart);
        assert_eq!(cart.ppu_read(0x0010), 0x99);
    }

    #[test]
    fn sprite_zero_hit() {
        let mut cart = cartridge();
        let mut ppu = Ppu::new(Region::Ntsc);
        ppu.write_register(0x2003, 0x00, &mut cart);
        [30, 0, 0, 40].into_iter().for_each(|b| ppu.write_oam(b));
        ppu.write_register(0x2001, 0x18, &mut cart);
        run_to(&mut ppu, &mut cart, 31, 41);
        assert_eq!(ppu.status() & 0x40, 0);
        ppu.step(&mut cart);
        assert_eq!(ppu.status() & 0x40, 0x40);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut cart = cartridge();
        let mut ppu = Ppu::new(Region::Ntsc);
        ppu.write_register(0x2000, 0x90, &mut cart);
        (0..1000).for_each(|_| ppu.step(&mut cart));
        ppu.reset();
        let once = ppu.clone();
        ppu.reset();
        assert_eq!(ppu, once);
        assert_eq!(ppu.ctrl(), 0);
    }
}
