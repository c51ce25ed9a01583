//! The console's CPU: a 6502 core without decimal mode. Instructions execute atomically; the
//! orchestrator catches the other devices up afterwards using the returned cycle cost.

use serde::Deserialize;
use serde::Serialize;
use tracing::trace;

use crate::mem::{MemoryLike, MemoryLikeExt};

mod ops;

pub use ops::{decode, Instr, Mode, Op};


pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// The cost of servicing an NMI or IRQ.
const INTERRUPT_CYCLES: u32 = 7;

const STACK_PAGE: u16 = 0x0100;

#[derive(
    Debug, Default, Hash, Clone, PartialEq, Eq, derive_more::Display, Serialize, Deserialize,
)]
#[display(
    "CPU {{ A=0x{:0>2X} X=0x{:0>2X} Y=0x{:0>2X} SP=0x{:0>2X} PC=0x{:0>4X} P=0x{:0>2X} cycles={} }}",
    a,
    x,
    y,
    sp,
    pc,
    p,
    cycles
)]
pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// The stack pointer. The stack lives in page one, so the full address is `0x0100 | sp`.
    pub sp: u8,
    pub pc: u16,
    /// The status register. See [`Flag`] for the bit layout.
    pub p: u8,
    /// Cycles executed since power-on, including DMA stalls charged by the orchestrator.
    pub cycles: u64,
}

/// The bits of the status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[repr(u8)]
pub enum Flag {
    Carry = 0x01,
    Zero = 0x02,
    InterruptDisable = 0x04,
    /// Stored but ignored; this CPU has no decimal mode.
    Decimal = 0x08,
    /// Only exists in copies of the status register pushed to the stack.
    Break = 0x10,
    Unused = 0x20,
    Overflow = 0x40,
    Negative = 0x80,
}

/// Where an instruction's operand lives once its addressing mode is resolved.
#[derive(Debug, Clone, Copy)]
struct Operand {
    addr: u16,
    /// The indexed address (or branch target) lies in a different page than its base.
    crossed: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts the registers in their documented post-reset state and loads the reset vector.
    pub fn reset<M: MemoryLike + ?Sized>(&mut self, mem: &mut M) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFD;
        self.p = Flag::InterruptDisable as u8 | Flag::Unused as u8;
        self.pc = mem.read_word(RESET_VECTOR);
        self.cycles = 7;
    }

    pub fn flag(&self, flag: Flag) -> bool {
        self.p & flag as u8 != 0
    }

    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        if value {
            self.p |= flag as u8;
        } else {
            self.p &= !(flag as u8);
        }
    }

    /// Services a pending interrupt or executes the instruction at PC. Returns the cycles spent.
    pub fn step<M: MemoryLike + ?Sized>(&mut self, mem: &mut M) -> u32 {
        let cycles = if mem.take_nmi() {
            self.interrupt(mem, NMI_VECTOR);
            INTERRUPT_CYCLES
        } else if mem.irq() && !self.flag(Flag::InterruptDisable) {
            self.interrupt(mem, IRQ_VECTOR);
            INTERRUPT_CYCLES
        } else {
            self.execute(mem)
        };
        self.cycles += u64::from(cycles);
        cycles
    }

    fn interrupt<M: MemoryLike + ?Sized>(&mut self, mem: &mut M, vector: u16) {
        trace!("Servicing interrupt through 0x{vector:0>4X} at PC 0x{:0>4X}", self.pc);
        self.push_word(mem, self.pc);
        self.push(mem, (self.p & !(Flag::Break as u8)) | Flag::Unused as u8);
        self.set_flag(Flag::InterruptDisable, true);
        self.pc = mem.read_word(vector);
    }

    fn fetch<M: MemoryLike + ?Sized>(&mut self, mem: &mut M) -> u8 {
        let byte = mem.read_byte(self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    fn fetch_word<M: MemoryLike + ?Sized>(&mut self, mem: &mut M) -> u16 {
        let lo = self.fetch(mem);
        let hi = self.fetch(mem);
        u16::from_le_bytes([lo, hi])
    }

    fn push<M: MemoryLike + ?Sized>(&mut self, mem: &mut M, val: u8) {
        mem.write_byte(STACK_PAGE | self.sp as u16, val);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pull<M: MemoryLike + ?Sized>(&mut self, mem: &mut M) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        mem.read_byte(STACK_PAGE | self.sp as u16)
    }

    fn push_word<M: MemoryLike + ?Sized>(&mut self, mem: &mut M, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.push(mem, hi);
        self.push(mem, lo);
    }

    fn pull_word<M: MemoryLike + ?Sized>(&mut self, mem: &mut M) -> u16 {
        let lo = self.pull(mem);
        let hi = self.pull(mem);
        u16::from_le_bytes([lo, hi])
    }

    fn set_zn(&mut self, val: u8) {
        self.set_flag(Flag::Zero, val == 0);
        self.set_flag(Flag::Negative, val & 0x80 != 0);
    }

    /// Zero page pointers wrap within page zero.
    fn read_zp_word<M: MemoryLike + ?Sized>(mem: &mut M, ptr: u8) -> u16 {
        let lo = mem.read_byte(ptr as u16);
        let hi = mem.read_byte(ptr.wrapping_add(1) as u16);
        u16::from_le_bytes([lo, hi])
    }

    fn operand<M: MemoryLike + ?Sized>(&mut self, mem: &mut M, mode: Mode) -> Operand {
        let plain = |addr| Operand {
            addr,
            crossed: false,
        };
        let indexed = |base: u16, index: u8| {
            let addr = base.wrapping_add(index as u16);
            Operand {
                addr,
                crossed: base & 0xFF00 != addr & 0xFF00,
            }
        };
        match mode {
            Mode::Implied | Mode::Accumulator => plain(0),
            Mode::Immediate => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                plain(addr)
            }
            Mode::ZeroPage => plain(self.fetch(mem) as u16),
            Mode::ZeroPageX => plain(self.fetch(mem).wrapping_add(self.x) as u16),
            Mode::ZeroPageY => plain(self.fetch(mem).wrapping_add(self.y) as u16),
            Mode::Absolute => plain(self.fetch_word(mem)),
            Mode::AbsoluteX => {
                let base = self.fetch_word(mem);
                indexed(base, self.x)
            }
            Mode::AbsoluteY => {
                let base = self.fetch_word(mem);
                indexed(base, self.y)
            }
            Mode::Indirect => {
                // The high byte is fetched without carrying into the pointer's page.
                let ptr = self.fetch_word(mem);
                let lo = mem.read_byte(ptr);
                let hi = mem.read_byte((ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF));
                plain(u16::from_le_bytes([lo, hi]))
            }
            Mode::IndirectX => {
                let ptr = self.fetch(mem).wrapping_add(self.x);
                plain(Self::read_zp_word(mem, ptr))
            }
            Mode::IndirectY => {
                let ptr = self.fetch(mem);
                let base = Self::read_zp_word(mem, ptr);
                indexed(base, self.y)
            }
            Mode::Relative => {
                let offset = self.fetch(mem) as i8;
                let addr = self.pc.wrapping_add(offset as i16 as u16);
                Operand {
                    addr,
                    crossed: self.pc & 0xFF00 != addr & 0xFF00,
                }
            }
        }
    }

    fn load<M: MemoryLike + ?Sized>(&self, mem: &mut M, mode: Mode, operand: Operand) -> u8 {
        match mode {
            Mode::Accumulator => self.a,
            _ => mem.read_byte(operand.addr),
        }
    }

    fn store<M: MemoryLike + ?Sized>(&mut self, mem: &mut M, mode: Mode, operand: Operand, val: u8) {
        match mode {
            Mode::Accumulator => self.a = val,
            _ => mem.write_byte(operand.addr, val),
        }
    }

    fn add(&mut self, val: u8) {
        let sum = self.a as u16 + val as u16 + self.flag(Flag::Carry) as u16;
        let result = sum as u8;
        self.set_flag(Flag::Carry, sum > 0xFF);
        self.set_flag(
            Flag::Overflow,
            (!(self.a ^ val) & (self.a ^ result) & 0x80) != 0,
        );
        self.a = result;
        self.set_zn(result);
    }

    fn compare(&mut self, reg: u8, val: u8) {
        self.set_flag(Flag::Carry, reg >= val);
        self.set_zn(reg.wrapping_sub(val));
    }

    /// Returns the extra cycles a taken branch costs.
    fn branch(&mut self, taken: bool, operand: Operand) -> u32 {
        if !taken {
            return 0;
        }
        self.pc = operand.addr;
        1 + operand.crossed as u32
    }

    fn execute<M: MemoryLike + ?Sized>(&mut self, mem: &mut M) -> u32 {
        let at = self.pc;
        let opcode = self.fetch(mem);
        let op = decode(opcode);
        let operand = self.operand(mem, op.mode);
        let mut cycles = op.cycles as u32;
        if op.page_penalty && operand.crossed {
            cycles += 1;
        }
        let mode = op.mode;

        match op.instr {
            Instr::Adc => {
                let val = self.load(mem, mode, operand);
                self.add(val);
            }
            Instr::Sbc => {
                let val = self.load(mem, mode, operand);
                self.add(!val);
            }
            Instr::And => {
                let val = self.load(mem, mode, operand);
                self.a &= val;
                self.set_zn(self.a);
            }
            Instr::Ora => {
                let val = self.load(mem, mode, operand);
                self.a |= val;
                self.set_zn(self.a);
            }
            Instr::Eor => {
                let val = self.load(mem, mode, operand);
                self.a ^= val;
                self.set_zn(self.a);
            }
            Instr::Asl => {
                let val = self.load(mem, mode, operand);
                self.set_flag(Flag::Carry, val & 0x80 != 0);
                let result = val << 1;
                self.set_zn(result);
                self.store(mem, mode, operand, result);
            }
            Instr::Lsr => {
                let val = self.load(mem, mode, operand);
                self.set_flag(Flag::Carry, val & 0x01 != 0);
                let result = val >> 1;
                self.set_zn(result);
                self.store(mem, mode, operand, result);
            }
            Instr::Rol => {
                let val = self.load(mem, mode, operand);
                let result = (val << 1) | self.flag(Flag::Carry) as u8;
                self.set_flag(Flag::Carry, val & 0x80 != 0);
                self.set_zn(result);
                self.store(mem, mode, operand, result);
            }
            Instr::Ror => {
                let val = self.load(mem, mode, operand);
                let result = (val >> 1) | ((self.flag(Flag::Carry) as u8) << 7);
                self.set_flag(Flag::Carry, val & 0x01 != 0);
                self.set_zn(result);
                self.store(mem, mode, operand, result);
            }
            Instr::Bit => {
                let val = self.load(mem, mode, operand);
                self.set_flag(Flag::Zero, self.a & val == 0);
                self.set_flag(Flag::Overflow, val & 0x40 != 0);
                self.set_flag(Flag::Negative, val & 0x80 != 0);
            }
            Instr::Bcc => cycles += self.branch(!self.flag(Flag::Carry), operand),
            Instr::Bcs => cycles += self.branch(self.flag(Flag::Carry), operand),
            Instr::Bne => cycles += self.branch(!self.flag(Flag::Zero), operand),
            Instr::Beq => cycles += self.branch(self.flag(Flag::Zero), operand),
            Instr::Bpl => cycles += self.branch(!self.flag(Flag::Negative), operand),
            Instr::Bmi => cycles += self.branch(self.flag(Flag::Negative), operand),
            Instr::Bvc => cycles += self.branch(!self.flag(Flag::Overflow), operand),
            Instr::Bvs => cycles += self.branch(self.flag(Flag::Overflow), operand),
            Instr::Brk => {
                // BRK skips a padding byte.
                self.push_word(mem, self.pc.wrapping_add(1));
                self.push(mem, self.p | Flag::Break as u8 | Flag::Unused as u8);
                self.set_flag(Flag::InterruptDisable, true);
                self.pc = mem.read_word(IRQ_VECTOR);
            }
            Instr::Clc => self.set_flag(Flag::Carry, false),
            Instr::Cld => self.set_flag(Flag::Decimal, false),
            Instr::Cli => self.set_flag(Flag::InterruptDisable, false),
            Instr::Clv => self.set_flag(Flag::Overflow, false),
            Instr::Sec => self.set_flag(Flag::Carry, true),
            Instr::Sed => self.set_flag(Flag::Decimal, true),
            Instr::Sei => self.set_flag(Flag::InterruptDisable, true),
            Instr::Cmp => {
                let val = self.load(mem, mode, operand);
                self.compare(self.a, val);
            }
            Instr::Cpx => {
                let val = self.load(mem, mode, operand);
                self.compare(self.x, val);
            }
            Instr::Cpy => {
                let val = self.load(mem, mode, operand);
                self.compare(self.y, val);
            }
            Instr::Dec => {
                let result = mem.update_byte(operand.addr, |val| *val = val.wrapping_sub(1));
                self.set_zn(result);
            }
            Instr::Inc => {
                let result = mem.update_byte(operand.addr, |val| *val = val.wrapping_add(1));
                self.set_zn(result);
            }
            Instr::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.set_zn(self.x);
            }
            Instr::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.set_zn(self.y);
            }
            Instr::Inx => {
                self.x = self.x.wrapping_add(1);
                self.set_zn(self.x);
            }
            Instr::Iny => {
                self.y = self.y.wrapping_add(1);
                self.set_zn(self.y);
            }
            Instr::Jmp => self.pc = operand.addr,
            Instr::Jsr => {
                self.push_word(mem, self.pc.wrapping_sub(1));
                self.pc = operand.addr;
            }
            Instr::Rts => self.pc = self.pull_word(mem).wrapping_add(1),
            Instr::Rti => {
                let p = self.pull(mem);
                self.p = (p & !(Flag::Break as u8)) | Flag::Unused as u8;
                self.pc = self.pull_word(mem);
            }
            Instr::Lda => {
                self.a = self.load(mem, mode, operand);
                self.set_zn(self.a);
            }
            Instr::Ldx => {
                self.x = self.load(mem, mode, operand);
                self.set_zn(self.x);
            }
            Instr::Ldy => {
                self.y = self.load(mem, mode, operand);
                self.set_zn(self.y);
            }
            Instr::Sta => mem.write_byte(operand.addr, self.a),
            Instr::Stx => mem.write_byte(operand.addr, self.x),
            Instr::Sty => mem.write_byte(operand.addr, self.y),
            Instr::Pha => self.push(mem, self.a),
            Instr::Php => self.push(mem, self.p | Flag::Break as u8 | Flag::Unused as u8),
            Instr::Pla => {
                self.a = self.pull(mem);
                self.set_zn(self.a);
            }
            Instr::Plp => {
                let p = self.pull(mem);
                self.p = (p & !(Flag::Break as u8)) | Flag::Unused as u8;
            }
            Instr::Tax => {
                self.x = self.a;
                self.set_zn(self.x);
            }
            Instr::Tay => {
                self.y = self.a;
                self.set_zn(self.y);
            }
            Instr::Tsx => {
                self.x = self.sp;
                self.set_zn(self.x);
            }
            Instr::Txa => {
                self.a = self.x;
                self.set_zn(self.a);
            }
            Instr::Txs => self.sp = self.x,
            Instr::Tya => {
                self.a = self.y;
                self.set_zn(self.a);
            }
            Instr::Nop => {}
            Instr::Unofficial => {
                trace!("Unofficial opcode 0x{opcode:0>2X} at 0x{at:0>4X} executed as NOP");
            }
        }
        cycles
    }
}
