//! Intel 8080, and the base state and executor the Z80 builds on.
//!
//! [`Core8080`] holds the register file, interrupt flip-flops and the
//! [`Machine`]; it executes every base [`Op`] under either flag model. The
//! [`I8080`] CPU pairs it with the Intel table. Cycle counts are T-states.

#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

pub mod opcodes;

use tracing::debug;

use self::opcodes::{AluOp, Cond, Op, Pair, Reg, Rotate, StackPair};
use crate::alu::{add16, add8, decimal_adjust_add, sub8, AluResult};
use crate::{
    find_register, AddressSpace, Cpu, Family, Fault, LineId, Machine, OpcodeTable,
    RegisterDescriptor, RegisterKind, RunState, SpaceId,
};

/// 64 KiB memory.
pub const MEMORY: SpaceId = SpaceId(0);
/// 256 I/O ports.
pub const IO: SpaceId = SpaceId(1);

/// Flag register bits. `P` doubles as the Z80 overflow flag; `Y`, `X` and
/// `N` only exist on the Z80.
pub mod flags {
    #![allow(missing_docs)]
    pub const S: u8 = 0x80;
    pub const Z: u8 = 0x40;
    pub const Y: u8 = 0x20;
    pub const H: u8 = 0x10;
    pub const X: u8 = 0x08;
    pub const P: u8 = 0x04;
    pub const N: u8 = 0x02;
    pub const C: u8 = 0x01;
}

use self::flags::{C, H, N, P, S, X, Y, Z};

/// Which silicon's flag and timing rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FlagModel {
    /// 8080: parity on arithmetic, no N/X/Y, bit 1 of F always set.
    Intel8080,
    /// Z80: overflow on arithmetic, N plus the undocumented X/Y copies.
    Zilog,
}

const fn build_szyxp() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut index = 0;
    while index < 256 {
        let value = index as u8;
        let mut bits = value & (S | Y | X);
        if value == 0 {
            bits |= Z;
        }
        if value.count_ones() % 2 == 0 {
            bits |= P;
        }
        table[index] = bits;
        index += 1;
    }
    table
}

/// Sign, zero, X/Y copies and even parity of every byte.
pub static SZYXP: [u8; 256] = build_szyxp();

/// Register file shared by the 8080 and the Z80.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    /// `BC` pair.
    #[must_use]
    pub const fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    /// `DE` pair.
    #[must_use]
    pub const fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    /// `HL` pair.
    #[must_use]
    pub const fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    /// `AF` pair.
    #[must_use]
    pub const fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f])
    }

    /// Sets `BC`.
    pub fn set_bc(&mut self, value: u16) {
        [self.b, self.c] = value.to_be_bytes();
    }

    /// Sets `DE`.
    pub fn set_de(&mut self, value: u16) {
        [self.d, self.e] = value.to_be_bytes();
    }

    /// Sets `HL`.
    pub fn set_hl(&mut self, value: u16) {
        [self.h, self.l] = value.to_be_bytes();
    }

    /// Value of a register pair.
    #[must_use]
    pub const fn pair(&self, pair: Pair) -> u16 {
        match pair {
            Pair::BC => self.bc(),
            Pair::DE => self.de(),
            Pair::HL => self.hl(),
            Pair::SP => self.sp,
        }
    }

    /// Sets a register pair.
    pub fn set_pair(&mut self, pair: Pair, value: u16) {
        match pair {
            Pair::BC => self.set_bc(value),
            Pair::DE => self.set_de(value),
            Pair::HL => self.set_hl(value),
            Pair::SP => self.sp = value,
        }
    }
}

/// Machine state and base-instruction executor.
#[derive(Debug)]
pub struct Core8080 {
    /// Register file.
    pub regs: Registers,
    /// Interrupt enable flip-flop.
    pub iff1: bool,
    /// Copy of `iff1` kept across an NMI (Z80).
    pub iff2: bool,
    /// Set by `EI` until the next instruction starts.
    pub(crate) ei_delay: bool,
    pub(crate) run_state: RunState,
    pub(crate) machine: Machine,
    model: FlagModel,
}

impl Core8080 {
    /// Creates a core with flat 64 KiB memory.
    ///
    /// # Errors
    ///
    /// Propagates wiring faults.
    pub fn new(model: FlagModel) -> Result<Self, Fault> {
        Self::with_memory(model, AddressSpace::flat("MEMORY", 0x1_0000))
    }

    /// Creates a core around a caller-built memory space, which may be
    /// composite, banked or a selector.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for a space that is not 64 KiB.
    pub fn with_memory(model: FlagModel, memory: AddressSpace) -> Result<Self, Fault> {
        if memory.size() != 0x1_0000 {
            return Err(Fault::configuration(format!(
                "{} must be 64 KiB, got {:#x}",
                memory.name(),
                memory.size()
            )));
        }
        let mut machine = Machine::new();
        machine.memory.add(memory)?;
        machine.memory.add(AddressSpace::flat("IO", 0x100))?;
        Ok(Self {
            regs: Registers::default(),
            iff1: false,
            iff2: false,
            ei_delay: false,
            run_state: RunState::Running,
            machine,
            model,
        })
    }

    /// Flag model in force.
    #[must_use]
    pub const fn model(&self) -> FlagModel {
        self.model
    }

    /// Shared machine state.
    #[must_use]
    pub const fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Exclusive machine state.
    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    /// Clears registers, flip-flops and in-service state.
    pub(crate) fn reset_state(&mut self) {
        self.regs = Registers::default();
        self.set_f(0);
        self.iff1 = false;
        self.iff2 = false;
        self.ei_delay = false;
        self.run_state = RunState::Running;
        self.machine.interrupts.reset();
    }

    /// Stores `F`, forcing the fixed bits of the 8080 layout.
    pub fn set_f(&mut self, value: u8) {
        self.regs.f = match self.model {
            FlagModel::Intel8080 => (value & (S | Z | H | P | C)) | N,
            FlagModel::Zilog => value,
        };
    }

    fn flag(&self, bit: u8) -> bool {
        self.regs.f & bit != 0
    }

    pub(crate) fn read8(&mut self, address: u16) -> Result<u8, Fault> {
        self.machine.memory.read(MEMORY, u32::from(address))
    }

    pub(crate) fn write8(&mut self, address: u16, value: u8) -> Result<(), Fault> {
        self.machine.memory.write(MEMORY, u32::from(address), value)
    }

    pub(crate) fn read16(&mut self, address: u16) -> Result<u16, Fault> {
        let low = self.read8(address)?;
        let high = self.read8(address.wrapping_add(1))?;
        Ok(u16::from_le_bytes([low, high]))
    }

    pub(crate) fn write16(&mut self, address: u16, value: u16) -> Result<(), Fault> {
        let [low, high] = value.to_le_bytes();
        self.write8(address, low)?;
        self.write8(address.wrapping_add(1), high)
    }

    pub(crate) fn push16(&mut self, value: u16) -> Result<(), Fault> {
        let [low, high] = value.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write8(self.regs.sp, high)?;
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write8(self.regs.sp, low)
    }

    pub(crate) fn pop16(&mut self) -> Result<u16, Fault> {
        let low = self.read8(self.regs.sp)?;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let high = self.read8(self.regs.sp)?;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        Ok(u16::from_le_bytes([low, high]))
    }

    /// Operand bytes following an opcode of `length` bytes at `pc`, where the
    /// opcode itself occupies `prefix` bytes.
    pub(crate) fn operands(&mut self, pc: u16, prefix: u8, length: u8) -> Result<[u8; 2], Fault> {
        let mut operands = [0u8; 2];
        for (slot, offset) in operands.iter_mut().zip(u16::from(prefix)..u16::from(length)) {
            *slot = self.read8(pc.wrapping_add(offset))?;
        }
        Ok(operands)
    }

    pub(crate) fn reg(&mut self, reg: Reg) -> Result<u8, Fault> {
        Ok(match reg {
            Reg::B => self.regs.b,
            Reg::C => self.regs.c,
            Reg::D => self.regs.d,
            Reg::E => self.regs.e,
            Reg::H => self.regs.h,
            Reg::L => self.regs.l,
            Reg::M => self.read8(self.regs.hl())?,
            Reg::A => self.regs.a,
        })
    }

    pub(crate) fn set_reg(&mut self, reg: Reg, value: u8) -> Result<(), Fault> {
        match reg {
            Reg::B => self.regs.b = value,
            Reg::C => self.regs.c = value,
            Reg::D => self.regs.d = value,
            Reg::E => self.regs.e = value,
            Reg::H => self.regs.h = value,
            Reg::L => self.regs.l = value,
            Reg::M => self.write8(self.regs.hl(), value)?,
            Reg::A => self.regs.a = value,
        }
        Ok(())
    }

    pub(crate) fn condition(&self, cond: Cond) -> bool {
        match cond {
            Cond::NZ => !self.flag(Z),
            Cond::Z => self.flag(Z),
            Cond::NC => !self.flag(C),
            Cond::C => self.flag(C),
            Cond::PO => !self.flag(P),
            Cond::PE => self.flag(P),
            Cond::P => !self.flag(S),
            Cond::M => self.flag(S),
        }
    }

    fn arith_flags(&self, result: AluResult, subtract: bool) -> u8 {
        let carry = if result.carry { C } else { 0 };
        match self.model {
            FlagModel::Intel8080 => {
                // the 8080 adds the complement, so H is the carry of that add
                let half = if result.half_carry == subtract { 0 } else { H };
                (SZYXP[usize::from(result.value)] & (S | Z | P)) | half | carry
            }
            FlagModel::Zilog => {
                let mut bits = (SZYXP[usize::from(result.value)] & (S | Z | Y | X)) | carry;
                if result.half_carry {
                    bits |= H;
                }
                if result.overflow {
                    bits |= P;
                }
                if subtract {
                    bits |= N;
                }
                bits
            }
        }
    }

    /// `A <- A op value` with the model's flag rules.
    pub(crate) fn alu(&mut self, op: AluOp, value: u8) {
        let a = self.regs.a;
        let carry = self.flag(C);
        let (result, bits) = match op {
            AluOp::Add | AluOp::Adc => {
                let sum = add8(a, value, op == AluOp::Adc && carry);
                (sum.value, self.arith_flags(sum, false))
            }
            AluOp::Sub | AluOp::Sbc | AluOp::Cp => {
                let difference = sub8(a, value, op == AluOp::Sbc && carry);
                let mut bits = self.arith_flags(difference, true);
                if op == AluOp::Cp && self.model == FlagModel::Zilog {
                    bits = (bits & !(Y | X)) | (value & (Y | X));
                }
                let result = if op == AluOp::Cp { a } else { difference.value };
                (result, bits)
            }
            AluOp::And => {
                let result = a & value;
                let half = match self.model {
                    FlagModel::Intel8080 if (a | value) & 0x08 == 0 => 0,
                    FlagModel::Intel8080 | FlagModel::Zilog => H,
                };
                (result, self.logic_flags(result) | half)
            }
            AluOp::Xor => (a ^ value, self.logic_flags(a ^ value)),
            AluOp::Or => (a | value, self.logic_flags(a | value)),
        };
        self.regs.a = result;
        self.set_f(bits);
    }

    fn logic_flags(&self, value: u8) -> u8 {
        match self.model {
            FlagModel::Intel8080 => SZYXP[usize::from(value)] & (S | Z | P),
            FlagModel::Zilog => SZYXP[usize::from(value)],
        }
    }

    /// Increment with `C` preserved.
    pub(crate) fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        let mut bits = (self.regs.f & C) | (SZYXP[usize::from(result)] & (S | Z | Y | X | P));
        if result & 0x0F == 0 {
            bits |= H;
        }
        if self.model == FlagModel::Zilog {
            bits &= !P;
            if result == 0x80 {
                bits |= P;
            }
        }
        self.set_f(bits);
        result
    }

    /// Decrement with `C` preserved.
    pub(crate) fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        let mut bits = (self.regs.f & C) | (SZYXP[usize::from(result)] & (S | Z | Y | X | P));
        match self.model {
            FlagModel::Intel8080 => {
                if result & 0x0F != 0x0F {
                    bits |= H;
                }
            }
            FlagModel::Zilog => {
                bits = (bits & !P) | N;
                if result & 0x0F == 0x0F {
                    bits |= H;
                }
                if result == 0x7F {
                    bits |= P;
                }
            }
        }
        self.set_f(bits);
        result
    }

    /// 16-bit add into a pair value; only `C` changes on the 8080, the Z80
    /// also sets `H`, clears `N` and copies X/Y from the high byte.
    pub(crate) fn add16_flags(&mut self, left: u16, right: u16) -> u16 {
        let sum = add16(left, right, false);
        let carry = if sum.carry { C } else { 0 };
        let bits = match self.model {
            FlagModel::Intel8080 => (self.regs.f & !C) | carry,
            FlagModel::Zilog => {
                let high = (sum.value >> 8) as u8;
                let half = if sum.half_carry { H } else { 0 };
                (self.regs.f & (S | Z | P)) | (high & (Y | X)) | half | carry
            }
        };
        self.set_f(bits);
        sum.value
    }

    fn rotate(&mut self, rotate: Rotate) {
        let a = self.regs.a;
        let carry_in = u8::from(self.flag(C));
        let (result, carry_out) = match rotate {
            Rotate::Rlc => (a.rotate_left(1), a & 0x80 != 0),
            Rotate::Rrc => (a.rotate_right(1), a & 0x01 != 0),
            Rotate::Ral => ((a << 1) | carry_in, a & 0x80 != 0),
            Rotate::Rar => ((a >> 1) | (carry_in << 7), a & 0x01 != 0),
        };
        self.regs.a = result;
        let carry = if carry_out { C } else { 0 };
        let bits = match self.model {
            FlagModel::Intel8080 => (self.regs.f & !C) | carry,
            FlagModel::Zilog => (self.regs.f & (S | Z | P)) | (result & (Y | X)) | carry,
        };
        self.set_f(bits);
    }

    fn decimal_adjust(&mut self) {
        let a = self.regs.a;
        match self.model {
            FlagModel::Intel8080 => {
                let (value, carry, half) = decimal_adjust_add(a, self.flag(C), self.flag(H));
                self.regs.a = value;
                let mut bits = SZYXP[usize::from(value)] & (S | Z | P);
                if carry {
                    bits |= C;
                }
                if half {
                    bits |= H;
                }
                self.set_f(bits);
            }
            FlagModel::Zilog => {
                let subtract = self.flag(N);
                let half_in = self.flag(H);
                let mut correction = 0u8;
                let mut carry = self.flag(C);
                if half_in || a & 0x0F > 9 {
                    correction |= 0x06;
                }
                if carry || a > 0x99 {
                    correction |= 0x60;
                    carry = true;
                }
                let (value, half) = if subtract {
                    (a.wrapping_sub(correction), half_in && a & 0x0F < 6)
                } else {
                    (a.wrapping_add(correction), a & 0x0F > 9)
                };
                self.regs.a = value;
                let mut bits = SZYXP[usize::from(value)] | (self.regs.f & N);
                if carry {
                    bits |= C;
                }
                if half {
                    bits |= H;
                }
                self.set_f(bits);
            }
        }
    }

    /// Executes one base instruction. The program counter already points
    /// past it. Returns whether a conditional path was taken.
    ///
    /// # Errors
    ///
    /// Memory faults from operand or stack access.
    #[allow(clippy::too_many_lines)]
    pub fn execute_base(&mut self, op: Op, operands: [u8; 2]) -> Result<bool, Fault> {
        let [b1, _] = operands;
        let word = u16::from_le_bytes(operands);
        let zilog = self.model == FlagModel::Zilog;
        match op {
            Op::Nop => {}
            Op::Lxi(pair) => self.regs.set_pair(pair, word),
            Op::Stax(pair) => self.write8(self.regs.pair(pair), self.regs.a)?,
            Op::Ldax(pair) => self.regs.a = self.read8(self.regs.pair(pair))?,
            Op::Shld => self.write16(word, self.regs.hl())?,
            Op::Lhld => {
                let value = self.read16(word)?;
                self.regs.set_hl(value);
            }
            Op::Sta => self.write8(word, self.regs.a)?,
            Op::Lda => self.regs.a = self.read8(word)?,
            Op::Inx(pair) => {
                let value = self.regs.pair(pair).wrapping_add(1);
                self.regs.set_pair(pair, value);
            }
            Op::Dcx(pair) => {
                let value = self.regs.pair(pair).wrapping_sub(1);
                self.regs.set_pair(pair, value);
            }
            Op::Dad(pair) => {
                let value = self.add16_flags(self.regs.hl(), self.regs.pair(pair));
                self.regs.set_hl(value);
            }
            Op::Inr(reg) => {
                let value = self.reg(reg)?;
                let value = self.inc8(value);
                self.set_reg(reg, value)?;
            }
            Op::Dcr(reg) => {
                let value = self.reg(reg)?;
                let value = self.dec8(value);
                self.set_reg(reg, value)?;
            }
            Op::Mvi(reg) => self.set_reg(reg, b1)?,
            Op::Rotate(rotate) => self.rotate(rotate),
            Op::Daa => self.decimal_adjust(),
            Op::Cma => {
                self.regs.a = !self.regs.a;
                if zilog {
                    let bits = (self.regs.f & (S | Z | P | C)) | (self.regs.a & (Y | X)) | H | N;
                    self.set_f(bits);
                }
            }
            Op::Stc => {
                let kept = if zilog { S | Z | P } else { S | Z | H | P };
                let bits = (self.regs.f & kept) | (self.regs.a & (Y | X)) | C;
                self.set_f(bits);
            }
            Op::Cmc => {
                let carry = self.regs.f & C;
                let bits = if zilog {
                    // H takes the previous carry
                    (self.regs.f & (S | Z | P)) | (self.regs.a & (Y | X)) | (carry << 4) | (carry ^ C)
                } else {
                    self.regs.f ^ C
                };
                self.set_f(bits);
            }
            Op::Mov(dst, src) => {
                let value = self.reg(src)?;
                self.set_reg(dst, value)?;
            }
            Op::Hlt => {
                self.run_state = RunState::Halted;
                debug!(pc = self.regs.pc, "halted");
            }
            Op::Alu(alu, reg) => {
                let value = self.reg(reg)?;
                self.alu(alu, value);
            }
            Op::AluImm(alu) => self.alu(alu, b1),
            Op::Ret => self.regs.pc = self.pop16()?,
            Op::RetCond(cond) => {
                if !self.condition(cond) {
                    return Ok(false);
                }
                self.regs.pc = self.pop16()?;
                return Ok(true);
            }
            Op::Pop(pair) => {
                let value = self.pop16()?;
                match pair {
                    StackPair::BC => self.regs.set_bc(value),
                    StackPair::DE => self.regs.set_de(value),
                    StackPair::HL => self.regs.set_hl(value),
                    StackPair::AF => {
                        let [a, f] = value.to_be_bytes();
                        self.regs.a = a;
                        self.set_f(f);
                    }
                }
            }
            Op::Push(pair) => {
                let value = match pair {
                    StackPair::BC => self.regs.bc(),
                    StackPair::DE => self.regs.de(),
                    StackPair::HL => self.regs.hl(),
                    StackPair::AF => self.regs.af(),
                };
                self.push16(value)?;
            }
            Op::Jmp => self.regs.pc = word,
            Op::JmpCond(cond) => {
                if self.condition(cond) {
                    self.regs.pc = word;
                    return Ok(true);
                }
                return Ok(false);
            }
            Op::Call => {
                self.push16(self.regs.pc)?;
                self.regs.pc = word;
            }
            Op::CallCond(cond) => {
                if !self.condition(cond) {
                    return Ok(false);
                }
                self.push16(self.regs.pc)?;
                self.regs.pc = word;
                return Ok(true);
            }
            Op::Rst(n) => {
                self.push16(self.regs.pc)?;
                self.regs.pc = u16::from(n) * 8;
            }
            Op::Out => {
                self.machine
                    .memory
                    .write(IO, u32::from(b1), self.regs.a)?;
            }
            Op::In => self.regs.a = self.machine.memory.read(IO, u32::from(b1))?,
            Op::Xthl => {
                let value = self.read16(self.regs.sp)?;
                self.write16(self.regs.sp, self.regs.hl())?;
                self.regs.set_hl(value);
            }
            Op::Pchl => self.regs.pc = self.regs.hl(),
            Op::Xchg => {
                let de = self.regs.de();
                self.regs.set_de(self.regs.hl());
                self.regs.set_hl(de);
            }
            Op::Sphl => self.regs.sp = self.regs.hl(),
            Op::Di => {
                self.iff1 = false;
                self.iff2 = false;
            }
            Op::Ei => {
                self.iff1 = true;
                self.iff2 = true;
                self.ei_delay = true;
            }
        }
        Ok(false)
    }

    /// Starts an instruction slot: ends the `EI` shadow and reports whether
    /// the core is halted.
    pub(crate) fn begin_slot(&mut self) -> bool {
        self.ei_delay = false;
        if self.run_state == RunState::Halted {
            return true;
        }
        self.run_state = RunState::Running;
        false
    }

    /// Maskable lines are accepted with `iff1` set, one instruction after
    /// `EI`.
    pub(crate) const fn interrupts_open(&self) -> bool {
        self.iff1 && !self.ei_delay
    }

    /// Acknowledges `line`, leaves the halt state and pushes the return
    /// address. Returns the line's vector.
    pub(crate) fn interrupt_entry(&mut self, line: LineId) -> Result<u16, Fault> {
        let vector = self
            .machine
            .interrupts
            .acknowledge(line, &mut self.machine.memory)?;
        self.run_state = RunState::Running;
        self.push16(self.regs.pc)?;
        Ok(vector)
    }

    /// Value of a base register by upper-case name.
    pub(crate) fn named(&self, name: &str) -> Option<u32> {
        let regs = &self.regs;
        let value = match name {
            "PC" => regs.pc,
            "SP" => regs.sp,
            "A" => u16::from(regs.a),
            "F" => u16::from(regs.f),
            "B" => u16::from(regs.b),
            "C" => u16::from(regs.c),
            "D" => u16::from(regs.d),
            "E" => u16::from(regs.e),
            "H" => u16::from(regs.h),
            "L" => u16::from(regs.l),
            "AF" => regs.af(),
            "BC" => regs.bc(),
            "DE" => regs.de(),
            "HL" => regs.hl(),
            _ => return None,
        };
        Some(u32::from(value))
    }

    /// Writes a base register by upper-case name; `false` for other names.
    pub(crate) fn set_named(&mut self, name: &str, value: u32) -> bool {
        let word = value as u16;
        let byte = value as u8;
        match name {
            "PC" => self.regs.pc = word,
            "SP" => self.regs.sp = word,
            "A" => self.regs.a = byte,
            "F" => self.set_f(byte),
            "B" => self.regs.b = byte,
            "C" => self.regs.c = byte,
            "D" => self.regs.d = byte,
            "E" => self.regs.e = byte,
            "H" => self.regs.h = byte,
            "L" => self.regs.l = byte,
            "AF" => {
                let [a, f] = word.to_be_bytes();
                self.regs.a = a;
                self.set_f(f);
            }
            "BC" => self.regs.set_bc(word),
            "DE" => self.regs.set_de(word),
            "HL" => self.regs.set_hl(word),
            _ => return false,
        }
        true
    }
}

static REGISTERS: [RegisterDescriptor; 13] = [
    RegisterDescriptor::new("PC", 16, RegisterKind::ProgramCounter),
    RegisterDescriptor::new("SP", 16, RegisterKind::StackPointer),
    RegisterDescriptor::new("A", 8, RegisterKind::Accumulator),
    RegisterDescriptor::new("F", 8, RegisterKind::Flags),
    RegisterDescriptor::new("B", 8, RegisterKind::General),
    RegisterDescriptor::new("C", 8, RegisterKind::General),
    RegisterDescriptor::new("D", 8, RegisterKind::General),
    RegisterDescriptor::new("E", 8, RegisterKind::General),
    RegisterDescriptor::new("H", 8, RegisterKind::General),
    RegisterDescriptor::new("L", 8, RegisterKind::General),
    RegisterDescriptor::new("BC", 16, RegisterKind::General),
    RegisterDescriptor::new("DE", 16, RegisterKind::General),
    RegisterDescriptor::new("HL", 16, RegisterKind::Index),
];

/// Intel 8080 CPU.
#[derive(Debug)]
pub struct I8080 {
    core: Core8080,
    table: OpcodeTable<Op>,
}

impl I8080 {
    /// Creates an 8080 with flat 64 KiB memory and 256 ports.
    ///
    /// # Errors
    ///
    /// Propagates table and wiring faults.
    pub fn new() -> Result<Self, Fault> {
        Self::with_memory(AddressSpace::flat("MEMORY", 0x1_0000))
    }

    /// Creates an 8080 around a caller-built 64 KiB memory space.
    ///
    /// # Errors
    ///
    /// Propagates table and wiring faults.
    pub fn with_memory(memory: AddressSpace) -> Result<Self, Fault> {
        let mut cpu = Self {
            core: Core8080::with_memory(FlagModel::Intel8080, memory)?,
            table: opcodes::build()?,
        };
        cpu.reset()?;
        Ok(cpu)
    }

    /// Register file and flip-flops.
    #[must_use]
    pub const fn core(&self) -> &Core8080 {
        &self.core
    }

    /// Opcode table with its execution counters.
    #[must_use]
    pub const fn table(&self) -> &OpcodeTable<Op> {
        &self.table
    }

    /// Clears every opcode execution counter.
    pub fn reset_counters(&mut self) {
        self.table.reset_counters();
    }
}

impl Cpu for I8080 {
    fn family(&self) -> Family {
        Family::I8080
    }

    fn machine(&self) -> &Machine {
        &self.core.machine
    }

    fn machine_mut(&mut self) -> &mut Machine {
        &mut self.core.machine
    }

    fn pc(&self) -> u16 {
        self.core.regs.pc
    }

    fn set_pc(&mut self, pc: u16) {
        self.core.regs.pc = pc;
    }

    fn run_state(&self) -> RunState {
        self.core.run_state
    }

    fn set_run_state(&mut self, state: RunState) {
        self.core.run_state = state;
    }

    fn reset(&mut self) -> Result<(), Fault> {
        self.core.reset_state();
        debug!("i8080 reset");
        Ok(())
    }

    fn execute(&mut self) -> Result<u32, Fault> {
        if self.core.begin_slot() {
            return Ok(4);
        }
        let pc = self.core.regs.pc;
        let code = self.core.read8(pc)?;
        let op = self.table.fetch(code, pc)?;
        let operands = self.core.operands(pc, 1, op.length)?;
        self.core.regs.pc = pc.wrapping_add(u16::from(op.length));
        let taken = self.core.execute_base(op.kind, operands)?;
        Ok(op.cost(taken))
    }

    fn maskable_enabled(&self) -> bool {
        self.core.interrupts_open()
    }

    fn enter_interrupt(&mut self, line: LineId) -> Result<u32, Fault> {
        self.core.iff1 = false;
        self.core.iff2 = false;
        self.core.regs.pc = self.core.interrupt_entry(line)?;
        Ok(11)
    }

    fn registers(&self) -> &'static [RegisterDescriptor] {
        &REGISTERS
    }

    fn read_register(&self, name: &str) -> Result<u32, Fault> {
        find_register(&REGISTERS, name)
            .and_then(|register| self.core.named(register.name))
            .ok_or_else(|| Fault::UnknownRegister(name.to_owned()))
    }

    fn write_register(&mut self, name: &str, value: u32) -> Result<(), Fault> {
        let register = find_register(&REGISTERS, name)
            .ok_or_else(|| Fault::UnknownRegister(name.to_owned()))?;
        self.core.set_named(register.name, value & register.mask());
        Ok(())
    }

    fn disassemble(&self, pc: u16) -> Result<(String, u8), Fault> {
        self.table.disassemble(&self.core.machine.memory, MEMORY, pc, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::{flags, I8080, IO, MEMORY};
    use crate::{Cpu, RunState};

    fn cpu_with(program: &[u8]) -> I8080 {
        let mut cpu = I8080::new().expect("builds");
        cpu.machine_mut()
            .memory
            .space_mut(MEMORY)
            .expect("memory")
            .poke_slice(0, program)
            .expect("fits");
        cpu
    }

    fn run(cpu: &mut I8080, steps: usize) -> u32 {
        (0..steps).map(|_| cpu.step().expect("step")).sum()
    }

    #[test]
    fn flags_register_keeps_fixed_bits() {
        let mut cpu = cpu_with(&[]);
        cpu.write_register("F", 0xFF).expect("known");
        assert_eq!(cpu.read_register("F"), Ok(0xD7));
    }

    #[test]
    fn add_sets_carry_half_zero_and_parity() {
        // MVI A,0FFh ; ADI 01h
        let mut cpu = cpu_with(&[0x3E, 0xFF, 0xC6, 0x01]);
        assert_eq!(run(&mut cpu, 2), 14);
        assert_eq!(cpu.read_register("A"), Ok(0));
        let f = cpu.read_register("F").expect("known") as u8;
        assert_eq!(
            f & (flags::Z | flags::C | flags::H | flags::P | flags::S),
            flags::Z | flags::C | flags::H | flags::P
        );
    }

    #[test]
    fn subtract_half_carry_uses_complement_add() {
        // MVI A,10h ; SUI 01h  -> 0F, no half carry out of the complement add
        let mut cpu = cpu_with(&[0x3E, 0x10, 0xD6, 0x01]);
        run(&mut cpu, 2);
        assert_eq!(cpu.read_register("A"), Ok(0x0F));
        let f = cpu.read_register("F").expect("known") as u8;
        assert_eq!(f & (flags::H | flags::C), 0);
        // MVI A,05h ; SUI 01h -> half carry set
        let mut cpu = cpu_with(&[0x3E, 0x05, 0xD6, 0x01]);
        run(&mut cpu, 2);
        assert_eq!(cpu.read_register("F").map(|f| f as u8 & flags::H), Ok(flags::H));
    }

    #[test]
    fn call_and_conditional_return_costs() {
        // LXI SP,0100h ; CALL 0010h ; ... 0010h: XRA A ; RNZ ; RZ
        let mut cpu = cpu_with(&[0x31, 0x00, 0x01, 0xCD, 0x10, 0x00]);
        cpu.machine_mut()
            .memory
            .space_mut(MEMORY)
            .expect("memory")
            .poke_slice(0x10, &[0xAF, 0xC0, 0xC8])
            .expect("fits");
        assert_eq!(run(&mut cpu, 2), 10 + 17);
        assert_eq!(cpu.read_register("SP"), Ok(0x00FE));
        assert_eq!(run(&mut cpu, 1), 4);
        assert_eq!(run(&mut cpu, 1), 5);
        assert_eq!(run(&mut cpu, 1), 11);
        assert_eq!(cpu.pc(), 0x0006);
    }

    #[test]
    fn daa_corrects_bcd_sum() {
        // MVI A,38h ; ADI 45h ; DAA
        let mut cpu = cpu_with(&[0x3E, 0x38, 0xC6, 0x45, 0x27]);
        run(&mut cpu, 3);
        assert_eq!(cpu.read_register("A"), Ok(0x83));
    }

    #[test]
    fn ports_are_a_separate_space() {
        // MVI A,5Ah ; OUT 10h ; IN 11h
        let mut cpu = cpu_with(&[0x3E, 0x5A, 0xD3, 0x10, 0xDB, 0x11]);
        cpu.machine_mut().memory.poke(IO, 0x11, 0x77).expect("in range");
        run(&mut cpu, 3);
        assert_eq!(cpu.machine().memory.peek(IO, 0x10), Ok(0x5A));
        assert_eq!(cpu.read_register("A"), Ok(0x77));
    }

    #[test]
    fn interrupt_waits_one_instruction_after_ei_and_wakes_halt() {
        // EI ; HLT
        let mut cpu = cpu_with(&[0xFB, 0x76]);
        cpu.write_register("SP", 0x0100).expect("known");
        let line = cpu.machine_mut().interrupts.add_line("RST7", 0x0038);
        cpu.machine_mut()
            .add_interrupt_rising_edge_condition(line, IO, 0xFF, 0x01)
            .expect("valid");
        cpu.machine_mut().memory.write(IO, 0xFF, 0x01).expect("in range");
        // EI: the shadow keeps the request pending
        assert_eq!(run(&mut cpu, 1), 4);
        assert_eq!(cpu.pc(), 1);
        // HLT executes, then the interrupt is taken
        assert_eq!(run(&mut cpu, 1), 7 + 11);
        assert_eq!(cpu.pc(), 0x0038);
        assert_eq!(cpu.run_state(), RunState::Running);
        assert_eq!(cpu.machine().memory.peek_u16_le(MEMORY, 0x00FE), Ok(0x0002));
        assert!(!cpu.core().iff1);
    }

    #[test]
    fn disassembly_uses_intel_syntax() {
        let cpu = cpu_with(&[0x21, 0x34, 0x12, 0xC2, 0x00, 0x01, 0x7E]);
        assert_eq!(cpu.disassemble(0), Ok(("LXI H,0x1234".to_owned(), 3)));
        assert_eq!(cpu.disassemble(3), Ok(("JNZ 0x0100".to_owned(), 3)));
        assert_eq!(cpu.disassemble(6), Ok(("MOV A,M".to_owned(), 1)));
    }
}
