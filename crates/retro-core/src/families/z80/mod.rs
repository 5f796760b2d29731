//! Zilog Z80, built on the 8080 [`Core8080`] under the Zilog flag model.
//!
//! The unprefixed table reuses the 8080 base; `CB`, `ED` and `DD`/`FD`
//! escape into nested tables whose entries carry the full instruction
//! length and T-state cost. The `R` register advances once per opcode
//! fetch, twice for prefixed instructions.

#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

pub mod opcodes;

use tracing::debug;

use self::opcodes::{Block, CbOp, EdOp, Index, IndexOp, OpZ80};
use super::i8080::flags::{C, H, N, P, S, X, Y, Z};
use super::i8080::opcodes::{AluOp, Pair, Reg};
use super::i8080::{Core8080, FlagModel, IO, MEMORY, SZYXP};
use crate::alu::{add16, sub16, sub8};
use crate::{
    find_register, sign_extend8, AddressSpace, Cpu, Family, Fault, LineId, Machine, OpcodeTable,
    RegisterDescriptor, RegisterKind, RunState,
};

/// Vector of the non-maskable interrupt.
pub const NMI_VECTOR: u16 = 0x0066;

/// Alternate register set swapped in by `EX AF,AF'` and `EXX`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Shadow {
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
}

static REGISTERS: [RegisterDescriptor; 23] = [
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
    RegisterDescriptor::new("AF", 16, RegisterKind::General),
    RegisterDescriptor::new("BC", 16, RegisterKind::General),
    RegisterDescriptor::new("DE", 16, RegisterKind::General),
    RegisterDescriptor::new("HL", 16, RegisterKind::Index),
    RegisterDescriptor::new("IX", 16, RegisterKind::Index),
    RegisterDescriptor::new("IY", 16, RegisterKind::Index),
    RegisterDescriptor::new("I", 8, RegisterKind::General),
    RegisterDescriptor::new("R", 8, RegisterKind::General),
    RegisterDescriptor::new("IM", 8, RegisterKind::General),
    RegisterDescriptor::new("AF'", 16, RegisterKind::General),
    RegisterDescriptor::new("BC'", 16, RegisterKind::General),
    RegisterDescriptor::new("DE'", 16, RegisterKind::General),
    RegisterDescriptor::new("HL'", 16, RegisterKind::General),
];

/// Z80 CPU.
#[derive(Debug)]
pub struct Z80 {
    core: Core8080,
    ix: u16,
    iy: u16,
    i: u8,
    r: u8,
    im: u8,
    shadow: Shadow,
    main: OpcodeTable<OpZ80>,
    cb: OpcodeTable<CbOp>,
    ed: OpcodeTable<EdOp>,
    index: OpcodeTable<IndexOp>,
    index_cb: OpcodeTable<CbOp>,
}

impl Z80 {
    /// Creates a Z80 with flat 64 KiB memory and 256 ports.
    ///
    /// # Errors
    ///
    /// Propagates table and wiring faults.
    pub fn new() -> Result<Self, Fault> {
        Self::with_memory(AddressSpace::flat("MEMORY", 0x1_0000))
    }

    /// Creates a Z80 around a caller-built 64 KiB memory space.
    ///
    /// # Errors
    ///
    /// Propagates table and wiring faults.
    pub fn with_memory(memory: AddressSpace) -> Result<Self, Fault> {
        let mut cpu = Self {
            core: Core8080::with_memory(FlagModel::Zilog, memory)?,
            ix: 0,
            iy: 0,
            i: 0,
            r: 0,
            im: 0,
            shadow: Shadow::default(),
            main: opcodes::build_main()?,
            cb: opcodes::build_cb()?,
            ed: opcodes::build_ed()?,
            index: opcodes::build_index()?,
            index_cb: opcodes::build_index_cb()?,
        };
        cpu.reset()?;
        Ok(cpu)
    }

    /// Adds the non-maskable line, vectored to 0x0066. Drive it through
    /// rising-edge conditions; a level condition would re-enter every
    /// instruction.
    pub fn add_nmi_line(&mut self) -> LineId {
        self.core
            .machine
            .interrupts
            .add_non_maskable_line("NMI", NMI_VECTOR)
    }

    /// Register file and flip-flops shared with the 8080.
    #[must_use]
    pub const fn core(&self) -> &Core8080 {
        &self.core
    }

    /// Interrupt mode selected by `IM`.
    #[must_use]
    pub const fn interrupt_mode(&self) -> u8 {
        self.im
    }

    /// Alternate register set.
    #[must_use]
    pub const fn shadow(&self) -> Shadow {
        self.shadow
    }

    /// Unprefixed opcode table with its execution counters.
    #[must_use]
    pub const fn table(&self) -> &OpcodeTable<OpZ80> {
        &self.main
    }

    /// Clears the execution counters of every table.
    pub fn reset_counters(&mut self) {
        self.main.reset_counters();
        self.cb.reset_counters();
        self.ed.reset_counters();
        self.index.reset_counters();
        self.index_cb.reset_counters();
    }

    fn bump_r(&mut self, fetches: u8) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(fetches) & 0x7F);
    }

    const fn index_value(&self, index: Index) -> u16 {
        match index {
            Index::IX => self.ix,
            Index::IY => self.iy,
        }
    }

    fn set_index(&mut self, index: Index, value: u16) {
        match index {
            Index::IX => self.ix = value,
            Index::IY => self.iy = value,
        }
    }

    const fn indexed(&self, index: Index, displacement: u8) -> u16 {
        self.index_value(index)
            .wrapping_add_signed(sign_extend8(displacement))
    }

    fn jump_relative(&mut self, offset: u8) {
        self.core.regs.pc = self.core.regs.pc.wrapping_add_signed(sign_extend8(offset));
    }

    fn port(&self) -> u32 {
        u32::from(self.core.regs.c)
    }

    /// Applies a bit-table operation to `value`; returns the byte to store
    /// back, if any. `hidden` supplies X/Y for `BIT`.
    fn bit_op(&mut self, op: CbOp, value: u8, hidden: u8) -> Option<u8> {
        let f = self.core.regs.f;
        match op {
            CbOp::Shift(shift, _) => {
                let (result, carry) = shift.apply(value, f & C != 0);
                self.core.set_f(SZYXP[usize::from(result)] | u8::from(carry));
                Some(result)
            }
            CbOp::Bit(bit, _) => {
                let tested = value & (1 << bit);
                let mut bits = (f & C) | H | (hidden & (Y | X)) | (tested & S);
                if tested == 0 {
                    bits |= Z | P;
                }
                self.core.set_f(bits);
                None
            }
            CbOp::Res(bit, _) => Some(value & !(1 << bit)),
            CbOp::Set(bit, _) => Some(value | (1 << bit)),
        }
    }

    fn execute_extra(&mut self, op: OpZ80, operand: u8) -> bool {
        let regs = &mut self.core.regs;
        match op {
            OpZ80::ExAf => {
                let current = regs.af();
                let [a, f] = self.shadow.af.to_be_bytes();
                regs.a = a;
                regs.f = f;
                self.shadow.af = current;
            }
            OpZ80::Exx => {
                let (bc, de, hl) = (regs.bc(), regs.de(), regs.hl());
                regs.set_bc(self.shadow.bc);
                regs.set_de(self.shadow.de);
                regs.set_hl(self.shadow.hl);
                self.shadow.bc = bc;
                self.shadow.de = de;
                self.shadow.hl = hl;
            }
            OpZ80::Djnz => {
                regs.b = regs.b.wrapping_sub(1);
                if regs.b != 0 {
                    self.jump_relative(operand);
                    return true;
                }
            }
            OpZ80::Jr => self.jump_relative(operand),
            OpZ80::JrCond(cond) => {
                if self.core.condition(cond) {
                    self.jump_relative(operand);
                    return true;
                }
            }
            // dispatched before operand fetch
            OpZ80::Base(_) | OpZ80::PrefixCb | OpZ80::PrefixEd | OpZ80::PrefixIndex(_) => {}
        }
        false
    }

    fn execute_cb(&mut self, pc: u16) -> Result<u32, Fault> {
        let code = self.core.read8(pc.wrapping_add(1))?;
        self.bump_r(1);
        let op = self.cb.fetch(code, pc)?;
        self.core.regs.pc = pc.wrapping_add(2);
        let (CbOp::Shift(_, reg) | CbOp::Bit(_, reg) | CbOp::Res(_, reg) | CbOp::Set(_, reg)) =
            op.kind;
        let value = self.core.reg(reg)?;
        // BIT n,(HL) leaks X/Y from an internal latch; H is the usual stand-in
        let hidden = if reg == Reg::M { self.core.regs.h } else { value };
        if let Some(result) = self.bit_op(op.kind, value, hidden) {
            self.core.set_reg(reg, result)?;
        }
        Ok(op.cost(false))
    }

    fn execute_ed(&mut self, pc: u16) -> Result<u32, Fault> {
        let code = self.core.read8(pc.wrapping_add(1))?;
        self.bump_r(1);
        let op = self.ed.fetch(code, pc)?;
        let operands = self.core.operands(pc, 2, op.length)?;
        self.core.regs.pc = pc.wrapping_add(u16::from(op.length));
        let repeated = self.execute_extended(op.kind, operands)?;
        if repeated {
            self.core.regs.pc = pc;
        }
        Ok(op.cost(repeated))
    }

    /// Runs an `ED` instruction; `true` when a repeating block form goes
    /// round again.
    #[allow(clippy::too_many_lines)]
    fn execute_extended(&mut self, op: EdOp, operands: [u8; 2]) -> Result<bool, Fault> {
        let address = u16::from_le_bytes(operands);
        let carry = self.core.regs.f & C;
        match op {
            EdOp::InC(reg) => {
                let value = self.core.machine.memory.read(IO, self.port())?;
                self.core.set_f(carry | SZYXP[usize::from(value)]);
                if reg != Reg::M {
                    self.core.set_reg(reg, value)?;
                }
            }
            EdOp::OutC(reg) => {
                let value = if reg == Reg::M {
                    0
                } else {
                    self.core.reg(reg)?
                };
                self.core.machine.memory.write(IO, self.port(), value)?;
            }
            EdOp::SbcHl(pair) | EdOp::AdcHl(pair) => {
                let hl = self.core.regs.hl();
                let right = self.core.regs.pair(pair);
                let subtract = matches!(op, EdOp::SbcHl(_));
                let result = if subtract {
                    sub16(hl, right, carry != 0)
                } else {
                    add16(hl, right, carry != 0)
                };
                let high = result.value.to_be_bytes()[0];
                let mut bits = high & (S | Y | X);
                if result.value == 0 {
                    bits |= Z;
                }
                if result.half_carry {
                    bits |= H;
                }
                if result.overflow {
                    bits |= P;
                }
                if subtract {
                    bits |= N;
                }
                if result.carry {
                    bits |= C;
                }
                self.core.set_f(bits);
                self.core.regs.set_hl(result.value);
            }
            EdOp::StoreWord(pair) => {
                let value = self.core.regs.pair(pair);
                self.core.write16(address, value)?;
            }
            EdOp::LoadWord(pair) => {
                let value = self.core.read16(address)?;
                self.core.regs.set_pair(pair, value);
            }
            EdOp::Neg => {
                let value = self.core.regs.a;
                self.core.regs.a = 0;
                self.core.alu(AluOp::Sub, value);
            }
            EdOp::Retn | EdOp::Reti => {
                self.core.regs.pc = self.core.pop16()?;
                self.core.iff1 = self.core.iff2;
            }
            EdOp::Im(mode) => self.im = mode,
            EdOp::LdIA => self.i = self.core.regs.a,
            EdOp::LdRA => self.r = self.core.regs.a,
            EdOp::LdAI | EdOp::LdAR => {
                let value = if op == EdOp::LdAI { self.i } else { self.r };
                self.core.regs.a = value;
                let mut bits = carry | (SZYXP[usize::from(value)] & (S | Z | Y | X));
                if self.core.iff2 {
                    bits |= P;
                }
                self.core.set_f(bits);
            }
            EdOp::Rrd | EdOp::Rld => {
                let hl = self.core.regs.hl();
                let memory = self.core.read8(hl)?;
                let a = self.core.regs.a;
                let (a, memory) = if op == EdOp::Rrd {
                    ((a & 0xF0) | (memory & 0x0F), (a << 4) | (memory >> 4))
                } else {
                    ((a & 0xF0) | (memory >> 4), (memory << 4) | (a & 0x0F))
                };
                self.core.write8(hl, memory)?;
                self.core.regs.a = a;
                self.core.set_f(carry | SZYXP[usize::from(a)]);
            }
            EdOp::Block {
                kind,
                increment,
                repeat,
            } => {
                let again = self.block(kind, increment)?;
                return Ok(repeat && again);
            }
        }
        Ok(false)
    }

    /// One step of a block instruction; returns whether a repeating form
    /// would continue.
    fn block(&mut self, kind: Block, increment: bool) -> Result<bool, Fault> {
        let delta: u16 = if increment { 1 } else { u16::MAX };
        let hl = self.core.regs.hl();
        let f = self.core.regs.f;
        let a = self.core.regs.a;
        match kind {
            Block::Ld => {
                let value = self.core.read8(hl)?;
                let de = self.core.regs.de();
                self.core.write8(de, value)?;
                self.core.regs.set_hl(hl.wrapping_add(delta));
                self.core.regs.set_de(de.wrapping_add(delta));
                let count = self.core.regs.bc().wrapping_sub(1);
                self.core.regs.set_bc(count);
                let n = value.wrapping_add(a);
                let mut bits = (f & (S | Z | C)) | (n & X) | ((n << 4) & Y);
                if count != 0 {
                    bits |= P;
                }
                self.core.set_f(bits);
                Ok(count != 0)
            }
            Block::Cp => {
                let value = self.core.read8(hl)?;
                let difference = sub8(a, value, false);
                self.core.regs.set_hl(hl.wrapping_add(delta));
                let count = self.core.regs.bc().wrapping_sub(1);
                self.core.regs.set_bc(count);
                let n = difference
                    .value
                    .wrapping_sub(u8::from(difference.half_carry));
                let mut bits = (f & C)
                    | N
                    | (SZYXP[usize::from(difference.value)] & (S | Z))
                    | (n & X)
                    | ((n << 4) & Y);
                if difference.half_carry {
                    bits |= H;
                }
                if count != 0 {
                    bits |= P;
                }
                self.core.set_f(bits);
                Ok(count != 0 && difference.value != 0)
            }
            Block::In | Block::Out => {
                if kind == Block::In {
                    let value = self.core.machine.memory.read(IO, self.port())?;
                    self.core.write8(hl, value)?;
                    self.core.regs.b = self.core.regs.b.wrapping_sub(1);
                } else {
                    self.core.regs.b = self.core.regs.b.wrapping_sub(1);
                    let value = self.core.read8(hl)?;
                    self.core.machine.memory.write(IO, self.port(), value)?;
                }
                self.core.regs.set_hl(hl.wrapping_add(delta));
                let b = self.core.regs.b;
                self.core
                    .set_f((SZYXP[usize::from(b)] & (S | Z | Y | X)) | N | (f & C));
                Ok(b != 0)
            }
        }
    }

    fn execute_index(&mut self, pc: u16, index: Index) -> Result<u32, Fault> {
        let code = self.core.read8(pc.wrapping_add(1))?;
        self.bump_r(1);
        let op = self.index.fetch(code, pc)?;
        if op.kind == IndexOp::Cb {
            return self.execute_index_cb(pc, index);
        }
        let operands = self.core.operands(pc, 2, op.length)?;
        self.core.regs.pc = pc.wrapping_add(u16::from(op.length));
        self.execute_indexed(op.kind, index, operands)?;
        Ok(op.cost(false))
    }

    fn execute_index_cb(&mut self, pc: u16, index: Index) -> Result<u32, Fault> {
        let displacement = self.core.read8(pc.wrapping_add(2))?;
        let code = self.core.read8(pc.wrapping_add(3))?;
        let op = self.index_cb.fetch(code, pc)?;
        self.core.regs.pc = pc.wrapping_add(4);
        let address = self.indexed(index, displacement);
        let value = self.core.read8(address)?;
        if let Some(result) = self.bit_op(op.kind, value, address.to_be_bytes()[0]) {
            self.core.write8(address, result)?;
        }
        Ok(op.cost(false))
    }

    fn execute_indexed(&mut self, op: IndexOp, index: Index, operands: [u8; 2]) -> Result<(), Fault> {
        let [displacement, immediate] = operands;
        let word = u16::from_le_bytes(operands);
        let current = self.index_value(index);
        let address = self.indexed(index, displacement);
        match op {
            IndexOp::Add(pair) => {
                let right = if pair == Pair::HL {
                    current
                } else {
                    self.core.regs.pair(pair)
                };
                let sum = self.core.add16_flags(current, right);
                self.set_index(index, sum);
            }
            IndexOp::LdNn => self.set_index(index, word),
            IndexOp::Store => self.core.write16(word, current)?,
            IndexOp::Load => {
                let value = self.core.read16(word)?;
                self.set_index(index, value);
            }
            IndexOp::Inc => self.set_index(index, current.wrapping_add(1)),
            IndexOp::Dec => self.set_index(index, current.wrapping_sub(1)),
            IndexOp::IncIdx | IndexOp::DecIdx => {
                let value = self.core.read8(address)?;
                let result = if op == IndexOp::IncIdx {
                    self.core.inc8(value)
                } else {
                    self.core.dec8(value)
                };
                self.core.write8(address, result)?;
            }
            IndexOp::LdIdxN => self.core.write8(address, immediate)?,
            IndexOp::LdRIdx(reg) => {
                let value = self.core.read8(address)?;
                self.core.set_reg(reg, value)?;
            }
            IndexOp::LdIdxR(reg) => {
                let value = self.core.reg(reg)?;
                self.core.write8(address, value)?;
            }
            IndexOp::AluIdx(alu) => {
                let value = self.core.read8(address)?;
                self.core.alu(alu, value);
            }
            IndexOp::Pop => {
                let value = self.core.pop16()?;
                self.set_index(index, value);
            }
            IndexOp::ExSp => {
                let sp = self.core.regs.sp;
                let value = self.core.read16(sp)?;
                self.core.write16(sp, current)?;
                self.set_index(index, value);
            }
            IndexOp::Push => self.core.push16(current)?,
            IndexOp::Jp => self.core.regs.pc = current,
            IndexOp::LdSp => self.core.regs.sp = current,
            // dispatched before operand fetch
            IndexOp::Cb => {}
        }
        Ok(())
    }
}

impl Cpu for Z80 {
    fn family(&self) -> Family {
        Family::Z80
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
        self.core.regs.a = 0xFF;
        self.core.set_f(0xFF);
        self.core.regs.sp = 0xFFFF;
        self.i = 0;
        self.r = 0;
        self.im = 0;
        debug!("z80 reset");
        Ok(())
    }

    fn execute(&mut self) -> Result<u32, Fault> {
        if self.core.begin_slot() {
            // HALT keeps fetching NOPs
            self.bump_r(1);
            return Ok(4);
        }
        let pc = self.core.regs.pc;
        let code = self.core.read8(pc)?;
        self.bump_r(1);
        let op = self.main.fetch(code, pc)?;
        match op.kind {
            OpZ80::PrefixCb => self.execute_cb(pc),
            OpZ80::PrefixEd => self.execute_ed(pc),
            OpZ80::PrefixIndex(index) => self.execute_index(pc, index),
            OpZ80::Base(base) => {
                let operands = self.core.operands(pc, 1, op.length)?;
                self.core.regs.pc = pc.wrapping_add(u16::from(op.length));
                let taken = self.core.execute_base(base, operands)?;
                Ok(op.cost(taken))
            }
            other => {
                let [operand, _] = self.core.operands(pc, 1, op.length)?;
                self.core.regs.pc = pc.wrapping_add(u16::from(op.length));
                let taken = self.execute_extra(other, operand);
                Ok(op.cost(taken))
            }
        }
    }

    fn maskable_enabled(&self) -> bool {
        self.core.interrupts_open()
    }

    fn enter_interrupt(&mut self, line: LineId) -> Result<u32, Fault> {
        let non_maskable = self
            .core
            .machine
            .interrupts
            .line(line)
            .is_some_and(|line| line.is_non_maskable());
        let vector = self.core.interrupt_entry(line)?;
        self.bump_r(1);
        if non_maskable {
            self.core.iff2 = self.core.iff1;
            self.core.iff1 = false;
            self.core.regs.pc = NMI_VECTOR;
            return Ok(11);
        }
        self.core.iff1 = false;
        self.core.iff2 = false;
        match self.im {
            // the vector stands in for the RST placed on the data bus
            0 => {
                self.core.regs.pc = vector;
                Ok(13)
            }
            1 => {
                self.core.regs.pc = 0x0038;
                Ok(13)
            }
            _ => {
                let pointer = (u16::from(self.i) << 8) | (vector & 0x00FF);
                self.core.regs.pc = self.core.read16(pointer)?;
                Ok(19)
            }
        }
    }

    fn registers(&self) -> &'static [RegisterDescriptor] {
        &REGISTERS
    }

    fn read_register(&self, name: &str) -> Result<u32, Fault> {
        let register = find_register(&REGISTERS, name)
            .ok_or_else(|| Fault::UnknownRegister(name.to_owned()))?;
        let value = match register.name {
            "IX" => self.ix,
            "IY" => self.iy,
            "I" => u16::from(self.i),
            "R" => u16::from(self.r),
            "IM" => u16::from(self.im),
            "AF'" => self.shadow.af,
            "BC'" => self.shadow.bc,
            "DE'" => self.shadow.de,
            "HL'" => self.shadow.hl,
            other => {
                return self
                    .core
                    .named(other)
                    .ok_or_else(|| Fault::UnknownRegister(name.to_owned()))
            }
        };
        Ok(u32::from(value))
    }

    fn write_register(&mut self, name: &str, value: u32) -> Result<(), Fault> {
        let register = find_register(&REGISTERS, name)
            .ok_or_else(|| Fault::UnknownRegister(name.to_owned()))?;
        let value = value & register.mask();
        let word = value as u16;
        match register.name {
            "IX" => self.ix = word,
            "IY" => self.iy = word,
            "I" => self.i = word as u8,
            "R" => self.r = word as u8,
            "IM" => self.im = word as u8,
            "AF'" => self.shadow.af = word,
            "BC'" => self.shadow.bc = word,
            "DE'" => self.shadow.de = word,
            "HL'" => self.shadow.hl = word,
            other => {
                self.core.set_named(other, value);
            }
        }
        Ok(())
    }

    fn disassemble(&self, pc: u16) -> Result<(String, u8), Fault> {
        let memory = &self.core.machine.memory;
        let code = memory.peek(MEMORY, u32::from(pc))?;
        let entry = self
            .main
            .get(code)
            .ok_or(Fault::UnsupportedOpcode { pc, opcode: code })?;
        match entry.kind {
            OpZ80::PrefixCb => self.cb.disassemble(memory, MEMORY, pc, 1),
            OpZ80::PrefixEd => self.ed.disassemble(memory, MEMORY, pc, 1),
            OpZ80::PrefixIndex(index) => {
                let sub = memory.peek(MEMORY, u32::from(pc.wrapping_add(1)))?;
                let escaped = self.index.get(sub).is_some_and(|op| op.kind == IndexOp::Cb);
                let (text, length) = if escaped {
                    self.index_cb.disassemble(memory, MEMORY, pc, 3)?
                } else {
                    self.index.disassemble(memory, MEMORY, pc, 1)?
                };
                Ok((text.replace("IX", index.name()), length))
            }
            _ => self.main.disassemble(memory, MEMORY, pc, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Z80, MEMORY};
    use crate::families::i8080::flags;
    use crate::{Cpu, Fault, FaultClass, RunState};

    fn cpu_with(program: &[u8]) -> Z80 {
        let mut cpu = Z80::new().expect("builds");
        cpu.machine_mut()
            .memory
            .space_mut(MEMORY)
            .expect("memory")
            .poke_slice(0, program)
            .expect("fits");
        cpu
    }

    fn run(cpu: &mut Z80, steps: usize) -> u32 {
        (0..steps).map(|_| cpu.step().expect("step")).sum()
    }

    #[test]
    fn reset_state() {
        let cpu = cpu_with(&[]);
        assert_eq!(cpu.read_register("AF"), Ok(0xFFFF));
        assert_eq!(cpu.read_register("SP"), Ok(0xFFFF));
        assert_eq!(cpu.read_register("IM"), Ok(0));
        assert_eq!(cpu.pc(), 0);
    }

    #[test]
    fn djnz_loop_costs() {
        // LD B,3 ; DJNZ $
        let mut cpu = cpu_with(&[0x06, 0x03, 0x10, 0xFE]);
        assert_eq!(run(&mut cpu, 4), 7 + 13 + 13 + 8);
        assert_eq!(cpu.pc(), 4);
        assert_eq!(cpu.read_register("B"), Ok(0));
    }

    #[test]
    fn overflow_flag_replaces_parity() {
        // LD A,7Fh ; ADD A,1
        let mut cpu = cpu_with(&[0x3E, 0x7F, 0xC6, 0x01]);
        run(&mut cpu, 2);
        let f = cpu.read_register("F").expect("known") as u8;
        assert_eq!(f & (flags::P | flags::S | flags::H | flags::N), flags::P | flags::S | flags::H);
    }

    #[test]
    fn bit_and_indexed_set() {
        // LD IX,0100h ; SET 3,(IX+2) ; BIT 3,(IX+2)
        let mut cpu = cpu_with(&[
            0xDD, 0x21, 0x00, 0x01, 0xDD, 0xCB, 0x02, 0xDE, 0xDD, 0xCB, 0x02, 0x5E,
        ]);
        assert_eq!(run(&mut cpu, 3), 14 + 23 + 20);
        assert_eq!(cpu.machine().memory.peek(MEMORY, 0x0102), Ok(0x08));
        let f = cpu.read_register("F").expect("known") as u8;
        assert_eq!(f & flags::Z, 0);
        assert_eq!(cpu.pc(), 12);
    }

    #[test]
    fn ldir_repeats_until_bc_is_zero() {
        // LD HL,0100h ; LD DE,0200h ; LD BC,3 ; LDIR
        let mut cpu = cpu_with(&[
            0x21, 0x00, 0x01, 0x11, 0x00, 0x02, 0x01, 0x03, 0x00, 0xED, 0xB0,
        ]);
        cpu.machine_mut()
            .memory
            .space_mut(MEMORY)
            .expect("memory")
            .poke_slice(0x100, b"abc")
            .expect("fits");
        run(&mut cpu, 3);
        assert_eq!(run(&mut cpu, 3), 21 + 21 + 16);
        assert_eq!(cpu.pc(), 11);
        assert_eq!(cpu.read_register("BC"), Ok(0));
        let copied = (0x200..0x203)
            .map(|address| cpu.machine().memory.peek(MEMORY, address).expect("in range"))
            .collect::<Vec<_>>();
        assert_eq!(copied, b"abc");
        assert_eq!(cpu.read_register("F").map(|f| f as u8 & flags::P), Ok(0));
    }

    #[test]
    fn exchanges_swap_shadow_set() {
        // LD BC,1234h ; EXX ; LD BC,5678h ; EXX
        let mut cpu = cpu_with(&[0x01, 0x34, 0x12, 0xD9, 0x01, 0x78, 0x56, 0xD9]);
        run(&mut cpu, 4);
        assert_eq!(cpu.read_register("BC"), Ok(0x1234));
        assert_eq!(cpu.read_register("BC'"), Ok(0x5678));
    }

    #[test]
    fn refresh_counts_prefixed_fetches_twice() {
        // NOP ; LD IX,0 ; NEG
        let mut cpu = cpu_with(&[0x00, 0xDD, 0x21, 0x00, 0x00, 0xED, 0x44]);
        run(&mut cpu, 3);
        assert_eq!(cpu.read_register("R"), Ok(5));
    }

    #[test]
    fn mode_two_reads_vector_table() {
        // LD A,80h ; LD I,A ; IM 2 ; EI ; NOP ; NOP
        let mut cpu = cpu_with(&[0x3E, 0x80, 0xED, 0x47, 0xED, 0x5E, 0xFB, 0x00, 0x00]);
        cpu.write_register("SP", 0x4000).expect("known");
        cpu.machine_mut()
            .memory
            .poke(MEMORY, 0x8010, 0x00)
            .expect("in range");
        cpu.machine_mut()
            .memory
            .poke(MEMORY, 0x8011, 0x30)
            .expect("in range");
        let line = cpu.machine_mut().interrupts.add_line("CTC", 0x0010);
        cpu.machine_mut()
            .add_interrupt_rising_edge_condition(line, super::IO, 0x00, 0x01)
            .expect("valid");
        cpu.machine_mut().memory.write(super::IO, 0x00, 0x01).expect("in range");
        run(&mut cpu, 4);
        assert_eq!(cpu.pc(), 7);
        assert_eq!(run(&mut cpu, 1), 4 + 19);
        assert_eq!(cpu.pc(), 0x3000);
        assert_eq!(cpu.interrupt_mode(), 2);
    }

    #[test]
    fn nmi_preserves_iff1_in_iff2() {
        // EI ; NOP ; NOP
        let mut cpu = cpu_with(&[0xFB, 0x00, 0x00]);
        cpu.write_register("SP", 0x4000).expect("known");
        let nmi = cpu.add_nmi_line();
        cpu.machine_mut()
            .add_interrupt_rising_edge_condition(nmi, super::IO, 0x01, 0x01)
            .expect("valid");
        run(&mut cpu, 1);
        cpu.machine_mut().memory.write(super::IO, 0x01, 0x01).expect("in range");
        assert_eq!(run(&mut cpu, 1), 4 + 11);
        assert_eq!(cpu.pc(), 0x0066);
        assert!(!cpu.core().iff1);
        assert!(cpu.core().iff2);
    }

    #[test]
    fn undefined_index_slot_faults() {
        let mut cpu = cpu_with(&[0xDD, 0x00]);
        assert_eq!(
            cpu.step(),
            Err(Fault::UnsupportedOpcode {
                pc: 0,
                opcode: 0x00
            })
        );
        assert_eq!(cpu.run_state(), RunState::Faulted(FaultClass::UnsupportedOperation));
    }

    #[test]
    fn disassembly_covers_prefixes() {
        let cpu = cpu_with(&[
            0xFD, 0x7E, 0xFB, 0xCB, 0x7E, 0xED, 0xB0, 0xDD, 0xCB, 0x05, 0xC6, 0x18, 0xFE,
        ]);
        assert_eq!(cpu.disassemble(0), Ok(("LD A,(IY-0x05)".to_owned(), 3)));
        assert_eq!(cpu.disassemble(3), Ok(("BIT 7,(HL)".to_owned(), 2)));
        assert_eq!(cpu.disassemble(5), Ok(("LDIR".to_owned(), 2)));
        assert_eq!(cpu.disassemble(7), Ok(("SET 0,(IX+0x05)".to_owned(), 4)));
        assert_eq!(cpu.disassemble(11), Ok(("JR 0x000b".to_owned(), 2)));
    }
}
