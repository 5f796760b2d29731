//! MOS 6502 (NMOS), documented instruction set.
//!
//! Interrupt lines carry the address of their vector word rather than the
//! handler address: IRQ reads 0xFFFE, NMI 0xFFFA, reset 0xFFFC. Indexed
//! reads and taken branches pay the page-crossing cycle.

#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

pub mod opcodes;

use tracing::debug;

use self::opcodes::{Mnemonic, Mode, Op};
use crate::alu::{add8, sub8};
use crate::{
    find_register, relative_target, AddressSpace, Cpu, Family, Fault, LineId, Machine,
    OpcodeTable, RegisterDescriptor, RegisterKind, RunState, SpaceId,
};

/// The single 64 KiB address space.
pub const MEMORY: SpaceId = SpaceId(0);

/// Vector word addresses.
pub mod vector {
    #![allow(missing_docs)]
    pub const NMI: u16 = 0xFFFA;
    pub const RESET: u16 = 0xFFFC;
    pub const IRQ: u16 = 0xFFFE;
}

/// Status register bits.
pub mod status {
    #![allow(missing_docs)]
    pub const N: u8 = 0x80;
    pub const V: u8 = 0x40;
    pub const U: u8 = 0x20;
    pub const B: u8 = 0x10;
    pub const D: u8 = 0x08;
    pub const I: u8 = 0x04;
    pub const Z: u8 = 0x02;
    pub const C: u8 = 0x01;
}

use self::status::{B, C, D, I, N, U, V, Z};

static REGISTERS: [RegisterDescriptor; 6] = [
    RegisterDescriptor::new("PC", 16, RegisterKind::ProgramCounter),
    RegisterDescriptor::new("SP", 8, RegisterKind::StackPointer),
    RegisterDescriptor::new("A", 8, RegisterKind::Accumulator),
    RegisterDescriptor::new("X", 8, RegisterKind::Index),
    RegisterDescriptor::new("Y", 8, RegisterKind::Index),
    RegisterDescriptor::new("P", 8, RegisterKind::Flags),
];

#[derive(Debug, Clone, Copy)]
enum Operand {
    None,
    Accumulator,
    Value(u8),
    Address(u16),
}

/// Register file.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub p: u8,
    pub pc: u16,
}

/// NMOS 6502 CPU.
#[derive(Debug)]
pub struct M6502 {
    machine: Machine,
    table: OpcodeTable<Op>,
    regs: Registers,
    run_state: RunState,
}

impl M6502 {
    /// Creates a 6502 with flat 64 KiB memory. The PC is loaded from the
    /// reset vector, so programs are normally loaded before [`Cpu::reset`].
    ///
    /// # Errors
    ///
    /// Propagates table and wiring faults.
    pub fn new() -> Result<Self, Fault> {
        Self::with_memory(AddressSpace::flat("MEMORY", 0x1_0000))
    }

    /// Creates a 6502 around a caller-built 64 KiB memory space.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for a space that is not 64 KiB.
    pub fn with_memory(memory: AddressSpace) -> Result<Self, Fault> {
        if memory.size() != 0x1_0000 {
            return Err(Fault::configuration(format!(
                "{} must be 64 KiB, got {:#x}",
                memory.name(),
                memory.size()
            )));
        }
        let mut machine = Machine::new();
        machine.memory.add(memory)?;
        let mut cpu = Self {
            machine,
            table: opcodes::build()?,
            regs: Registers::default(),
            run_state: RunState::Running,
        };
        cpu.reset()?;
        Ok(cpu)
    }

    /// Adds the maskable IRQ line.
    pub fn add_irq_line(&mut self) -> LineId {
        self.machine.interrupts.add_line("IRQ", vector::IRQ)
    }

    /// Adds the NMI line; drive it through rising-edge conditions.
    pub fn add_nmi_line(&mut self) -> LineId {
        self.machine
            .interrupts
            .add_non_maskable_line("NMI", vector::NMI)
    }

    /// Register file.
    #[must_use]
    pub const fn registers_file(&self) -> Registers {
        self.regs
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

    const fn flag(&self, bit: u8) -> bool {
        self.regs.p & bit != 0
    }

    fn set_flag(&mut self, bit: u8, on: bool) {
        if on {
            self.regs.p |= bit;
        } else {
            self.regs.p &= !bit;
        }
    }

    fn set_nz(&mut self, value: u8) {
        self.set_flag(Z, value == 0);
        self.set_flag(N, value & 0x80 != 0);
    }

    fn read8(&mut self, address: u16) -> Result<u8, Fault> {
        self.machine.memory.read(MEMORY, u32::from(address))
    }

    fn write8(&mut self, address: u16, value: u8) -> Result<(), Fault> {
        self.machine.memory.write(MEMORY, u32::from(address), value)
    }

    fn read16(&mut self, address: u16) -> Result<u16, Fault> {
        let low = self.read8(address)?;
        let high = self.read8(address.wrapping_add(1))?;
        Ok(u16::from_le_bytes([low, high]))
    }

    /// Word read whose high byte wraps within the page of `address`.
    fn read16_in_page(&mut self, address: u16) -> Result<u16, Fault> {
        let low = self.read8(address)?;
        let high = self.read8((address & 0xFF00) | (address.wrapping_add(1) & 0x00FF))?;
        Ok(u16::from_le_bytes([low, high]))
    }

    fn push(&mut self, value: u8) -> Result<(), Fault> {
        self.write8(0x0100 | u16::from(self.regs.sp), value)?;
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        Ok(())
    }

    fn pop(&mut self) -> Result<u8, Fault> {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        self.read8(0x0100 | u16::from(self.regs.sp))
    }

    fn push16(&mut self, value: u16) -> Result<(), Fault> {
        let [low, high] = value.to_le_bytes();
        self.push(high)?;
        self.push(low)
    }

    fn pop16(&mut self) -> Result<u16, Fault> {
        let low = self.pop()?;
        let high = self.pop()?;
        Ok(u16::from_le_bytes([low, high]))
    }

    /// Resolves the operand of the instruction at `pc`; the flag reports an
    /// indexed page crossing.
    fn resolve(&mut self, mode: Mode, pc: u16) -> Result<(Operand, bool), Fault> {
        let first = if mode.length() > 1 {
            self.read8(pc.wrapping_add(1))?
        } else {
            0
        };
        let word = if mode.length() > 2 {
            self.read16(pc.wrapping_add(1))?
        } else {
            u16::from(first)
        };
        let indexed = |base: u16, index: u8| {
            let address = base.wrapping_add(u16::from(index));
            (Operand::Address(address), (base ^ address) & 0xFF00 != 0)
        };
        Ok(match mode {
            Mode::Implied => (Operand::None, false),
            Mode::Accumulator => (Operand::Accumulator, false),
            Mode::Immediate => (Operand::Value(first), false),
            Mode::ZeroPage | Mode::Absolute => (Operand::Address(word), false),
            Mode::ZeroPageX => (
                Operand::Address(u16::from(first.wrapping_add(self.regs.x))),
                false,
            ),
            Mode::ZeroPageY => (
                Operand::Address(u16::from(first.wrapping_add(self.regs.y))),
                false,
            ),
            Mode::AbsoluteX => indexed(word, self.regs.x),
            Mode::AbsoluteY => indexed(word, self.regs.y),
            Mode::IndirectX => {
                let pointer = u16::from(first.wrapping_add(self.regs.x));
                (Operand::Address(self.read16_in_page(pointer)?), false)
            }
            Mode::IndirectY => {
                let base = self.read16_in_page(u16::from(first))?;
                indexed(base, self.regs.y)
            }
            // NMOS fetches the high byte without carrying into the page
            Mode::Indirect => (Operand::Address(self.read16_in_page(word)?), false),
            Mode::Relative => {
                let next = pc.wrapping_add(2);
                let target = relative_target(pc, 2, first);
                (Operand::Address(target), (next ^ target) & 0xFF00 != 0)
            }
        })
    }

    fn load(&mut self, operand: Operand) -> Result<u8, Fault> {
        match operand {
            Operand::None => Ok(0),
            Operand::Accumulator => Ok(self.regs.a),
            Operand::Value(value) => Ok(value),
            Operand::Address(address) => self.read8(address),
        }
    }

    fn store(&mut self, operand: Operand, value: u8) -> Result<(), Fault> {
        match operand {
            Operand::Accumulator => self.regs.a = value,
            Operand::Address(address) => self.write8(address, value)?,
            Operand::None | Operand::Value(_) => {}
        }
        Ok(())
    }

    fn add_with_carry(&mut self, value: u8) {
        let a = self.regs.a;
        let carry = self.flag(C);
        let binary = add8(a, value, carry);
        if !self.flag(D) {
            self.regs.a = binary.value;
            self.set_flag(C, binary.carry);
            self.set_flag(V, binary.overflow);
            self.set_nz(binary.value);
            return;
        }
        let mut low = u16::from(a & 0x0F) + u16::from(value & 0x0F) + u16::from(carry);
        if low >= 0x0A {
            low = ((low + 0x06) & 0x0F) + 0x10;
        }
        let mut sum = u16::from(a & 0xF0) + u16::from(value & 0xF0) + low;
        // N and V come from the sum before the high-digit correction
        let intermediate = sum as u8;
        self.set_flag(N, intermediate & 0x80 != 0);
        self.set_flag(V, !(a ^ value) & (a ^ intermediate) & 0x80 != 0);
        if sum >= 0xA0 {
            sum += 0x60;
        }
        self.set_flag(C, sum >= 0x100);
        self.set_flag(Z, binary.value == 0);
        self.regs.a = sum as u8;
    }

    fn subtract_with_borrow(&mut self, value: u8) {
        let a = self.regs.a;
        let borrow = !self.flag(C);
        let binary = sub8(a, value, borrow);
        self.set_flag(C, !binary.carry);
        self.set_flag(V, binary.overflow);
        self.set_nz(binary.value);
        if !self.flag(D) {
            self.regs.a = binary.value;
            return;
        }
        // flags stay binary on NMOS; only the result is corrected
        let mut low = i16::from(a & 0x0F) - i16::from(value & 0x0F) - i16::from(borrow);
        if low < 0 {
            low = ((low - 0x06) & 0x0F) - 0x10;
        }
        let mut difference = i16::from(a & 0xF0) - i16::from(value & 0xF0) + low;
        if difference < 0 {
            difference -= 0x60;
        }
        self.regs.a = difference as u8;
    }

    fn compare(&mut self, register: u8, value: u8) {
        let result = register.wrapping_sub(value);
        self.set_flag(C, register >= value);
        self.set_nz(result);
    }

    /// Runs one decoded instruction; returns `true` for a taken branch.
    fn run(&mut self, op: Op, operand: Operand) -> Result<bool, Fault> {
        let taken = match op.mnemonic {
            Mnemonic::Bcc => !self.flag(C),
            Mnemonic::Bcs => self.flag(C),
            Mnemonic::Bne => !self.flag(Z),
            Mnemonic::Beq => self.flag(Z),
            Mnemonic::Bpl => !self.flag(N),
            Mnemonic::Bmi => self.flag(N),
            Mnemonic::Bvc => !self.flag(V),
            Mnemonic::Bvs => self.flag(V),
            other => {
                self.run_straight(other, operand)?;
                return Ok(false);
            }
        };
        if let (true, Operand::Address(target)) = (taken, operand) {
            self.regs.pc = target;
        }
        Ok(taken)
    }

    #[allow(clippy::too_many_lines)]
    fn run_straight(&mut self, mnemonic: Mnemonic, operand: Operand) -> Result<(), Fault> {
        match mnemonic {
            Mnemonic::Adc => {
                let value = self.load(operand)?;
                self.add_with_carry(value);
            }
            Mnemonic::Sbc => {
                let value = self.load(operand)?;
                self.subtract_with_borrow(value);
            }
            Mnemonic::And | Mnemonic::Ora | Mnemonic::Eor => {
                let value = self.load(operand)?;
                self.regs.a = match mnemonic {
                    Mnemonic::And => self.regs.a & value,
                    Mnemonic::Ora => self.regs.a | value,
                    _ => self.regs.a ^ value,
                };
                self.set_nz(self.regs.a);
            }
            Mnemonic::Asl | Mnemonic::Lsr | Mnemonic::Rol | Mnemonic::Ror => {
                let value = self.load(operand)?;
                let carry_in = u8::from(self.flag(C));
                let (result, carry) = match mnemonic {
                    Mnemonic::Asl => (value << 1, value & 0x80 != 0),
                    Mnemonic::Rol => ((value << 1) | carry_in, value & 0x80 != 0),
                    Mnemonic::Lsr => (value >> 1, value & 0x01 != 0),
                    _ => ((value >> 1) | (carry_in << 7), value & 0x01 != 0),
                };
                self.store(operand, result)?;
                self.set_flag(C, carry);
                self.set_nz(result);
            }
            Mnemonic::Bit => {
                let value = self.load(operand)?;
                self.set_flag(Z, self.regs.a & value == 0);
                self.set_flag(N, value & 0x80 != 0);
                self.set_flag(V, value & 0x40 != 0);
            }
            Mnemonic::Brk => {
                self.push16(self.regs.pc)?;
                self.push(self.regs.p | B | U)?;
                self.regs.p |= I;
                self.regs.pc = self.read16(vector::IRQ)?;
            }
            Mnemonic::Clc => self.set_flag(C, false),
            Mnemonic::Cld => self.set_flag(D, false),
            Mnemonic::Cli => self.set_flag(I, false),
            Mnemonic::Clv => self.set_flag(V, false),
            Mnemonic::Sec => self.set_flag(C, true),
            Mnemonic::Sed => self.set_flag(D, true),
            Mnemonic::Sei => self.set_flag(I, true),
            Mnemonic::Cmp | Mnemonic::Cpx | Mnemonic::Cpy => {
                let value = self.load(operand)?;
                let register = match mnemonic {
                    Mnemonic::Cmp => self.regs.a,
                    Mnemonic::Cpx => self.regs.x,
                    _ => self.regs.y,
                };
                self.compare(register, value);
            }
            Mnemonic::Dec | Mnemonic::Inc => {
                let value = self.load(operand)?;
                let result = if mnemonic == Mnemonic::Inc {
                    value.wrapping_add(1)
                } else {
                    value.wrapping_sub(1)
                };
                self.store(operand, result)?;
                self.set_nz(result);
            }
            Mnemonic::Dex => {
                self.regs.x = self.regs.x.wrapping_sub(1);
                self.set_nz(self.regs.x);
            }
            Mnemonic::Dey => {
                self.regs.y = self.regs.y.wrapping_sub(1);
                self.set_nz(self.regs.y);
            }
            Mnemonic::Inx => {
                self.regs.x = self.regs.x.wrapping_add(1);
                self.set_nz(self.regs.x);
            }
            Mnemonic::Iny => {
                self.regs.y = self.regs.y.wrapping_add(1);
                self.set_nz(self.regs.y);
            }
            Mnemonic::Jmp => {
                if let Operand::Address(target) = operand {
                    self.regs.pc = target;
                }
            }
            Mnemonic::Jsr => {
                if let Operand::Address(target) = operand {
                    self.push16(self.regs.pc.wrapping_sub(1))?;
                    self.regs.pc = target;
                }
            }
            Mnemonic::Lda => {
                self.regs.a = self.load(operand)?;
                self.set_nz(self.regs.a);
            }
            Mnemonic::Ldx => {
                self.regs.x = self.load(operand)?;
                self.set_nz(self.regs.x);
            }
            Mnemonic::Ldy => {
                self.regs.y = self.load(operand)?;
                self.set_nz(self.regs.y);
            }
            Mnemonic::Pha => self.push(self.regs.a)?,
            Mnemonic::Php => self.push(self.regs.p | B | U)?,
            Mnemonic::Pla => {
                self.regs.a = self.pop()?;
                self.set_nz(self.regs.a);
            }
            Mnemonic::Plp => self.regs.p = (self.pop()? & !B) | U,
            Mnemonic::Rti => {
                self.regs.p = (self.pop()? & !B) | U;
                self.regs.pc = self.pop16()?;
            }
            Mnemonic::Rts => self.regs.pc = self.pop16()?.wrapping_add(1),
            Mnemonic::Sta => self.store(operand, self.regs.a)?,
            Mnemonic::Stx => self.store(operand, self.regs.x)?,
            Mnemonic::Sty => self.store(operand, self.regs.y)?,
            Mnemonic::Tax => {
                self.regs.x = self.regs.a;
                self.set_nz(self.regs.x);
            }
            Mnemonic::Tay => {
                self.regs.y = self.regs.a;
                self.set_nz(self.regs.y);
            }
            Mnemonic::Tsx => {
                self.regs.x = self.regs.sp;
                self.set_nz(self.regs.x);
            }
            Mnemonic::Txa => {
                self.regs.a = self.regs.x;
                self.set_nz(self.regs.a);
            }
            Mnemonic::Txs => self.regs.sp = self.regs.x,
            Mnemonic::Tya => {
                self.regs.a = self.regs.y;
                self.set_nz(self.regs.a);
            }
            Mnemonic::Nop
            | Mnemonic::Bcc
            | Mnemonic::Bcs
            | Mnemonic::Beq
            | Mnemonic::Bmi
            | Mnemonic::Bne
            | Mnemonic::Bpl
            | Mnemonic::Bvc
            | Mnemonic::Bvs => {}
        }
        Ok(())
    }
}

impl Cpu for M6502 {
    fn family(&self) -> Family {
        Family::M6502
    }

    fn machine(&self) -> &Machine {
        &self.machine
    }

    fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    fn run_state(&self) -> RunState {
        self.run_state
    }

    fn set_run_state(&mut self, state: RunState) {
        self.run_state = state;
    }

    fn reset(&mut self) -> Result<(), Fault> {
        self.regs = Registers {
            sp: 0xFD,
            p: U | I,
            ..Registers::default()
        };
        self.regs.pc = self.read16(vector::RESET)?;
        self.run_state = RunState::Running;
        self.machine.interrupts.reset();
        debug!(pc = self.regs.pc, "m6502 reset");
        Ok(())
    }

    fn execute(&mut self) -> Result<u32, Fault> {
        let pc = self.regs.pc;
        let code = self.read8(pc)?;
        let op = self.table.fetch(code, pc)?;
        let (operand, crossed) = self.resolve(op.kind.mode, pc)?;
        self.regs.pc = pc.wrapping_add(u16::from(op.length));
        let taken = self.run(op.kind, operand)?;
        let mut cycles = op.cost(taken);
        if crossed && (taken || op.kind.page_penalty()) {
            cycles += 1;
        }
        Ok(cycles)
    }

    fn maskable_enabled(&self) -> bool {
        !self.flag(I)
    }

    fn enter_interrupt(&mut self, line: LineId) -> Result<u32, Fault> {
        let vector = self
            .machine
            .interrupts
            .acknowledge(line, &mut self.machine.memory)?;
        self.push16(self.regs.pc)?;
        self.push((self.regs.p & !B) | U)?;
        self.regs.p |= I;
        self.regs.pc = self.read16(vector)?;
        Ok(7)
    }

    fn registers(&self) -> &'static [RegisterDescriptor] {
        &REGISTERS
    }

    fn read_register(&self, name: &str) -> Result<u32, Fault> {
        let register = find_register(&REGISTERS, name)
            .ok_or_else(|| Fault::UnknownRegister(name.to_owned()))?;
        let value = match register.name {
            "PC" => self.regs.pc,
            "SP" => u16::from(self.regs.sp),
            "A" => u16::from(self.regs.a),
            "X" => u16::from(self.regs.x),
            "Y" => u16::from(self.regs.y),
            _ => u16::from(self.regs.p),
        };
        Ok(u32::from(value))
    }

    fn write_register(&mut self, name: &str, value: u32) -> Result<(), Fault> {
        let register = find_register(&REGISTERS, name)
            .ok_or_else(|| Fault::UnknownRegister(name.to_owned()))?;
        let value = value & register.mask();
        let byte = value as u8;
        match register.name {
            "PC" => self.regs.pc = value as u16,
            "SP" => self.regs.sp = byte,
            "A" => self.regs.a = byte,
            "X" => self.regs.x = byte,
            "Y" => self.regs.y = byte,
            _ => self.regs.p = (byte & !B) | U,
        }
        Ok(())
    }

    fn disassemble(&self, pc: u16) -> Result<(String, u8), Fault> {
        self.table.disassemble(&self.machine.memory, MEMORY, pc, 0)
    }
}
