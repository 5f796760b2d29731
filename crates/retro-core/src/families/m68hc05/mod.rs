//! Motorola 68HC05 core.
//!
//! Memory size is a power of two up to 64 KiB; the vector words sit at the
//! top of it (reset, SWI, external IRQ, timer, going down). The stack is six
//! bits wide and lives in 0xC0..=0xFF. `WAIT` and `STOP` halt the core with
//! interrupts unmasked until a line is dispatched.

#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

pub mod opcodes;

use tracing::debug;

use self::opcodes::{Branch, Mode, Op, RegMem, Rmw};
use crate::alu::{add8, sub8};
use crate::{
    find_register, relative_target, AddressSpace, Cpu, Family, Fault, LineId, Machine,
    OpcodeTable, RegisterDescriptor, RegisterKind, RunState, SpaceId,
};

/// The single address space.
pub const MEMORY: SpaceId = SpaceId(0);

/// Condition code register bits; bits 5-7 always read as one.
pub mod ccr {
    #![allow(missing_docs)]
    pub const H: u8 = 0x10;
    pub const I: u8 = 0x08;
    pub const N: u8 = 0x04;
    pub const Z: u8 = 0x02;
    pub const C: u8 = 0x01;
    pub const FIXED: u8 = 0xE0;
}

use self::ccr::{C, FIXED, H, I, N, Z};

const STACK_BASE: u8 = 0xC0;

static REGISTERS: [RegisterDescriptor; 5] = [
    RegisterDescriptor::new("PC", 16, RegisterKind::ProgramCounter),
    RegisterDescriptor::new("SP", 8, RegisterKind::StackPointer),
    RegisterDescriptor::new("A", 8, RegisterKind::Accumulator),
    RegisterDescriptor::new("X", 8, RegisterKind::Index),
    RegisterDescriptor::new("CCR", 8, RegisterKind::Flags),
];

/// Vector word slots, counted down from the top of memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vector {
    /// Power-on and external reset.
    Reset,
    /// Software interrupt.
    Swi,
    /// External `IRQ` pin.
    Irq,
    /// On-chip timer.
    Timer,
}

/// 68HC05 CPU.
#[derive(Debug)]
pub struct M68hc05 {
    machine: Machine,
    table: OpcodeTable<Op>,
    top: u16,
    pc: u16,
    a: u8,
    x: u8,
    sp: u8,
    ccr: u8,
    irq: Option<LineId>,
    run_state: RunState,
}

impl M68hc05 {
    /// Creates a core with `size` bytes of flat memory.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for a size that is not a power of two
    /// between 512 bytes and 64 KiB.
    pub fn new(size: u32) -> Result<Self, Fault> {
        Self::with_memory(AddressSpace::flat("MEMORY", size))
    }

    /// Creates a core around a caller-built memory space.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for a size that is not a power of two
    /// between 512 bytes and 64 KiB.
    pub fn with_memory(memory: AddressSpace) -> Result<Self, Fault> {
        let size = memory.size();
        if !size.is_power_of_two() || !(0x200..=0x1_0000).contains(&size) {
            return Err(Fault::configuration(format!(
                "{}: 68HC05 memory must be a power of two in 512..=65536, got {size:#x}",
                memory.name()
            )));
        }
        let top = u16::try_from(size - 1)
            .map_err(|_| Fault::configuration(format!("memory size {size:#x}")))?;
        let mut machine = Machine::new();
        machine.memory.add(memory)?;
        let mut cpu = Self {
            machine,
            table: opcodes::build()?,
            top,
            pc: 0,
            a: 0,
            x: 0,
            sp: 0xFF,
            ccr: FIXED | I,
            irq: None,
            run_state: RunState::Running,
        };
        cpu.reset()?;
        Ok(cpu)
    }

    /// Address of a vector word.
    #[must_use]
    pub const fn vector_address(&self, vector: Vector) -> u16 {
        let slot = match vector {
            Vector::Reset => 0,
            Vector::Swi => 1,
            Vector::Irq => 2,
            Vector::Timer => 3,
        };
        self.top - 1 - 2 * slot
    }

    /// Adds the external interrupt line. `BIL`/`BIH` sample it as the pin.
    pub fn add_irq_line(&mut self) -> LineId {
        let vector = self.vector_address(Vector::Irq);
        let id = self.machine.interrupts.add_line("IRQ", vector);
        self.irq = Some(id);
        id
    }

    /// Adds the timer interrupt line.
    pub fn add_timer_line(&mut self) -> LineId {
        let vector = self.vector_address(Vector::Timer);
        self.machine.interrupts.add_line("TIMER", vector)
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
        self.ccr & bit != 0
    }

    fn set_flag(&mut self, bit: u8, on: bool) {
        if on {
            self.ccr |= bit;
        } else {
            self.ccr &= !bit;
        }
    }

    fn set_nz(&mut self, value: u8) {
        self.set_flag(N, value & 0x80 != 0);
        self.set_flag(Z, value == 0);
    }

    /// Level of the IRQ pin: low while the line is requesting.
    fn irq_pin_low(&self) -> bool {
        self.irq
            .and_then(|id| self.machine.interrupts.line(id))
            .is_some_and(|line| line.is_active())
    }

    fn read8(&mut self, address: u16) -> Result<u8, Fault> {
        self.machine.memory.read(MEMORY, u32::from(address))
    }

    fn write8(&mut self, address: u16, value: u8) -> Result<(), Fault> {
        self.machine.memory.write(MEMORY, u32::from(address), value)
    }

    fn read16(&mut self, address: u16) -> Result<u16, Fault> {
        self.machine.memory.read_u16_be(MEMORY, u32::from(address))
    }

    fn push(&mut self, value: u8) -> Result<(), Fault> {
        self.write8(u16::from(self.sp), value)?;
        self.sp = STACK_BASE | (self.sp.wrapping_sub(1) & 0x3F);
        Ok(())
    }

    fn pop(&mut self) -> Result<u8, Fault> {
        self.sp = STACK_BASE | (self.sp.wrapping_add(1) & 0x3F);
        self.read8(u16::from(self.sp))
    }

    fn push_pc(&mut self) -> Result<(), Fault> {
        let [high, low] = self.pc.to_be_bytes();
        self.push(low)?;
        self.push(high)
    }

    fn pop_pc(&mut self) -> Result<(), Fault> {
        let high = self.pop()?;
        let low = self.pop()?;
        self.pc = u16::from_be_bytes([high, low]);
        Ok(())
    }

    /// Stacks the full machine state and vectors through `vector`.
    fn stack_and_vector(&mut self, vector: u16) -> Result<(), Fault> {
        self.push_pc()?;
        self.push(self.x)?;
        self.push(self.a)?;
        self.push(self.ccr)?;
        self.ccr |= I;
        self.pc = self.read16(vector)?;
        Ok(())
    }

    fn effective_address(&self, mode: Mode, operands: [u8; 2]) -> Option<u16> {
        let [first, _] = operands;
        let word = u16::from_be_bytes(operands);
        let x = u16::from(self.x);
        match mode {
            Mode::Direct => Some(u16::from(first)),
            Mode::Extended => Some(word),
            Mode::Indexed2 => Some(x.wrapping_add(word)),
            Mode::Indexed1 => Some(x + u16::from(first)),
            Mode::Indexed => Some(x),
            Mode::Immediate | Mode::InherentA | Mode::InherentX => None,
        }
    }

    fn load(&mut self, mode: Mode, operands: [u8; 2]) -> Result<u8, Fault> {
        match mode {
            Mode::Immediate => Ok(operands[0]),
            Mode::InherentA => Ok(self.a),
            Mode::InherentX => Ok(self.x),
            _ => match self.effective_address(mode, operands) {
                Some(address) => self.read8(address),
                None => Ok(0),
            },
        }
    }

    fn store(&mut self, mode: Mode, operands: [u8; 2], value: u8) -> Result<(), Fault> {
        match mode {
            Mode::InherentA => self.a = value,
            Mode::InherentX => self.x = value,
            _ => {
                if let Some(address) = self.effective_address(mode, operands) {
                    self.write8(address, value)?;
                }
            }
        }
        Ok(())
    }

    fn branch_taken(&self, branch: Branch) -> bool {
        let c = self.flag(C);
        let z = self.flag(Z);
        match branch {
            Branch::Bra => true,
            Branch::Brn => false,
            Branch::Bhi => !c && !z,
            Branch::Bls => c || z,
            Branch::Bcc => !c,
            Branch::Bcs => c,
            Branch::Bne => !z,
            Branch::Beq => z,
            Branch::Bhcc => !self.flag(H),
            Branch::Bhcs => self.flag(H),
            Branch::Bpl => !self.flag(N),
            Branch::Bmi => self.flag(N),
            Branch::Bmc => !self.flag(I),
            Branch::Bms => self.flag(I),
            Branch::Bil => self.irq_pin_low(),
            Branch::Bih => !self.irq_pin_low(),
        }
    }

    fn read_modify_write(&mut self, rmw: Rmw, mode: Mode, operands: [u8; 2]) -> Result<(), Fault> {
        let value = self.load(mode, operands)?;
        let carry_in = u8::from(self.flag(C));
        let (result, carry) = match rmw {
            Rmw::Neg => (value.wrapping_neg(), Some(value != 0)),
            Rmw::Com => (!value, Some(true)),
            Rmw::Lsr => (value >> 1, Some(value & 0x01 != 0)),
            Rmw::Ror => ((value >> 1) | (carry_in << 7), Some(value & 0x01 != 0)),
            Rmw::Asr => ((value >> 1) | (value & 0x80), Some(value & 0x01 != 0)),
            Rmw::Asl => (value << 1, Some(value & 0x80 != 0)),
            Rmw::Rol => ((value << 1) | carry_in, Some(value & 0x80 != 0)),
            Rmw::Dec => (value.wrapping_sub(1), None),
            Rmw::Inc => (value.wrapping_add(1), None),
            Rmw::Tst => {
                self.set_nz(value);
                return Ok(());
            }
            Rmw::Clr => (0, None),
        };
        if let Some(carry) = carry {
            self.set_flag(C, carry);
        }
        self.set_nz(result);
        self.store(mode, operands, result)
    }

    fn register_memory(&mut self, op: RegMem, mode: Mode, operands: [u8; 2]) -> Result<(), Fault> {
        match op {
            RegMem::Sta => return self.store(mode, operands, self.a).map(|()| self.set_nz(self.a)),
            RegMem::Stx => return self.store(mode, operands, self.x).map(|()| self.set_nz(self.x)),
            RegMem::Jmp | RegMem::Jsr => {
                if let Some(target) = self.effective_address(mode, operands) {
                    if op == RegMem::Jsr {
                        self.push_pc()?;
                    }
                    self.pc = target;
                }
                return Ok(());
            }
            _ => {}
        }
        let value = self.load(mode, operands)?;
        let borrow = self.flag(C);
        match op {
            RegMem::Add | RegMem::Adc => {
                let sum = add8(self.a, value, op == RegMem::Adc && borrow);
                self.set_flag(H, sum.half_carry);
                self.set_flag(C, sum.carry);
                self.a = sum.value;
                self.set_nz(sum.value);
            }
            RegMem::Sub | RegMem::Sbc | RegMem::Cmp | RegMem::Cpx => {
                let left = if op == RegMem::Cpx { self.x } else { self.a };
                let difference = sub8(left, value, op == RegMem::Sbc && borrow);
                self.set_flag(C, difference.carry);
                self.set_nz(difference.value);
                if matches!(op, RegMem::Sub | RegMem::Sbc) {
                    self.a = difference.value;
                }
            }
            RegMem::And => {
                self.a &= value;
                self.set_nz(self.a);
            }
            RegMem::Ora => {
                self.a |= value;
                self.set_nz(self.a);
            }
            RegMem::Eor => {
                self.a ^= value;
                self.set_nz(self.a);
            }
            RegMem::Bit => self.set_nz(self.a & value),
            RegMem::Lda => {
                self.a = value;
                self.set_nz(value);
            }
            RegMem::Ldx => {
                self.x = value;
                self.set_nz(value);
            }
            RegMem::Sta | RegMem::Stx | RegMem::Jmp | RegMem::Jsr => {}
        }
        Ok(())
    }

    /// Runs one decoded instruction at `pc`; `self.pc` already points past
    /// it.
    fn run(&mut self, op: Op, pc: u16, length: u8, operands: [u8; 2]) -> Result<(), Fault> {
        let [first, second] = operands;
        match op {
            Op::Brset(bit) | Op::Brclr(bit) => {
                let value = self.read8(u16::from(first))?;
                let set = value & (1 << bit) != 0;
                self.set_flag(C, set);
                if set == matches!(op, Op::Brset(_)) {
                    self.pc = relative_target(pc, length, second);
                }
            }
            Op::Bset(bit) | Op::Bclr(bit) => {
                let address = u16::from(first);
                let value = self.read8(address)?;
                let value = if matches!(op, Op::Bset(_)) {
                    value | (1 << bit)
                } else {
                    value & !(1 << bit)
                };
                self.write8(address, value)?;
            }
            Op::Branch(branch) => {
                if self.branch_taken(branch) {
                    self.pc = relative_target(pc, length, first);
                }
            }
            Op::Bsr => {
                self.push_pc()?;
                self.pc = relative_target(pc, length, first);
            }
            Op::Rmw(rmw, mode) => self.read_modify_write(rmw, mode, operands)?,
            Op::RegMem(regmem, mode) => self.register_memory(regmem, mode, operands)?,
            Op::Mul => {
                let [high, low] = (u16::from(self.x) * u16::from(self.a)).to_be_bytes();
                self.x = high;
                self.a = low;
                self.set_flag(H, false);
                self.set_flag(C, false);
            }
            Op::Rti => {
                self.ccr = self.pop()? | FIXED;
                self.a = self.pop()?;
                self.x = self.pop()?;
                self.pop_pc()?;
            }
            Op::Rts => self.pop_pc()?,
            Op::Swi => {
                let vector = self.vector_address(Vector::Swi);
                self.stack_and_vector(vector)?;
            }
            Op::Stop | Op::Wait => {
                self.set_flag(I, false);
                self.run_state = RunState::Halted;
                debug!(pc, "m68hc05 waiting for interrupt");
            }
            Op::Tax => self.x = self.a,
            Op::Txa => self.a = self.x,
            Op::Clc => self.set_flag(C, false),
            Op::Sec => self.set_flag(C, true),
            Op::Cli => self.set_flag(I, false),
            Op::Sei => self.set_flag(I, true),
            Op::Rsp => self.sp = 0xFF,
            Op::Nop => {}
        }
        Ok(())
    }
}

impl Cpu for M68hc05 {
    fn family(&self) -> Family {
        Family::M68hc05
    }

    fn machine(&self) -> &Machine {
        &self.machine
    }

    fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    fn pc(&self) -> u16 {
        self.pc
    }

    fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    fn run_state(&self) -> RunState {
        self.run_state
    }

    fn set_run_state(&mut self, state: RunState) {
        self.run_state = state;
    }

    fn reset(&mut self) -> Result<(), Fault> {
        self.sp = 0xFF;
        self.ccr = FIXED | I;
        self.run_state = RunState::Running;
        self.machine.interrupts.reset();
        self.pc = self.read16(self.vector_address(Vector::Reset))?;
        debug!(pc = self.pc, "m68hc05 reset");
        Ok(())
    }

    fn execute(&mut self) -> Result<u32, Fault> {
        if self.run_state == RunState::Halted {
            return Ok(1);
        }
        let pc = self.pc;
        let code = self.read8(pc)?;
        let op = self.table.fetch(code, pc)?;
        let mut operands = [0u8; 2];
        for (slot, offset) in operands.iter_mut().zip(1..u16::from(op.length)) {
            *slot = self.read8(pc.wrapping_add(offset))?;
        }
        self.pc = pc.wrapping_add(u16::from(op.length));
        self.run(op.kind, pc, op.length, operands)?;
        Ok(op.cost(false))
    }

    fn maskable_enabled(&self) -> bool {
        !self.flag(I)
    }

    fn enter_interrupt(&mut self, line: LineId) -> Result<u32, Fault> {
        let vector = self
            .machine
            .interrupts
            .acknowledge(line, &mut self.machine.memory)?;
        self.run_state = RunState::Running;
        self.stack_and_vector(vector)?;
        Ok(10)
    }

    fn registers(&self) -> &'static [RegisterDescriptor] {
        &REGISTERS
    }

    fn read_register(&self, name: &str) -> Result<u32, Fault> {
        let register = find_register(&REGISTERS, name)
            .ok_or_else(|| Fault::UnknownRegister(name.to_owned()))?;
        let value = match register.name {
            "PC" => self.pc,
            "SP" => u16::from(self.sp),
            "A" => u16::from(self.a),
            "X" => u16::from(self.x),
            _ => u16::from(self.ccr),
        };
        Ok(u32::from(value))
    }

    fn write_register(&mut self, name: &str, value: u32) -> Result<(), Fault> {
        let register = find_register(&REGISTERS, name)
            .ok_or_else(|| Fault::UnknownRegister(name.to_owned()))?;
        let value = value & register.mask();
        let byte = value as u8;
        match register.name {
            "PC" => self.pc = value as u16,
            "SP" => self.sp = STACK_BASE | (byte & 0x3F),
            "A" => self.a = byte,
            "X" => self.x = byte,
            _ => self.ccr = byte | FIXED,
        }
        Ok(())
    }

    fn disassemble(&self, pc: u16) -> Result<(String, u8), Fault> {
        self.table.disassemble(&self.machine.memory, MEMORY, pc, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::{ccr, M68hc05, Vector, MEMORY};
    use crate::{Cpu, Fault, RunState};

    const ORIGIN: u16 = 0x0200;

    fn cpu_with(program: &[u8]) -> M68hc05 {
        let mut cpu = M68hc05::new(0x2000).expect("builds");
        let reset = cpu.vector_address(Vector::Reset);
        let memory = cpu.machine_mut().memory.space_mut(MEMORY).expect("memory");
        memory
            .poke_slice(u32::from(ORIGIN), program)
            .expect("fits");
        memory
            .poke_slice(u32::from(reset), &ORIGIN.to_be_bytes())
            .expect("fits");
        cpu.reset().expect("reset");
        cpu
    }

    fn run(cpu: &mut M68hc05, steps: usize) -> u32 {
        (0..steps).map(|_| cpu.step().expect("step")).sum()
    }

    fn flags(cpu: &M68hc05) -> u8 {
        cpu.read_register("CCR").expect("known") as u8
    }

    #[test]
    fn reset_reads_big_endian_vector() {
        let cpu = cpu_with(&[]);
        assert_eq!(cpu.vector_address(Vector::Reset), 0x1FFE);
        assert_eq!(cpu.vector_address(Vector::Timer), 0x1FF8);
        assert_eq!(cpu.pc(), ORIGIN);
        assert_eq!(cpu.read_register("SP"), Ok(0xFF));
        assert_eq!(flags(&cpu), ccr::FIXED | ccr::I);
    }

    #[test]
    fn memory_size_must_be_power_of_two() {
        assert!(matches!(M68hc05::new(0x1800), Err(Fault::Configuration(_))));
        assert!(matches!(M68hc05::new(0x100), Err(Fault::Configuration(_))));
    }

    #[test]
    fn add_sets_half_carry() {
        // LDA #$0F ; ADD #$01
        let mut cpu = cpu_with(&[0xA6, 0x0F, 0xAB, 0x01]);
        assert_eq!(run(&mut cpu, 2), 4);
        assert_eq!(cpu.read_register("A"), Ok(0x10));
        assert_eq!(flags(&cpu) & (ccr::H | ccr::C | ccr::Z), ccr::H);
    }

    #[test]
    fn subtract_borrows() {
        // CLRA ; SUB #$01
        let mut cpu = cpu_with(&[0x4F, 0xA0, 0x01]);
        run(&mut cpu, 2);
        assert_eq!(cpu.read_register("A"), Ok(0xFF));
        assert_eq!(flags(&cpu) & (ccr::N | ccr::C), ccr::N | ccr::C);
    }

    #[test]
    fn bit_set_then_branch_on_it() {
        // BSET 3,$80 ; BRSET 3,$80,+2 ; NOP ; NOP ; NOP
        let mut cpu = cpu_with(&[0x16, 0x80, 0x06, 0x80, 0x02, 0x9D, 0x9D, 0x9D]);
        assert_eq!(run(&mut cpu, 2), 10);
        assert_eq!(cpu.machine().memory.peek(MEMORY, 0x80), Ok(0x08));
        assert_eq!(cpu.pc(), ORIGIN + 7);
        assert_ne!(flags(&cpu) & ccr::C, 0);
    }

    #[test]
    fn stack_wraps_in_its_window() {
        // JSR $0300
        let mut cpu = cpu_with(&[0xCD, 0x03, 0x00]);
        cpu.write_register("SP", 0xC0).expect("known");
        assert_eq!(run(&mut cpu, 1), 6);
        assert_eq!(cpu.read_register("SP"), Ok(0xFE));
        assert_eq!(cpu.machine().memory.peek(MEMORY, 0xC0), Ok(0x03));
        assert_eq!(cpu.machine().memory.peek(MEMORY, 0xFF), Ok(0x02));
        assert_eq!(cpu.pc(), 0x0300);
    }

    #[test]
    fn multiply_spreads_over_x_and_a() {
        // LDX #$12 ; LDA #$34 ; MUL
        let mut cpu = cpu_with(&[0xAE, 0x12, 0xA6, 0x34, 0x42]);
        assert_eq!(run(&mut cpu, 3), 2 + 2 + 11);
        assert_eq!(cpu.read_register("X"), Ok(0x03));
        assert_eq!(cpu.read_register("A"), Ok(0xA8));
    }

    #[test]
    fn wait_sleeps_until_irq() {
        // WAIT ; NOP ; handler at $0300: CLR $10 ; RTI
        let mut cpu = cpu_with(&[0x8F, 0x9D]);
        let irq = cpu.add_irq_line();
        let vector = cpu.vector_address(Vector::Irq);
        let memory = cpu.machine_mut().memory.space_mut(MEMORY).expect("memory");
        memory
            .poke_slice(u32::from(vector), &[0x03, 0x00])
            .expect("fits");
        memory
            .poke_slice(0x0300, &[0x3F, 0x10, 0x80])
            .expect("fits");
        cpu.machine_mut()
            .add_interrupt_condition(irq, MEMORY, 0x10, 0x01)
            .expect("valid");

        assert_eq!(run(&mut cpu, 1), 2);
        assert_eq!(cpu.run_state(), RunState::Halted);
        assert_eq!(run(&mut cpu, 3), 3);
        assert_eq!(cpu.pc(), ORIGIN + 1);

        cpu.machine_mut().memory.write(MEMORY, 0x10, 0x01).expect("in range");
        assert_eq!(run(&mut cpu, 1), 1 + 10);
        assert_eq!(cpu.run_state(), RunState::Running);
        assert_eq!(cpu.pc(), 0x0300);
        assert_eq!(cpu.read_register("SP"), Ok(0xFA));
        run(&mut cpu, 2);
        assert_eq!(cpu.pc(), ORIGIN + 1);
        assert_eq!(flags(&cpu) & ccr::I, 0);
    }

    #[test]
    fn irq_pin_branches() {
        // BIH +2 ; NOP ; NOP
        let mut cpu = cpu_with(&[0x2F, 0x02, 0x9D, 0x9D]);
        assert_eq!(run(&mut cpu, 1), 3);
        assert_eq!(cpu.pc(), ORIGIN + 4);
    }

    #[test]
    fn disassembly() {
        let cpu = cpu_with(&[0x06, 0x80, 0xFD, 0xD6, 0x12, 0x34, 0x3C, 0x10, 0x5F]);
        assert_eq!(
            cpu.disassemble(ORIGIN),
            Ok(("BRSET 3,0x80,0x0200".to_owned(), 3))
        );
        assert_eq!(
            cpu.disassemble(ORIGIN + 3),
            Ok(("LDA 0x1234,X".to_owned(), 3))
        );
        assert_eq!(cpu.disassemble(ORIGIN + 6), Ok(("INC 0x10".to_owned(), 2)));
        assert_eq!(cpu.disassemble(ORIGIN + 8), Ok(("CLRX".to_owned(), 1)));
    }
}
