//! Intel MCS-51 (8051/8052).
//!
//! Four address spaces: `CODE` (program memory), `DATA` (internal RAM, 128
//! bytes on the 8051 and 256 on the 8052), `SFR` (special function registers
//! at 0x80..0xFF) and `XDATA` (external RAM). Direct addresses below 0x80
//! reach `DATA`, the rest `SFR`; indirect addressing always reaches `DATA`.
//! Cycle counts are machine cycles (12 oscillator periods).

#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

pub mod opcodes;
pub mod serial;
pub mod timer;

use tracing::debug;

use self::opcodes::{Arith, External, Loc, Op};
use self::serial::{BaudClock, Serial, SerialPort};
use self::timer::{Timer2, Timers};
use crate::alu::{add8, parity_even, sub8};
use crate::{
    find_register, sign_extend8, AddressSpace, Cpu, Family, Fault, IdleClock,
    LineId, Machine, OpcodeTable, RegisterDescriptor, RegisterKind, RunState, SpaceId,
};

/// Program memory.
pub const CODE: SpaceId = SpaceId(0);
/// Internal RAM.
pub const DATA: SpaceId = SpaceId(1);
/// Special function registers, addressed 0x00..0xFF with the registers at
/// 0x80 and above.
pub const SFR: SpaceId = SpaceId(2);
/// External data memory.
pub const XDATA: SpaceId = SpaceId(3);

/// SFR addresses.
pub mod sfr {
    #![allow(missing_docs)]
    pub const P0: u32 = 0x80;
    pub const SP: u32 = 0x81;
    pub const DPL: u32 = 0x82;
    pub const DPH: u32 = 0x83;
    pub const PCON: u32 = 0x87;
    pub const TCON: u32 = 0x88;
    pub const TMOD: u32 = 0x89;
    pub const TL0: u32 = 0x8A;
    pub const TL1: u32 = 0x8B;
    pub const TH0: u32 = 0x8C;
    pub const TH1: u32 = 0x8D;
    pub const P1: u32 = 0x90;
    pub const SCON: u32 = 0x98;
    pub const SBUF: u32 = 0x99;
    pub const P2: u32 = 0xA0;
    pub const IE: u32 = 0xA8;
    pub const P3: u32 = 0xB0;
    pub const IP: u32 = 0xB8;
    pub const T2CON: u32 = 0xC8;
    pub const RCAP2L: u32 = 0xCA;
    pub const RCAP2H: u32 = 0xCB;
    pub const TL2: u32 = 0xCC;
    pub const TH2: u32 = 0xCD;
    pub const PSW: u32 = 0xD0;
    pub const ACC: u32 = 0xE0;
    pub const B: u32 = 0xF0;
}

/// PSW bits.
pub mod psw {
    #![allow(missing_docs)]
    pub const CY: u8 = 0x80;
    pub const AC: u8 = 0x40;
    pub const F0: u8 = 0x20;
    pub const RS1: u8 = 0x10;
    pub const RS0: u8 = 0x08;
    pub const OV: u8 = 0x04;
    pub const F1: u8 = 0x02;
    pub const P: u8 = 0x01;
}

/// IE bits.
pub mod ie {
    #![allow(missing_docs)]
    pub const EA: u8 = 0x80;
    pub const ET2: u8 = 0x20;
    pub const ES: u8 = 0x10;
    pub const ET1: u8 = 0x08;
    pub const EX1: u8 = 0x04;
    pub const ET0: u8 = 0x02;
    pub const EX0: u8 = 0x01;
}

/// TCON interrupt flags.
pub mod tcon {
    #![allow(missing_docs)]
    pub const TF1: u8 = 0x80;
    pub const TF0: u8 = 0x20;
    pub const IE1: u8 = 0x08;
    pub const IE0: u8 = 0x02;
}

/// SCON bits.
pub mod scon {
    #![allow(missing_docs)]
    pub const REN: u8 = 0x10;
    pub const TI: u8 = 0x02;
    pub const RI: u8 = 0x01;
}

/// PCON bits.
pub mod pcon {
    #![allow(missing_docs)]
    pub const SMOD: u8 = 0x80;
    pub const PD: u8 = 0x02;
    pub const IDL: u8 = 0x01;
}

const T2CON_TF2: u8 = 0x80;

/// Part selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Variant {
    /// 128 bytes of internal RAM, two timers.
    #[default]
    I8051,
    /// 256 bytes of internal RAM, Timer2.
    I8052,
}

impl Variant {
    /// Internal RAM size in bytes.
    #[must_use]
    pub const fn internal_ram(self) -> u32 {
        match self {
            Self::I8051 => 0x80,
            Self::I8052 => 0x100,
        }
    }
}

static REGISTERS: [RegisterDescriptor; 14] = [
    RegisterDescriptor::new("PC", 16, RegisterKind::ProgramCounter),
    RegisterDescriptor::new("SP", 8, RegisterKind::StackPointer),
    RegisterDescriptor::new("A", 8, RegisterKind::Accumulator),
    RegisterDescriptor::new("B", 8, RegisterKind::General),
    RegisterDescriptor::new("PSW", 8, RegisterKind::Flags),
    RegisterDescriptor::new("DPTR", 16, RegisterKind::Index),
    RegisterDescriptor::new("R0", 8, RegisterKind::General),
    RegisterDescriptor::new("R1", 8, RegisterKind::General),
    RegisterDescriptor::new("R2", 8, RegisterKind::General),
    RegisterDescriptor::new("R3", 8, RegisterKind::General),
    RegisterDescriptor::new("R4", 8, RegisterKind::General),
    RegisterDescriptor::new("R5", 8, RegisterKind::General),
    RegisterDescriptor::new("R6", 8, RegisterKind::General),
    RegisterDescriptor::new("R7", 8, RegisterKind::General),
];

/// Interrupt lines created with the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lines {
    /// External interrupt 0, vector 0x03.
    pub int0: LineId,
    /// Timer0 overflow, vector 0x0B.
    pub timer0: LineId,
    /// External interrupt 1, vector 0x13.
    pub int1: LineId,
    /// Timer1 overflow, vector 0x1B.
    pub timer1: LineId,
    /// Timer2 overflow (8052), vector 0x2B.
    pub timer2: Option<LineId>,
}

/// MCS-51 core.
#[derive(Debug)]
pub struct Mcs51 {
    machine: Machine,
    table: OpcodeTable<Op>,
    variant: Variant,
    pc: u16,
    run_state: RunState,
    lines: Lines,
    timer1_overflows: std::rc::Rc<std::cell::Cell<u64>>,
}

/// Bit address to (space, byte address, mask).
const fn bit_location(bit: u8) -> (SpaceId, u32, u8) {
    let mask = 1 << (bit & 7);
    if bit < 0x80 {
        (DATA, 0x20 + (bit as u32 >> 3), mask)
    } else {
        (SFR, (bit & 0xF8) as u32, mask)
    }
}

impl Mcs51 {
    /// Creates a core with flat 64 KiB code and external data spaces.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if wiring fails.
    pub fn new(variant: Variant) -> Result<Self, Fault> {
        Self::with_memory(
            variant,
            AddressSpace::flat("CODE", 0x1_0000),
            AddressSpace::flat("XDATA", 0x1_0000),
        )
    }

    /// Creates a core around caller-built code and external data spaces,
    /// which may be composite, banked or selector spaces.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for spaces larger than 64 KiB or if
    /// wiring fails.
    pub fn with_memory(variant: Variant, code: AddressSpace, xdata: AddressSpace) -> Result<Self, Fault> {
        for space in [&code, &xdata] {
            if space.size() > 0x1_0000 {
                return Err(Fault::configuration(format!(
                    "{} is larger than 64 KiB",
                    space.name()
                )));
            }
        }
        let mut machine = Machine::new();
        machine.memory.add(code)?;
        machine
            .memory
            .add(AddressSpace::flat("DATA", variant.internal_ram()))?;
        machine.memory.add(AddressSpace::flat("SFR", 0x100))?;
        machine.memory.add(xdata)?;

        // PSW.P always mirrors the parity of ACC
        let sfr_space = machine.memory.space_mut(SFR)?;
        sfr_space.add_write_observer(sfr::ACC, |space, _, value, _| {
            let flags = space.peek(sfr::PSW)?;
            space.poke(sfr::PSW, parity_flag(flags, value))
        })?;
        sfr_space.add_write_observer(sfr::PSW, |space, _, value, _| {
            let acc = space.peek(sfr::ACC)?;
            space.poke(sfr::PSW, parity_flag(value, acc))
        })?;

        let lines = Self::wire_interrupts(&mut machine, variant)?;
        let timers = Timers::new();
        let timer1_overflows = timers.timer1_overflows();
        machine.add_cycle_listener(timers);
        if variant == Variant::I8052 {
            machine.add_cycle_listener(Timer2);
        }

        let mut cpu = Self {
            machine,
            table: opcodes::build()?,
            variant,
            pc: 0,
            run_state: RunState::Running,
            lines,
            timer1_overflows,
        };
        cpu.reset()?;
        Ok(cpu)
    }

    fn wire_interrupts(machine: &mut Machine, variant: Variant) -> Result<Lines, Fault> {
        let mut line = |name: &str, vector: u16, enable: u8, address: u32, flag: u8| {
            let id = machine.interrupts.add_line(name, vector);
            machine.add_interrupt_condition(id, SFR, sfr::IE, enable)?;
            machine.add_interrupt_condition(id, SFR, address, flag)?;
            machine.interrupts.clear_on_entry(id, SFR, address, flag)?;
            Ok::<_, Fault>(id)
        };
        let int0 = line("INT0", 0x03, ie::EX0, sfr::TCON, tcon::IE0)?;
        let timer0 = line("TIMER0", 0x0B, ie::ET0, sfr::TCON, tcon::TF0)?;
        let int1 = line("INT1", 0x13, ie::EX1, sfr::TCON, tcon::IE1)?;
        let timer1 = line("TIMER1", 0x1B, ie::ET1, sfr::TCON, tcon::TF1)?;
        // TF2 is left for the handler to clear, as on the silicon
        let timer2 = match variant {
            Variant::I8051 => None,
            Variant::I8052 => {
                let id = machine.interrupts.add_line("TIMER2", 0x2B);
                machine.add_interrupt_condition(id, SFR, sfr::IE, ie::ET2)?;
                machine.add_interrupt_condition(id, SFR, sfr::T2CON, T2CON_TF2)?;
                Some(id)
            }
        };
        Ok(Lines {
            int0,
            timer0,
            int1,
            timer1,
            timer2,
        })
    }

    /// Attaches the UART clocked by Timer1 and returns its host side.
    ///
    /// # Errors
    ///
    /// Propagates wiring faults.
    pub fn attach_serial(&mut self, idle: IdleClock) -> Result<SerialPort, Fault> {
        let baud = BaudClock::Timer1(std::rc::Rc::clone(&self.timer1_overflows));
        let (serial, port) = Serial::with_channels(idle, baud);
        serial.attach(&mut self.machine)?;
        Ok(port)
    }

    /// Attaches a caller-built UART, for instance one with a fixed baud clock.
    ///
    /// # Errors
    ///
    /// Propagates wiring faults.
    pub fn attach_uart(&mut self, serial: Serial) -> Result<(), Fault> {
        serial.attach(&mut self.machine)
    }

    /// Part variant.
    #[must_use]
    pub const fn variant(&self) -> Variant {
        self.variant
    }

    /// Interrupt lines created with the core.
    #[must_use]
    pub const fn lines(&self) -> Lines {
        self.lines
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

    fn sfr(&self, address: u32) -> Result<u8, Fault> {
        self.machine.memory.peek(SFR, address)
    }

    fn read_sfr(&mut self, address: u32) -> Result<u8, Fault> {
        self.machine.memory.read(SFR, address)
    }

    fn write_sfr(&mut self, address: u32, value: u8) -> Result<(), Fault> {
        self.machine.memory.write(SFR, address, value)
    }

    fn acc(&mut self) -> Result<u8, Fault> {
        self.read_sfr(sfr::ACC)
    }

    fn set_acc(&mut self, value: u8) -> Result<(), Fault> {
        self.write_sfr(sfr::ACC, value)
    }

    fn carry(&self) -> Result<bool, Fault> {
        Ok(self.sfr(sfr::PSW)? & psw::CY != 0)
    }

    fn update_psw(&mut self, mask: u8, bits: u8) -> Result<(), Fault> {
        let flags = self.sfr(sfr::PSW)?;
        self.write_sfr(sfr::PSW, (flags & !mask) | (bits & mask))
    }

    fn set_carry(&mut self, carry: bool) -> Result<(), Fault> {
        self.update_psw(psw::CY, if carry { psw::CY } else { 0 })
    }

    fn bank_base(&self) -> Result<u32, Fault> {
        Ok(u32::from(self.sfr(sfr::PSW)? & (psw::RS1 | psw::RS0)))
    }

    fn reg(&mut self, n: u8) -> Result<u8, Fault> {
        let address = self.bank_base()? + u32::from(n);
        self.machine.memory.read(DATA, address)
    }

    fn set_reg(&mut self, n: u8, value: u8) -> Result<(), Fault> {
        let address = self.bank_base()? + u32::from(n);
        self.machine.memory.write(DATA, address, value)
    }

    fn dptr(&self) -> Result<u16, Fault> {
        Ok(u16::from_be_bytes([self.sfr(sfr::DPH)?, self.sfr(sfr::DPL)?]))
    }

    fn set_dptr(&mut self, value: u16) -> Result<(), Fault> {
        let [high, low] = value.to_be_bytes();
        self.write_sfr(sfr::DPH, high)?;
        self.write_sfr(sfr::DPL, low)
    }

    fn direct_location(address: u8) -> (SpaceId, u32) {
        if address < 0x80 {
            (DATA, u32::from(address))
        } else {
            (SFR, u32::from(address))
        }
    }

    fn read_direct(&mut self, address: u8) -> Result<u8, Fault> {
        let (space, address) = Self::direct_location(address);
        self.machine.memory.read(space, address)
    }

    fn write_direct(&mut self, address: u8, value: u8) -> Result<(), Fault> {
        let (space, address) = Self::direct_location(address);
        self.machine.memory.write(space, address, value)
    }

    fn read_loc(&mut self, loc: Loc, operand: u8) -> Result<u8, Fault> {
        match loc {
            Loc::A => self.acc(),
            Loc::Direct => self.read_direct(operand),
            Loc::Indirect(i) => {
                let address = self.reg(i)?;
                self.machine.memory.read(DATA, u32::from(address))
            }
            Loc::Reg(n) => self.reg(n),
            Loc::Imm => Ok(operand),
        }
    }

    fn write_loc(&mut self, loc: Loc, operand: u8, value: u8) -> Result<(), Fault> {
        match loc {
            Loc::A => self.set_acc(value),
            Loc::Direct => self.write_direct(operand, value),
            Loc::Indirect(i) => {
                let address = self.reg(i)?;
                self.machine.memory.write(DATA, u32::from(address), value)
            }
            Loc::Reg(n) => self.set_reg(n, value),
            Loc::Imm => Err(Fault::Unsupported("write to an immediate operand".into())),
        }
    }

    fn read_bit(&mut self, bit: u8) -> Result<bool, Fault> {
        let (space, address, mask) = bit_location(bit);
        Ok(self.machine.memory.read(space, address)? & mask != 0)
    }

    fn write_bit(&mut self, bit: u8, set: bool) -> Result<(), Fault> {
        let (space, address, mask) = bit_location(bit);
        let value = self.machine.memory.read(space, address)?;
        let value = if set { value | mask } else { value & !mask };
        self.machine.memory.write(space, address, value)
    }

    fn push(&mut self, value: u8) -> Result<(), Fault> {
        let sp = self.sfr(sfr::SP)?;
        let top = u32::from(sp) + 1;
        if top >= self.variant.internal_ram() {
            return Err(Fault::StackOverflow { sp: u32::from(sp) });
        }
        self.machine.memory.write(DATA, top, value)?;
        self.write_sfr(sfr::SP, sp + 1)
    }

    fn pop(&mut self) -> Result<u8, Fault> {
        let sp = self.sfr(sfr::SP)?;
        if sp == 0 {
            return Err(Fault::StackUnderflow { sp: 0 });
        }
        let value = self.machine.memory.read(DATA, u32::from(sp))?;
        self.write_sfr(sfr::SP, sp - 1)?;
        Ok(value)
    }

    fn push_pc(&mut self, pc: u16) -> Result<(), Fault> {
        let [high, low] = pc.to_be_bytes();
        self.push(low)?;
        self.push(high)
    }

    fn pop_pc(&mut self) -> Result<u16, Fault> {
        let high = self.pop()?;
        let low = self.pop()?;
        Ok(u16::from_be_bytes([high, low]))
    }

    fn arith(&mut self, kind: Arith, value: u8) -> Result<(), Fault> {
        let a = self.acc()?;
        let carry = self.carry()?;
        let result = match kind {
            Arith::Add => add8(a, value, false),
            Arith::Addc => add8(a, value, carry),
            Arith::Subb => sub8(a, value, carry),
        };
        self.set_acc(result.value)?;
        let mut flags = 0;
        if result.carry {
            flags |= psw::CY;
        }
        if result.half_carry {
            flags |= psw::AC;
        }
        if result.overflow {
            flags |= psw::OV;
        }
        self.update_psw(psw::CY | psw::AC | psw::OV, flags)
    }

    fn decimal_adjust(&mut self) -> Result<(), Fault> {
        let flags = self.sfr(sfr::PSW)?;
        let mut value = u16::from(self.acc()?);
        let mut carry = flags & psw::CY != 0;
        if value & 0x0F > 9 || flags & psw::AC != 0 {
            value += 0x06;
            carry |= value > 0xFF;
        }
        if carry || value & 0xF0 > 0x90 {
            value += 0x60;
            carry |= value > 0xFF;
        }
        self.set_acc(value as u8)?;
        // DA only ever sets CY
        if carry {
            self.set_carry(true)?;
        }
        Ok(())
    }

    fn jump_relative(&mut self, next: u16, offset: u8) {
        self.pc = next.wrapping_add(sign_extend8(offset) as u16);
    }

    #[allow(clippy::too_many_lines)]
    fn execute_op(&mut self, op: Op, pc: u16, length: u8, operands: [u8; 2]) -> Result<(), Fault> {
        let next = pc.wrapping_add(u16::from(length));
        let [b1, b2] = operands;
        self.pc = next;
        match op {
            Op::Nop => {}
            Op::Ajmp => {
                self.pc = (next & 0xF800) | (u16::from(self.opcode_at(pc)? & 0xE0) << 3) | u16::from(b1);
            }
            Op::Acall => {
                self.push_pc(next)?;
                self.pc = (next & 0xF800) | (u16::from(self.opcode_at(pc)? & 0xE0) << 3) | u16::from(b1);
            }
            Op::Ljmp => self.pc = u16::from_be_bytes([b1, b2]),
            Op::Lcall => {
                self.push_pc(next)?;
                self.pc = u16::from_be_bytes([b1, b2]);
            }
            Op::Sjmp => self.jump_relative(next, b1),
            Op::JmpDptr => {
                let a = self.acc()?;
                self.pc = self.dptr()?.wrapping_add(u16::from(a));
            }
            Op::Ret => self.pc = self.pop_pc()?,
            Op::Reti => {
                self.pc = self.pop_pc()?;
                self.machine.interrupts.end_service();
            }
            Op::Rr => {
                let a = self.acc()?;
                self.set_acc(a.rotate_right(1))?;
            }
            Op::Rl => {
                let a = self.acc()?;
                self.set_acc(a.rotate_left(1))?;
            }
            Op::Rrc => {
                let a = self.acc()?;
                let carry = self.carry()?;
                self.set_acc((a >> 1) | if carry { 0x80 } else { 0 })?;
                self.set_carry(a & 0x01 != 0)?;
            }
            Op::Rlc => {
                let a = self.acc()?;
                let carry = self.carry()?;
                self.set_acc((a << 1) | u8::from(carry))?;
                self.set_carry(a & 0x80 != 0)?;
            }
            Op::Inc(loc) => {
                let value = self.read_loc(loc, b1)?;
                self.write_loc(loc, b1, value.wrapping_add(1))?;
            }
            Op::Dec(loc) => {
                let value = self.read_loc(loc, b1)?;
                self.write_loc(loc, b1, value.wrapping_sub(1))?;
            }
            Op::IncDptr => {
                let dptr = self.dptr()?;
                self.set_dptr(dptr.wrapping_add(1))?;
            }
            Op::Jbc => {
                if self.read_bit(b1)? {
                    self.write_bit(b1, false)?;
                    self.jump_relative(next, b2);
                }
            }
            Op::Jb => {
                if self.read_bit(b1)? {
                    self.jump_relative(next, b2);
                }
            }
            Op::Jnb => {
                if !self.read_bit(b1)? {
                    self.jump_relative(next, b2);
                }
            }
            Op::Jc => {
                if self.carry()? {
                    self.jump_relative(next, b1);
                }
            }
            Op::Jnc => {
                if !self.carry()? {
                    self.jump_relative(next, b1);
                }
            }
            Op::Jz => {
                if self.acc()? == 0 {
                    self.jump_relative(next, b1);
                }
            }
            Op::Jnz => {
                if self.acc()? != 0 {
                    self.jump_relative(next, b1);
                }
            }
            Op::Arith(kind, loc) => {
                let value = self.read_loc(loc, b1)?;
                self.arith(kind, value)?;
            }
            Op::Logic(logic, loc) => {
                let value = self.read_loc(loc, b1)?;
                let a = self.acc()?;
                self.set_acc(logic.apply(a, value))?;
            }
            Op::LogicDirect(logic, source) => {
                let value = match source {
                    Loc::Imm => b2,
                    _ => self.acc()?,
                };
                let target = self.read_direct(b1)?;
                self.write_direct(b1, logic.apply(target, value))?;
            }
            Op::OrlC { complement } => {
                let bit = self.read_bit(b1)? != complement;
                let carry = self.carry()?;
                self.set_carry(carry || bit)?;
            }
            Op::AnlC { complement } => {
                let bit = self.read_bit(b1)? != complement;
                let carry = self.carry()?;
                self.set_carry(carry && bit)?;
            }
            Op::MovCBit => {
                let bit = self.read_bit(b1)?;
                self.set_carry(bit)?;
            }
            Op::MovBitC => {
                let carry = self.carry()?;
                self.write_bit(b1, carry)?;
            }
            Op::MovcPc => {
                let a = self.acc()?;
                let value = self.machine.memory.read(CODE, u32::from(next.wrapping_add(u16::from(a))))?;
                self.set_acc(value)?;
            }
            Op::MovcDptr => {
                let a = self.acc()?;
                let address = self.dptr()?.wrapping_add(u16::from(a));
                let value = self.machine.memory.read(CODE, u32::from(address))?;
                self.set_acc(value)?;
            }
            Op::Div => {
                let a = self.acc()?;
                let b = self.read_sfr(sfr::B)?;
                if b == 0 {
                    self.update_psw(psw::CY | psw::OV, psw::OV)?;
                } else {
                    self.set_acc(a / b)?;
                    self.write_sfr(sfr::B, a % b)?;
                    self.update_psw(psw::CY | psw::OV, 0)?;
                }
            }
            Op::Mul => {
                let product = u16::from(self.acc()?) * u16::from(self.read_sfr(sfr::B)?);
                let [high, low] = product.to_be_bytes();
                self.set_acc(low)?;
                self.write_sfr(sfr::B, high)?;
                self.update_psw(psw::CY | psw::OV, if high != 0 { psw::OV } else { 0 })?;
            }
            Op::Mov(dst, src) => {
                // the destination operand is encoded first
                let dst_byte = b1;
                let src_byte = if dst.operand_bytes() == 1 { b2 } else { b1 };
                let value = self.read_loc(src, src_byte)?;
                self.write_loc(dst, dst_byte, value)?;
            }
            Op::MovDirDir => {
                let value = self.read_direct(b1)?;
                self.write_direct(b2, value)?;
            }
            Op::MovDptr => self.set_dptr(u16::from_be_bytes([b1, b2]))?,
            Op::Cjne(lhs, rhs) => {
                let left = self.read_loc(lhs, b1)?;
                let right = self.read_loc(rhs, b1)?;
                self.set_carry(left < right)?;
                if left != right {
                    self.jump_relative(next, b2);
                }
            }
            Op::Push => {
                let value = self.read_direct(b1)?;
                self.push(value)?;
            }
            Op::Pop => {
                let value = self.pop()?;
                self.write_direct(b1, value)?;
            }
            Op::ClrBit => self.write_bit(b1, false)?,
            Op::SetbBit => self.write_bit(b1, true)?,
            Op::CplBit => {
                let bit = self.read_bit(b1)?;
                self.write_bit(b1, !bit)?;
            }
            Op::ClrC => self.set_carry(false)?,
            Op::SetbC => self.set_carry(true)?,
            Op::CplC => {
                let carry = self.carry()?;
                self.set_carry(!carry)?;
            }
            Op::ClrA => self.set_acc(0)?,
            Op::CplA => {
                let a = self.acc()?;
                self.set_acc(!a)?;
            }
            Op::Swap => {
                let a = self.acc()?;
                self.set_acc(a.rotate_left(4))?;
            }
            Op::Xch(loc) => {
                let a = self.acc()?;
                let value = self.read_loc(loc, b1)?;
                self.write_loc(loc, b1, a)?;
                self.set_acc(value)?;
            }
            Op::Xchd(i) => {
                let a = self.acc()?;
                let address = u32::from(self.reg(i)?);
                let value = self.machine.memory.read(DATA, address)?;
                self.machine
                    .memory
                    .write(DATA, address, (value & 0xF0) | (a & 0x0F))?;
                self.set_acc((a & 0xF0) | (value & 0x0F))?;
            }
            Op::Da => self.decimal_adjust()?,
            Op::Djnz(loc) => {
                let value = self.read_loc(loc, b1)?.wrapping_sub(1);
                self.write_loc(loc, b1, value)?;
                if value != 0 {
                    let offset = if loc == Loc::Direct { b2 } else { b1 };
                    self.jump_relative(next, offset);
                }
            }
            Op::MovxRead(external) => {
                let address = self.external_address(external)?;
                let value = self.machine.memory.read(XDATA, address)?;
                self.set_acc(value)?;
            }
            Op::MovxWrite(external) => {
                let address = self.external_address(external)?;
                let value = self.acc()?;
                self.machine.memory.write(XDATA, address, value)?;
            }
        }
        Ok(())
    }

    fn opcode_at(&self, pc: u16) -> Result<u8, Fault> {
        self.machine.memory.peek(CODE, u32::from(pc))
    }

    fn external_address(&mut self, external: External) -> Result<u32, Fault> {
        Ok(match external {
            External::Dptr => u32::from(self.dptr()?),
            External::Reg(i) => {
                let low = self.reg(i)?;
                let high = self.sfr(sfr::P2)?;
                u32::from(u16::from_be_bytes([high, low]))
            }
        })
    }
}

/// PSW with P set from the parity of `acc` (set when the count is odd).
fn parity_flag(flags: u8, acc: u8) -> u8 {
    if parity_even(acc) {
        flags & !psw::P
    } else {
        flags | psw::P
    }
}

impl Cpu for Mcs51 {
    fn family(&self) -> Family {
        Family::Mcs51
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
        self.pc = 0;
        self.run_state = RunState::Running;
        self.machine.interrupts.reset();
        for address in 0x80..=0xFF {
            self.machine.memory.poke(SFR, address, 0)?;
        }
        for port in [sfr::P0, sfr::P1, sfr::P2, sfr::P3] {
            self.machine.memory.poke(SFR, port, 0xFF)?;
        }
        self.machine.memory.poke(SFR, sfr::SP, 0x07)?;
        self.machine.interrupts.refresh(&self.machine.memory)?;
        debug!(variant = ?self.variant, "mcs51 reset");
        Ok(())
    }

    fn execute(&mut self) -> Result<u32, Fault> {
        if self.sfr(sfr::PCON)? & (pcon::IDL | pcon::PD) != 0 {
            self.run_state = RunState::Halted;
            return Ok(1);
        }
        self.run_state = RunState::Running;
        let pc = self.pc;
        let code = self.machine.memory.read(CODE, u32::from(pc))?;
        let op = self.table.fetch(code, pc)?;
        let mut operands = [0u8; 2];
        for (slot, offset) in operands.iter_mut().zip(1..u16::from(op.length)) {
            *slot = self.machine.memory.read(CODE, u32::from(pc.wrapping_add(offset)))?;
        }
        self.execute_op(op.kind, pc, op.length, operands)?;
        Ok(op.cost(false))
    }

    fn maskable_enabled(&self) -> bool {
        self.sfr(sfr::IE).is_ok_and(|ie| ie & ie::EA != 0) && !self.machine.interrupts.is_servicing()
    }

    fn enter_interrupt(&mut self, line: LineId) -> Result<u32, Fault> {
        let vector = self
            .machine
            .interrupts
            .begin_service(line, &mut self.machine.memory)?;
        // an interrupt ends idle mode
        let power = self.sfr(sfr::PCON)?;
        if power & pcon::IDL != 0 {
            self.write_sfr(sfr::PCON, power & !pcon::IDL)?;
        }
        self.run_state = RunState::Running;
        self.push_pc(self.pc)?;
        self.pc = vector;
        Ok(2)
    }

    fn registers(&self) -> &'static [RegisterDescriptor] {
        &REGISTERS
    }

    fn read_register(&self, name: &str) -> Result<u32, Fault> {
        let register = find_register(&REGISTERS, name)
            .ok_or_else(|| Fault::UnknownRegister(name.to_owned()))?;
        let value = match register.name {
            "PC" => u32::from(self.pc),
            "SP" => u32::from(self.sfr(sfr::SP)?),
            "A" => u32::from(self.sfr(sfr::ACC)?),
            "B" => u32::from(self.sfr(sfr::B)?),
            "PSW" => u32::from(self.sfr(sfr::PSW)?),
            "DPTR" => u32::from(self.dptr()?),
            other => {
                let n = u32::from(other.as_bytes()[1] - b'0');
                let base = self.bank_base()?;
                u32::from(self.machine.memory.peek(DATA, base + n)?)
            }
        };
        Ok(value)
    }

    fn write_register(&mut self, name: &str, value: u32) -> Result<(), Fault> {
        let register = find_register(&REGISTERS, name)
            .ok_or_else(|| Fault::UnknownRegister(name.to_owned()))?;
        let value = value & register.mask();
        let byte = value as u8;
        match register.name {
            "PC" => self.pc = value as u16,
            "SP" => self.write_sfr(sfr::SP, byte)?,
            "A" => self.set_acc(byte)?,
            "B" => self.write_sfr(sfr::B, byte)?,
            "PSW" => self.write_sfr(sfr::PSW, byte)?,
            "DPTR" => self.set_dptr(value as u16)?,
            other => {
                let n = other.as_bytes()[1] - b'0';
                self.set_reg(n, byte)?;
            }
        }
        Ok(())
    }

    fn disassemble(&self, pc: u16) -> Result<(String, u8), Fault> {
        self.table.disassemble(&self.machine.memory, CODE, pc, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::{bit_location, psw, sfr, Mcs51, Variant, CODE, DATA, SFR, XDATA};
    use crate::{Cpu, Fault, FaultClass, RunState};

    fn load(cpu: &mut Mcs51, program: &[u8]) {
        cpu.machine_mut()
            .memory
            .space_mut(CODE)
            .expect("code space")
            .poke_slice(0, program)
            .expect("fits");
    }

    fn run(cpu: &mut Mcs51, steps: usize) {
        for _ in 0..steps {
            cpu.step().expect("step");
        }
    }

    #[test]
    fn bit_addresses_split_between_ram_and_sfr() {
        assert_eq!(bit_location(0x00), (DATA, 0x20, 0x01));
        assert_eq!(bit_location(0x7F), (DATA, 0x2F, 0x80));
        assert_eq!(bit_location(0xE7), (SFR, 0xE0, 0x80));
        assert_eq!(bit_location(0xD7), (SFR, 0xD0, 0x80));
    }

    #[test]
    fn reset_state() {
        let cpu = Mcs51::new(Variant::I8051).expect("builds");
        assert_eq!(cpu.read_register("SP"), Ok(0x07));
        assert_eq!(cpu.read_register("PC"), Ok(0));
        assert_eq!(cpu.machine().memory.peek(SFR, sfr::P1), Ok(0xFF));
    }

    #[test]
    fn add_sets_carry_aux_and_parity() {
        let mut cpu = Mcs51::new(Variant::I8051).expect("builds");
        // MOV A,#0xFF ; ADD A,#0x01
        load(&mut cpu, &[0x74, 0xFF, 0x24, 0x01]);
        run(&mut cpu, 1);
        assert_eq!(cpu.read_register("PSW").map(|p| p as u8 & psw::P), Ok(0));
        run(&mut cpu, 1);
        assert_eq!(cpu.read_register("A"), Ok(0));
        let flags = cpu.read_register("PSW").expect("known") as u8;
        assert_eq!(flags & (psw::CY | psw::AC | psw::OV), psw::CY | psw::AC);
    }

    #[test]
    fn register_bank_follows_psw() {
        let mut cpu = Mcs51::new(Variant::I8051).expect("builds");
        // MOV R0,#0x11 ; SETB PSW.3 ; MOV R0,#0x22
        load(&mut cpu, &[0x78, 0x11, 0xD2, 0xD3, 0x78, 0x22]);
        run(&mut cpu, 3);
        assert_eq!(cpu.machine().memory.peek(DATA, 0x00), Ok(0x11));
        assert_eq!(cpu.machine().memory.peek(DATA, 0x08), Ok(0x22));
        assert_eq!(cpu.read_register("R0"), Ok(0x22));
    }

    #[test]
    fn djnz_loop_costs_two_cycles_per_pass() {
        let mut cpu = Mcs51::new(Variant::I8051).expect("builds");
        // MOV R2,#3 ; DJNZ R2,$ ; NOP
        load(&mut cpu, &[0x7A, 0x03, 0xDA, 0xFE, 0x00]);
        run(&mut cpu, 4);
        assert_eq!(cpu.pc(), 4);
        assert_eq!(cpu.cycles(), 1 + 3 * 2);
    }

    #[test]
    fn lcall_ret_round_trip() {
        let mut cpu = Mcs51::new(Variant::I8051).expect("builds");
        // LCALL 0x0010 ; ... 0x0010: RET
        load(&mut cpu, &[0x12, 0x00, 0x10]);
        cpu.machine_mut().memory.poke(CODE, 0x10, 0x22).expect("in range");
        run(&mut cpu, 1);
        assert_eq!(cpu.pc(), 0x10);
        assert_eq!(cpu.read_register("SP"), Ok(0x09));
        assert_eq!(cpu.machine().memory.peek(DATA, 0x08), Ok(0x03));
        run(&mut cpu, 1);
        assert_eq!(cpu.pc(), 3);
    }

    #[test]
    fn movx_and_movc_reach_their_spaces() {
        let mut cpu = Mcs51::new(Variant::I8051).expect("builds");
        // MOV DPTR,#0x1234 ; MOV A,#0x5A ; MOVX @DPTR,A ; CLR A ; MOVC A,@A+DPTR
        load(&mut cpu, &[0x90, 0x12, 0x34, 0x74, 0x5A, 0xF0, 0xE4, 0x93]);
        cpu.machine_mut().memory.poke(CODE, 0x1234, 0xC3).expect("in range");
        run(&mut cpu, 5);
        assert_eq!(cpu.machine().memory.peek(XDATA, 0x1234), Ok(0x5A));
        assert_eq!(cpu.read_register("A"), Ok(0xC3));
    }

    #[test]
    fn stack_overflow_is_a_stack_fault() {
        let mut cpu = Mcs51::new(Variant::I8051).expect("builds");
        // MOV SP,#0x7F ; PUSH ACC
        load(&mut cpu, &[0x75, 0x81, 0x7F, 0xC0, 0xE0]);
        run(&mut cpu, 1);
        assert_eq!(cpu.step(), Err(Fault::StackOverflow { sp: 0x7F }));
        assert_eq!(cpu.run_state(), RunState::Faulted(FaultClass::Stack));
    }

    #[test]
    fn timer0_overflow_vectors_and_reti_ends_service() {
        let mut cpu = Mcs51::new(Variant::I8051).expect("builds");
        // MOV TMOD,#0x02 ; MOV TH0,#0x00 ; MOV TL0,#0xFE ; MOV IE,#0x82 ; SETB TR0 ; SJMP $
        load(
            &mut cpu,
            &[
                0x75, 0x89, 0x02, 0x75, 0x8C, 0x00, 0x75, 0x8A, 0xFE, 0x75, 0xA8, 0x82, 0xD2,
                0x8C, 0x80, 0xFE,
            ],
        );
        // 0x0B: RETI
        cpu.machine_mut().memory.poke(CODE, 0x0B, 0x32).expect("in range");
        run(&mut cpu, 5);
        let timer0 = cpu.lines().timer0;
        let mut entered = false;
        for _ in 0..4 {
            cpu.step().expect("step");
            if cpu.pc() == 0x0B {
                entered = true;
                break;
            }
        }
        assert!(entered);
        assert_eq!(cpu.machine().interrupts.in_service(), &[timer0]);
        // TF0 cleared by hardware on entry
        assert_eq!(cpu.machine().memory.peek(SFR, sfr::TCON).map(|t| t & 0x20), Ok(0));
        run(&mut cpu, 1);
        assert!(!cpu.machine().interrupts.is_servicing());
        assert_eq!(cpu.pc(), 0x0E);
    }

    #[test]
    fn disassembly_renders_operands() {
        let mut cpu = Mcs51::new(Variant::I8051).expect("builds");
        load(&mut cpu, &[0x75, 0x81, 0x7F, 0x80, 0xFE, 0x21, 0x10]);
        assert_eq!(
            cpu.disassemble(0),
            Ok(("MOV 0x81,#0x7f".to_owned(), 3))
        );
        assert_eq!(cpu.disassemble(3), Ok(("SJMP 0x0003".to_owned(), 2)));
        assert_eq!(cpu.disassemble(5), Ok(("AJMP 0x0110".to_owned(), 2)));
        assert!(matches!(
            cpu.disassemble(0x100),
            Ok((text, 1)) if text == "NOP"
        ));
    }

    #[test]
    fn undefined_opcode_faults() {
        let mut cpu = Mcs51::new(Variant::I8052).expect("builds");
        load(&mut cpu, &[0xA5]);
        assert_eq!(
            cpu.step(),
            Err(Fault::UnsupportedOpcode { pc: 0, opcode: 0xA5 })
        );
    }
}
