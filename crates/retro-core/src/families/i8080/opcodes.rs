//! 8080 instruction kinds and the base table shared with the Z80.
//!
//! The Z80 runs the same base instructions with its own mnemonics, timings
//! and flag rules, so [`define_base`] takes the [`FlagModel`] and a wrapper
//! turning an [`Op`] into the caller's table kind.

use super::FlagModel;
use crate::{Fault, OpcodeTable};

/// 8-bit operand in the 3-bit register field. `M` is the byte at `(HL)`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    B,
    C,
    D,
    E,
    H,
    L,
    M,
    A,
}

impl Reg {
    /// Every register in encoding order.
    pub const ALL: [Self; 8] = [
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::H,
        Self::L,
        Self::M,
        Self::A,
    ];

    /// Name in the given assembler syntax.
    #[must_use]
    pub const fn name(self, model: FlagModel) -> &'static str {
        match (self, model) {
            (Self::B, _) => "B",
            (Self::C, _) => "C",
            (Self::D, _) => "D",
            (Self::E, _) => "E",
            (Self::H, _) => "H",
            (Self::L, _) => "L",
            (Self::M, FlagModel::Intel8080) => "M",
            (Self::M, FlagModel::Zilog) => "(HL)",
            (Self::A, _) => "A",
        }
    }
}

/// Register pair of the 2-bit pair field.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pair {
    BC,
    DE,
    HL,
    SP,
}

impl Pair {
    /// Every pair in encoding order.
    pub const ALL: [Self; 4] = [Self::BC, Self::DE, Self::HL, Self::SP];

    const fn name(self, model: FlagModel) -> &'static str {
        match (self, model) {
            (Self::BC, FlagModel::Intel8080) => "B",
            (Self::DE, FlagModel::Intel8080) => "D",
            (Self::HL, FlagModel::Intel8080) => "H",
            (Self::BC, FlagModel::Zilog) => "BC",
            (Self::DE, FlagModel::Zilog) => "DE",
            (Self::HL, FlagModel::Zilog) => "HL",
            (Self::SP, _) => "SP",
        }
    }
}

/// Register pair of `PUSH`/`POP`, where the fourth slot is A plus flags.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPair {
    BC,
    DE,
    HL,
    AF,
}

impl StackPair {
    const ALL: [Self; 4] = [Self::BC, Self::DE, Self::HL, Self::AF];

    const fn name(self, model: FlagModel) -> &'static str {
        match (self, model) {
            (Self::AF, FlagModel::Intel8080) => "PSW",
            (Self::AF, FlagModel::Zilog) => "AF",
            (Self::BC, _) => Pair::BC.name(model),
            (Self::DE, _) => Pair::DE.name(model),
            (Self::HL, _) => Pair::HL.name(model),
        }
    }
}

/// Branch condition of the 3-bit condition field.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    NZ,
    Z,
    NC,
    C,
    PO,
    PE,
    P,
    M,
}

impl Cond {
    /// Every condition in encoding order.
    pub const ALL: [Self; 8] = [
        Self::NZ,
        Self::Z,
        Self::NC,
        Self::C,
        Self::PO,
        Self::PE,
        Self::P,
        Self::M,
    ];

    /// Suffix used by both syntaxes.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NZ => "NZ",
            Self::Z => "Z",
            Self::NC => "NC",
            Self::C => "C",
            Self::PO => "PO",
            Self::PE => "PE",
            Self::P => "P",
            Self::M => "M",
        }
    }
}

/// Accumulator operation of the 3-bit ALU field.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    const ALL: [Self; 8] = [
        Self::Add,
        Self::Adc,
        Self::Sub,
        Self::Sbc,
        Self::And,
        Self::Xor,
        Self::Or,
        Self::Cp,
    ];

    /// Register form mnemonic prefix, e.g. `ADD A,` or `ANA `.
    const fn register_form(self, model: FlagModel) -> &'static str {
        match (self, model) {
            (Self::Add, FlagModel::Intel8080) => "ADD ",
            (Self::Adc, FlagModel::Intel8080) => "ADC ",
            (Self::Sub, FlagModel::Intel8080) => "SUB ",
            (Self::Sbc, FlagModel::Intel8080) => "SBB ",
            (Self::And, FlagModel::Intel8080) => "ANA ",
            (Self::Xor, FlagModel::Intel8080) => "XRA ",
            (Self::Or, FlagModel::Intel8080) => "ORA ",
            (Self::Cp, FlagModel::Intel8080) => "CMP ",
            (Self::Add, FlagModel::Zilog) => "ADD A,",
            (Self::Adc, FlagModel::Zilog) => "ADC A,",
            (Self::Sub, FlagModel::Zilog) => "SUB ",
            (Self::Sbc, FlagModel::Zilog) => "SBC A,",
            (Self::And, FlagModel::Zilog) => "AND ",
            (Self::Xor, FlagModel::Zilog) => "XOR ",
            (Self::Or, FlagModel::Zilog) => "OR ",
            (Self::Cp, FlagModel::Zilog) => "CP ",
        }
    }

    /// Immediate form mnemonic prefix.
    const fn immediate_form(self, model: FlagModel) -> &'static str {
        match (self, model) {
            (Self::Add, FlagModel::Intel8080) => "ADI ",
            (Self::Adc, FlagModel::Intel8080) => "ACI ",
            (Self::Sub, FlagModel::Intel8080) => "SUI ",
            (Self::Sbc, FlagModel::Intel8080) => "SBI ",
            (Self::And, FlagModel::Intel8080) => "ANI ",
            (Self::Xor, FlagModel::Intel8080) => "XRI ",
            (Self::Or, FlagModel::Intel8080) => "ORI ",
            (Self::Cp, FlagModel::Intel8080) => "CPI ",
            (_, FlagModel::Zilog) => self.register_form(model),
        }
    }
}

/// Accumulator rotate.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotate {
    Rlc,
    Rrc,
    Ral,
    Rar,
}

/// One base instruction form, named after the Intel mnemonic.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nop,
    Lxi(Pair),
    Stax(Pair),
    Ldax(Pair),
    Shld,
    Lhld,
    Sta,
    Lda,
    Inx(Pair),
    Dcx(Pair),
    Dad(Pair),
    Inr(Reg),
    Dcr(Reg),
    Mvi(Reg),
    Rotate(Rotate),
    Daa,
    Cma,
    Stc,
    Cmc,
    /// `dst <- src`.
    Mov(Reg, Reg),
    Hlt,
    Alu(AluOp, Reg),
    AluImm(AluOp),
    Ret,
    RetCond(Cond),
    Pop(StackPair),
    Push(StackPair),
    Jmp,
    JmpCond(Cond),
    Call,
    CallCond(Cond),
    /// Restart to `8 * n`.
    Rst(u8),
    Out,
    In,
    Xthl,
    Pchl,
    Xchg,
    Sphl,
    Di,
    Ei,
}

/// Defines the base instruction set in `t`.
///
/// With [`FlagModel::Intel8080`] the twelve undocumented aliases (NOP at
/// `08..38`, JMP at `CB`, RET at `D9`, CALL at `DD`/`ED`/`FD`) are defined
/// too, filling the table. With [`FlagModel::Zilog`] those slots stay free
/// for the Z80's own instructions and prefixes.
///
/// # Errors
///
/// Returns a configuration fault if a slot is already taken.
#[allow(clippy::too_many_lines)]
pub fn define_base<K: Copy>(
    t: &mut OpcodeTable<K>,
    model: FlagModel,
    wrap: impl Fn(Op) -> K,
) -> Result<(), Fault> {
    let intel = model == FlagModel::Intel8080;
    let cy = |intel_cycles: u8, zilog_cycles: u8| if intel { intel_cycles } else { zilog_cycles };
    let text = |intel_text: String, zilog_text: String| if intel { intel_text } else { zilog_text };

    t.op(0x00, 1, 4, "NOP", wrap(Op::Nop))?;
    for (pair, row) in Pair::ALL.into_iter().zip((0u8..).step_by(0x10)) {
        let name = pair.name(model);
        t.op(
            row | 0x01,
            3,
            10,
            text(format!("LXI {name},%w1"), format!("LD {name},%w1")),
            wrap(Op::Lxi(pair)),
        )?;
        t.op(
            row | 0x03,
            1,
            cy(5, 6),
            text(format!("INX {name}"), format!("INC {name}")),
            wrap(Op::Inx(pair)),
        )?;
        t.op(
            row | 0x09,
            1,
            cy(10, 11),
            text(format!("DAD {name}"), format!("ADD HL,{name}")),
            wrap(Op::Dad(pair)),
        )?;
        t.op(
            row | 0x0B,
            1,
            cy(5, 6),
            text(format!("DCX {name}"), format!("DEC {name}")),
            wrap(Op::Dcx(pair)),
        )?;
    }
    for (pair, row) in [(Pair::BC, 0x00), (Pair::DE, 0x10)] {
        let name = pair.name(model);
        t.op(
            row | 0x02,
            1,
            7,
            text(format!("STAX {name}"), format!("LD ({name}),A")),
            wrap(Op::Stax(pair)),
        )?;
        t.op(
            row | 0x0A,
            1,
            7,
            text(format!("LDAX {name}"), format!("LD A,({name})")),
            wrap(Op::Ldax(pair)),
        )?;
    }
    t.op(0x22, 3, 16, text("SHLD %w1".into(), "LD (%w1),HL".into()), wrap(Op::Shld))?;
    t.op(0x2A, 3, 16, text("LHLD %w1".into(), "LD HL,(%w1)".into()), wrap(Op::Lhld))?;
    t.op(0x32, 3, 13, text("STA %w1".into(), "LD (%w1),A".into()), wrap(Op::Sta))?;
    t.op(0x3A, 3, 13, text("LDA %w1".into(), "LD A,(%w1)".into()), wrap(Op::Lda))?;

    for (reg, field) in Reg::ALL.into_iter().zip(0u8..) {
        let name = reg.name(model);
        let memory = reg == Reg::M;
        let code = field << 3;
        let (step, load) = if memory { (cy(10, 11), 10) } else { (cy(5, 4), 7) };
        t.op(
            code | 0x04,
            1,
            step,
            text(format!("INR {name}"), format!("INC {name}")),
            wrap(Op::Inr(reg)),
        )?;
        t.op(
            code | 0x05,
            1,
            step,
            text(format!("DCR {name}"), format!("DEC {name}")),
            wrap(Op::Dcr(reg)),
        )?;
        t.op(
            code | 0x06,
            2,
            load,
            text(format!("MVI {name},%b1"), format!("LD {name},%b1")),
            wrap(Op::Mvi(reg)),
        )?;
    }

    for (code, rotate, intel_name, zilog_name) in [
        (0x07, Rotate::Rlc, "RLC", "RLCA"),
        (0x0F, Rotate::Rrc, "RRC", "RRCA"),
        (0x17, Rotate::Ral, "RAL", "RLA"),
        (0x1F, Rotate::Rar, "RAR", "RRA"),
    ] {
        t.op(code, 1, 4, if intel { intel_name } else { zilog_name }, wrap(Op::Rotate(rotate)))?;
    }
    t.op(0x27, 1, 4, "DAA", wrap(Op::Daa))?;
    t.op(0x2F, 1, 4, if intel { "CMA" } else { "CPL" }, wrap(Op::Cma))?;
    t.op(0x37, 1, 4, if intel { "STC" } else { "SCF" }, wrap(Op::Stc))?;
    t.op(0x3F, 1, 4, if intel { "CMC" } else { "CCF" }, wrap(Op::Cmc))?;

    for (dst, dst_field) in Reg::ALL.into_iter().zip(0u8..) {
        for (src, src_field) in Reg::ALL.into_iter().zip(0u8..) {
            if dst == Reg::M && src == Reg::M {
                continue;
            }
            let cycles = if dst == Reg::M || src == Reg::M { 7 } else { cy(5, 4) };
            let (d, s) = (dst.name(model), src.name(model));
            t.op(
                0x40 | (dst_field << 3) | src_field,
                1,
                cycles,
                text(format!("MOV {d},{s}"), format!("LD {d},{s}")),
                wrap(Op::Mov(dst, src)),
            )?;
        }
    }
    t.op(0x76, 1, cy(7, 4), if intel { "HLT" } else { "HALT" }, wrap(Op::Hlt))?;

    for (alu, field) in AluOp::ALL.into_iter().zip(0u8..) {
        for (reg, reg_field) in Reg::ALL.into_iter().zip(0u8..) {
            let cycles = if reg == Reg::M { 7 } else { 4 };
            t.op(
                0x80 | (field << 3) | reg_field,
                1,
                cycles,
                format!("{}{}", alu.register_form(model), reg.name(model)),
                wrap(Op::Alu(alu, reg)),
            )?;
        }
        t.op(
            0xC6 | (field << 3),
            2,
            7,
            format!("{}%b1", alu.immediate_form(model)),
            wrap(Op::AluImm(alu)),
        )?;
    }

    for (cond, field) in Cond::ALL.into_iter().zip(0u8..) {
        let code = 0xC0 | (field << 3);
        let c = cond.name();
        t.branch(
            code,
            1,
            5,
            11,
            text(format!("R{c}"), format!("RET {c}")),
            wrap(Op::RetCond(cond)),
        )?;
        t.op(
            code | 0x02,
            3,
            10,
            text(format!("J{c} %w1"), format!("JP {c},%w1")),
            wrap(Op::JmpCond(cond)),
        )?;
        t.branch(
            code | 0x04,
            3,
            cy(11, 10),
            17,
            text(format!("C{c} %w1"), format!("CALL {c},%w1")),
            wrap(Op::CallCond(cond)),
        )?;
        t.op(
            code | 0x07,
            1,
            11,
            text(format!("RST {field}"), format!("RST {:02X}H", field * 8)),
            wrap(Op::Rst(field)),
        )?;
    }
    for (pair, row) in StackPair::ALL.into_iter().zip((0xC0u8..).step_by(0x10)) {
        let name = pair.name(model);
        t.op(row | 0x01, 1, 10, format!("POP {name}"), wrap(Op::Pop(pair)))?;
        t.op(row | 0x05, 1, 11, format!("PUSH {name}"), wrap(Op::Push(pair)))?;
    }

    t.op(0xC3, 3, 10, text("JMP %w1".into(), "JP %w1".into()), wrap(Op::Jmp))?;
    t.op(0xC9, 1, 10, "RET", wrap(Op::Ret))?;
    t.op(0xCD, 3, 17, "CALL %w1", wrap(Op::Call))?;
    t.op(0xD3, 2, cy(10, 11), text("OUT %b1".into(), "OUT (%b1),A".into()), wrap(Op::Out))?;
    t.op(0xDB, 2, cy(10, 11), text("IN %b1".into(), "IN A,(%b1)".into()), wrap(Op::In))?;
    t.op(0xE3, 1, cy(18, 19), text("XTHL".into(), "EX (SP),HL".into()), wrap(Op::Xthl))?;
    t.op(0xE9, 1, cy(5, 4), text("PCHL".into(), "JP (HL)".into()), wrap(Op::Pchl))?;
    t.op(0xEB, 1, 4, text("XCHG".into(), "EX DE,HL".into()), wrap(Op::Xchg))?;
    t.op(0xF3, 1, 4, "DI", wrap(Op::Di))?;
    t.op(0xF9, 1, cy(5, 6), text("SPHL".into(), "LD SP,HL".into()), wrap(Op::Sphl))?;
    t.op(0xFB, 1, 4, "EI", wrap(Op::Ei))?;

    if intel {
        for code in (0x08..=0x38).step_by(0x08) {
            t.op(code, 1, 4, "*NOP", wrap(Op::Nop))?;
        }
        t.op(0xCB, 3, 10, "*JMP %w1", wrap(Op::Jmp))?;
        t.op(0xD9, 1, 10, "*RET", wrap(Op::Ret))?;
        for code in [0xDD, 0xED, 0xFD] {
            t.op(code, 3, 17, "*CALL %w1", wrap(Op::Call))?;
        }
    }
    Ok(())
}

/// Builds the complete 8080 table.
///
/// # Errors
///
/// Returns a configuration fault on a duplicate slot.
pub fn build() -> Result<OpcodeTable<Op>, Fault> {
    let mut table = OpcodeTable::new("i8080");
    define_base(&mut table, FlagModel::Intel8080, |op| op)?;
    Ok(table)
}
