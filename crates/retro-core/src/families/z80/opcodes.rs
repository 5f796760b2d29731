//! Z80 instruction kinds: the unprefixed table layered over the 8080 base,
//! plus the `CB`, `ED`, `DD`/`FD` and `DDCB`/`FDCB` tables.

#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use crate::families::i8080::opcodes::{define_base, AluOp, Cond, Op, Pair, Reg};
use crate::families::i8080::FlagModel;
use crate::{Fault, OpcodeTable};

/// Index register selected by a `DD` or `FD` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// `DD` prefix.
    IX,
    /// `FD` prefix.
    IY,
}

impl Index {
    /// Register name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IX => "IX",
            Self::IY => "IY",
        }
    }
}

/// Unprefixed Z80 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpZ80 {
    /// Shared with the 8080, Z80 flag rules.
    Base(Op),
    /// `EX AF,AF'`.
    ExAf,
    /// `EXX`.
    Exx,
    /// Decrement B, jump relative while non-zero.
    Djnz,
    /// `JR e`.
    Jr,
    /// `JR cc,e` for NZ, Z, NC, C.
    JrCond(Cond),
    /// Escape into the bit table.
    PrefixCb,
    /// Escape into the extended table.
    PrefixEd,
    /// Escape into the index table.
    PrefixIndex(Index),
}

/// Rotate/shift group of the bit table.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Sll,
    Srl,
}

impl Shift {
    const ALL: [Self; 8] = [
        Self::Rlc,
        Self::Rrc,
        Self::Rl,
        Self::Rr,
        Self::Sla,
        Self::Sra,
        Self::Sll,
        Self::Srl,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::Rlc => "RLC",
            Self::Rrc => "RRC",
            Self::Rl => "RL",
            Self::Rr => "RR",
            Self::Sla => "SLA",
            Self::Sra => "SRA",
            Self::Sll => "SLL",
            Self::Srl => "SRL",
        }
    }

    /// Shifted value and carry out.
    #[must_use]
    pub const fn apply(self, value: u8, carry_in: bool) -> (u8, bool) {
        let low = value & 0x01 != 0;
        let high = value & 0x80 != 0;
        match self {
            Self::Rlc => (value.rotate_left(1), high),
            Self::Rrc => (value.rotate_right(1), low),
            Self::Rl => ((value << 1) | carry_in as u8, high),
            Self::Rr => ((value >> 1) | ((carry_in as u8) << 7), low),
            Self::Sla => (value << 1, high),
            Self::Sra => ((value >> 1) | (value & 0x80), low),
            Self::Sll => ((value << 1) | 0x01, high),
            Self::Srl => (value >> 1, low),
        }
    }
}

/// Bit table instruction. The register is ignored in the indexed forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbOp {
    /// Rotate or shift.
    Shift(Shift, Reg),
    /// Test bit.
    Bit(u8, Reg),
    /// Clear bit.
    Res(u8, Reg),
    /// Set bit.
    Set(u8, Reg),
}

/// Block transfer/search/I/O family.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    Ld,
    Cp,
    In,
    Out,
}

/// Extended (`ED`) instruction.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdOp {
    /// `IN r,(C)`; `M` is the flags-only `IN (C)`.
    InC(Reg),
    /// `OUT (C),r`; `M` writes zero.
    OutC(Reg),
    SbcHl(Pair),
    AdcHl(Pair),
    /// `LD (nn),rr`.
    StoreWord(Pair),
    /// `LD rr,(nn)`.
    LoadWord(Pair),
    Neg,
    Retn,
    Reti,
    Im(u8),
    LdIA,
    LdRA,
    LdAI,
    LdAR,
    Rrd,
    Rld,
    Block {
        kind: Block,
        increment: bool,
        repeat: bool,
    },
}

/// Index (`DD`/`FD`) instruction. `HL` in a pair field means the index
/// register itself.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    Add(Pair),
    LdNn,
    Store,
    Load,
    Inc,
    Dec,
    IncIdx,
    DecIdx,
    LdIdxN,
    LdRIdx(Reg),
    LdIdxR(Reg),
    AluIdx(AluOp),
    /// Escape into the indexed bit table.
    Cb,
    Pop,
    ExSp,
    Push,
    Jp,
    LdSp,
}

/// Unprefixed table: the 8080 base with Z80 timings plus the Z80-only
/// instructions and prefixes.
///
/// # Errors
///
/// Returns a configuration fault on a duplicate slot.
pub fn build_main() -> Result<OpcodeTable<OpZ80>, Fault> {
    let mut t = OpcodeTable::new("z80");
    define_base(&mut t, FlagModel::Zilog, OpZ80::Base)?;
    t.op(0x08, 1, 4, "EX AF,AF'", OpZ80::ExAf)?;
    t.branch(0x10, 2, 8, 13, "DJNZ %r1", OpZ80::Djnz)?;
    t.op(0x18, 2, 12, "JR %r1", OpZ80::Jr)?;
    for (code, cond) in [(0x20, Cond::NZ), (0x28, Cond::Z), (0x30, Cond::NC), (0x38, Cond::C)] {
        t.branch(code, 2, 7, 12, format!("JR {},%r1", cond.name()), OpZ80::JrCond(cond))?;
    }
    t.op(0xD9, 1, 4, "EXX", OpZ80::Exx)?;
    t.op(0xCB, 1, 0, "CB", OpZ80::PrefixCb)?;
    t.op(0xED, 1, 0, "ED", OpZ80::PrefixEd)?;
    t.op(0xDD, 1, 0, "DD", OpZ80::PrefixIndex(Index::IX))?;
    t.op(0xFD, 1, 0, "FD", OpZ80::PrefixIndex(Index::IY))?;
    Ok(t)
}

fn bit_kind(code: u8) -> (CbOp, String) {
    let reg = Reg::ALL[usize::from(code & 0x07)];
    let y = (code >> 3) & 0x07;
    let target = reg.name(FlagModel::Zilog);
    match code >> 6 {
        0 => {
            let shift = Shift::ALL[usize::from(y)];
            (CbOp::Shift(shift, reg), format!("{} {target}", shift.name()))
        }
        1 => (CbOp::Bit(y, reg), format!("BIT {y},{target}")),
        2 => (CbOp::Res(y, reg), format!("RES {y},{target}")),
        _ => (CbOp::Set(y, reg), format!("SET {y},{target}")),
    }
}

/// `CB` table: all 256 slots.
///
/// # Errors
///
/// Returns a configuration fault on a duplicate slot.
pub fn build_cb() -> Result<OpcodeTable<CbOp>, Fault> {
    let mut t = OpcodeTable::new("z80 cb");
    for code in 0..=0xFFu8 {
        let (kind, text) = bit_kind(code);
        let memory = code & 0x07 == 6;
        let cycles = match (kind, memory) {
            (_, false) => 8,
            (CbOp::Bit(..), true) => 12,
            (_, true) => 15,
        };
        t.op(code, 2, cycles, text, kind)?;
    }
    Ok(t)
}

/// `DDCB d op` table, keyed by the fourth byte. Only the documented
/// `(IX+d)` forms (register field 6) are defined.
///
/// # Errors
///
/// Returns a configuration fault on a duplicate slot.
pub fn build_index_cb() -> Result<OpcodeTable<CbOp>, Fault> {
    let mut t = OpcodeTable::new("z80 index cb");
    for code in (0x06..=0xFEu8).step_by(8) {
        let (kind, text) = bit_kind(code);
        let cycles = if matches!(kind, CbOp::Bit(..)) { 20 } else { 23 };
        t.op(code, 4, cycles, text.replace("(HL)", "(IX%s2)"), kind)?;
    }
    Ok(t)
}

/// `ED` table.
///
/// # Errors
///
/// Returns a configuration fault on a duplicate slot.
pub fn build_ed() -> Result<OpcodeTable<EdOp>, Fault> {
    let mut t = OpcodeTable::new("z80 ed");
    for (reg, field) in Reg::ALL.into_iter().zip(0u8..) {
        let code = 0x40 | (field << 3);
        let (input, output) = if reg == Reg::M {
            ("IN (C)".to_owned(), "OUT (C),0".to_owned())
        } else {
            let name = reg.name(FlagModel::Zilog);
            (format!("IN {name},(C)"), format!("OUT (C),{name}"))
        };
        t.op(code, 2, 12, input, EdOp::InC(reg))?;
        t.op(code | 0x01, 2, 12, output, EdOp::OutC(reg))?;
    }
    for (pair, row) in Pair::ALL.into_iter().zip((0x40u8..).step_by(0x10)) {
        let name = match pair {
            Pair::BC => "BC",
            Pair::DE => "DE",
            Pair::HL => "HL",
            Pair::SP => "SP",
        };
        t.op(row | 0x02, 2, 15, format!("SBC HL,{name}"), EdOp::SbcHl(pair))?;
        t.op(row | 0x03, 4, 20, format!("LD (%w2),{name}"), EdOp::StoreWord(pair))?;
        t.op(row | 0x0A, 2, 15, format!("ADC HL,{name}"), EdOp::AdcHl(pair))?;
        t.op(row | 0x0B, 4, 20, format!("LD {name},(%w2)"), EdOp::LoadWord(pair))?;
    }
    t.op(0x44, 2, 8, "NEG", EdOp::Neg)?;
    t.op(0x45, 2, 14, "RETN", EdOp::Retn)?;
    t.op(0x4D, 2, 14, "RETI", EdOp::Reti)?;
    t.op(0x46, 2, 8, "IM 0", EdOp::Im(0))?;
    t.op(0x56, 2, 8, "IM 1", EdOp::Im(1))?;
    t.op(0x5E, 2, 8, "IM 2", EdOp::Im(2))?;
    t.op(0x47, 2, 9, "LD I,A", EdOp::LdIA)?;
    t.op(0x4F, 2, 9, "LD R,A", EdOp::LdRA)?;
    t.op(0x57, 2, 9, "LD A,I", EdOp::LdAI)?;
    t.op(0x5F, 2, 9, "LD A,R", EdOp::LdAR)?;
    t.op(0x67, 2, 18, "RRD", EdOp::Rrd)?;
    t.op(0x6F, 2, 18, "RLD", EdOp::Rld)?;

    let kinds = [
        (0, Block::Ld, "LD"),
        (1, Block::Cp, "CP"),
        (2, Block::In, "IN"),
        (3, Block::Out, "OT"),
    ];
    for (column, kind, stem) in kinds {
        for (row, increment, repeat) in [
            (0xA0, true, false),
            (0xA8, false, false),
            (0xB0, true, true),
            (0xB8, false, true),
        ] {
            let direction = if increment { "I" } else { "D" };
            let text = match (kind, repeat) {
                (Block::Out, false) => format!("OUT{direction}"),
                (_, false) => format!("{stem}{direction}"),
                (_, true) => format!("{stem}{direction}R"),
            };
            let kind = EdOp::Block {
                kind,
                increment,
                repeat,
            };
            if repeat {
                t.branch(row | column, 2, 16, 21, text, kind)?;
            } else {
                t.op(row | column, 2, 16, text, kind)?;
            }
        }
    }
    Ok(t)
}

/// `DD`/`FD` table, written for IX. Slots without an indexed meaning are
/// left undefined.
///
/// # Errors
///
/// Returns a configuration fault on a duplicate slot.
pub fn build_index() -> Result<OpcodeTable<IndexOp>, Fault> {
    let mut t = OpcodeTable::new("z80 index");
    for (pair, name) in [
        (Pair::BC, "BC"),
        (Pair::DE, "DE"),
        (Pair::HL, "IX"),
        (Pair::SP, "SP"),
    ] {
        let code = match pair {
            Pair::BC => 0x09,
            Pair::DE => 0x19,
            Pair::HL => 0x29,
            Pair::SP => 0x39,
        };
        t.op(code, 2, 15, format!("ADD IX,{name}"), IndexOp::Add(pair))?;
    }
    t.op(0x21, 4, 14, "LD IX,%w2", IndexOp::LdNn)?;
    t.op(0x22, 4, 20, "LD (%w2),IX", IndexOp::Store)?;
    t.op(0x23, 2, 10, "INC IX", IndexOp::Inc)?;
    t.op(0x2A, 4, 20, "LD IX,(%w2)", IndexOp::Load)?;
    t.op(0x2B, 2, 10, "DEC IX", IndexOp::Dec)?;
    t.op(0x34, 3, 23, "INC (IX%s2)", IndexOp::IncIdx)?;
    t.op(0x35, 3, 23, "DEC (IX%s2)", IndexOp::DecIdx)?;
    t.op(0x36, 4, 19, "LD (IX%s2),%b3", IndexOp::LdIdxN)?;
    for (reg, field) in Reg::ALL.into_iter().zip(0u8..) {
        if reg == Reg::M {
            continue;
        }
        let name = reg.name(FlagModel::Zilog);
        t.op(
            0x46 | (field << 3),
            3,
            19,
            format!("LD {name},(IX%s2)"),
            IndexOp::LdRIdx(reg),
        )?;
        t.op(
            0x70 | field,
            3,
            19,
            format!("LD (IX%s2),{name}"),
            IndexOp::LdIdxR(reg),
        )?;
    }
    let alu_ops = [
        (AluOp::Add, "ADD A,"),
        (AluOp::Adc, "ADC A,"),
        (AluOp::Sub, "SUB "),
        (AluOp::Sbc, "SBC A,"),
        (AluOp::And, "AND "),
        (AluOp::Xor, "XOR "),
        (AluOp::Or, "OR "),
        (AluOp::Cp, "CP "),
    ];
    for ((alu, stem), field) in alu_ops.into_iter().zip(0u8..) {
        t.op(
            0x86 | (field << 3),
            3,
            19,
            format!("{stem}(IX%s2)"),
            IndexOp::AluIdx(alu),
        )?;
    }
    t.op(0xCB, 4, 0, "CB", IndexOp::Cb)?;
    t.op(0xE1, 2, 14, "POP IX", IndexOp::Pop)?;
    t.op(0xE3, 2, 23, "EX (SP),IX", IndexOp::ExSp)?;
    t.op(0xE5, 2, 15, "PUSH IX", IndexOp::Push)?;
    t.op(0xE9, 2, 8, "JP (IX)", IndexOp::Jp)?;
    t.op(0xF9, 2, 10, "LD SP,IX", IndexOp::LdSp)?;
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::{build_cb, build_ed, build_index, build_index_cb, build_main, CbOp, Shift};
    use crate::families::i8080::opcodes::Reg;

    #[test]
    fn tables_cover_the_documented_set() {
        assert_eq!(build_main().expect("no duplicates").defined(), 256);
        assert_eq!(build_cb().expect("no duplicates").defined(), 256);
        assert_eq!(build_index_cb().expect("no duplicates").defined(), 32);
        // 16 in/out, 16 word forms, NEG, RETN, RETI, 3 IM, 4 I/R loads,
        // RRD, RLD, 16 block forms
        assert_eq!(build_ed().expect("no duplicates").defined(), 60);
        assert_eq!(build_index().expect("no duplicates").defined(), 40);
    }

    #[test]
    fn bit_table_fields() {
        let cb = build_cb().expect("no duplicates");
        let entry = cb.get(0x7E).expect("defined");
        assert_eq!(entry.kind, CbOp::Bit(7, Reg::M));
        assert_eq!(entry.mnemonic, "BIT 7,(HL)");
        assert_eq!(entry.cycles, 12);
        assert_eq!(cb.get(0x38).map(|op| op.kind), Some(CbOp::Shift(Shift::Srl, Reg::B)));
        let indexed = build_index_cb().expect("no duplicates");
        assert_eq!(indexed.get(0xC6).map(|op| op.mnemonic.as_ref()), Some("SET 0,(IX%s2)"));
    }

    #[test]
    fn shifts_follow_silicon() {
        assert_eq!(Shift::Sra.apply(0x81, false), (0xC0, true));
        assert_eq!(Shift::Rl.apply(0x80, true), (0x01, true));
        assert_eq!(Shift::Sll.apply(0x00, false), (0x01, false));
        assert_eq!(Shift::Srl.apply(0x01, false), (0x00, true));
    }
}
