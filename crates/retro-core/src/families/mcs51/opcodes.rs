//! MCS-51 instruction kinds and the 256-entry table.

use crate::{Fault, OpcodeTable};

/// Operand location of a register/memory form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loc {
    /// Accumulator.
    A,
    /// Direct address byte: internal RAM below 0x80, SFR from 0x80.
    Direct,
    /// `@R0`/`@R1`: internal RAM addressed through a bank register.
    Indirect(u8),
    /// `R0`..`R7` of the active bank.
    Reg(u8),
    /// Immediate byte.
    Imm,
}

impl Loc {
    /// Operand bytes the location consumes.
    pub const fn operand_bytes(self) -> u8 {
        match self {
            Self::Direct | Self::Imm => 1,
            Self::A | Self::Indirect(_) | Self::Reg(_) => 0,
        }
    }

    fn text(self, offset: u8) -> String {
        match self {
            Self::A => "A".into(),
            Self::Direct => format!("%b{offset}"),
            Self::Indirect(index) => format!("@R{index}"),
            Self::Reg(index) => format!("R{index}"),
            Self::Imm => format!("#%b{offset}"),
        }
    }
}

/// Accumulator arithmetic group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    /// `ADD`.
    Add,
    /// `ADDC`.
    Addc,
    /// `SUBB`.
    Subb,
}

/// Bitwise group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    /// `ORL`.
    Orl,
    /// `ANL`.
    Anl,
    /// `XRL`.
    Xrl,
}

impl Logic {
    /// Applies the operation.
    pub const fn apply(self, a: u8, b: u8) -> u8 {
        match self {
            Self::Orl => a | b,
            Self::Anl => a & b,
            Self::Xrl => a ^ b,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Orl => "ORL",
            Self::Anl => "ANL",
            Self::Xrl => "XRL",
        }
    }
}

/// External data addressing of `MOVX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum External {
    /// `@DPTR`, full 16-bit address.
    Dptr,
    /// `@R0`/`@R1`, high byte from P2.
    Reg(u8),
}

/// One MCS-51 instruction form. Variants are named after their mnemonics.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nop,
    Ajmp,
    Acall,
    Ljmp,
    Lcall,
    Sjmp,
    JmpDptr,
    Ret,
    Reti,
    Rr,
    Rrc,
    Rl,
    Rlc,
    Inc(Loc),
    Dec(Loc),
    IncDptr,
    Jbc,
    Jb,
    Jnb,
    Jc,
    Jnc,
    Jz,
    Jnz,
    /// `A <- A op src`.
    Arith(Arith, Loc),
    /// `A <- A op src`.
    Logic(Logic, Loc),
    /// `direct <- direct op src`, src is `A` or an immediate.
    LogicDirect(Logic, Loc),
    /// `C <- C | bit` (or `/bit`).
    OrlC { complement: bool },
    /// `C <- C & bit` (or `/bit`).
    AnlC { complement: bool },
    MovCBit,
    MovBitC,
    MovcPc,
    MovcDptr,
    Div,
    Mul,
    /// `dst <- src`.
    Mov(Loc, Loc),
    /// `MOV direct, direct`; source byte is encoded first.
    MovDirDir,
    MovDptr,
    /// Compare and jump if not equal.
    Cjne(Loc, Loc),
    Push,
    Pop,
    ClrBit,
    ClrC,
    SetbBit,
    SetbC,
    CplBit,
    CplC,
    ClrA,
    CplA,
    Swap,
    Xch(Loc),
    Xchd(u8),
    Da,
    Djnz(Loc),
    MovxRead(External),
    MovxWrite(External),
}

/// Operand columns 4..F of the regular rows.
fn columns(first: u8) -> impl Iterator<Item = (u8, Loc)> {
    [
        (0x4, Loc::Imm),
        (0x5, Loc::Direct),
        (0x6, Loc::Indirect(0)),
        (0x7, Loc::Indirect(1)),
    ]
    .into_iter()
    .chain((0..8).map(|n| (0x8 + n, Loc::Reg(n))))
    .filter(move |(column, _)| *column >= first)
}

/// Builds the MCS-51 table. `0xA5` stays undefined.
#[allow(clippy::too_many_lines)]
pub fn build() -> Result<OpcodeTable<Op>, Fault> {
    let mut t = OpcodeTable::new("mcs51");

    // page-relative jumps and calls occupy column 1 of every row
    for row in 0..8u8 {
        t.op((row << 5) | 0x01, 2, 2, "AJMP %a1", Op::Ajmp)?;
        t.op((row << 5) | 0x11, 2, 2, "ACALL %a1", Op::Acall)?;
    }

    t.op(0x00, 1, 1, "NOP", Op::Nop)?;
    t.op(0x02, 3, 2, "LJMP %W1", Op::Ljmp)?;
    t.op(0x03, 1, 1, "RR A", Op::Rr)?;
    t.op(0x10, 3, 2, "JBC %b1,%r2", Op::Jbc)?;
    t.op(0x12, 3, 2, "LCALL %W1", Op::Lcall)?;
    t.op(0x13, 1, 1, "RRC A", Op::Rrc)?;
    t.op(0x20, 3, 2, "JB %b1,%r2", Op::Jb)?;
    t.op(0x22, 1, 2, "RET", Op::Ret)?;
    t.op(0x23, 1, 1, "RL A", Op::Rl)?;
    t.op(0x30, 3, 2, "JNB %b1,%r2", Op::Jnb)?;
    t.op(0x32, 1, 2, "RETI", Op::Reti)?;
    t.op(0x33, 1, 1, "RLC A", Op::Rlc)?;
    t.op(0x40, 2, 2, "JC %r1", Op::Jc)?;
    t.op(0x50, 2, 2, "JNC %r1", Op::Jnc)?;
    t.op(0x60, 2, 2, "JZ %r1", Op::Jz)?;
    t.op(0x70, 2, 2, "JNZ %r1", Op::Jnz)?;
    t.op(0x72, 2, 2, "ORL C,%b1", Op::OrlC { complement: false })?;
    t.op(0x73, 1, 2, "JMP @A+DPTR", Op::JmpDptr)?;
    t.op(0x80, 2, 2, "SJMP %r1", Op::Sjmp)?;
    t.op(0x82, 2, 2, "ANL C,%b1", Op::AnlC { complement: false })?;
    t.op(0x83, 1, 2, "MOVC A,@A+PC", Op::MovcPc)?;
    t.op(0x84, 1, 4, "DIV AB", Op::Div)?;
    t.op(0x85, 3, 2, "MOV %b2,%b1", Op::MovDirDir)?;
    t.op(0x90, 3, 2, "MOV DPTR,#%W1", Op::MovDptr)?;
    t.op(0x92, 2, 2, "MOV %b1,C", Op::MovBitC)?;
    t.op(0x93, 1, 2, "MOVC A,@A+DPTR", Op::MovcDptr)?;
    t.op(0xA0, 2, 2, "ORL C,/%b1", Op::OrlC { complement: true })?;
    t.op(0xA2, 2, 1, "MOV C,%b1", Op::MovCBit)?;
    t.op(0xA3, 1, 2, "INC DPTR", Op::IncDptr)?;
    t.op(0xA4, 1, 4, "MUL AB", Op::Mul)?;
    t.op(0xB0, 2, 2, "ANL C,/%b1", Op::AnlC { complement: true })?;
    t.op(0xB2, 2, 1, "CPL %b1", Op::CplBit)?;
    t.op(0xB3, 1, 1, "CPL C", Op::CplC)?;
    t.op(0xC0, 2, 2, "PUSH %b1", Op::Push)?;
    t.op(0xC2, 2, 1, "CLR %b1", Op::ClrBit)?;
    t.op(0xC3, 1, 1, "CLR C", Op::ClrC)?;
    t.op(0xC4, 1, 1, "SWAP A", Op::Swap)?;
    t.op(0xD0, 2, 2, "POP %b1", Op::Pop)?;
    t.op(0xD2, 2, 1, "SETB %b1", Op::SetbBit)?;
    t.op(0xD3, 1, 1, "SETB C", Op::SetbC)?;
    t.op(0xD4, 1, 1, "DA A", Op::Da)?;
    t.op(0xD5, 3, 2, "DJNZ %b1,%r2", Op::Djnz(Loc::Direct))?;
    t.op(0xE4, 1, 1, "CLR A", Op::ClrA)?;
    t.op(0xF4, 1, 1, "CPL A", Op::CplA)?;

    t.op(0xE0, 1, 2, "MOVX A,@DPTR", Op::MovxRead(External::Dptr))?;
    t.op(0xF0, 1, 2, "MOVX @DPTR,A", Op::MovxWrite(External::Dptr))?;
    for i in 0..2u8 {
        t.op(0xE2 + i, 1, 2, format!("MOVX A,@R{i}"), Op::MovxRead(External::Reg(i)))?;
        t.op(0xF2 + i, 1, 2, format!("MOVX @R{i},A"), Op::MovxWrite(External::Reg(i)))?;
        t.op(0xD6 + i, 1, 1, format!("XCHD A,@R{i}"), Op::Xchd(i))?;
    }

    // INC/DEC: A, direct, @Ri, Rn
    t.op(0x04, 1, 1, "INC A", Op::Inc(Loc::A))?;
    t.op(0x14, 1, 1, "DEC A", Op::Dec(Loc::A))?;
    for (column, loc) in columns(0x5) {
        let length = 1 + loc.operand_bytes();
        t.op(column, length, 1, format!("INC {}", loc.text(1)), Op::Inc(loc))?;
        t.op(0x10 | column, length, 1, format!("DEC {}", loc.text(1)), Op::Dec(loc))?;
    }

    // A <- A op src
    let groups = [
        (0x20, "ADD", Some(Arith::Add), None),
        (0x30, "ADDC", Some(Arith::Addc), None),
        (0x90, "SUBB", Some(Arith::Subb), None),
        (0x40, "ORL", None, Some(Logic::Orl)),
        (0x50, "ANL", None, Some(Logic::Anl)),
        (0x60, "XRL", None, Some(Logic::Xrl)),
    ];
    for (row, name, arith, logic) in groups {
        for (column, loc) in columns(0x4) {
            let kind = match (arith, logic) {
                (Some(arith), _) => Op::Arith(arith, loc),
                (None, Some(logic)) => Op::Logic(logic, loc),
                (None, None) => continue,
            };
            let text = format!("{name} A,{}", loc.text(1));
            t.op(row | column, 1 + loc.operand_bytes(), 1, text, kind)?;
        }
    }
    for (row, logic) in [(0x40, Logic::Orl), (0x50, Logic::Anl), (0x60, Logic::Xrl)] {
        let name = logic.name();
        t.op(
            row | 0x2,
            2,
            1,
            format!("{name} %b1,A"),
            Op::LogicDirect(logic, Loc::A),
        )?;
        t.op(
            row | 0x3,
            3,
            2,
            format!("{name} %b1,#%b2"),
            Op::LogicDirect(logic, Loc::Imm),
        )?;
    }

    // MOV forms
    for (column, loc) in columns(0x4) {
        // MOV dst,#imm
        let (dst, length) = match loc {
            Loc::Imm => (Loc::A, 2),
            Loc::Direct => (Loc::Direct, 3),
            other => (other, 2),
        };
        let text = format!("MOV {},#%b{}", dst.text(1), length - 1);
        let cycles = if column == 0x5 { 2 } else { 1 };
        t.op(0x70 | column, length, cycles, text, Op::Mov(dst, Loc::Imm))?;
    }
    for (column, loc) in columns(0x6) {
        t.op(
            0x80 | column,
            2,
            2,
            format!("MOV %b1,{}", loc.text(0)),
            Op::Mov(Loc::Direct, loc),
        )?;
        t.op(
            0xA0 | column,
            2,
            2,
            format!("MOV {},%b1", loc.text(0)),
            Op::Mov(loc, Loc::Direct),
        )?;
        t.op(
            0xE0 | column,
            1,
            1,
            format!("MOV A,{}", loc.text(0)),
            Op::Mov(Loc::A, loc),
        )?;
        t.op(
            0xF0 | column,
            1,
            1,
            format!("MOV {},A", loc.text(0)),
            Op::Mov(loc, Loc::A),
        )?;
        t.op(
            0xC0 | column,
            1,
            1,
            format!("XCH A,{}", loc.text(0)),
            Op::Xch(loc),
        )?;
    }
    t.op(0xE5, 2, 1, "MOV A,%b1", Op::Mov(Loc::A, Loc::Direct))?;
    t.op(0xF5, 2, 1, "MOV %b1,A", Op::Mov(Loc::Direct, Loc::A))?;
    t.op(0xC5, 2, 1, "XCH A,%b1", Op::Xch(Loc::Direct))?;

    // CJNE lhs,rhs,rel
    t.op(0xB4, 3, 2, "CJNE A,#%b1,%r2", Op::Cjne(Loc::A, Loc::Imm))?;
    t.op(0xB5, 3, 2, "CJNE A,%b1,%r2", Op::Cjne(Loc::A, Loc::Direct))?;
    for (column, loc) in columns(0x6) {
        t.op(
            0xB0 | column,
            3,
            2,
            format!("CJNE {},#%b1,%r2", loc.text(0)),
            Op::Cjne(loc, Loc::Imm),
        )?;
    }
    for n in 0..8u8 {
        t.op(0xD8 + n, 2, 2, format!("DJNZ R{n},%r1"), Op::Djnz(Loc::Reg(n)))?;
    }

    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::{build, Loc, Op};

    #[test]
    fn table_defines_every_slot_but_a5() {
        let table = build().expect("no duplicates");
        assert_eq!(table.defined(), 255);
        assert!(table.get(0xA5).is_none());
    }

    #[test]
    fn captured_fields_follow_the_opcode_map() {
        let table = build().expect("no duplicates");
        let entry = table.get(0x2B).expect("defined");
        assert_eq!(entry.kind, Op::Arith(super::Arith::Add, Loc::Reg(3)));
        assert_eq!(entry.mnemonic, "ADD A,R3");
        let entry = table.get(0x75).expect("defined");
        assert_eq!((entry.length, entry.cycles), (3, 2));
        assert_eq!(entry.mnemonic, "MOV %b1,#%b2");
        let entry = table.get(0xB7).expect("defined");
        assert_eq!(entry.kind, Op::Cjne(Loc::Indirect(1), Loc::Imm));
        assert_eq!(entry.length, 3);
    }
}
