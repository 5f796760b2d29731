//! NMOS 6502 documented instruction set: 56 mnemonics over 13 addressing
//! modes, 151 opcodes.

use crate::{Fault, OpcodeTable};

/// Addressing mode; fixes the instruction length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No operand.
    Implied,
    /// Operates on `A`.
    Accumulator,
    /// `#nn`.
    Immediate,
    /// `nn`.
    ZeroPage,
    /// `nn,X`, wrapping in page zero.
    ZeroPageX,
    /// `nn,Y`, wrapping in page zero.
    ZeroPageY,
    /// `nnnn`.
    Absolute,
    /// `nnnn,X`.
    AbsoluteX,
    /// `nnnn,Y`.
    AbsoluteY,
    /// `(nn,X)`.
    IndirectX,
    /// `(nn),Y`.
    IndirectY,
    /// `(nnnn)`, `JMP` only.
    Indirect,
    /// Branch offset.
    Relative,
}

impl Mode {
    /// Instruction length including the opcode.
    #[must_use]
    pub const fn length(self) -> u8 {
        match self {
            Self::Implied | Self::Accumulator => 1,
            Self::Absolute | Self::AbsoluteX | Self::AbsoluteY | Self::Indirect => 3,
            _ => 2,
        }
    }

    const fn template(self) -> &'static str {
        match self {
            Self::Implied => "",
            Self::Accumulator => " A",
            Self::Immediate => " #%b1",
            Self::ZeroPage => " %b1",
            Self::ZeroPageX => " %b1,X",
            Self::ZeroPageY => " %b1,Y",
            Self::Absolute => " %w1",
            Self::AbsoluteX => " %w1,X",
            Self::AbsoluteY => " %w1,Y",
            Self::IndirectX => " (%b1,X)",
            Self::IndirectY => " (%b1),Y",
            Self::Indirect => " (%w1)",
            Self::Relative => " %r1",
        }
    }
}

/// Instruction mnemonic.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
}

/// Mnemonic and addressing mode of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Op {
    /// What the instruction does.
    pub mnemonic: Mnemonic,
    /// Where its operand comes from.
    pub mode: Mode,
}

impl Op {
    /// Reads that pay one extra cycle when indexing crosses a page.
    #[must_use]
    pub const fn page_penalty(self) -> bool {
        matches!(
            self.mode,
            Mode::AbsoluteX | Mode::AbsoluteY | Mode::IndirectY
        ) && matches!(
            self.mnemonic,
            Mnemonic::Adc
                | Mnemonic::And
                | Mnemonic::Cmp
                | Mnemonic::Eor
                | Mnemonic::Lda
                | Mnemonic::Ldx
                | Mnemonic::Ldy
                | Mnemonic::Ora
                | Mnemonic::Sbc
        )
    }
}

fn define(
    t: &mut OpcodeTable<Op>,
    code: u8,
    mnemonic: Mnemonic,
    mode: Mode,
    cycles: u8,
) -> Result<(), Fault> {
    let name = format!("{mnemonic:?}").to_uppercase();
    let text = format!("{name}{}", mode.template());
    let length = if mnemonic == Mnemonic::Brk { 2 } else { mode.length() };
    let kind = Op { mnemonic, mode };
    if mode == Mode::Relative {
        t.branch(code, length, cycles, cycles + 1, text, kind)
    } else {
        t.op(code, length, cycles, text, kind)
    }
}

/// Builds the documented NMOS table.
///
/// # Errors
///
/// Returns a configuration fault on a duplicate slot.
#[allow(clippy::too_many_lines)]
pub fn build() -> Result<OpcodeTable<Op>, Fault> {
    use Mnemonic::{
        Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc, Cld, Cli, Clv, Cmp,
        Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha,
        Php, Pla, Plp, Rol, Ror, Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa,
        Txs, Tya,
    };
    use Mode::{
        Absolute, AbsoluteX, AbsoluteY, Accumulator, Immediate, Implied, Indirect, IndirectX,
        IndirectY, Relative, ZeroPage, ZeroPageX, ZeroPageY,
    };

    let mut t = OpcodeTable::new("m6502");

    // aaabbb01: the accumulator group
    for (base, mnemonic) in [
        (0x00, Ora),
        (0x20, And),
        (0x40, Eor),
        (0x60, Adc),
        (0x80, Sta),
        (0xA0, Lda),
        (0xC0, Cmp),
        (0xE0, Sbc),
    ] {
        let store = mnemonic == Sta;
        define(&mut t, base | 0x01, mnemonic, IndirectX, 6)?;
        define(&mut t, base | 0x05, mnemonic, ZeroPage, 3)?;
        if !store {
            define(&mut t, base | 0x09, mnemonic, Immediate, 2)?;
        }
        define(&mut t, base | 0x0D, mnemonic, Absolute, 4)?;
        define(&mut t, base | 0x11, mnemonic, IndirectY, if store { 6 } else { 5 })?;
        define(&mut t, base | 0x15, mnemonic, ZeroPageX, 4)?;
        define(&mut t, base | 0x19, mnemonic, AbsoluteY, if store { 5 } else { 4 })?;
        define(&mut t, base | 0x1D, mnemonic, AbsoluteX, if store { 5 } else { 4 })?;
    }

    // aaabbb10 read-modify-write; only the shifts have an accumulator form
    for (base, mnemonic) in [(0x00, Asl), (0x20, Rol), (0x40, Lsr), (0x60, Ror), (0xC0, Dec), (0xE0, Inc)] {
        define(&mut t, base | 0x06, mnemonic, ZeroPage, 5)?;
        if base < 0x80 {
            define(&mut t, base | 0x0A, mnemonic, Accumulator, 2)?;
        }
        define(&mut t, base | 0x0E, mnemonic, Absolute, 6)?;
        define(&mut t, base | 0x16, mnemonic, ZeroPageX, 6)?;
        define(&mut t, base | 0x1E, mnemonic, AbsoluteX, 7)?;
    }

    for (code, mnemonic) in [
        (0x10, Bpl),
        (0x30, Bmi),
        (0x50, Bvc),
        (0x70, Bvs),
        (0x90, Bcc),
        (0xB0, Bcs),
        (0xD0, Bne),
        (0xF0, Beq),
    ] {
        define(&mut t, code, mnemonic, Relative, 2)?;
    }

    let implied = [
        (0x00, Brk, 7),
        (0x08, Php, 3),
        (0x18, Clc, 2),
        (0x28, Plp, 4),
        (0x38, Sec, 2),
        (0x40, Rti, 6),
        (0x48, Pha, 3),
        (0x58, Cli, 2),
        (0x60, Rts, 6),
        (0x68, Pla, 4),
        (0x78, Sei, 2),
        (0x88, Dey, 2),
        (0x8A, Txa, 2),
        (0x98, Tya, 2),
        (0x9A, Txs, 2),
        (0xA8, Tay, 2),
        (0xAA, Tax, 2),
        (0xB8, Clv, 2),
        (0xBA, Tsx, 2),
        (0xC8, Iny, 2),
        (0xCA, Dex, 2),
        (0xD8, Cld, 2),
        (0xE8, Inx, 2),
        (0xEA, Nop, 2),
        (0xF8, Sed, 2),
    ];
    for (code, mnemonic, cycles) in implied {
        define(&mut t, code, mnemonic, Implied, cycles)?;
    }

    let others = [
        (0x20, Jsr, Absolute, 6),
        (0x24, Bit, ZeroPage, 3),
        (0x2C, Bit, Absolute, 4),
        (0x4C, Jmp, Absolute, 3),
        (0x6C, Jmp, Indirect, 5),
        (0x84, Sty, ZeroPage, 3),
        (0x8C, Sty, Absolute, 4),
        (0x94, Sty, ZeroPageX, 4),
        (0x86, Stx, ZeroPage, 3),
        (0x8E, Stx, Absolute, 4),
        (0x96, Stx, ZeroPageY, 4),
        (0xA0, Ldy, Immediate, 2),
        (0xA4, Ldy, ZeroPage, 3),
        (0xAC, Ldy, Absolute, 4),
        (0xB4, Ldy, ZeroPageX, 4),
        (0xBC, Ldy, AbsoluteX, 4),
        (0xA2, Ldx, Immediate, 2),
        (0xA6, Ldx, ZeroPage, 3),
        (0xAE, Ldx, Absolute, 4),
        (0xB6, Ldx, ZeroPageY, 4),
        (0xBE, Ldx, AbsoluteY, 4),
        (0xC0, Cpy, Immediate, 2),
        (0xC4, Cpy, ZeroPage, 3),
        (0xCC, Cpy, Absolute, 4),
        (0xE0, Cpx, Immediate, 2),
        (0xE4, Cpx, ZeroPage, 3),
        (0xEC, Cpx, Absolute, 4),
    ];
    for (code, mnemonic, mode, cycles) in others {
        define(&mut t, code, mnemonic, mode, cycles)?;
    }
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::{build, Mnemonic, Mode, Op};

    #[test]
    fn documented_set_is_complete() {
        let table = build().expect("no duplicates");
        assert_eq!(table.defined(), 151);
        assert!(table.get(0x02).is_none());
        assert!(table.get(0x89).is_none());
    }

    #[test]
    fn entries_carry_mode_and_timing() {
        let table = build().expect("no duplicates");
        let entry = table.get(0x91).expect("defined");
        assert_eq!(
            entry.kind,
            Op {
                mnemonic: Mnemonic::Sta,
                mode: Mode::IndirectY
            }
        );
        assert_eq!((entry.length, entry.cycles), (2, 6));
        assert!(!entry.kind.page_penalty());
        assert!(table.get(0xB1).expect("defined").kind.page_penalty());
        assert_eq!(table.get(0xD0).map(|op| op.taken_cycles), Some(3));
        assert_eq!(table.get(0x6C).map(|op| op.mnemonic.as_ref()), Some("JMP (%w1)"));
        assert_eq!(table.get(0x00).map(|op| op.length), Some(2));
    }
}
