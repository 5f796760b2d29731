//! 68HC05 instruction kinds and the 210-entry opcode table.
//!
//! The map is regular: rows 0x0-0x2 are bit and branch forms, rows
//! 0x3-0x7 the read-modify-write group across five addressing modes,
//! rows 0x8-0x9 control, rows 0xA-0xF the register/memory group.

use crate::{Fault, OpcodeTable};

/// Operand addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `#nn`.
    Immediate,
    /// `nn` in page zero.
    Direct,
    /// `nnnn`, big-endian.
    Extended,
    /// `nnnn,X`.
    Indexed2,
    /// `nn,X`.
    Indexed1,
    /// `,X`.
    Indexed,
    /// Operates on `A`.
    InherentA,
    /// Operates on `X`.
    InherentX,
}

impl Mode {
    /// Instruction length including the opcode.
    #[must_use]
    pub const fn length(self) -> u8 {
        match self {
            Self::Extended | Self::Indexed2 => 3,
            Self::Immediate | Self::Direct | Self::Indexed1 => 2,
            Self::Indexed | Self::InherentA | Self::InherentX => 1,
        }
    }
}

/// Read-modify-write operations.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rmw {
    Neg,
    Com,
    Lsr,
    Ror,
    Asr,
    Asl,
    Rol,
    Dec,
    Inc,
    Tst,
    Clr,
}

impl Rmw {
    const ALL: [(u8, Self, &'static str); 11] = [
        (0x0, Self::Neg, "NEG"),
        (0x3, Self::Com, "COM"),
        (0x4, Self::Lsr, "LSR"),
        (0x6, Self::Ror, "ROR"),
        (0x7, Self::Asr, "ASR"),
        (0x8, Self::Asl, "ASL"),
        (0x9, Self::Rol, "ROL"),
        (0xA, Self::Dec, "DEC"),
        (0xC, Self::Inc, "INC"),
        (0xD, Self::Tst, "TST"),
        (0xF, Self::Clr, "CLR"),
    ];
}

/// Register/memory operations.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegMem {
    Sub,
    Cmp,
    Sbc,
    Cpx,
    And,
    Bit,
    Lda,
    Sta,
    Eor,
    Adc,
    Ora,
    Add,
    Jmp,
    Jsr,
    Ldx,
    Stx,
}

impl RegMem {
    const ALL: [(Self, &'static str); 16] = [
        (Self::Sub, "SUB"),
        (Self::Cmp, "CMP"),
        (Self::Sbc, "SBC"),
        (Self::Cpx, "CPX"),
        (Self::And, "AND"),
        (Self::Bit, "BIT"),
        (Self::Lda, "LDA"),
        (Self::Sta, "STA"),
        (Self::Eor, "EOR"),
        (Self::Adc, "ADC"),
        (Self::Ora, "ORA"),
        (Self::Add, "ADD"),
        (Self::Jmp, "JMP"),
        (Self::Jsr, "JSR"),
        (Self::Ldx, "LDX"),
        (Self::Stx, "STX"),
    ];

    /// Stores and jumps have no immediate form.
    const fn has_immediate(self) -> bool {
        !matches!(self, Self::Sta | Self::Stx | Self::Jmp | Self::Jsr)
    }

    /// Cycle cost per mode, in the row order imm, dir, ext, ix2, ix1, ix.
    const fn cycles(self) -> [u8; 6] {
        match self {
            Self::Sta | Self::Stx => [0, 4, 5, 6, 5, 4],
            Self::Jmp => [0, 2, 3, 4, 3, 2],
            Self::Jsr => [0, 5, 6, 7, 6, 5],
            _ => [2, 3, 4, 5, 4, 3],
        }
    }
}

/// Relative branch conditions, in opcode order from 0x20.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Bra,
    Brn,
    Bhi,
    Bls,
    Bcc,
    Bcs,
    Bne,
    Beq,
    Bhcc,
    Bhcs,
    Bpl,
    Bmi,
    Bmc,
    Bms,
    Bil,
    Bih,
}

impl Branch {
    const ALL: [Self; 16] = [
        Self::Bra,
        Self::Brn,
        Self::Bhi,
        Self::Bls,
        Self::Bcc,
        Self::Bcs,
        Self::Bne,
        Self::Beq,
        Self::Bhcc,
        Self::Bhcs,
        Self::Bpl,
        Self::Bmi,
        Self::Bmc,
        Self::Bms,
        Self::Bil,
        Self::Bih,
    ];
}

/// One decoded 68HC05 instruction.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Branch if bit `n` of a direct byte is set.
    Brset(u8),
    /// Branch if bit `n` of a direct byte is clear.
    Brclr(u8),
    Bset(u8),
    Bclr(u8),
    Branch(Branch),
    Bsr,
    Rmw(Rmw, Mode),
    RegMem(RegMem, Mode),
    Mul,
    Rti,
    Rts,
    Swi,
    Stop,
    Wait,
    Tax,
    Txa,
    Clc,
    Sec,
    Cli,
    Sei,
    Rsp,
    Nop,
}

/// Builds the full table.
///
/// # Errors
///
/// Returns a configuration fault on a duplicate slot.
pub fn build() -> Result<OpcodeTable<Op>, Fault> {
    let mut t = OpcodeTable::new("m68hc05");

    for bit in 0..8u8 {
        t.op(2 * bit, 3, 5, format!("BRSET {bit},%b1,%r2"), Op::Brset(bit))?;
        t.op(2 * bit + 1, 3, 5, format!("BRCLR {bit},%b1,%r2"), Op::Brclr(bit))?;
        t.op(0x10 + 2 * bit, 2, 5, format!("BSET {bit},%b1"), Op::Bset(bit))?;
        t.op(0x11 + 2 * bit, 2, 5, format!("BCLR {bit},%b1"), Op::Bclr(bit))?;
    }
    for (branch, code) in Branch::ALL.into_iter().zip(0x20u8..) {
        let name = format!("{branch:?}").to_uppercase();
        t.op(code, 2, 3, format!("{name} %r1"), Op::Branch(branch))?;
    }

    let rmw_rows = [
        (0x30, Mode::Direct, " %b1", 5),
        (0x40, Mode::InherentA, "A", 3),
        (0x50, Mode::InherentX, "X", 3),
        (0x60, Mode::Indexed1, " %b1,X", 6),
        (0x70, Mode::Indexed, " ,X", 5),
    ];
    for (row, mode, suffix, cycles) in rmw_rows {
        for (column, rmw, name) in Rmw::ALL {
            // TST only reads, saving a cycle on memory forms
            let cost = if rmw == Rmw::Tst && cycles > 3 {
                cycles - 1
            } else {
                cycles
            };
            t.op(
                row | column,
                mode.length(),
                cost,
                format!("{name}{suffix}"),
                Op::Rmw(rmw, mode),
            )?;
        }
    }
    t.op(0x42, 1, 11, "MUL", Op::Mul)?;

    let control = [
        (0x80, 9, "RTI", Op::Rti),
        (0x81, 6, "RTS", Op::Rts),
        (0x83, 10, "SWI", Op::Swi),
        (0x8E, 2, "STOP", Op::Stop),
        (0x8F, 2, "WAIT", Op::Wait),
        (0x97, 2, "TAX", Op::Tax),
        (0x98, 2, "CLC", Op::Clc),
        (0x99, 2, "SEC", Op::Sec),
        (0x9A, 2, "CLI", Op::Cli),
        (0x9B, 2, "SEI", Op::Sei),
        (0x9C, 2, "RSP", Op::Rsp),
        (0x9D, 2, "NOP", Op::Nop),
        (0x9F, 2, "TXA", Op::Txa),
    ];
    for (code, cycles, text, op) in control {
        t.op(code, 1, cycles, text, op)?;
    }
    t.op(0xAD, 2, 6, "BSR %r1", Op::Bsr)?;

    let regmem_rows = [
        (0xA0, Mode::Immediate, " #%b1"),
        (0xB0, Mode::Direct, " %b1"),
        (0xC0, Mode::Extended, " %W1"),
        (0xD0, Mode::Indexed2, " %W1,X"),
        (0xE0, Mode::Indexed1, " %b1,X"),
        (0xF0, Mode::Indexed, " ,X"),
    ];
    for ((regmem, name), column) in RegMem::ALL.into_iter().zip(0u8..) {
        for ((row, mode, suffix), cycles) in regmem_rows.into_iter().zip(regmem.cycles()) {
            if mode == Mode::Immediate && !regmem.has_immediate() {
                continue;
            }
            t.op(
                row | column,
                mode.length(),
                cycles,
                format!("{name}{suffix}"),
                Op::RegMem(regmem, mode),
            )?;
        }
    }
    Ok(t)
}
