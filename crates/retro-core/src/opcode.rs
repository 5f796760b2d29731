//! Opcode descriptors, 256-entry dispatch tables and mnemonic rendering.

#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{Fault, MemoryMap, SpaceId};

/// One encoded instruction form.
///
/// `K` is the family's closed instruction kind carrying the captured operand
/// fields (register number, bit index, addressing mode) so execution is a
/// single `match` with no per-entry indirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcode<K> {
    /// Opcode byte within its table.
    pub code: u8,
    /// Encoded length in bytes, prefixes included.
    pub length: u8,
    /// Cycle cost when no branch is taken and no repeat happens.
    pub cycles: u8,
    /// Cycle cost of the taken path; equals `cycles` for straight-line forms.
    pub taken_cycles: u8,
    /// Disassembly template, see [`render_mnemonic`].
    pub mnemonic: Cow<'static, str>,
    /// Family specific behavior selector.
    pub kind: K,
}

impl<K: Copy> Opcode<K> {
    /// Creates a straight-line opcode.
    pub fn new(
        code: u8,
        length: u8,
        cycles: u8,
        mnemonic: impl Into<Cow<'static, str>>,
        kind: K,
    ) -> Self {
        Self {
            code,
            length,
            cycles,
            taken_cycles: cycles,
            mnemonic: mnemonic.into(),
            kind,
        }
    }

    /// Sets the taken-branch cost.
    #[must_use]
    pub fn taken(mut self, cycles: u8) -> Self {
        self.taken_cycles = cycles;
        self
    }

    /// Execution view of this entry.
    #[must_use]
    pub const fn dispatch(&self) -> Dispatch<K> {
        Dispatch {
            kind: self.kind,
            length: self.length,
            cycles: self.cycles,
            taken_cycles: self.taken_cycles,
        }
    }
}

/// The parts of an [`Opcode`] execution needs, copied out of the table so
/// the executor can borrow the CPU mutably.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch<K> {
    /// Behavior selector.
    pub kind: K,
    /// Encoded length in bytes.
    pub length: u8,
    /// Not-taken cost.
    pub cycles: u8,
    /// Taken cost.
    pub taken_cycles: u8,
}

impl<K> Dispatch<K> {
    /// Cost for the path actually executed.
    #[must_use]
    pub fn cost(&self, taken: bool) -> u32 {
        u32::from(if taken { self.taken_cycles } else { self.cycles })
    }
}

/// Flat 256-entry dispatch table with per-opcode execution counters.
#[derive(Debug, Clone)]
pub struct OpcodeTable<K> {
    name: &'static str,
    entries: Vec<Option<Opcode<K>>>,
    counters: Vec<u64>,
}

impl<K: Copy> OpcodeTable<K> {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: vec![None; 256],
            counters: vec![0; 256],
        }
    }

    /// Table name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Installs `opcode` at its code.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if the slot is already taken.
    pub fn define(&mut self, opcode: Opcode<K>) -> Result<(), Fault> {
        let slot = &mut self.entries[usize::from(opcode.code)];
        if let Some(existing) = slot.as_ref() {
            return Err(Fault::configuration(format!(
                "{}: opcode {:#04x} defined as {} and {}",
                self.name, opcode.code, existing.mnemonic, opcode.mnemonic
            )));
        }
        *slot = Some(opcode);
        Ok(())
    }

    /// Convenience form of [`Self::define`].
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if the slot is already taken.
    pub fn op(
        &mut self,
        code: u8,
        length: u8,
        cycles: u8,
        mnemonic: impl Into<Cow<'static, str>>,
        kind: K,
    ) -> Result<(), Fault> {
        self.define(Opcode::new(code, length, cycles, mnemonic, kind))
    }

    /// Defines a conditional form with distinct not-taken and taken costs.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if the slot is already taken.
    pub fn branch(
        &mut self,
        code: u8,
        length: u8,
        cycles: u8,
        taken_cycles: u8,
        mnemonic: impl Into<Cow<'static, str>>,
        kind: K,
    ) -> Result<(), Fault> {
        self.define(Opcode::new(code, length, cycles, mnemonic, kind).taken(taken_cycles))
    }

    /// Entry for `code`, if defined.
    #[must_use]
    pub fn get(&self, code: u8) -> Option<&Opcode<K>> {
        self.entries[usize::from(code)].as_ref()
    }

    /// Looks `code` up for execution and bumps its counter.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnsupportedOpcode`] for an undefined slot.
    pub fn fetch(&mut self, code: u8, pc: u16) -> Result<Dispatch<K>, Fault> {
        let index = usize::from(code);
        let dispatch = self.entries[index]
            .as_ref()
            .map(Opcode::dispatch)
            .ok_or(Fault::UnsupportedOpcode { pc, opcode: code })?;
        self.counters[index] += 1;
        Ok(dispatch)
    }

    /// Times `code` has been fetched since creation or the last reset.
    #[must_use]
    pub fn count(&self, code: u8) -> u64 {
        self.counters[usize::from(code)]
    }

    /// Clears every execution counter.
    pub fn reset_counters(&mut self) {
        self.counters.fill(0);
    }

    /// Number of defined entries.
    #[must_use]
    pub fn defined(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    /// Defined entries in code order.
    pub fn iter(&self) -> impl Iterator<Item = &Opcode<K>> + '_ {
        self.entries.iter().flatten()
    }

    /// Renders the instruction starting at `pc` whose opcode byte for this
    /// table sits `code_offset` bytes in (past any prefixes). Reads go
    /// through `peek`, so disassembly has no side effects.
    ///
    /// # Errors
    ///
    /// [`Fault::UnsupportedOpcode`] for an undefined slot, addressing faults
    /// past the end of `space`.
    pub fn disassemble(
        &self,
        memory: &MemoryMap,
        space: SpaceId,
        pc: u16,
        code_offset: u16,
    ) -> Result<(String, u8), Fault> {
        let code = memory.peek(space, u32::from(pc.wrapping_add(code_offset)))?;
        let entry = self
            .get(code)
            .ok_or(Fault::UnsupportedOpcode { pc, opcode: code })?;
        let bytes = (0..u16::from(entry.length))
            .map(|offset| memory.peek(space, u32::from(pc.wrapping_add(offset))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((
            render_mnemonic(&entry.mnemonic, pc, entry.length, &bytes),
            entry.length,
        ))
    }
}

/// Sign-extends a relative branch byte: `o - ((o & 0x80) << 1)`.
#[must_use]
pub const fn sign_extend8(offset: u8) -> i16 {
    offset as i16 - ((offset as i16 & 0x80) << 1)
}

/// Target of a relative branch: `pc + length + sign_extend8(offset)`.
#[must_use]
pub const fn relative_target(pc: u16, length: u8, offset: u8) -> u16 {
    pc.wrapping_add(length as u16)
        .wrapping_add(sign_extend8(offset) as u16)
}

/// Expands a mnemonic template for the instruction at `pc`.
///
/// `bytes` holds the encoded instruction starting at its first byte. The
/// digit after each placeholder is the byte offset of the operand:
///
/// - `%bN` byte, `%sN` signed displacement
/// - `%wN` little-endian word, `%WN` big-endian word
/// - `%rN` relative branch target
/// - `%aN` 11-bit page address built from the opcode's top three bits
#[must_use]
pub fn render_mnemonic(template: &str, pc: u16, length: u8, bytes: &[u8]) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let Some(form) = chars.next() else {
            out.push('%');
            break;
        };
        let Some(offset) = chars.next().and_then(|digit| digit.to_digit(10)) else {
            out.push('%');
            out.push(form);
            continue;
        };
        let offset = offset as usize;
        let byte = |index: usize| bytes.get(index).copied();
        let rendered = match form {
            'b' => byte(offset).map(|value| format!("{value:#04x}")),
            's' => byte(offset).map(|value| {
                let displacement = sign_extend8(value);
                if displacement < 0 {
                    format!("-{:#04x}", -displacement)
                } else {
                    format!("+{displacement:#04x}")
                }
            }),
            'w' => byte(offset)
                .zip(byte(offset + 1))
                .map(|(low, high)| format!("{:#06x}", u16::from_le_bytes([low, high]))),
            'W' => byte(offset)
                .zip(byte(offset + 1))
                .map(|(high, low)| format!("{:#06x}", u16::from_be_bytes([high, low]))),
            'r' => byte(offset).map(|value| format!("{:#06x}", relative_target(pc, length, value))),
            'a' => byte(0).zip(byte(offset)).map(|(opcode, low)| {
                let next = pc.wrapping_add(u16::from(length));
                let target =
                    (next & 0xF800) | (u16::from(opcode & 0xE0) << 3) | u16::from(low);
                format!("{target:#06x}")
            }),
            _ => None,
        };
        match rendered {
            Some(text) => out.push_str(&text),
            None => {
                let _ = write!(out, "%{form}{offset}");
            }
        }
    }
    out
}
