//! Bit-exact 8/16-bit arithmetic shared by every family.
//!
//! Results are computed widened and the condition bits are derived from the
//! operand and result bit patterns. Each family maps [`AluResult`] onto its
//! own status register layout.

#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

/// Outcome of an 8-bit add or subtract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    /// Truncated 8-bit result.
    pub value: u8,
    /// Carry out of bit 7 (borrow for subtraction).
    pub carry: bool,
    /// Carry out of bit 3 (borrow for subtraction).
    pub half_carry: bool,
    /// Signed overflow.
    pub overflow: bool,
}

impl AluResult {
    /// Result is zero.
    #[must_use]
    pub const fn zero(&self) -> bool {
        self.value == 0
    }

    /// Bit 7 of the result.
    #[must_use]
    pub const fn sign(&self) -> bool {
        self.value & 0x80 != 0
    }
}

/// Outcome of a 16-bit add or subtract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult16 {
    /// Truncated 16-bit result.
    pub value: u16,
    /// Carry out of bit 15 (borrow for subtraction).
    pub carry: bool,
    /// Carry out of bit 11 (borrow for subtraction).
    pub half_carry: bool,
    /// Signed overflow.
    pub overflow: bool,
}

/// `a + b + carry_in`.
#[must_use]
pub const fn add8(a: u8, b: u8, carry_in: bool) -> AluResult {
    let wide = a as u16 + b as u16 + carry_in as u16;
    let value = wide as u8;
    AluResult {
        value,
        carry: wide > 0xFF,
        half_carry: (a ^ b ^ value) & 0x10 != 0,
        overflow: (a ^ value) & (b ^ value) & 0x80 != 0,
    }
}

/// `a - b - borrow_in`; `carry` reports a borrow.
#[must_use]
pub const fn sub8(a: u8, b: u8, borrow_in: bool) -> AluResult {
    let wide = (a as u16)
        .wrapping_sub(b as u16)
        .wrapping_sub(borrow_in as u16);
    let value = wide as u8;
    AluResult {
        value,
        carry: wide > 0xFF,
        half_carry: (a ^ b ^ value) & 0x10 != 0,
        overflow: (a ^ b) & (a ^ value) & 0x80 != 0,
    }
}

/// `a + b + carry_in` on 16 bits.
#[must_use]
pub const fn add16(a: u16, b: u16, carry_in: bool) -> AluResult16 {
    let wide = a as u32 + b as u32 + carry_in as u32;
    let value = wide as u16;
    AluResult16 {
        value,
        carry: wide > 0xFFFF,
        half_carry: (a ^ b ^ value) & 0x1000 != 0,
        overflow: (a ^ value) & (b ^ value) & 0x8000 != 0,
    }
}

/// `a - b - borrow_in` on 16 bits; `carry` reports a borrow.
#[must_use]
pub const fn sub16(a: u16, b: u16, borrow_in: bool) -> AluResult16 {
    let wide = (a as u32)
        .wrapping_sub(b as u32)
        .wrapping_sub(borrow_in as u32);
    let value = wide as u16;
    AluResult16 {
        value,
        carry: wide > 0xFFFF,
        half_carry: (a ^ b ^ value) & 0x1000 != 0,
        overflow: (a ^ b) & (a ^ value) & 0x8000 != 0,
    }
}

const fn build_parity_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut index = 0;
    while index < 256 {
        table[index] = (index as u8).count_ones() % 2 == 0;
        index += 1;
    }
    table
}

/// `true` where the byte has an even number of set bits.
pub static EVEN_PARITY: [bool; 256] = build_parity_table();

/// Even parity of `value`.
#[must_use]
pub fn parity_even(value: u8) -> bool {
    EVEN_PARITY[usize::from(value)]
}

/// Decimal adjust after an addition, 8080 rules.
///
/// Returns the adjusted value and the new carry and auxiliary-carry bits.
#[must_use]
pub const fn decimal_adjust_add(a: u8, carry: bool, half_carry: bool) -> (u8, bool, bool) {
    let mut correction = 0u8;
    let mut carry_out = carry;
    if half_carry || a & 0x0F > 9 {
        correction |= 0x06;
    }
    if carry || a > 0x99 {
        correction |= 0x60;
        carry_out = true;
    }
    let value = a.wrapping_add(correction);
    (value, carry_out, (a ^ correction ^ value) & 0x10 != 0)
}

#[cfg(test)]
mod tests {
    use super::{add16, add8, decimal_adjust_add, parity_even, sub16, sub8};

    #[test]
    fn add_wraps_with_carry_half_carry_and_zero() {
        let result = add8(0xFF, 0x01, false);
        assert_eq!(result.value, 0x00);
        assert!(result.carry);
        assert!(result.half_carry);
        assert!(result.zero());
        assert!(!result.overflow);
    }

    #[test]
    fn add_into_sign_bit_overflows() {
        let result = add8(0x7F, 0x01, false);
        assert_eq!(result.value, 0x80);
        assert!(result.overflow);
        assert!(result.sign());
        assert!(!result.carry);
    }

    #[test]
    fn carry_in_is_added() {
        assert_eq!(add8(0x0F, 0x00, true).value, 0x10);
        assert!(add8(0x0F, 0x00, true).half_carry);
    }

    #[test]
    fn subtract_reports_borrow() {
        let result = sub8(0x00, 0x01, false);
        assert_eq!(result.value, 0xFF);
        assert!(result.carry);
        assert!(result.half_carry);
        let result = sub8(0x80, 0x01, false);
        assert!(result.overflow);
        assert_eq!(sub8(0x05, 0x03, true).value, 0x01);
    }

    #[test]
    fn sixteen_bit_forms() {
        let sum = add16(0x0FFF, 0x0001, false);
        assert_eq!(sum.value, 0x1000);
        assert!(sum.half_carry);
        assert!(add16(0xFFFF, 0x0001, false).carry);
        assert!(add16(0x7FFF, 0x0001, false).overflow);
        assert!(sub16(0x0000, 0x0001, false).carry);
        assert!(sub16(0x8000, 0x0001, false).overflow);
    }

    #[test]
    fn parity_table() {
        assert!(parity_even(0x00));
        assert!(!parity_even(0x01));
        assert!(parity_even(0x03));
        assert!(!parity_even(0xFE));
    }

    #[test]
    fn decimal_adjust_after_bcd_add() {
        // 0x38 + 0x45 = 0x7D -> 83
        assert_eq!(decimal_adjust_add(0x7D, false, false), (0x83, false, true));
        // 0x99 + 0x01 = 0x9A -> 00 with carry
        assert_eq!(decimal_adjust_add(0x9A, false, false), (0x00, true, true));
        // 0x09 + 0x09 = 0x12 with half carry -> 18
        assert_eq!(decimal_adjust_add(0x12, false, true), (0x18, false, false));
    }
}
