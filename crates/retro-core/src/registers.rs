//! Named register descriptors shared by every family.

/// Architectural role of a register, used by debuggers to pick what to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RegisterKind {
    /// Program counter.
    ProgramCounter,
    /// Stack pointer.
    StackPointer,
    /// Accumulator.
    Accumulator,
    /// Condition code / status register.
    Flags,
    /// Index or data pointer register.
    Index,
    /// Any other general purpose register.
    General,
}

/// Static description of one named register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterDescriptor {
    /// Upper-case register name, unique within a family.
    pub name: &'static str,
    /// Width in bits (8 or 16).
    pub width: u8,
    /// Architectural role.
    pub kind: RegisterKind,
}

impl RegisterDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub const fn new(name: &'static str, width: u8, kind: RegisterKind) -> Self {
        Self { name, width, kind }
    }

    /// Mask of the bits the register holds.
    #[must_use]
    pub const fn mask(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1 << self.width) - 1
        }
    }
}

/// Finds a descriptor by case-insensitive name.
#[must_use]
pub fn find_register<'a>(
    registers: &'a [RegisterDescriptor],
    name: &str,
) -> Option<&'a RegisterDescriptor> {
    registers
        .iter()
        .find(|register| register.name.eq_ignore_ascii_case(name))
}

/// Renders a flag byte MSB first, printing the letter for set bits and `-`
/// for clear ones.
#[must_use]
pub fn flag_string(value: u8, letters: &[u8; 8]) -> String {
    letters
        .iter()
        .enumerate()
        .map(|(index, &letter)| {
            if value & (0x80 >> index) != 0 {
                char::from(letter)
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{find_register, flag_string, RegisterDescriptor, RegisterKind};

    const SET: &[RegisterDescriptor] = &[
        RegisterDescriptor::new("PC", 16, RegisterKind::ProgramCounter),
        RegisterDescriptor::new("A", 8, RegisterKind::Accumulator),
    ];

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(find_register(SET, "pc").map(|r| r.width), Some(16));
        assert!(find_register(SET, "SP").is_none());
    }

    #[test]
    fn mask_matches_width() {
        assert_eq!(SET[0].mask(), 0xFFFF);
        assert_eq!(SET[1].mask(), 0xFF);
    }

    #[test]
    fn flags_render_msb_first() {
        assert_eq!(flag_string(0b1000_0001, b"SZ-H-PNC"), "S------C");
        assert_eq!(flag_string(0xFF, b"CAF0RS1P"), "CAF0RS1P");
    }
}
