use thiserror::Error;

/// Fault classes used for reporting and halt policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Access outside the bounds of an address space.
    Addressing,
    /// Stack pointer moved outside the stack window.
    Stack,
    /// Instruction, mode, or request not modeled for the family.
    UnsupportedOperation,
    /// Machine assembled with missing or inconsistent pieces.
    Configuration,
}

/// Failure raised by memory access, execution, or machine construction.
///
/// A fault aborts the instruction in progress and propagates to the caller of
/// [`crate::Cpu::step`]. The core never retries or recovers on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Fault {
    /// Address outside `0..size` of the named space.
    #[error("address {address:#06x} outside {space} (size {size:#x})")]
    AddressOutOfRange {
        /// Name of the space that rejected the access.
        space: String,
        /// Requested address.
        address: u32,
        /// Size of the space in bytes.
        size: u32,
    },
    /// Push past the top of the stack window.
    #[error("stack overflow at sp {sp:#06x}")]
    StackOverflow {
        /// Stack pointer value before the failed push.
        sp: u32,
    },
    /// Pop below the bottom of the stack window.
    #[error("stack underflow at sp {sp:#06x}")]
    StackUnderflow {
        /// Stack pointer value before the failed pop.
        sp: u32,
    },
    /// Opcode byte with no entry in the dispatch table.
    #[error("unsupported opcode {opcode:#04x} at pc {pc:#06x}")]
    UnsupportedOpcode {
        /// Address of the opcode byte.
        pc: u16,
        /// The rejected opcode byte.
        opcode: u8,
    },
    /// Request that the addressed component does not model.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// Register name not published by the family.
    #[error("unknown register {0}")]
    UnknownRegister(String),
    /// Machine construction failure detected before execution starts.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Fault {
    /// Builds an out-of-range fault for `space`.
    #[must_use]
    pub fn out_of_range(space: &str, address: u32, size: u32) -> Self {
        Self::AddressOutOfRange {
            space: space.to_owned(),
            address,
            size,
        }
    }

    /// Builds a configuration fault from any displayable message.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns the reporting class for this fault.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        match self {
            Self::AddressOutOfRange { .. } => FaultClass::Addressing,
            Self::StackOverflow { .. } | Self::StackUnderflow { .. } => FaultClass::Stack,
            Self::UnsupportedOpcode { .. } | Self::Unsupported(_) | Self::UnknownRegister(_) => {
                FaultClass::UnsupportedOperation
            }
            Self::Configuration(_) => FaultClass::Configuration,
        }
    }

    /// Faults that leave the machine unusable until it is rebuilt or reset.
    ///
    /// Stack and unsupported-operation faults are reported to the caller, which
    /// may inspect state and continue stepping.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self.class(),
            FaultClass::Addressing | FaultClass::Configuration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Fault, FaultClass};

    #[test]
    fn classes_follow_taxonomy() {
        assert_eq!(
            Fault::out_of_range("DATA", 0x80, 0x80).class(),
            FaultClass::Addressing
        );
        assert_eq!(Fault::StackOverflow { sp: 0xFF }.class(), FaultClass::Stack);
        assert_eq!(Fault::StackUnderflow { sp: 0 }.class(), FaultClass::Stack);
        assert_eq!(
            Fault::UnsupportedOpcode { pc: 0, opcode: 0xA5 }.class(),
            FaultClass::UnsupportedOperation
        );
        assert_eq!(
            Fault::configuration("no CODE space").class(),
            FaultClass::Configuration
        );
    }

    #[test]
    fn only_addressing_and_configuration_are_fatal() {
        assert!(Fault::out_of_range("X", 1, 1).is_fatal());
        assert!(Fault::configuration("x").is_fatal());
        assert!(!Fault::StackOverflow { sp: 0x100 }.is_fatal());
        assert!(!Fault::Unsupported("mode 3".into()).is_fatal());
    }

    #[test]
    fn messages_carry_context() {
        let fault = Fault::out_of_range("XDATA", 0x1_0000, 0x1_0000);
        assert_eq!(
            fault.to_string(),
            "address 0x10000 outside XDATA (size 0x10000)"
        );
        let fault = Fault::UnsupportedOpcode {
            pc: 0x0100,
            opcode: 0xA5,
        };
        assert_eq!(fault.to_string(), "unsupported opcode 0xa5 at pc 0x0100");
    }
}
