//! Machine selection and construction.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::families::i8080::I8080;
use crate::families::m6502::M6502;
use crate::families::m68hc05::M68hc05;
use crate::families::mcs51::serial::SerialPort;
use crate::families::mcs51::{Mcs51, Variant};
use crate::families::z80::Z80;
use crate::{Cpu, Family, Fault, IdleClock};

/// Default 68HC05 memory size.
pub const DEFAULT_M68HC05_MEMORY: u32 = 0x2000;

/// What to build and how long its idle waits may last.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MachineConfig {
    /// CPU family.
    pub family: Family,
    /// MCS-51 part; ignored by other families.
    pub mcs51_variant: Variant,
    /// 68HC05 memory size in bytes, a power of two.
    pub m68hc05_memory: u32,
    /// Longest single idle wait in milliseconds.
    pub idle_timeout_ms: u64,
    /// Attach the UART on MCS-51 parts.
    pub serial: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            family: Family::Mcs51,
            mcs51_variant: Variant::I8051,
            m68hc05_memory: DEFAULT_M68HC05_MEMORY,
            idle_timeout_ms: 20,
            serial: false,
        }
    }
}

impl MachineConfig {
    /// Default configuration for `family`.
    #[must_use]
    pub fn for_family(family: Family) -> Self {
        Self {
            family,
            ..Self::default()
        }
    }

    /// Idle clock matching the configured timeout.
    #[must_use]
    pub fn idle_clock(&self) -> IdleClock {
        IdleClock::new(Duration::from_millis(self.idle_timeout_ms))
    }

    /// Checks the values that construction cannot repair.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for a zero timeout.
    pub fn validate(&self) -> Result<(), Fault> {
        if self.idle_timeout_ms == 0 {
            return Err(Fault::configuration("idle timeout must be non-zero"));
        }
        Ok(())
    }
}

/// A constructed core and the host side of its peripherals.
pub struct BuiltCpu {
    /// The core, boxed for family-independent drivers.
    pub cpu: Box<dyn Cpu>,
    /// UART host side when [`MachineConfig::serial`] was set on an MCS-51.
    pub serial: Option<SerialPort>,
}

impl fmt::Debug for BuiltCpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltCpu")
            .field("family", &self.cpu.family())
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

/// Builds the configured core. The idle clock is handed to peripherals that
/// wait on host I/O.
///
/// # Errors
///
/// Returns configuration faults from validation or core construction.
pub fn build_cpu(config: &MachineConfig, idle: IdleClock) -> Result<BuiltCpu, Fault> {
    config.validate()?;
    debug!(family = ?config.family, serial = config.serial, "building cpu");
    let mut serial = None;
    let cpu: Box<dyn Cpu> = match config.family {
        Family::Mcs51 => {
            let mut cpu = Mcs51::new(config.mcs51_variant)?;
            if config.serial {
                serial = Some(cpu.attach_serial(idle)?);
            }
            Box::new(cpu)
        }
        Family::I8080 => Box::new(I8080::new()?),
        Family::Z80 => {
            let mut cpu = Z80::new()?;
            cpu.add_nmi_line();
            Box::new(cpu)
        }
        Family::M6502 => {
            let mut cpu = M6502::new()?;
            cpu.add_nmi_line();
            cpu.add_irq_line();
            Box::new(cpu)
        }
        Family::M68hc05 => {
            let mut cpu = M68hc05::new(config.m68hc05_memory)?;
            cpu.add_irq_line();
            cpu.add_timer_line();
            Box::new(cpu)
        }
    };
    Ok(BuiltCpu { cpu, serial })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{build_cpu, MachineConfig};
    use crate::{Family, Fault, IdleClock, RunState};

    #[rstest]
    #[case(Family::Mcs51)]
    #[case(Family::I8080)]
    #[case(Family::Z80)]
    #[case(Family::M6502)]
    #[case(Family::M68hc05)]
    fn builds_every_family(#[case] family: Family) {
        let built = build_cpu(&MachineConfig::for_family(family), IdleClock::default())
            .expect("builds");
        let cpu = built.cpu;
        assert!(built.serial.is_none());
        assert_eq!(cpu.family(), family);
        assert_eq!(cpu.run_state(), RunState::Running);
        assert!(!cpu.registers().is_empty());
    }

    #[test]
    fn serial_hands_back_the_port() {
        let config = MachineConfig {
            serial: true,
            ..MachineConfig::default()
        };
        let built = build_cpu(&config, config.idle_clock()).expect("builds");
        assert!(built.serial.is_some());
    }

    #[test]
    fn rejects_bad_memory_size() {
        let config = MachineConfig {
            family: Family::M68hc05,
            m68hc05_memory: 3000,
            ..MachineConfig::default()
        };
        assert!(matches!(
            build_cpu(&config, IdleClock::default()),
            Err(Fault::Configuration(_))
        ));
    }

    #[test]
    fn rejects_zero_idle_timeout() {
        let config = MachineConfig {
            idle_timeout_ms: 0,
            ..MachineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
