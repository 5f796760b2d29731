//! Instruction-boundary trace hooks.

use crate::FaultClass;

/// Execution event emitted by [`crate::run_until`] when a sink is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TraceEvent {
    /// About to execute the instruction at `pc`.
    InstructionStart {
        /// Program counter of the instruction.
        pc: u16,
    },
    /// The step starting at `pc` completed.
    InstructionRetired {
        /// Program counter the step started at.
        pc: u16,
        /// Cycles consumed, interrupt entry included.
        cycles: u32,
        /// Program counter after the step.
        next_pc: u16,
    },
    /// A step aborted with a fault.
    FaultRaised {
        /// Program counter the step started at.
        pc: u16,
        /// Fault class latched in the run state.
        class: FaultClass,
    },
}

/// Receiver for [`TraceEvent`]s.
pub trait TraceSink {
    /// Records an event in execution order.
    fn on_event(&mut self, event: TraceEvent);
}

impl TraceSink for Vec<TraceEvent> {
    fn on_event(&mut self, event: TraceEvent) {
        self.push(event);
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::TraceEvent;
    use crate::{CpuSnapshot, Fault};

    fn exchangeable<T: serde::Serialize + serde::de::DeserializeOwned>() {}

    #[test]
    fn trace_events_travel_with_snapshots_and_faults() {
        exchangeable::<TraceEvent>();
        exchangeable::<CpuSnapshot>();
        exchangeable::<Fault>();
    }
}
