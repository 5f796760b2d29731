//! Cycle-counted emulation engine for 8-bit CPU families.

/// Fault taxonomy shared by every component.
pub mod fault;
pub use fault::{Fault, FaultClass};

/// Address spaces, observers and the per-machine memory map.
pub mod memory;
pub use memory::{AddressSpace, MemoryMap, ObserverId, ReadObserver, SpaceId, SpaceKind, WriteObserver};

/// Register descriptors published by each family.
pub mod registers;
pub use registers::{find_register, flag_string, RegisterDescriptor, RegisterKind};

/// 256-entry opcode dispatch tables and mnemonic rendering.
pub mod opcode;
pub use opcode::{relative_target, render_mnemonic, sign_extend8, Dispatch, Opcode, OpcodeTable};

/// Shared arithmetic and flag helpers.
pub mod alu;

/// Condition-driven interrupt lines.
pub mod interrupt;
pub use interrupt::{Condition, InterruptController, InterruptLine, LineId, Trigger};

/// Cycle counting, listeners and idle waits.
pub mod clock;
pub use clock::{CycleClock, CycleListener, IdleClock, IdleWait, ListenerId};

/// Machine state and the CPU step contract.
pub mod cpu;
pub use cpu::{Cpu, CpuSnapshot, Family, Machine, RunState, SnapshotVersion, SpaceImage};

/// Instruction-boundary trace hooks.
pub mod trace;
pub use trace::{TraceEvent, TraceSink};

/// Bounded runs and the threaded runner.
pub mod runner;
pub use runner::{run_until, Command, RunBoundary, RunOutcome, Runner, RunnerEvent, StopReason};

/// Program image loaders.
pub mod loader;
pub use loader::{load_binary, load_file, load_intel_hex, load_srecord, LoadError, LoadedRange};

/// CPU family implementations.
pub mod families;

/// Machine selection and construction.
pub mod config;
pub use config::{build_cpu, BuiltCpu, MachineConfig};

#[cfg(test)]
use proptest as _;
