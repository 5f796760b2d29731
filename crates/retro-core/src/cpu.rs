//! Machine state shared by every family and the fetch-execute-notify loop.

use tracing::{trace, warn};

use crate::{
    find_register, CycleClock, CycleListener, Fault, FaultClass, InterruptController, LineId,
    ListenerId, MemoryMap, RegisterDescriptor, SpaceId,
};

/// Supported CPU families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Family {
    /// Intel MCS-51 (8051/8052) microcontrollers.
    Mcs51,
    /// Intel 8080.
    I8080,
    /// Zilog Z80.
    Z80,
    /// MOS 6502 (NMOS).
    M6502,
    /// Motorola 68HC05.
    M68hc05,
}

/// Execution state observed by schedulers and debuggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Executing instructions.
    #[default]
    Running,
    /// Stopped by a halt/wait instruction until an interrupt is dispatched.
    Halted,
    /// The last step raised a fault of this class.
    Faulted(FaultClass),
}

impl RunState {
    /// Class of the latched fault, if any.
    #[must_use]
    pub const fn latched_fault(self) -> Option<FaultClass> {
        match self {
            Self::Faulted(class) => Some(class),
            Self::Running | Self::Halted => None,
        }
    }
}

/// Memory, cycle clock and interrupt controller embedded by every family.
///
/// Families own a `Machine` and add their registers and opcode tables around
/// it; peripherals are wired through the three members.
#[derive(Debug, Default)]
pub struct Machine {
    /// Address spaces.
    pub memory: MemoryMap,
    /// Cycle counter and listeners.
    pub clock: CycleClock,
    /// Interrupt lines.
    pub interrupts: InterruptController,
}

impl Machine {
    /// Creates an empty machine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `cycles`, notifying listeners.
    ///
    /// # Errors
    ///
    /// Propagates listener faults.
    pub fn advance(&mut self, cycles: u32) -> Result<(), Fault> {
        self.clock.advance(cycles, &mut self.memory)
    }

    /// Registers a cycle listener.
    pub fn add_cycle_listener(&mut self, listener: impl CycleListener + 'static) -> ListenerId {
        self.clock.add_listener(listener)
    }

    /// Adds a level condition to `line`.
    ///
    /// # Errors
    ///
    /// See [`InterruptController::add_condition`].
    pub fn add_interrupt_condition(
        &mut self,
        line: LineId,
        space: SpaceId,
        address: u32,
        mask: u8,
    ) -> Result<(), Fault> {
        self.interrupts
            .add_condition(&mut self.memory, line, space, address, mask)
    }

    /// Adds a rising-edge condition to `line`.
    ///
    /// # Errors
    ///
    /// See [`InterruptController::add_rising_edge_condition`].
    pub fn add_interrupt_rising_edge_condition(
        &mut self,
        line: LineId,
        space: SpaceId,
        address: u32,
        mask: u8,
    ) -> Result<(), Fault> {
        self.interrupts
            .add_rising_edge_condition(&mut self.memory, line, space, address, mask)
    }
}

/// Saved contents of one address space.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SpaceImage {
    /// Space name.
    pub name: String,
    /// Visible contents.
    pub bytes: Vec<u8>,
}

/// Stable snapshot schema identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u16)]
pub enum SnapshotVersion {
    /// First schema revision.
    V1 = 1,
}

/// Settled machine state: registers, cycle total and memory contents.
///
/// Taken between steps, so it can be handed to another thread for display.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuSnapshot {
    /// Schema revision.
    pub version: SnapshotVersion,
    /// Family that produced the snapshot.
    pub family: Family,
    /// Total cycles.
    pub cycles: u64,
    /// Register values by descriptor name, in descriptor order.
    pub registers: Vec<(String, u32)>,
    /// Every address space in map order.
    pub spaces: Vec<SpaceImage>,
}

impl CpuSnapshot {
    /// Value of a register by case-insensitive name.
    #[must_use]
    pub fn register(&self, name: &str) -> Option<u32> {
        self.registers
            .iter()
            .find(|(register, _)| register.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

/// A CPU family bound to its [`Machine`].
///
/// Families implement instruction execution, interrupt entry and register
/// access; the provided [`Cpu::step`] sequences one instruction boundary.
pub trait Cpu {
    /// Family of this core.
    fn family(&self) -> Family;

    /// Shared machine state.
    fn machine(&self) -> &Machine;

    /// Exclusive machine state, for wiring peripherals.
    fn machine_mut(&mut self) -> &mut Machine;

    /// Program counter.
    fn pc(&self) -> u16;

    /// Moves the program counter.
    fn set_pc(&mut self, pc: u16);

    /// Current run state.
    fn run_state(&self) -> RunState;

    /// Overrides the run state; used by the step loop to latch faults.
    fn set_run_state(&mut self, state: RunState);

    /// Applies power-on/reset semantics: registers, vectors, in-service
    /// state. Memory contents are kept.
    ///
    /// # Errors
    ///
    /// Propagates faults from reading reset vectors or reset-time writes.
    fn reset(&mut self) -> Result<(), Fault>;

    /// Executes one instruction (or one idle slot while halted) and returns
    /// the elapsed cycles.
    ///
    /// # Errors
    ///
    /// Any fault aborts the instruction.
    fn execute(&mut self) -> Result<u32, Fault>;

    /// Returns `true` when maskable lines may be dispatched at this boundary.
    fn maskable_enabled(&self) -> bool;

    /// Vectors to `line` and returns the entry cost in cycles.
    ///
    /// # Errors
    ///
    /// Propagates stack and memory faults of the entry sequence.
    fn enter_interrupt(&mut self, line: LineId) -> Result<u32, Fault>;

    /// Registers this family publishes.
    fn registers(&self) -> &'static [RegisterDescriptor];

    /// Reads a register by name, resolving memory-backed views.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnknownRegister`] for names the family does not have.
    fn read_register(&self, name: &str) -> Result<u32, Fault>;

    /// Writes a register by name; the value is truncated to its width.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnknownRegister`] for names the family does not have.
    fn write_register(&mut self, name: &str, value: u32) -> Result<(), Fault>;

    /// Renders the instruction at `pc` and returns it with its length.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnsupportedOpcode`] for undefined encodings and
    /// addressing faults for reads past the code space.
    fn disassemble(&self, pc: u16) -> Result<(String, u8), Fault>;

    /// Total cycles elapsed.
    fn cycles(&self) -> u64 {
        self.machine().clock.total()
    }

    /// Runs one instruction boundary: execute, notify cycle listeners, then
    /// dispatch at most one pending interrupt. Returns the cycles consumed,
    /// interrupt entry included.
    ///
    /// # Errors
    ///
    /// A fault aborts the step, latches [`RunState::Faulted`] and is returned.
    fn step(&mut self) -> Result<u32, Fault> {
        step_boundary(self).inspect_err(|fault| {
            warn!(pc = self.pc(), %fault, "step aborted");
            self.set_run_state(RunState::Faulted(fault.class()));
        })
    }

    /// Captures registers, cycle total and every address space.
    ///
    /// # Errors
    ///
    /// Propagates register read faults.
    fn snapshot(&self) -> Result<CpuSnapshot, Fault> {
        let registers = self
            .registers()
            .iter()
            .map(|register| -> Result<(String, u32), Fault> {
                Ok((register.name.to_owned(), self.read_register(register.name)?))
            })
            .collect::<Result<Vec<_>, Fault>>()?;
        let spaces = self
            .machine()
            .memory
            .iter()
            .map(|(_, space)| SpaceImage {
                name: space.name().to_owned(),
                bytes: space.to_vec(),
            })
            .collect();
        Ok(CpuSnapshot {
            version: SnapshotVersion::V1,
            family: self.family(),
            cycles: self.cycles(),
            registers,
            spaces,
        })
    }

    /// Restores a snapshot taken from the same family: memory first, then
    /// registers, then level interrupt conditions are re-read.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for a foreign family, an unknown space
    /// or an image whose size does not match.
    fn restore(&mut self, snapshot: &CpuSnapshot) -> Result<(), Fault> {
        if snapshot.family != self.family() {
            return Err(Fault::configuration(format!(
                "snapshot of {:?} restored into {:?}",
                snapshot.family,
                self.family()
            )));
        }
        let machine = self.machine_mut();
        for image in &snapshot.spaces {
            let id = machine
                .memory
                .find(&image.name)
                .ok_or_else(|| Fault::configuration(format!("no space {}", image.name)))?;
            let space = machine.memory.space_mut(id)?;
            if image.bytes.len() != space.size() as usize {
                return Err(Fault::configuration(format!(
                    "{}: image of {} bytes for size {}",
                    image.name,
                    image.bytes.len(),
                    space.size()
                )));
            }
            space.poke_slice(0, &image.bytes)?;
        }
        machine.clock.set_total(snapshot.cycles);
        for (name, value) in &snapshot.registers {
            if find_register(self.registers(), name).is_some() {
                self.write_register(name, *value)?;
            }
        }
        let machine = self.machine();
        machine.interrupts.refresh(&machine.memory)?;
        self.set_run_state(RunState::Running);
        Ok(())
    }
}

fn step_boundary<C: Cpu + ?Sized>(cpu: &mut C) -> Result<u32, Fault> {
    let pc = cpu.pc();
    let mut cycles = cpu.execute()?;
    cpu.machine_mut().advance(cycles)?;

    let maskable = cpu.maskable_enabled();
    if let Some(line) = cpu.machine().interrupts.pending(maskable) {
        let entry = cpu.enter_interrupt(line)?;
        cpu.machine_mut().advance(entry)?;
        cycles += entry;
    }
    trace!(pc, cycles, "step");
    Ok(cycles)
}

#[cfg(test)]
mod tests {
    use super::{Machine, RunState};
    use crate::{AddressSpace, FaultClass};

    #[test]
    fn run_state_default_is_running() {
        assert_eq!(RunState::default(), RunState::Running);
        assert_eq!(RunState::Halted.latched_fault(), None);
        assert_eq!(
            RunState::Faulted(FaultClass::Stack).latched_fault(),
            Some(FaultClass::Stack)
        );
    }

    #[test]
    fn machine_wires_conditions_through_memory() {
        let mut machine = Machine::new();
        let sfr = machine
            .memory
            .add(AddressSpace::flat("SFR", 0x100))
            .expect("first");
        let line = machine.interrupts.add_line("EXT", 0x03);
        machine
            .add_interrupt_condition(line, sfr, 0x88, 0x02)
            .expect("valid");
        machine
            .add_interrupt_rising_edge_condition(line, sfr, 0xA8, 0x01)
            .expect("valid");
        machine.memory.write(sfr, 0x88, 0x02).expect("in range");
        machine.memory.write(sfr, 0xA8, 0x01).expect("in range");
        assert_eq!(machine.interrupts.pending(true), Some(line));
        machine.advance(12).expect("no listeners");
        assert_eq!(machine.clock.total(), 12);
    }
}
