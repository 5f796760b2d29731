//! Bounded execution loops: a synchronous `run_until` and a worker thread
//! driven through a command channel.

use std::sync::mpsc::{self, Receiver, RecvError, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::{Cpu, CpuSnapshot, Fault, FaultClass, IdleClock, RunState, TraceEvent, TraceSink};

/// Where [`run_until`] stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunBoundary {
    /// Stop once at least this many cycles were consumed. `None` runs until
    /// another boundary is met.
    pub cycle_budget: Option<u64>,
    /// Stop before executing an instruction at any of these addresses.
    pub breakpoints: Vec<u16>,
    /// Exempts the first instruction of the run from the breakpoint check
    /// when it sits at this address, so continuing from a breakpoint stop
    /// makes progress.
    pub resume_from: Option<u16>,
    /// Stop when the core enters [`RunState::Halted`].
    pub stop_on_halt: bool,
}

impl RunBoundary {
    /// Boundary that only limits cycles.
    #[must_use]
    pub const fn cycles(budget: u64) -> Self {
        Self {
            cycle_budget: Some(budget),
            breakpoints: Vec::new(),
            resume_from: None,
            stop_on_halt: false,
        }
    }

    /// Adds a breakpoint.
    #[must_use]
    pub fn with_breakpoint(mut self, pc: u16) -> Self {
        self.breakpoints.push(pc);
        self
    }

    /// Continues from a breakpoint stop at `pc`.
    #[must_use]
    pub const fn resuming_from(mut self, pc: u16) -> Self {
        self.resume_from = Some(pc);
        self
    }

    /// Stops on halt as well.
    #[must_use]
    pub const fn with_stop_on_halt(mut self) -> Self {
        self.stop_on_halt = true;
        self
    }
}

/// Why a run returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The cycle budget was used up.
    BudgetExhausted,
    /// The next instruction sits on a breakpoint.
    Breakpoint(u16),
    /// The core halted.
    Halted,
    /// A step faulted; the run state holds its class.
    Faulted(Fault),
    /// The core was already faulted when the run started.
    Latched(FaultClass),
}

/// Aggregated result of a [`run_until`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Steps completed, the faulting one excluded.
    pub steps: u64,
    /// Cycles consumed by this run.
    pub cycles: u64,
    /// Stop condition.
    pub reason: StopReason,
}

/// Steps `cpu` until a boundary is met, reporting each instruction to `sink`.
///
/// A core already latched in [`RunState::Faulted`] returns at once. A
/// breakpoint at the next instruction wins over an exhausted budget.
pub fn run_until<C>(
    cpu: &mut C,
    boundary: &RunBoundary,
    mut sink: Option<&mut dyn TraceSink>,
) -> RunOutcome
where
    C: Cpu + ?Sized,
{
    let mut steps = 0u64;
    let mut cycles = 0u64;
    loop {
        if let RunState::Faulted(class) = cpu.run_state() {
            return RunOutcome {
                steps,
                cycles,
                reason: StopReason::Latched(class),
            };
        }
        let pc = cpu.pc();
        let resuming = steps == 0 && boundary.resume_from == Some(pc);
        if !resuming && boundary.breakpoints.contains(&pc) {
            return RunOutcome {
                steps,
                cycles,
                reason: StopReason::Breakpoint(pc),
            };
        }
        if boundary
            .cycle_budget
            .is_some_and(|budget| cycles >= budget)
        {
            return RunOutcome {
                steps,
                cycles,
                reason: StopReason::BudgetExhausted,
            };
        }
        if let Some(sink) = sink.as_deref_mut() {
            sink.on_event(TraceEvent::InstructionStart { pc });
        }
        match cpu.step() {
            Ok(elapsed) => {
                steps += 1;
                cycles += u64::from(elapsed);
                if let Some(sink) = sink.as_deref_mut() {
                    sink.on_event(TraceEvent::InstructionRetired {
                        pc,
                        cycles: elapsed,
                        next_pc: cpu.pc(),
                    });
                }
            }
            Err(fault) => {
                if let Some(sink) = sink.as_deref_mut() {
                    sink.on_event(TraceEvent::FaultRaised {
                        pc,
                        class: fault.class(),
                    });
                }
                return RunOutcome {
                    steps,
                    cycles,
                    reason: StopReason::Faulted(fault),
                };
            }
        }
        if boundary.stop_on_halt && cpu.run_state() == RunState::Halted {
            return RunOutcome {
                steps,
                cycles,
                reason: StopReason::Halted,
            };
        }
    }
}

/// Commands accepted by a [`Runner`] worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run in slices until paused or a boundary stops the core. A breakpoint
    /// at the current address is stepped over; the `Stopped` reply totals
    /// every slice of the run.
    Run,
    /// Stop running after the current slice.
    Pause,
    /// Execute exactly one step.
    Step,
    /// Reset the core.
    Reset,
    /// Replace the breakpoint list.
    SetBreakpoints(Vec<u16>),
    /// Reply with a snapshot.
    Snapshot,
    /// Exit the worker.
    Shutdown,
}

/// Notifications sent back by a [`Runner`] worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    /// The core stopped running.
    Stopped(RunOutcome),
    /// Reply to [`Command::Snapshot`].
    Snapshot(Box<CpuSnapshot>),
    /// The core was reset.
    Reset,
    /// A command failed.
    Failed(Fault),
}

/// Cycles executed between command polls while running.
const SLICE_CYCLES: u64 = 10_000;

/// Owns a CPU on a dedicated thread.
///
/// Cores hold non-`Send` observers, so the CPU is built by a factory inside
/// the worker. The shared [`IdleClock`] is handed to the factory for
/// peripherals that wait on host I/O; reset and shutdown cancel it so a
/// blocked wait returns promptly.
#[derive(Debug)]
pub struct Runner {
    commands: Sender<Command>,
    events: Receiver<RunnerEvent>,
    idle: IdleClock,
    handle: Option<JoinHandle<()>>,
}

impl Runner {
    /// Spawns the worker and builds the CPU on it.
    ///
    /// # Errors
    ///
    /// Returns the factory's fault, or a configuration fault if the thread
    /// could not be started.
    pub fn spawn<F>(idle: IdleClock, factory: F) -> Result<Self, Fault>
    where
        F: FnOnce(IdleClock) -> Result<Box<dyn Cpu>, Fault> + Send + 'static,
    {
        let (commands, command_rx) = mpsc::channel();
        let (event_tx, events) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let worker_idle = idle.clone();
        let handle = thread::Builder::new()
            .name("retro-core-runner".into())
            .spawn(move || match factory(worker_idle.clone()) {
                Ok(cpu) => {
                    if ready_tx.send(Ok(())).is_ok() {
                        worker(cpu, &worker_idle, &command_rx, &event_tx);
                    }
                }
                Err(fault) => {
                    let _ = ready_tx.send(Err(fault));
                }
            })
            .map_err(|error| Fault::configuration(format!("runner thread: {error}")))?;
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(fault)) => {
                let _ = handle.join();
                return Err(fault);
            }
            Err(RecvError) => {
                let _ = handle.join();
                return Err(Fault::configuration("runner thread exited during start"));
            }
        }
        info!("runner started");
        Ok(Self {
            commands,
            events,
            idle,
            handle: Some(handle),
        })
    }

    /// Queues a command. Reset cancels pending idle waits first.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if the worker has exited.
    pub fn send(&self, command: Command) -> Result<(), Fault> {
        if matches!(command, Command::Reset | Command::Shutdown) {
            self.idle.cancel();
        }
        self.commands
            .send(command)
            .map_err(|_| Fault::configuration("runner worker is gone"))
    }

    /// Blocks for the next worker event.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if the worker has exited.
    pub fn recv(&self) -> Result<RunnerEvent, Fault> {
        self.events
            .recv()
            .map_err(|_| Fault::configuration("runner worker is gone"))
    }

    /// Requests a snapshot and waits for it, skipping other events.
    ///
    /// # Errors
    ///
    /// Returns the worker's fault or a configuration fault if it has exited.
    pub fn snapshot(&self) -> Result<CpuSnapshot, Fault> {
        self.send(Command::Snapshot)?;
        loop {
            match self.recv()? {
                RunnerEvent::Snapshot(snapshot) => return Ok(*snapshot),
                RunnerEvent::Failed(fault) => return Err(fault),
                RunnerEvent::Stopped(_) | RunnerEvent::Reset => {}
            }
        }
    }

    /// Stops the worker and waits for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.send(Command::Shutdown);
            if handle.join().is_err() {
                warn!("runner thread panicked");
            }
            info!("runner stopped");
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker(
    mut cpu: Box<dyn Cpu>,
    idle: &IdleClock,
    commands: &Receiver<Command>,
    events: &Sender<RunnerEvent>,
) {
    let mut running = false;
    let mut breakpoints = Vec::new();
    // set when a run starts, consumed by its first slice only
    let mut resume_from = None;
    let mut steps = 0u64;
    let mut cycles = 0u64;
    loop {
        let command = if running {
            match commands.try_recv() {
                Ok(command) => Some(command),
                Err(mpsc::TryRecvError::Empty) => None,
                Err(mpsc::TryRecvError::Disconnected) => return,
            }
        } else {
            match commands.recv() {
                Ok(command) => Some(command),
                Err(RecvError) => return,
            }
        };

        let reply = match command {
            None => None,
            Some(Command::Run) => {
                if !running {
                    running = true;
                    resume_from = Some(cpu.pc());
                    steps = 0;
                    cycles = 0;
                }
                None
            }
            Some(Command::Pause) => {
                running = false;
                None
            }
            Some(Command::Step) => {
                running = false;
                let boundary = RunBoundary::cycles(1);
                Some(RunnerEvent::Stopped(run_until(cpu.as_mut(), &boundary, None)))
            }
            Some(Command::Reset) => {
                running = false;
                idle.resume();
                info!(family = ?cpu.family(), "runner reset");
                Some(match cpu.reset() {
                    Ok(()) => RunnerEvent::Reset,
                    Err(fault) => RunnerEvent::Failed(fault),
                })
            }
            Some(Command::SetBreakpoints(list)) => {
                debug!(count = list.len(), "breakpoints replaced");
                breakpoints = list;
                None
            }
            Some(Command::Snapshot) => Some(match cpu.snapshot() {
                Ok(snapshot) => RunnerEvent::Snapshot(Box::new(snapshot)),
                Err(fault) => RunnerEvent::Failed(fault),
            }),
            Some(Command::Shutdown) => return,
        };
        if let Some(event) = reply {
            if events.send(event).is_err() {
                return;
            }
        }

        if running {
            let boundary = RunBoundary {
                cycle_budget: Some(SLICE_CYCLES),
                breakpoints: breakpoints.clone(),
                resume_from: resume_from.take(),
                stop_on_halt: false,
            };
            let slice = run_until(cpu.as_mut(), &boundary, None);
            steps += slice.steps;
            cycles += slice.cycles;
            if slice.reason != StopReason::BudgetExhausted {
                running = false;
                if let StopReason::Faulted(fault) = &slice.reason {
                    warn!(pc = cpu.pc(), %fault, "runner stopped on fault");
                }
                let outcome = RunOutcome {
                    steps,
                    cycles,
                    reason: slice.reason,
                };
                if events.send(RunnerEvent::Stopped(outcome)).is_err() {
                    return;
                }
            }
        }
    }
}
