//! Threaded runner lifecycle.

#![allow(clippy::pedantic, clippy::nursery)]

use proptest as _;
use retro_core::{
    build_cpu, Command, Family, IdleClock, MachineConfig, RunOutcome, Runner, RunnerEvent,
    StopReason,
};
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

fn z80_runner() -> Runner {
    Runner::spawn(IdleClock::default(), |idle| {
        build_cpu(&MachineConfig::for_family(Family::Z80), idle).map(|built| built.cpu)
    })
    .expect("spawns")
}

fn stopped(runner: &Runner) -> RunOutcome {
    match runner.recv().expect("worker alive") {
        RunnerEvent::Stopped(outcome) => outcome,
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn run_to_breakpoint_then_step() {
    let runner = z80_runner();
    runner
        .send(Command::SetBreakpoints(vec![0x0100]))
        .expect("queued");
    runner.send(Command::Run).expect("queued");
    let outcome = stopped(&runner);
    // memory is zeroed, so every instruction is a 4-cycle NOP
    assert_eq!(outcome.reason, StopReason::Breakpoint(0x0100));
    assert_eq!(outcome.steps, 0x100);
    assert_eq!(outcome.cycles, 0x100 * 4);

    runner.send(Command::Step).expect("queued");
    assert_eq!(stopped(&runner).steps, 1);
    let snapshot = runner.snapshot().expect("taken");
    assert_eq!(snapshot.family, Family::Z80);
    assert_eq!(snapshot.register("PC"), Some(0x0101));
    assert_eq!(snapshot.cycles, 0x101 * 4);
    runner.shutdown();
}

#[test]
fn breakpoint_on_a_slice_boundary_stops_the_run() {
    let runner = z80_runner();
    // 2500 NOPs use up exactly one 10,000-cycle slice
    runner
        .send(Command::SetBreakpoints(vec![0x09C4, 0x0A00]))
        .expect("queued");
    runner.send(Command::Run).expect("queued");
    let outcome = stopped(&runner);
    assert_eq!(outcome.reason, StopReason::Breakpoint(0x09C4));
    assert_eq!(outcome.steps, 2500);
    assert_eq!(outcome.cycles, 10_000);

    // continuing steps over the breakpoint it stopped on
    runner.send(Command::Run).expect("queued");
    let outcome = stopped(&runner);
    assert_eq!(outcome.reason, StopReason::Breakpoint(0x0A00));
    assert_eq!(outcome.steps, 0x0A00 - 0x09C4);
    assert_eq!(outcome.cycles, (0x0A00 - 0x09C4) * 4);
    let snapshot = runner.snapshot().expect("taken");
    assert_eq!(snapshot.cycles, 0x0A00 * 4);
    runner.shutdown();
}

#[test]
fn reset_returns_to_the_vector() {
    let runner = z80_runner();
    runner.send(Command::Step).expect("queued");
    stopped(&runner);
    runner.send(Command::Reset).expect("queued");
    assert_eq!(runner.recv(), Ok(RunnerEvent::Reset));
    let snapshot = runner.snapshot().expect("taken");
    assert_eq!(snapshot.register("PC"), Some(0));
}

#[test]
fn factory_fault_is_reported() {
    let config = MachineConfig {
        family: Family::M68hc05,
        m68hc05_memory: 1000,
        ..MachineConfig::default()
    };
    let spawned = Runner::spawn(IdleClock::default(), move |idle| {
        build_cpu(&config, idle).map(|built| built.cpu)
    });
    assert!(spawned.is_err());
}
