//! Short programs run through `build_cpu` on every family: results, cycle
//! totals, trace events, disassembly and snapshots.

#![allow(clippy::pedantic, clippy::nursery, clippy::cast_possible_truncation)]

use proptest as _;
use retro_core::{
    build_cpu, load_binary, load_intel_hex, run_until, Cpu, Family, FaultClass, IdleClock,
    MachineConfig, RunBoundary, RunState, SpaceId, StopReason, TraceEvent,
};
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

const MEMORY: SpaceId = SpaceId(0);

fn cpu_for(family: Family) -> Box<dyn Cpu> {
    build_cpu(&MachineConfig::for_family(family), IdleClock::default())
        .expect("builds")
        .cpu
}

/// Loads `program` at `origin` and points the family's reset path at it.
fn boot(family: Family, origin: u16, program: &[u8]) -> Box<dyn Cpu> {
    let mut cpu = cpu_for(family);
    let memory = &mut cpu.machine_mut().memory;
    load_binary(memory, MEMORY, u32::from(origin), program).expect("fits");
    match family {
        Family::M6502 => {
            load_binary(memory, MEMORY, 0xFFFC, &origin.to_le_bytes()).expect("fits");
        }
        Family::M68hc05 => {
            load_binary(memory, MEMORY, 0x1FFE, &origin.to_be_bytes()).expect("fits");
        }
        Family::Mcs51 | Family::I8080 | Family::Z80 => {}
    }
    cpu.reset().expect("reset");
    cpu.set_pc(origin);
    cpu
}

#[rstest]
// MOV A,#0x3C ; ADD A,#0xC4 ; SJMP $
#[case(Family::Mcs51, &[0x74, 0x3C, 0x24, 0xC4, 0x80, 0xFE], 2, 2, 0x00)]
// MVI A,0x0F ; INR A ; HLT
#[case(Family::I8080, &[0x3E, 0x0F, 0x3C, 0x76], 3, 7 + 5 + 7, 0x10)]
// LD A,0x7F ; INC A ; HALT
#[case(Family::Z80, &[0x3E, 0x7F, 0x3C, 0x76], 3, 7 + 4 + 4, 0x80)]
// LDA #$FF ; CLC ; ADC #$01
#[case(Family::M6502, &[0xA9, 0xFF, 0x18, 0x69, 0x01], 3, 6, 0x00)]
// LDA #$40 ; ADD #$40 ; NOP
#[case(Family::M68hc05, &[0xA6, 0x40, 0xAB, 0x40, 0x9D], 3, 6, 0x80)]
fn short_program_results(
    #[case] family: Family,
    #[case] program: &[u8],
    #[case] steps: u64,
    #[case] cycles: u64,
    #[case] accumulator: u32,
) {
    let mut cpu = boot(family, 0x0200, program);
    let mut events: Vec<TraceEvent> = Vec::new();
    let boundary = RunBoundary::default().with_stop_on_halt();
    let boundary = RunBoundary {
        cycle_budget: Some(cycles),
        ..boundary
    };
    let outcome = run_until(cpu.as_mut(), &boundary, Some(&mut events));
    assert_eq!(outcome.steps, steps);
    assert_eq!(outcome.cycles, cycles);
    assert_eq!(cpu.cycles(), cycles);
    assert_eq!(cpu.read_register("A"), Ok(accumulator));
    assert_eq!(events.len() as u64, 2 * steps);
    assert_eq!(events.first(), Some(&TraceEvent::InstructionStart { pc: 0x0200 }));
}

#[test]
fn mcs51_flags_after_add() {
    let mut cpu = boot(Family::Mcs51, 0, &[0x74, 0x3C, 0x24, 0xC4]);
    run_until(cpu.as_mut(), &RunBoundary::cycles(2), None);
    // CY and AC set, OV and P clear
    assert_eq!(cpu.read_register("PSW").map(|psw| psw & 0xC5), Ok(0xC0));
}

#[test]
fn intel_and_zilog_halt() {
    for family in [Family::I8080, Family::Z80] {
        let mut cpu = boot(family, 0, &[0x76]);
        let outcome = run_until(
            cpu.as_mut(),
            &RunBoundary::cycles(100).with_stop_on_halt(),
            None,
        );
        assert_eq!(outcome.reason, StopReason::Halted);
        assert_eq!(cpu.run_state(), RunState::Halted);
        assert_eq!(cpu.pc(), 1);
    }
}

#[test]
fn z80_increment_overflows_into_sign() {
    let mut cpu = boot(Family::Z80, 0, &[0x3E, 0x7F, 0x3C]);
    run_until(cpu.as_mut(), &RunBoundary::cycles(11), None);
    assert_eq!(cpu.read_register("F").map(|f| f & 0x84), Ok(0x84));
}

#[test]
fn m6502_carry_and_zero() {
    let mut cpu = boot(Family::M6502, 0x0200, &[0xA9, 0xFF, 0x18, 0x69, 0x01]);
    run_until(cpu.as_mut(), &RunBoundary::cycles(6), None);
    assert_eq!(cpu.read_register("P").map(|p| p & 0xC3), Ok(0x03));
}

#[rstest]
#[case(Family::Z80, &[0xDD, 0x00])]
#[case(Family::M6502, &[0x02])]
#[case(Family::M68hc05, &[0x41])]
#[case(Family::Mcs51, &[0xA5])]
fn undefined_opcode_latches_a_fault(#[case] family: Family, #[case] program: &[u8]) {
    let mut cpu = boot(family, 0x0200, program);
    let outcome = run_until(cpu.as_mut(), &RunBoundary::cycles(10), None);
    assert!(matches!(outcome.reason, StopReason::Faulted(_)));
    assert_eq!(
        cpu.run_state(),
        RunState::Faulted(FaultClass::UnsupportedOperation)
    );
    let again = run_until(cpu.as_mut(), &RunBoundary::cycles(10), None);
    assert_eq!(
        again.reason,
        StopReason::Latched(FaultClass::UnsupportedOperation)
    );
    assert_eq!(again.steps, 0);
}

#[test]
fn breakpoints_stop_before_the_instruction() {
    // NOP x4
    let mut cpu = boot(Family::Z80, 0, &[0x00; 4]);
    let outcome = run_until(
        cpu.as_mut(),
        &RunBoundary::cycles(100).with_breakpoint(3),
        None,
    );
    assert_eq!(outcome.reason, StopReason::Breakpoint(3));
    assert_eq!(outcome.steps, 3);
    assert_eq!(cpu.pc(), 3);
}

#[test]
fn resuming_checks_every_breakpoint_after_the_first_instruction() {
    // NOP x8
    let mut cpu = boot(Family::Z80, 0, &[0x00; 8]);
    let at_start = run_until(
        cpu.as_mut(),
        &RunBoundary::cycles(100).with_breakpoint(0),
        None,
    );
    assert_eq!(at_start.reason, StopReason::Breakpoint(0));
    assert_eq!(at_start.steps, 0);

    let boundary = RunBoundary::cycles(100)
        .with_breakpoint(0)
        .with_breakpoint(2)
        .resuming_from(0);
    let outcome = run_until(cpu.as_mut(), &boundary, None);
    assert_eq!(outcome.reason, StopReason::Breakpoint(2));
    assert_eq!(outcome.steps, 2);
}

#[test]
fn breakpoint_wins_over_an_exhausted_budget() {
    let mut cpu = boot(Family::Z80, 0, &[0x00; 4]);
    let outcome = run_until(
        cpu.as_mut(),
        &RunBoundary::cycles(8).with_breakpoint(2),
        None,
    );
    assert_eq!(outcome.reason, StopReason::Breakpoint(2));
    assert_eq!(outcome.cycles, 8);
}

#[test]
fn snapshot_restores_registers_and_memory() {
    let mut cpu = boot(Family::M6502, 0x0200, &[0xA9, 0x42, 0x85, 0x10, 0xA9, 0x00]);
    let before = cpu.snapshot().expect("readable");
    run_until(cpu.as_mut(), &RunBoundary::cycles(7), None);
    assert_eq!(cpu.machine().memory.peek(MEMORY, 0x10), Ok(0x42));
    assert_eq!(cpu.read_register("A"), Ok(0x00));

    cpu.restore(&before).expect("same family");
    assert_eq!(cpu.pc(), 0x0200);
    assert_eq!(cpu.cycles(), before.cycles);
    assert_eq!(cpu.machine().memory.peek(MEMORY, 0x10), Ok(0x00));
    assert_eq!(cpu.snapshot().expect("readable"), before);

    let foreign = cpu_for(Family::Z80).snapshot().expect("readable");
    assert!(cpu.restore(&foreign).is_err());
}

#[test]
fn disassembly_walks_a_program() {
    let cpu = boot(Family::I8080, 0, &[0x3E, 0x0F, 0xC3, 0x34, 0x12, 0x76]);
    let mut pc = 0u16;
    let mut listing = Vec::new();
    for _ in 0..3 {
        let (text, length) = cpu.disassemble(pc).expect("defined");
        listing.push(text);
        pc += u16::from(length);
    }
    assert_eq!(listing, ["MVI A,0x0f", "JMP 0x1234", "HLT"]);
}

#[test]
fn intel_hex_program_runs() {
    let mut cpu = cpu_for(Family::Mcs51);
    // MOV A,#0x57 at 0x0000
    let hex = ":02000000745733\n:00000001FF\n";
    let range =
        load_intel_hex(&mut cpu.machine_mut().memory, MEMORY, 0, hex).expect("valid image");
    assert_eq!((range.start, range.end), (0, 1));
    cpu.step().expect("defined");
    assert_eq!(cpu.read_register("A"), Ok(0x57));
}
