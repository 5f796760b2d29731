//! Interrupt condition semantics observed through a running machine.

#![allow(clippy::pedantic, clippy::nursery)]

use std::cell::Cell;
use std::rc::Rc;

use proptest as _;
use retro_core::families::m6502::{M6502, MEMORY};
use retro_core::families::mcs51::{sfr, Mcs51, Variant, CODE, DATA, SFR};
use retro_core::{
    AddressSpace, Cpu, Fault, InterruptController, LineId, MemoryMap, RunBoundary, SpaceId,
};
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

fn wired() -> (MemoryMap, SpaceId) {
    let mut memory = MemoryMap::new();
    let sfr = memory.add(AddressSpace::flat("SFR", 0x100)).expect("first");
    (memory, sfr)
}

#[rstest]
#[case(0x00, 0x00, false)]
#[case(0x01, 0x00, false)]
#[case(0x00, 0x80, false)]
#[case(0x01, 0x80, true)]
fn every_condition_must_hold(#[case] flag: u8, #[case] enable: u8, #[case] active: bool) {
    let (mut memory, sfr) = wired();
    let mut interrupts = InterruptController::new();
    let line = interrupts.add_line("EXT", 0x03);
    interrupts
        .add_condition(&mut memory, line, sfr, 0x88, 0x01)
        .expect("valid");
    interrupts
        .add_condition(&mut memory, line, sfr, 0xA8, 0x80)
        .expect("valid");
    memory.write(sfr, 0x88, flag).expect("in range");
    memory.write(sfr, 0xA8, enable).expect("in range");
    assert_eq!(interrupts.pending(true).is_some(), active);
}

#[test]
fn rising_edge_latches_until_service_ends() {
    let (mut memory, sfr) = wired();
    let mut interrupts = InterruptController::new();
    let line = interrupts.add_line("EDGE", 0x13);
    interrupts
        .add_rising_edge_condition(&mut memory, line, sfr, 0x90, 0x04)
        .expect("valid");

    memory.write(sfr, 0x90, 0x04).expect("in range");
    memory.write(sfr, 0x90, 0x00).expect("in range");
    assert_eq!(interrupts.pending(true), Some(line));

    assert_eq!(interrupts.begin_service(line, &mut memory), Ok(0x13));
    assert_eq!(interrupts.pending(true), None);
    assert_eq!(interrupts.end_service(), Some(line));
    assert_eq!(interrupts.pending(true), None);

    memory.write(sfr, 0x90, 0x04).expect("in range");
    assert_eq!(interrupts.pending(true), Some(line));
}

#[test]
fn level_follows_the_cell() {
    let (mut memory, sfr) = wired();
    let mut interrupts = InterruptController::new();
    let line = interrupts.add_line("LEVEL", 0x0B);
    interrupts
        .add_condition(&mut memory, line, sfr, 0x88, 0x20)
        .expect("valid");
    memory.write(sfr, 0x88, 0x20).expect("in range");
    assert_eq!(interrupts.pending(true), Some(line));
    memory.write(sfr, 0x88, 0x00).expect("in range");
    assert_eq!(interrupts.pending(true), None);
}

#[test]
fn registration_order_is_priority() {
    let (mut memory, sfr) = wired();
    let mut interrupts = InterruptController::new();
    let first = interrupts.add_line("FIRST", 0x03);
    let second = interrupts.add_line("SECOND", 0x0B);
    for line in [first, second] {
        interrupts
            .add_condition(&mut memory, line, sfr, 0x88, 0x01)
            .expect("valid");
    }
    memory.write(sfr, 0x88, 0x01).expect("in range");
    assert_eq!(interrupts.pending(true), Some(first));
    interrupts.begin_service(first, &mut memory).expect("known");
    assert_eq!(interrupts.pending(true), Some(second));
}

#[test]
fn masked_lines_wait_for_the_cpu() {
    let (mut memory, sfr) = wired();
    let mut interrupts = InterruptController::new();
    let maskable = interrupts.add_line("IRQ", 0xFFFE);
    let nmi = interrupts.add_non_maskable_line("NMI", 0xFFFA);
    interrupts
        .add_condition(&mut memory, maskable, sfr, 0x10, 0x01)
        .expect("valid");
    memory.write(sfr, 0x10, 0x01).expect("in range");
    assert_eq!(interrupts.pending(false), None);
    interrupts
        .add_condition(&mut memory, nmi, sfr, 0x11, 0x01)
        .expect("valid");
    memory.write(sfr, 0x11, 0x01).expect("in range");
    assert_eq!(interrupts.pending(false), Some(nmi));
}

#[test]
fn mcs51_external_interrupt_round_trip() {
    let mut cpu = Mcs51::new(Variant::I8051).expect("builds");
    // MOV IE,#0x81 ; SETB IE0 ; NOP ; NOP   vector 0x03: RETI
    let program = [0x75, 0xA8, 0x81, 0xD2, 0x89, 0x00, 0x00];
    let code = cpu.machine_mut().memory.space_mut(CODE).expect("code");
    code.poke_slice(0x30, &program).expect("fits");
    code.poke_slice(0x00, &[0x02, 0x00, 0x30]).expect("fits");
    code.poke(0x03, 0x32).expect("fits");

    assert_eq!(cpu.step(), Ok(2));
    assert_eq!(cpu.step(), Ok(2));
    assert_eq!(cpu.step(), Ok(1 + 2));
    assert_eq!(cpu.pc(), 0x03);
    assert_eq!(cpu.machine().memory.peek(SFR, sfr::TCON), Ok(0x00));
    assert_eq!(cpu.read_register("SP"), Ok(0x09));
    assert_eq!(cpu.machine().memory.peek(DATA, 0x08), Ok(0x35));
    assert!(cpu.machine().interrupts.is_servicing());

    let outcome = retro_core::run_until(&mut cpu, &RunBoundary::cycles(2), None);
    assert_eq!(outcome.steps, 1);
    assert_eq!(cpu.pc(), 0x35);
    assert!(!cpu.machine().interrupts.is_servicing());
}

/// 6502 with NOP NOP NOP CLI NOP NOP at 0x0200, RTI at the IRQ handler
/// 0x0300, and an IRQ line latched on the rising edge of 0x00F0 bit 0.
fn m6502_with_edge_irq() -> (M6502, LineId) {
    let mut cpu = M6502::new().expect("builds");
    let memory = cpu.machine_mut().memory.space_mut(MEMORY).expect("memory");
    memory
        .poke_slice(0x0200, &[0xEA, 0xEA, 0xEA, 0x58, 0xEA, 0xEA])
        .expect("fits");
    memory.poke(0x0300, 0x40).expect("fits");
    memory.poke_slice(0xFFFC, &[0x00, 0x02]).expect("fits");
    memory.poke_slice(0xFFFE, &[0x00, 0x03]).expect("fits");
    cpu.reset().expect("vector readable");
    let line = cpu.add_irq_line();
    cpu.machine_mut()
        .add_interrupt_rising_edge_condition(line, MEMORY, 0x00F0, 0x01)
        .expect("valid");
    (cpu, line)
}

#[test]
fn masked_edge_stays_latched_until_the_cpu_unmasks() {
    let (mut cpu, line) = m6502_with_edge_irq();
    let memory = &mut cpu.machine_mut().memory;
    memory.write(MEMORY, 0x00F0, 0x01).expect("in range");
    memory.write(MEMORY, 0x00F0, 0x00).expect("in range");

    for pc in [0x0201, 0x0202, 0x0203] {
        assert_eq!(cpu.step(), Ok(2));
        assert_eq!(cpu.pc(), pc);
        assert_eq!(cpu.machine().interrupts.pending(true), Some(line));
    }

    // CLI, then entry through the IRQ vector
    assert_eq!(cpu.step(), Ok(2 + 7));
    assert_eq!(cpu.pc(), 0x0300);
    assert_eq!(cpu.machine().interrupts.pending(true), None);
    assert_eq!(cpu.machine().memory.peek(MEMORY, 0x01FD), Ok(0x02));
    assert_eq!(cpu.machine().memory.peek(MEMORY, 0x01FC), Ok(0x04));

    assert_eq!(cpu.step(), Ok(6));
    assert_eq!(cpu.pc(), 0x0204);
    assert_eq!(cpu.step(), Ok(2));
    assert_eq!(cpu.pc(), 0x0205);
}

#[test]
fn cycle_listeners_see_every_step_cycle() {
    let (mut cpu, _) = m6502_with_edge_irq();
    let seen = Rc::new(Cell::new(0u64));
    let total = Rc::clone(&seen);
    cpu.machine_mut()
        .add_cycle_listener(move |elapsed: u32, _: &mut MemoryMap| -> Result<(), Fault> {
            total.set(total.get() + u64::from(elapsed));
            Ok(())
        });
    let memory = &mut cpu.machine_mut().memory;
    memory.write(MEMORY, 0x00F0, 0x01).expect("in range");

    let mut returned = 0u64;
    for _ in 0..6 {
        returned += u64::from(cpu.step().expect("runs"));
    }
    assert_eq!(returned, 3 * 2 + (2 + 7) + 6 + 2);
    assert_eq!(seen.get(), returned);
    assert_eq!(cpu.cycles(), returned);
}
