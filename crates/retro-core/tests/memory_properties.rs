//! Property coverage for address spaces, relative branches and the cycle
//! clock.

#![allow(clippy::pedantic, clippy::nursery, clippy::cast_possible_truncation)]

use std::cell::Cell;
use std::rc::Rc;

use proptest::prelude::*;
use retro_core::{
    relative_target, sign_extend8, AddressSpace, Fault, InterruptController, Machine, MemoryMap,
};
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

fn layouts(size: u32) -> Vec<AddressSpace> {
    let half = size / 2;
    vec![
        AddressSpace::flat("FLAT", size),
        AddressSpace::composite(
            "COMPOSITE",
            vec![AddressSpace::flat("LOW", half), AddressSpace::flat("HIGH", size - half)],
        )
        .expect("children"),
        AddressSpace::banked("BANKED", size, 0x40, 4, 0..0x40).expect("aligned"),
        AddressSpace::selector(
            "SELECTOR",
            vec![AddressSpace::flat("A", size), AddressSpace::flat("B", size)],
        )
        .expect("same size"),
    ]
}

proptest! {
    #[test]
    fn write_then_read_returns_the_value(address in 0u32..0x200, value in any::<u8>()) {
        for mut space in layouts(0x200) {
            space.write(address, value).expect("in range");
            prop_assert_eq!(space.read(address), Ok(value));
            prop_assert_eq!(space.peek(address), Ok(value));
        }
    }

    #[test]
    fn out_of_range_is_never_wrapped(offset in 0u32..0x1000) {
        for mut space in layouts(0x200) {
            let address = 0x200 + offset;
            let fault = space.read(address);
            let is_range_fault = matches!(fault, Err(Fault::AddressOutOfRange { .. }));
            prop_assert!(is_range_fault);
            prop_assert!(space.write(address, 0).is_err());
        }
    }

    #[test]
    fn banks_keep_their_own_contents(
        page in 1u32..8,
        offset in 0u32..0x40,
        values in proptest::array::uniform4(any::<u8>()),
    ) {
        let mut space = AddressSpace::banked("BANKED", 0x200, 0x40, 4, 0..0x40).expect("aligned");
        space.activate_banking().expect("banked");
        let address = page * 0x40 + offset;
        for (bank, value) in values.iter().enumerate() {
            space.select_bank(bank).expect("configured");
            space.write(address, *value).expect("in range");
        }
        for (bank, value) in values.iter().enumerate() {
            space.select_bank(bank).expect("configured");
            prop_assert_eq!(space.read(address), Ok(*value));
        }
    }

    #[test]
    fn shared_page_is_the_same_in_every_bank(offset in 0u32..0x40, value in any::<u8>()) {
        let mut space = AddressSpace::banked("BANKED", 0x200, 0x40, 4, 0..0x40).expect("aligned");
        space.activate_banking().expect("banked");
        space.select_bank(2).expect("configured");
        space.write(offset, value).expect("in range");
        for bank in 0..4 {
            space.select_bank(bank).expect("configured");
            prop_assert_eq!(space.peek(offset), Ok(value));
        }
    }

    #[test]
    fn relative_branch_wraps_sixteen_bits(pc in any::<u16>(), length in 1u8..=3, offset in any::<u8>()) {
        let expected = (i32::from(pc) + i32::from(length) + i32::from(sign_extend8(offset))) & 0xFFFF;
        prop_assert_eq!(u32::from(relative_target(pc, length, offset)), expected as u32);
    }

    #[test]
    fn listeners_see_every_cycle(steps in proptest::collection::vec(1u32..64, 1..50)) {
        let mut machine = Machine::new();
        let first = Rc::new(Cell::new(0u64));
        let second = Rc::new(Cell::new(0u64));
        let seen = Rc::clone(&first);
        machine.add_cycle_listener(move |elapsed: u32, _: &mut MemoryMap| -> Result<(), Fault> {
            seen.set(seen.get() + u64::from(elapsed));
            Ok(())
        });
        let seen = Rc::clone(&second);
        machine.add_cycle_listener(move |elapsed: u32, _: &mut MemoryMap| -> Result<(), Fault> {
            seen.set(seen.get() + u64::from(elapsed));
            Ok(())
        });
        for elapsed in &steps {
            machine.advance(*elapsed).expect("listeners succeed");
        }
        let total: u64 = steps.iter().map(|elapsed| u64::from(*elapsed)).sum();
        prop_assert_eq!(machine.clock.total(), total);
        prop_assert_eq!(first.get(), total);
        prop_assert_eq!(second.get(), total);
    }
}

#[test]
fn banking_activation_keeps_visible_contents() {
    let mut space = AddressSpace::banked("BANKED", 0x100, 0x40, 2, 0..0).expect("aligned");
    space.write(0x80, 0x5A).expect("in range");
    space.activate_banking().expect("banked");
    space.select_bank(1).expect("configured");
    assert_eq!(space.read(0x80), Ok(0x5A));
    space.write(0x80, 0xA5).expect("in range");
    space.select_bank(0).expect("configured");
    assert_eq!(space.read(0x80), Ok(0x5A));
}

#[test]
fn read_only_space_ignores_writes_but_accepts_pokes() {
    let mut rom = AddressSpace::flat("ROM", 0x10).read_only();
    rom.write(0, 0x12).expect("ignored, not faulted");
    assert_eq!(rom.read(0), Ok(0));
    rom.poke(0, 0x34).expect("in range");
    assert_eq!(rom.read(0), Ok(0x34));
}

#[test]
fn observers_run_in_registration_order() {
    let mut space = AddressSpace::flat("SFR", 0x100);
    let log = Rc::new(std::cell::RefCell::new(Vec::new()));
    for tag in ["first", "second"] {
        let log = Rc::clone(&log);
        space
            .add_write_observer(0x90, move |_, _, new, old| {
                log.borrow_mut().push((tag, new, old));
                Ok(())
            })
            .expect("in range");
    }
    space
        .add_read_observer(0x90, |_, _, value| value ^ 0xFF)
        .expect("in range");
    space.write(0x90, 0x0F).expect("in range");
    assert_eq!(*log.borrow(), vec![("first", 0x0F, 0x00), ("second", 0x0F, 0x00)]);
    assert_eq!(space.read(0x90), Ok(0xF0));
    assert_eq!(space.peek(0x90), Ok(0x0F));
}

#[test]
fn later_observers_see_a_rewritten_cell() {
    let mut memory = MemoryMap::new();
    let sfr = memory.add(AddressSpace::flat("SFR", 0x100)).expect("first");
    // only the low nibble of 0x40 is writable
    memory
        .space_mut(sfr)
        .expect("added")
        .add_write_observer(0x40, |space, address, new, _| {
            space.write(address, new & 0x0F)
        })
        .expect("in range");
    let mut interrupts = InterruptController::new();
    let line = interrupts.add_line("MASKED", 0x0B);
    interrupts
        .add_condition(&mut memory, line, sfr, 0x40, 0x80)
        .expect("valid");

    memory.write(sfr, 0x40, 0x81).expect("in range");
    assert_eq!(memory.peek(sfr, 0x40), Ok(0x01));
    assert_eq!(interrupts.pending(true), None);
}
