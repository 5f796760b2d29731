#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use tracing::debug;

use crate::Fault;

/// Read hook: receives the space, the address and the value read so far and
/// returns the value the reader will see.
pub type ReadObserver = Box<dyn FnMut(&AddressSpace, u32, u8) -> u8>;

/// Write hook: receives the space, the address, the new value and the value it
/// replaced. Hooks may write elsewhere in the same space.
pub type WriteObserver = Box<dyn FnMut(&mut AddressSpace, u32, u8, u8) -> Result<(), Fault>>;

/// Handle returned by observer registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Storage layout of an [`AddressSpace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum SpaceKind {
    /// Contiguous byte array.
    Flat,
    /// Concatenation of child spaces.
    Composite,
    /// Bank x page translated store.
    Banked,
    /// One active space out of several identically sized ones.
    Selector,
}

#[derive(Default)]
struct Observers {
    next_id: u64,
    reads: BTreeMap<u32, Vec<(ObserverId, ReadObserver)>>,
    writes: BTreeMap<u32, Vec<(ObserverId, WriteObserver)>>,
}

impl Observers {
    fn allocate(&mut self) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        id
    }
}

struct Composite {
    children: Vec<AddressSpace>,
    backing_space: Box<[u16]>,
    backing_offset: Box<[u32]>,
}

struct Banked {
    physical: Vec<u8>,
    page_size: u32,
    pages_per_bank: usize,
    banks: usize,
    bank: usize,
    shared: Range<u32>,
    pages: Vec<usize>,
    active: bool,
}

impl Banked {
    fn physical_index(&self, address: u32) -> usize {
        if !self.active {
            return address as usize;
        }
        let page = (address / self.page_size) as usize;
        let frame = self.pages[self.bank * self.pages_per_bank + page];
        frame * self.page_size as usize + (address % self.page_size) as usize
    }

    fn is_shared_page(&self, page: usize) -> bool {
        let start = page as u32 * self.page_size;
        start >= self.shared.start && start < self.shared.end
    }

    fn activate(&mut self) {
        let snapshot = std::mem::take(&mut self.physical);
        let mut frames = 0usize;
        let mut shared_frames = vec![None; self.pages_per_bank];
        for (page, slot) in shared_frames.iter_mut().enumerate() {
            if self.is_shared_page(page) {
                *slot = Some(frames);
                frames += 1;
            }
        }

        self.pages = Vec::with_capacity(self.banks * self.pages_per_bank);
        for _ in 0..self.banks {
            for shared in &shared_frames {
                let frame = shared.unwrap_or_else(|| {
                    let frame = frames;
                    frames += 1;
                    frame
                });
                self.pages.push(frame);
            }
        }

        let page_size = self.page_size as usize;
        self.physical = vec![0; frames * page_size];
        for (slot, frame) in self.pages.iter().enumerate() {
            let page = slot % self.pages_per_bank;
            let source = &snapshot[page * page_size..(page + 1) * page_size];
            self.physical[frame * page_size..(frame + 1) * page_size].copy_from_slice(source);
        }
        self.active = true;
    }
}

struct Selector {
    spaces: Vec<AddressSpace>,
    active: usize,
}

enum Storage {
    Flat(Box<[u8]>),
    Composite(Composite),
    Banked(Banked),
    Selector(Selector),
}

/// Named, fixed-size, byte-addressable store with per-address observers.
///
/// Every access is bounds-checked against `size` before any storage or
/// observer is touched; an out-of-range address is reported as
/// [`Fault::AddressOutOfRange`] and never wrapped.
///
/// Observers run synchronously in registration order. While the observers of
/// one address run they are detached from the space, so a hook that writes
/// its own address does not re-enter itself.
pub struct AddressSpace {
    name: String,
    size: u32,
    read_only: bool,
    storage: Storage,
    observers: Observers,
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("kind", &self.kind())
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl AddressSpace {
    /// Creates a zero-filled flat space.
    #[must_use]
    pub fn flat(name: impl Into<String>, size: u32) -> Self {
        Self::with_storage(
            name.into(),
            size,
            Storage::Flat(vec![0; size as usize].into_boxed_slice()),
        )
    }

    /// Concatenates `children` into one space; child `i` starts where child
    /// `i - 1` ends.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault when `children` is empty or the combined
    /// size does not fit a 32-bit address.
    pub fn composite(name: impl Into<String>, children: Vec<Self>) -> Result<Self, Fault> {
        let name = name.into();
        if children.is_empty() {
            return Err(Fault::configuration(format!("{name}: composite without children")));
        }
        let total: u64 = children.iter().map(|child| u64::from(child.size)).sum();
        let size = u32::try_from(total)
            .map_err(|_| Fault::configuration(format!("{name}: composite too large")))?;
        let child_count = u16::try_from(children.len())
            .map_err(|_| Fault::configuration(format!("{name}: too many children")))?;

        let mut backing_space = Vec::with_capacity(size as usize);
        let mut backing_offset = Vec::with_capacity(size as usize);
        for (index, child) in (0..child_count).zip(&children) {
            for offset in 0..child.size {
                backing_space.push(index);
                backing_offset.push(offset);
            }
        }

        Ok(Self::with_storage(
            name,
            size,
            Storage::Composite(Composite {
                children,
                backing_space: backing_space.into_boxed_slice(),
                backing_offset: backing_offset.into_boxed_slice(),
            }),
        ))
    }

    /// Creates a banked space of `size` bytes split into `page_size` pages,
    /// with `banks` banks once activated. Pages inside `shared` map to the
    /// same physical page in every bank.
    ///
    /// Until [`Self::activate_banking`] is called the space behaves exactly
    /// like a flat space of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for a zero page size, a page size that does
    /// not divide `size`, zero banks, or a shared range not aligned to pages.
    pub fn banked(
        name: impl Into<String>,
        size: u32,
        page_size: u32,
        banks: usize,
        shared: Range<u32>,
    ) -> Result<Self, Fault> {
        let name = name.into();
        if page_size == 0 || size % page_size != 0 {
            return Err(Fault::configuration(format!(
                "{name}: page size {page_size:#x} does not divide {size:#x}"
            )));
        }
        if banks == 0 {
            return Err(Fault::configuration(format!("{name}: zero banks")));
        }
        if shared.start % page_size != 0
            || shared.end % page_size != 0
            || shared.end > size
            || shared.start > shared.end
        {
            return Err(Fault::configuration(format!(
                "{name}: shared range {shared:?} not page aligned"
            )));
        }

        Ok(Self::with_storage(
            name,
            size,
            Storage::Banked(Banked {
                physical: vec![0; size as usize],
                page_size,
                pages_per_bank: (size / page_size) as usize,
                banks,
                bank: 0,
                shared,
                pages: Vec::new(),
                active: false,
            }),
        ))
    }

    /// Wraps identically sized spaces of which exactly one is visible at a time.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault when `spaces` is empty or sizes differ.
    pub fn selector(name: impl Into<String>, spaces: Vec<Self>) -> Result<Self, Fault> {
        let name = name.into();
        let Some(first) = spaces.first() else {
            return Err(Fault::configuration(format!("{name}: selector without spaces")));
        };
        let size = first.size;
        if let Some(odd) = spaces.iter().find(|space| space.size != size) {
            return Err(Fault::configuration(format!(
                "{name}: {} has size {:#x}, expected {size:#x}",
                odd.name, odd.size
            )));
        }
        Ok(Self::with_storage(
            name,
            size,
            Storage::Selector(Selector { spaces, active: 0 }),
        ))
    }

    fn with_storage(name: String, size: u32, storage: Storage) -> Self {
        Self {
            name,
            size,
            read_only: false,
            storage,
            observers: Observers::default(),
        }
    }

    /// Space name used in diagnostics and snapshots.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of addressable bytes.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Storage layout of this space.
    #[must_use]
    pub const fn kind(&self) -> SpaceKind {
        match self.storage {
            Storage::Flat(_) => SpaceKind::Flat,
            Storage::Composite(_) => SpaceKind::Composite,
            Storage::Banked(_) => SpaceKind::Banked,
            Storage::Selector(_) => SpaceKind::Selector,
        }
    }

    /// Returns `true` when [`Self::write`] leaves contents untouched.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Marks the space read-only. Loaders and [`Self::poke`] still modify it.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Builder form of [`Self::set_read_only`].
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn check(&self, address: u32) -> Result<(), Fault> {
        if address < self.size {
            Ok(())
        } else {
            Err(Fault::out_of_range(&self.name, address, self.size))
        }
    }

    /// Reads one byte, passing it through every read observer at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::AddressOutOfRange`] when `address >= size`.
    pub fn read(&mut self, address: u32) -> Result<u8, Fault> {
        self.check(address)?;
        let mut value = match &mut self.storage {
            Storage::Flat(bytes) => bytes[address as usize],
            Storage::Composite(composite) => {
                let child = usize::from(composite.backing_space[address as usize]);
                let offset = composite.backing_offset[address as usize];
                composite.children[child].read(offset)?
            }
            Storage::Banked(banked) => banked.physical[banked.physical_index(address)],
            Storage::Selector(selector) => selector.spaces[selector.active].read(address)?,
        };

        if let Some(mut hooks) = self.observers.reads.remove(&address) {
            for (_, hook) in &mut hooks {
                value = hook(self, address, value);
            }
            let slot = self.observers.reads.entry(address).or_default();
            hooks.append(slot);
            *slot = hooks;
        }
        Ok(value)
    }

    /// Stores one byte, then runs every write observer at `address` with the
    /// new and previous values. Writes to a read-only space are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::AddressOutOfRange`] when `address >= size`, or the first
    /// fault raised by an observer.
    pub fn write(&mut self, address: u32, value: u8) -> Result<(), Fault> {
        self.check(address)?;
        if self.read_only {
            return Ok(());
        }
        let old = self.peek(address)?;
        match &mut self.storage {
            Storage::Flat(bytes) => bytes[address as usize] = value,
            Storage::Composite(composite) => {
                let child = usize::from(composite.backing_space[address as usize]);
                let offset = composite.backing_offset[address as usize];
                composite.children[child].write(offset, value)?;
            }
            Storage::Banked(banked) => {
                let index = banked.physical_index(address);
                banked.physical[index] = value;
            }
            Storage::Selector(selector) => {
                selector.spaces[selector.active].write(address, value)?;
            }
        }

        if let Some(mut hooks) = self.observers.writes.remove(&address) {
            let mut outcome = Ok(());
            let mut current = value;
            for (_, hook) in &mut hooks {
                outcome = hook(self, address, current, old);
                if outcome.is_err() {
                    break;
                }
                // a hook may have rewritten the cell; later hooks see the result
                match self.peek(address) {
                    Ok(stored) => current = stored,
                    Err(fault) => {
                        outcome = Err(fault);
                        break;
                    }
                }
            }
            let slot = self.observers.writes.entry(address).or_default();
            hooks.append(slot);
            *slot = hooks;
            outcome?;
        }
        Ok(())
    }

    /// Reads the stored byte without running observers.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::AddressOutOfRange`] when `address >= size`.
    pub fn peek(&self, address: u32) -> Result<u8, Fault> {
        self.check(address)?;
        match &self.storage {
            Storage::Flat(bytes) => Ok(bytes[address as usize]),
            Storage::Composite(composite) => {
                let child = usize::from(composite.backing_space[address as usize]);
                composite.children[child].peek(composite.backing_offset[address as usize])
            }
            Storage::Banked(banked) => Ok(banked.physical[banked.physical_index(address)]),
            Storage::Selector(selector) => selector.spaces[selector.active].peek(address),
        }
    }

    /// Stores a byte without running observers, ignoring the read-only flag.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::AddressOutOfRange`] when `address >= size`.
    pub fn poke(&mut self, address: u32, value: u8) -> Result<(), Fault> {
        self.check(address)?;
        match &mut self.storage {
            Storage::Flat(bytes) => bytes[address as usize] = value,
            Storage::Composite(composite) => {
                let child = usize::from(composite.backing_space[address as usize]);
                let offset = composite.backing_offset[address as usize];
                composite.children[child].poke(offset, value)?;
            }
            Storage::Banked(banked) => {
                let index = banked.physical_index(address);
                banked.physical[index] = value;
            }
            Storage::Selector(selector) => {
                selector.spaces[selector.active].poke(address, value)?;
            }
        }
        Ok(())
    }

    /// Copies `bytes` to `base..base + len` with [`Self::poke`].
    ///
    /// # Errors
    ///
    /// Returns [`Fault::AddressOutOfRange`] if the range leaves the space; bytes
    /// before the failing address have already been stored.
    pub fn poke_slice(&mut self, base: u32, bytes: &[u8]) -> Result<(), Fault> {
        for (delta, &byte) in bytes.iter().enumerate() {
            let address = u32::try_from(delta)
                .ok()
                .and_then(|delta| base.checked_add(delta))
                .ok_or_else(|| Fault::out_of_range(&self.name, u32::MAX, self.size))?;
            self.poke(address, byte)?;
        }
        Ok(())
    }

    /// Fills every visible cell with `value`, bypassing observers.
    pub fn fill(&mut self, value: u8) {
        match &mut self.storage {
            Storage::Flat(bytes) => bytes.fill(value),
            Storage::Composite(composite) => {
                for child in &mut composite.children {
                    child.fill(value);
                }
            }
            Storage::Banked(banked) => banked.physical.fill(value),
            Storage::Selector(selector) => selector.spaces[selector.active].fill(value),
        }
    }

    /// Copies the currently visible contents into a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        (0..self.size)
            .map(|address| self.peek(address).unwrap_or_default())
            .collect()
    }

    /// Registers a read observer for `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::AddressOutOfRange`] when `address >= size`.
    pub fn add_read_observer(
        &mut self,
        address: u32,
        observer: impl FnMut(&Self, u32, u8) -> u8 + 'static,
    ) -> Result<ObserverId, Fault> {
        self.check(address)?;
        let id = self.observers.allocate();
        self.observers
            .reads
            .entry(address)
            .or_default()
            .push((id, Box::new(observer)));
        Ok(id)
    }

    /// Registers a write observer for `address`.
    ///
    /// Observers run in registration order. Each receives the value stored
    /// after the previous observer returned, so a hook that masks or rewrites
    /// its own cell is seen by later hooks such as interrupt conditions. The
    /// observers of `address` are not re-entered by writes they make to it.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::AddressOutOfRange`] when `address >= size`.
    pub fn add_write_observer(
        &mut self,
        address: u32,
        observer: impl FnMut(&mut Self, u32, u8, u8) -> Result<(), Fault> + 'static,
    ) -> Result<ObserverId, Fault> {
        self.check(address)?;
        let id = self.observers.allocate();
        self.observers
            .writes
            .entry(address)
            .or_default()
            .push((id, Box::new(observer)));
        Ok(id)
    }

    /// Unregisters an observer. Returns `false` if `id` is unknown.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let mut removed = false;
        self.observers.reads.retain(|_, hooks| {
            let before = hooks.len();
            hooks.retain(|(hook_id, _)| *hook_id != id);
            removed |= hooks.len() != before;
            !hooks.is_empty()
        });
        self.observers.writes.retain(|_, hooks| {
            let before = hooks.len();
            hooks.retain(|(hook_id, _)| *hook_id != id);
            removed |= hooks.len() != before;
            !hooks.is_empty()
        });
        removed
    }

    /// Number of read and write observers registered at `address`.
    #[must_use]
    pub fn observer_count(&self, address: u32) -> usize {
        self.observers.reads.get(&address).map_or(0, Vec::len)
            + self.observers.writes.get(&address).map_or(0, Vec::len)
    }

    /// Child spaces of a composite, in address order.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match &self.storage {
            Storage::Composite(composite) => &composite.children,
            Storage::Selector(selector) => &selector.spaces,
            Storage::Flat(_) | Storage::Banked(_) => &[],
        }
    }

    /// Mutable access to child `index` of a composite or selector.
    pub fn child_mut(&mut self, index: usize) -> Option<&mut Self> {
        match &mut self.storage {
            Storage::Composite(composite) => composite.children.get_mut(index),
            Storage::Selector(selector) => selector.spaces.get_mut(index),
            Storage::Flat(_) | Storage::Banked(_) => None,
        }
    }

    /// Switches a banked space from flat behavior to page-table routing.
    ///
    /// Current contents are replicated into every bank, so reads immediately
    /// after activation return what they returned before. Activating twice is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::Unsupported`] when the space is not banked.
    pub fn activate_banking(&mut self) -> Result<(), Fault> {
        let Storage::Banked(banked) = &mut self.storage else {
            return Err(Fault::Unsupported(format!("{} is not banked", self.name)));
        };
        if !banked.active {
            banked.activate();
            debug!(space = %self.name, banks = banked.banks, "banking activated");
        }
        Ok(())
    }

    /// Makes `bank` the visible bank of a banked space.
    ///
    /// Before activation the bank number is recorded and takes effect once
    /// banking is activated.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::Unsupported`] for a non-banked space and a configuration
    /// fault for a bank number past the configured count.
    pub fn select_bank(&mut self, bank: usize) -> Result<(), Fault> {
        let Storage::Banked(banked) = &mut self.storage else {
            return Err(Fault::Unsupported(format!("{} is not banked", self.name)));
        };
        if bank >= banked.banks {
            return Err(Fault::configuration(format!(
                "{}: bank {bank} of {}",
                self.name, banked.banks
            )));
        }
        banked.bank = bank;
        Ok(())
    }

    /// Current bank of a banked space, `None` for other layouts.
    #[must_use]
    pub const fn bank(&self) -> Option<usize> {
        match &self.storage {
            Storage::Banked(banked) => Some(banked.bank),
            _ => None,
        }
    }

    /// Returns `true` once a banked space routes through its page table.
    #[must_use]
    pub const fn is_banking_active(&self) -> bool {
        matches!(&self.storage, Storage::Banked(banked) if banked.active)
    }

    /// Makes space `index` visible in a selector.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::Unsupported`] for a non-selector space and a
    /// configuration fault for an index past the number of spaces.
    pub fn select(&mut self, index: usize) -> Result<(), Fault> {
        let Storage::Selector(selector) = &mut self.storage else {
            return Err(Fault::Unsupported(format!("{} is not a selector", self.name)));
        };
        if index >= selector.spaces.len() {
            return Err(Fault::configuration(format!(
                "{}: selector index {index} of {}",
                self.name,
                selector.spaces.len()
            )));
        }
        selector.active = index;
        Ok(())
    }

    /// Visible index of a selector, `None` for other layouts.
    #[must_use]
    pub const fn selected(&self) -> Option<usize> {
        match &self.storage {
            Storage::Selector(selector) => Some(selector.active),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::{AddressSpace, SpaceKind};
    use crate::{Fault, FaultClass};

    #[test]
    fn out_of_range_is_addressing_fault_not_wrapped() {
        let mut space = AddressSpace::flat("DATA", 0x80);
        let fault = space.write(0x80, 1).expect_err("past the end");
        assert_eq!(fault.class(), FaultClass::Addressing);
        assert_eq!(space.peek(0), Ok(0));
        assert!(space.read(0x1_0000).is_err());
    }

    #[test]
    fn write_observer_sees_new_and_old_values() {
        let mut space = AddressSpace::flat("SFR", 0x100);
        space.poke(0x90, 0x0F).expect("in range");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        space
            .add_write_observer(0x90, move |_, address, new, old| {
                log.borrow_mut().push((address, new, old));
                Ok(())
            })
            .expect("in range");

        space.write(0x90, 0xF0).expect("in range");
        space.write(0x91, 0x55).expect("in range");
        assert_eq!(*seen.borrow(), vec![(0x90, 0xF0, 0x0F)]);
    }

    #[test]
    fn read_observers_chain_in_registration_order() {
        let mut space = AddressSpace::flat("SFR", 0x100);
        space.poke(0x10, 0x01).expect("in range");
        space
            .add_read_observer(0x10, |_, _, value| value | 0x80)
            .expect("in range");
        space
            .add_read_observer(0x10, |_, _, value| value.wrapping_add(1))
            .expect("in range");
        assert_eq!(space.read(0x10), Ok(0x82));
        assert_eq!(space.peek(0x10), Ok(0x01));
    }

    #[test]
    fn observer_may_write_its_own_address_without_recursion() {
        let mut space = AddressSpace::flat("SFR", 0x10);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        space
            .add_write_observer(3, move |space, address, new, _| {
                counter.set(counter.get() + 1);
                space.write(address, new & 0x0F)?;
                space.write(4, new)
            })
            .expect("in range");
        space.write(3, 0xAB).expect("in range");
        assert_eq!(calls.get(), 1);
        assert_eq!(space.peek(3), Ok(0x0B));
        assert_eq!(space.peek(4), Ok(0xAB));
        assert_eq!(space.observer_count(3), 1);
    }

    #[test]
    fn observer_fault_propagates_to_writer() {
        let mut space = AddressSpace::flat("IO", 4);
        space
            .add_write_observer(1, |_, _, _, _| Err(Fault::Unsupported("port".into())))
            .expect("in range");
        assert_eq!(
            space.write(1, 9),
            Err(Fault::Unsupported("port".into()))
        );
    }

    #[test]
    fn removed_observer_no_longer_runs() {
        let mut space = AddressSpace::flat("IO", 4);
        let id = space
            .add_read_observer(2, |_, _, _| 0xEE)
            .expect("in range");
        assert_eq!(space.read(2), Ok(0xEE));
        assert!(space.remove_observer(id));
        assert!(!space.remove_observer(id));
        assert_eq!(space.read(2), Ok(0));
    }

    #[test]
    fn read_only_space_ignores_writes_but_accepts_poke() {
        let mut rom = AddressSpace::flat("ROM", 16).read_only();
        rom.write(0, 0x12).expect("in range");
        assert_eq!(rom.peek(0), Ok(0));
        rom.poke(0, 0x12).expect("in range");
        assert_eq!(rom.read(0), Ok(0x12));
    }

    #[test]
    fn composite_routes_to_children() {
        let low = AddressSpace::flat("LOW", 0x80);
        let high = AddressSpace::flat("HIGH", 0x80);
        let mut data = AddressSpace::composite("DATA", vec![low, high]).expect("children");
        assert_eq!(data.size(), 0x100);
        assert_eq!(data.kind(), SpaceKind::Composite);
        data.write(0x7F, 1).expect("in range");
        data.write(0x80, 2).expect("in range");
        assert_eq!(data.children()[0].peek(0x7F), Ok(1));
        assert_eq!(data.children()[1].peek(0x00), Ok(2));
        assert!(data.read(0x100).is_err());
    }

    #[test]
    fn composite_runs_child_observers() {
        let mut high = AddressSpace::flat("HIGH", 0x10);
        high.add_read_observer(1, |_, _, _| 0x5A).expect("in range");
        let low = AddressSpace::flat("LOW", 0x10);
        let mut data = AddressSpace::composite("DATA", vec![low, high]).expect("children");
        assert_eq!(data.read(0x11), Ok(0x5A));
    }

    #[test]
    fn empty_composite_is_configuration_fault() {
        let fault = AddressSpace::composite("X", Vec::new()).expect_err("no children");
        assert_eq!(fault.class(), FaultClass::Configuration);
    }

    #[test]
    fn banked_space_replicates_on_activation_and_isolates_banks() {
        let mut code = AddressSpace::banked("CODE", 0x400, 0x100, 4, 0x300..0x400).expect("valid");
        code.write(0x010, 0xAA).expect("in range");
        code.write(0x310, 0xBB).expect("in range");
        code.activate_banking().expect("banked");

        for bank in 0..4 {
            code.select_bank(bank).expect("valid bank");
            assert_eq!(code.read(0x010), Ok(0xAA));
            assert_eq!(code.read(0x310), Ok(0xBB));
        }

        code.select_bank(1).expect("valid bank");
        code.write(0x010, 0x11).expect("in range");
        code.write(0x311, 0x22).expect("in range");
        code.select_bank(2).expect("valid bank");
        assert_eq!(code.read(0x010), Ok(0xAA));
        assert_eq!(code.read(0x311), Ok(0x22));
        code.select_bank(1).expect("valid bank");
        assert_eq!(code.read(0x010), Ok(0x11));
    }

    #[test]
    fn banked_rejects_bad_geometry() {
        assert!(AddressSpace::banked("X", 0x300, 0x200, 2, 0..0).is_err());
        assert!(AddressSpace::banked("X", 0x400, 0x100, 0, 0..0).is_err());
        assert!(AddressSpace::banked("X", 0x400, 0x100, 2, 0x80..0x100).is_err());
        let mut space = AddressSpace::banked("X", 0x400, 0x100, 2, 0..0).expect("valid");
        assert!(space.select_bank(2).is_err());
        assert!(AddressSpace::flat("F", 1).activate_banking().is_err());
    }

    #[test]
    fn selector_swaps_backing_store() {
        let first = AddressSpace::flat("A", 8);
        let second = AddressSpace::flat("B", 8);
        let mut window = AddressSpace::selector("WIN", vec![first, second]).expect("same size");
        window.write(0, 1).expect("in range");
        window.select(1).expect("valid index");
        assert_eq!(window.read(0), Ok(0));
        window.write(0, 2).expect("in range");
        window.select(0).expect("valid index");
        assert_eq!(window.read(0), Ok(1));
        assert_eq!(window.selected(), Some(0));
        assert!(window.select(2).is_err());
    }

    #[test]
    fn selector_rejects_mismatched_sizes() {
        let fault = AddressSpace::selector(
            "WIN",
            vec![AddressSpace::flat("A", 8), AddressSpace::flat("B", 9)],
        )
        .expect_err("sizes differ");
        assert_eq!(fault.class(), FaultClass::Configuration);
    }

    #[test]
    fn fill_and_snapshot_cover_whole_space() {
        let mut space = AddressSpace::flat("ROM", 4);
        space.fill(0xFF);
        space.poke_slice(1, &[1, 2]).expect("in range");
        assert_eq!(space.to_vec(), vec![0xFF, 1, 2, 0xFF]);
        assert!(space.poke_slice(3, &[1, 2]).is_err());
    }
}
