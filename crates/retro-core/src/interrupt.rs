//! Condition-driven interrupt lines and registration-order dispatch.
//!
//! A line is active when every one of its conditions is active. Conditions
//! watch one address through a write observer, so their state follows every
//! observed write to the watched cell. Dispatch picks the earliest registered
//! line that is enabled, active and not already in service.

use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

use crate::{Fault, MemoryMap, SpaceId};

/// Index of a line in its [`InterruptController`], in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LineId(pub usize);

/// How a condition reacts to writes of its watched cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Trigger {
    /// Active while the masked bits are non-zero.
    Level,
    /// Latched on a zero to non-zero transition of the masked bits, held
    /// until the owning line returns from service.
    RisingEdge,
}

/// Address + mask + trigger predicate.
#[derive(Debug)]
pub struct Condition {
    space: SpaceId,
    address: u32,
    mask: u8,
    trigger: Trigger,
    active: Cell<bool>,
}

impl Condition {
    /// Watched space.
    #[must_use]
    pub const fn space(&self) -> SpaceId {
        self.space
    }

    /// Watched address.
    #[must_use]
    pub const fn address(&self) -> u32 {
        self.address
    }

    /// Watched bits.
    #[must_use]
    pub const fn mask(&self) -> u8 {
        self.mask
    }

    /// Trigger mode.
    #[must_use]
    pub const fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Current state.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    fn observe(&self, new: u8, old: u8) {
        match self.trigger {
            Trigger::Level => self.active.set(new & self.mask != 0),
            Trigger::RisingEdge => {
                if old & self.mask == 0 && new & self.mask != 0 {
                    self.active.set(true);
                }
            }
        }
    }
}

/// Named interrupt source with a fixed vector.
#[derive(Debug)]
pub struct InterruptLine {
    name: String,
    vector: u16,
    enabled: bool,
    non_maskable: bool,
    conditions: Vec<Rc<Condition>>,
    clear_on_entry: Vec<(SpaceId, u32, u8)>,
    dispatched: u64,
}

impl InterruptLine {
    /// Line name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vector: an address for most families, a data-bus byte for Z80 mode 2.
    #[must_use]
    pub const fn vector(&self) -> u16 {
        self.vector
    }

    /// Software enable switch, independent of the CPU's global mask.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Non-maskable lines ignore the CPU's global mask.
    #[must_use]
    pub const fn is_non_maskable(&self) -> bool {
        self.non_maskable
    }

    /// All conditions active. A line without conditions is never active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(|c| c.is_active())
    }

    /// Conditions in registration order.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> + '_ {
        self.conditions.iter().map(|condition| &**condition)
    }

    /// Number of times the line has been dispatched.
    #[must_use]
    pub const fn dispatch_count(&self) -> u64 {
        self.dispatched
    }

    fn reset_edges(&self) {
        for condition in &self.conditions {
            if condition.trigger == Trigger::RisingEdge {
                condition.active.set(false);
            }
        }
    }
}

/// Interrupt lines of one machine plus the in-service stack.
#[derive(Debug, Default)]
pub struct InterruptController {
    lines: Vec<InterruptLine>,
    in_service: Vec<LineId>,
}

impl InterruptController {
    /// Creates a controller without lines.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            in_service: Vec::new(),
        }
    }

    /// Registers a maskable line. Earlier lines win over later ones.
    pub fn add_line(&mut self, name: impl Into<String>, vector: u16) -> LineId {
        self.push_line(name.into(), vector, false)
    }

    /// Registers a line that ignores the CPU's global mask.
    pub fn add_non_maskable_line(&mut self, name: impl Into<String>, vector: u16) -> LineId {
        self.push_line(name.into(), vector, true)
    }

    fn push_line(&mut self, name: String, vector: u16, non_maskable: bool) -> LineId {
        let id = LineId(self.lines.len());
        self.lines.push(InterruptLine {
            name,
            vector,
            enabled: true,
            non_maskable,
            conditions: Vec::new(),
            clear_on_entry: Vec::new(),
            dispatched: 0,
        });
        id
    }

    fn line_mut(&mut self, id: LineId) -> Result<&mut InterruptLine, Fault> {
        self.lines
            .get_mut(id.0)
            .ok_or_else(|| Fault::configuration(format!("no interrupt line {}", id.0)))
    }

    /// Line by id.
    #[must_use]
    pub fn line(&self, id: LineId) -> Option<&InterruptLine> {
        self.lines.get(id.0)
    }

    /// Lines in priority order.
    pub fn lines(&self) -> impl Iterator<Item = (LineId, &InterruptLine)> + '_ {
        self.lines.iter().enumerate().map(|(i, line)| (LineId(i), line))
    }

    /// Finds a line by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<LineId> {
        self.lines.iter().position(|line| line.name == name).map(LineId)
    }

    /// Flips the software enable switch of a line.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for an unknown line.
    pub fn set_enabled(&mut self, id: LineId, enabled: bool) -> Result<(), Fault> {
        self.line_mut(id)?.enabled = enabled;
        Ok(())
    }

    /// Adds a level condition: active while `space[address] & mask != 0`.
    ///
    /// The condition starts from the cell's current value.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for an unknown line or space and an
    /// addressing fault for an out-of-range address.
    pub fn add_condition(
        &mut self,
        memory: &mut MemoryMap,
        id: LineId,
        space: SpaceId,
        address: u32,
        mask: u8,
    ) -> Result<(), Fault> {
        self.attach(memory, id, space, address, mask, Trigger::Level)
    }

    /// Adds a rising-edge condition: latches when the masked bits go from
    /// zero to non-zero and stays active until the line's service ends.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for an unknown line or space and an
    /// addressing fault for an out-of-range address.
    pub fn add_rising_edge_condition(
        &mut self,
        memory: &mut MemoryMap,
        id: LineId,
        space: SpaceId,
        address: u32,
        mask: u8,
    ) -> Result<(), Fault> {
        self.attach(memory, id, space, address, mask, Trigger::RisingEdge)
    }

    fn attach(
        &mut self,
        memory: &mut MemoryMap,
        id: LineId,
        space: SpaceId,
        address: u32,
        mask: u8,
        trigger: Trigger,
    ) -> Result<(), Fault> {
        let initial = match trigger {
            Trigger::Level => memory.peek(space, address)? & mask != 0,
            Trigger::RisingEdge => false,
        };
        let line = self.line_mut(id)?;
        let condition = Rc::new(Condition {
            space,
            address,
            mask,
            trigger,
            active: Cell::new(initial),
        });
        let watched = Rc::clone(&condition);
        memory
            .space_mut(space)?
            .add_write_observer(address, move |_, _, new, old| {
                watched.observe(new, old);
                Ok(())
            })?;
        line.conditions.push(condition);
        Ok(())
    }

    /// Bits cleared through an observed write when the line is dispatched,
    /// modeling flags the hardware clears on vectoring.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for an unknown line.
    pub fn clear_on_entry(
        &mut self,
        id: LineId,
        space: SpaceId,
        address: u32,
        mask: u8,
    ) -> Result<(), Fault> {
        self.line_mut(id)?.clear_on_entry.push((space, address, mask));
        Ok(())
    }

    /// Highest priority line ready for dispatch.
    ///
    /// Lines already in service are skipped. Maskable lines are only
    /// considered when `maskable_enabled` is set.
    #[must_use]
    pub fn pending(&self, maskable_enabled: bool) -> Option<LineId> {
        self.lines
            .iter()
            .enumerate()
            .find(|(index, line)| {
                line.enabled
                    && (line.non_maskable || maskable_enabled)
                    && !self.in_service.contains(&LineId(*index))
                    && line.is_active()
            })
            .map(|(index, _)| LineId(index))
    }

    /// Returns `true` while any line is in service.
    #[must_use]
    pub fn is_servicing(&self) -> bool {
        !self.in_service.is_empty()
    }

    /// In-service stack, innermost last.
    #[must_use]
    pub fn in_service(&self) -> &[LineId] {
        &self.in_service
    }

    /// Marks `id` as in service, clears its clear-on-entry bits and returns
    /// its vector.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for an unknown line, or a fault raised
    /// while clearing the entry bits.
    pub fn begin_service(&mut self, id: LineId, memory: &mut MemoryMap) -> Result<u16, Fault> {
        let line = self.line_mut(id)?;
        line.dispatched += 1;
        let vector = line.vector;
        let clears = line.clear_on_entry.clone();
        debug!(line = %line.name, vector, "interrupt dispatch");
        self.in_service.push(id);
        for (space, address, mask) in clears {
            let value = memory.peek(space, address)?;
            memory.write(space, address, value & !mask)?;
        }
        Ok(vector)
    }

    /// Dispatch for families whose re-entry gate is a CPU flag rather than
    /// the in-service stack: clears the entry bits and resets the line's edge
    /// latches immediately. Returns the vector.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for an unknown line, or a fault raised
    /// while clearing the entry bits.
    pub fn acknowledge(&mut self, id: LineId, memory: &mut MemoryMap) -> Result<u16, Fault> {
        let line = self.line_mut(id)?;
        line.dispatched += 1;
        line.reset_edges();
        let vector = line.vector;
        let clears = line.clear_on_entry.clone();
        debug!(line = %line.name, vector, "interrupt acknowledged");
        for (space, address, mask) in clears {
            let value = memory.peek(space, address)?;
            memory.write(space, address, value & !mask)?;
        }
        Ok(vector)
    }

    /// Ends the innermost service: pops it and resets the line's edge
    /// conditions. Returns the line that ended, `None` when nothing was in
    /// service.
    pub fn end_service(&mut self) -> Option<LineId> {
        let id = self.in_service.pop()?;
        if let Some(line) = self.lines.get(id.0) {
            line.reset_edges();
            debug!(line = %line.name, "interrupt return");
        }
        Some(id)
    }

    /// Clears the in-service stack and every edge latch.
    pub fn reset(&mut self) {
        self.in_service.clear();
        for line in &self.lines {
            line.reset_edges();
        }
    }

    /// Re-reads every level condition from memory, for use after contents
    /// were changed without observers (snapshot restore, loaders).
    ///
    /// # Errors
    ///
    /// Propagates faults from reading watched cells.
    pub fn refresh(&self, memory: &MemoryMap) -> Result<(), Fault> {
        for condition in self.lines.iter().flat_map(|line| &line.conditions) {
            if condition.trigger == Trigger::Level {
                let value = memory.peek(condition.space, condition.address)?;
                condition.active.set(value & condition.mask != 0);
            }
        }
        Ok(())
    }
}
