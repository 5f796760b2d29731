//! Machine-wide collection of address spaces.

use super::AddressSpace;
use crate::Fault;

/// Index of an [`AddressSpace`] inside a [`MemoryMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SpaceId(pub u8);

/// Every address space of one machine, in creation order.
///
/// Families create their spaces in a fixed order, so the returned
/// [`SpaceId`]s can be published as constants.
#[derive(Debug, Default)]
pub struct MemoryMap {
    spaces: Vec<AddressSpace>,
}

impl MemoryMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self { spaces: Vec::new() }
    }

    /// Appends `space` and returns its id.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault when the name is already taken or more
    /// than 256 spaces are added.
    pub fn add(&mut self, space: AddressSpace) -> Result<SpaceId, Fault> {
        if self.find(space.name()).is_some() {
            return Err(Fault::configuration(format!(
                "duplicate address space {}",
                space.name()
            )));
        }
        let id = u8::try_from(self.spaces.len())
            .map_err(|_| Fault::configuration("too many address spaces"))?;
        self.spaces.push(space);
        Ok(SpaceId(id))
    }

    /// Looks a space up by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<SpaceId> {
        self.spaces
            .iter()
            .position(|space| space.name() == name)
            .and_then(|index| u8::try_from(index).ok())
            .map(SpaceId)
    }

    /// Number of spaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    /// Returns `true` when no space has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Iterates `(id, space)` pairs in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (SpaceId, &AddressSpace)> + '_ {
        (0u8..).zip(&self.spaces).map(|(id, space)| (SpaceId(id), space))
    }

    /// Shared access to a space.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for an unknown id.
    pub fn space(&self, id: SpaceId) -> Result<&AddressSpace, Fault> {
        self.spaces
            .get(usize::from(id.0))
            .ok_or_else(|| Fault::configuration(format!("no address space {}", id.0)))
    }

    /// Exclusive access to a space.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for an unknown id.
    pub fn space_mut(&mut self, id: SpaceId) -> Result<&mut AddressSpace, Fault> {
        self.spaces
            .get_mut(usize::from(id.0))
            .ok_or_else(|| Fault::configuration(format!("no address space {}", id.0)))
    }

    /// Observed read, see [`AddressSpace::read`].
    ///
    /// # Errors
    ///
    /// Propagates unknown-space and addressing faults.
    pub fn read(&mut self, id: SpaceId, address: u32) -> Result<u8, Fault> {
        self.space_mut(id)?.read(address)
    }

    /// Observed write, see [`AddressSpace::write`].
    ///
    /// # Errors
    ///
    /// Propagates unknown-space, addressing and observer faults.
    pub fn write(&mut self, id: SpaceId, address: u32, value: u8) -> Result<(), Fault> {
        self.space_mut(id)?.write(address, value)
    }

    /// Unobserved read, see [`AddressSpace::peek`].
    ///
    /// # Errors
    ///
    /// Propagates unknown-space and addressing faults.
    pub fn peek(&self, id: SpaceId, address: u32) -> Result<u8, Fault> {
        self.space(id)?.peek(address)
    }

    /// Unobserved write, see [`AddressSpace::poke`].
    ///
    /// # Errors
    ///
    /// Propagates unknown-space and addressing faults.
    pub fn poke(&mut self, id: SpaceId, address: u32, value: u8) -> Result<(), Fault> {
        self.space_mut(id)?.poke(address, value)
    }

    /// Reads a little-endian word from `address` and `address + 1`.
    ///
    /// # Errors
    ///
    /// Propagates addressing faults of either byte.
    pub fn read_u16_le(&mut self, id: SpaceId, address: u32) -> Result<u16, Fault> {
        let low = self.read(id, address)?;
        let high = self.read(id, address + 1)?;
        Ok(u16::from_le_bytes([low, high]))
    }

    /// Reads a big-endian word from `address` and `address + 1`.
    ///
    /// # Errors
    ///
    /// Propagates addressing faults of either byte.
    pub fn read_u16_be(&mut self, id: SpaceId, address: u32) -> Result<u16, Fault> {
        let high = self.read(id, address)?;
        let low = self.read(id, address + 1)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    /// Unobserved little-endian word read.
    ///
    /// # Errors
    ///
    /// Propagates addressing faults of either byte.
    pub fn peek_u16_le(&self, id: SpaceId, address: u32) -> Result<u16, Fault> {
        let low = self.peek(id, address)?;
        let high = self.peek(id, address + 1)?;
        Ok(u16::from_le_bytes([low, high]))
    }

    /// Unobserved big-endian word read.
    ///
    /// # Errors
    ///
    /// Propagates addressing faults of either byte.
    pub fn peek_u16_be(&self, id: SpaceId, address: u32) -> Result<u16, Fault> {
        let high = self.peek(id, address)?;
        let low = self.peek(id, address + 1)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    /// Writes a little-endian word, low byte first.
    ///
    /// # Errors
    ///
    /// Propagates addressing and observer faults of either byte.
    pub fn write_u16_le(&mut self, id: SpaceId, address: u32, value: u16) -> Result<(), Fault> {
        let [low, high] = value.to_le_bytes();
        self.write(id, address, low)?;
        self.write(id, address + 1, high)
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryMap, SpaceId};
    use crate::{AddressSpace, FaultClass};

    #[test]
    fn ids_follow_creation_order() {
        let mut map = MemoryMap::new();
        assert_eq!(map.add(AddressSpace::flat("CODE", 16)), Ok(SpaceId(0)));
        assert_eq!(map.add(AddressSpace::flat("DATA", 16)), Ok(SpaceId(1)));
        assert_eq!(map.find("DATA"), Some(SpaceId(1)));
        assert_eq!(map.find("XDATA"), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut map = MemoryMap::new();
        map.add(AddressSpace::flat("CODE", 16)).expect("first");
        let fault = map.add(AddressSpace::flat("CODE", 8)).expect_err("dup");
        assert_eq!(fault.class(), FaultClass::Configuration);
    }

    #[test]
    fn word_helpers_respect_byte_order() {
        let mut map = MemoryMap::new();
        let id = map.add(AddressSpace::flat("MEM", 4)).expect("first");
        map.write_u16_le(id, 0, 0x1234).expect("in range");
        assert_eq!(map.peek(id, 0), Ok(0x34));
        assert_eq!(map.read_u16_le(id, 0), Ok(0x1234));
        assert_eq!(map.read_u16_be(id, 0), Ok(0x3412));
        assert!(map.read_u16_le(id, 3).is_err());
    }

    #[test]
    fn unknown_space_is_configuration_fault() {
        let mut map = MemoryMap::new();
        let fault = map.read(SpaceId(3), 0).expect_err("missing");
        assert_eq!(fault.class(), FaultClass::Configuration);
    }
}
