//! Address spaces and the per-machine memory map.

/// Machine-wide space collection.
pub mod map;
/// Address space storage variants and observers.
pub mod space;

pub use map::{MemoryMap, SpaceId};
pub use space::{AddressSpace, ObserverId, ReadObserver, SpaceKind, WriteObserver};
