//! CPU family implementations over the shared [`crate::Machine`].

pub mod i8080;
pub mod m6502;
pub mod m68hc05;
pub mod mcs51;
pub mod z80;
