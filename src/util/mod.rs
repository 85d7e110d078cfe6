//! Small, broadly-shared utilities. Analogous to the teacher's top-level
//! `util` module, trimmed to what a single-process allocator/GC needs.

pub mod address;
pub mod constants;
pub mod conversions;
pub mod rust_util;

pub use address::Address;
