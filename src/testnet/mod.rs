//! Test helpers shared by the unit tests
//!
//! Deterministic chain builders, signing keys and an in-process peer
//! transport.

pub mod test_utils;

pub use test_utils::*;
