//! Command-line interface
//!
//! Argument parsing for the `ledger-node` binary.

pub mod commands;

pub use commands::{Command, Opt, StartNodeArgs};
