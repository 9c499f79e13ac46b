//! The ledger node
//!
//! Wires the chain, memory pool, miner, peer registry, sync and event bus
//! into the operations the HTTP API exposes.

pub mod service;

pub use service::{BlockReceipt, NodeService};
