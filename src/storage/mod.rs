//! Data storage and persistence
//!
//! This module holds the node's mutable state: the pending transaction pool,
//! the published chain with its version counter, and the durable block store
//! behind it.

pub mod chain_store;
pub mod ledger;
pub mod memory_pool;

pub use chain_store::{ChainStore, MemoryChainStore, SledChainStore};
pub use ledger::Ledger;
pub use memory_pool::{MemoryPool, SubmitOutcome};
