//! # Ledger Node - a small proof-of-work ledger that gossips over HTTP
//!
//! Every node keeps a full copy of the chain, collects transactions in its
//! memory pool, mines them into blocks and converges with its peers by
//! adopting the longest valid chain it hears about.
//!
//! ## How I Organized My Code
//! - `core/`: hashing, transactions, blocks, proof of work, chain validation,
//!   the miner and the longest-chain rule
//! - `storage/`: the memory pool, the sled chain store and the `Ledger` that
//!   owns the current chain
//! - `network/`: the HTTP API, the peer transport, chain sync and the event
//!   feed behind `/stream`
//! - `node/`: `NodeService`, which ties all of the above together
//! - `config/`: settings from TOML, environment and CLI flags
//! - `utils/`: hashing and signature helpers
//! - `cli/`: command-line parsing for the binary
//!
//! ## When I Need to Understand Something
//! 1. Start with `node/service.rs` to see every operation a node supports
//! 2. Look at `core/chain.rs` for what makes a chain valid
//! 3. Check `storage/ledger.rs` for how the chain is swapped safely
//! 4. Review `network/sync.rs` for how nodes converge

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod node;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{
    AppendOutcome, Block, Chain, ConsensusResolver, Miner, MiningOutcome, ProofOfWork,
    Transaction, TxValidity,
};
pub use error::{BlockchainError, Result};
pub use network::{EventBroadcaster, HttpTransport, NodeEvent, PeerTransport, SyncOutcome};
pub use node::{BlockReceipt, NodeService};
pub use storage::{ChainStore, Ledger, MemoryChainStore, MemoryPool, SledChainStore, SubmitOutcome};
pub use utils::{current_timestamp, sha256_digest};
