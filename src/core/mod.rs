//! Core ledger functionality
//!
//! This module contains the fundamental ledger components: canonical hashing,
//! transactions, blocks with proof-of-work, chain validation, the fork-choice
//! rule and the miner.

pub mod block;
pub mod chain;
pub mod consensus;
pub mod hasher;
pub mod miner;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, GENESIS_MINER, GENESIS_PREVIOUS_HASH, GENESIS_TIMESTAMP};
pub use chain::{AppendOutcome, Chain};
pub use consensus::{ConsensusResolver, RejectReason, Resolution};
pub use hasher::{hash_hex, CanonicalEncoder};
pub use miner::{Miner, MinerConfig, MiningOutcome};
pub use proof_of_work::{ProofOfWork, SearchOutcome};
pub use transaction::{Transaction, TxValidity, MAX_ADDRESS_LEN, SYSTEM_ADDRESS};
