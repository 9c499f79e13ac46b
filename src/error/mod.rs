//! Error handling for the ledger node
//!
//! One error type covers every operation in the crate. The variants follow the
//! failure classes a node has to report: rejected input, structurally broken
//! blocks or chains, concurrency conflicts the caller may retry, unreachable
//! peers, and infrastructure failures (storage, serialization, I/O).

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error types for ledger operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// A transaction or request failed validation
    Validation(String),
    /// A block does not extend the chain it was offered to
    Linkage(String),
    /// A block hash does not match its content or misses the difficulty target
    ProofOfWork(String),
    /// A whole chain failed validation
    InvalidChain(String),
    /// Another mining search is already running on this node
    MiningInProgress,
    /// A mined block no longer extends the current tip
    StaleBlock { index: u64 },
    /// A chain replacement lost the race against another writer
    StaleChain { expected: String, actual: String },
    /// A peer could not be reached or answered garbage
    PeerUnreachable { peer: String, reason: String },
    /// Database-related errors
    Database(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Configuration errors
    Config(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Network errors that are not tied to a single peer
    Network(String),
    /// Mining errors other than conflicts
    Mining(String),
}

impl BlockchainError {
    /// Conflicts leave local state untouched, so the caller can simply try
    /// again.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            BlockchainError::MiningInProgress
                | BlockchainError::StaleBlock { .. }
                | BlockchainError::StaleChain { .. }
        )
    }
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Validation(msg) => write!(f, "Validation error: {msg}"),
            BlockchainError::Linkage(msg) => write!(f, "Linkage error: {msg}"),
            BlockchainError::ProofOfWork(msg) => write!(f, "Proof-of-work error: {msg}"),
            BlockchainError::InvalidChain(msg) => write!(f, "Invalid chain: {msg}"),
            BlockchainError::MiningInProgress => write!(f, "Mining already in progress"),
            BlockchainError::StaleBlock { index } => {
                write!(
                    f,
                    "Mined block {index} is stale: the chain changed during mining, result discarded"
                )
            }
            BlockchainError::StaleChain { expected, actual } => {
                write!(
                    f,
                    "Chain replacement rejected: expected tip {expected}, found {actual}"
                )
            }
            BlockchainError::PeerUnreachable { peer, reason } => {
                write!(f, "Peer {peer} unreachable: {reason}")
            }
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Mining(msg) => write!(f, "Mining error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
