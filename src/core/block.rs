use crate::core::hasher::{hash_hex, CanonicalEncoder};
use crate::core::proof_of_work::ProofOfWork;
use crate::core::Transaction;
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_MINER: &str = "genesis";
/// 2025-01-01T00:00:00Z. Fixed so every node builds the same genesis block.
pub const GENESIS_TIMESTAMP: i64 = 1_735_689_600_000;

static GENESIS: Lazy<Block> = Lazy::new(|| {
    Block::new_candidate(
        0,
        GENESIS_PREVIOUS_HASH,
        GENESIS_TIMESTAMP,
        vec![],
        GENESIS_MINER,
        0,
    )
});

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Block {
    index: u64,
    timestamp: i64,
    previous_hash: String,
    hash: String,
    nonce: u64,
    difficulty: u32,
    miner: String,
    transactions: Vec<Transaction>,
}

impl Block {
    /// An unsealed block: nonce 0 and the hash that goes with it. Only the
    /// nonce and hash change afterwards, through `seal`.
    pub fn new_candidate(
        index: u64,
        previous_hash: &str,
        timestamp: i64,
        transactions: Vec<Transaction>,
        miner: &str,
        difficulty: u32,
    ) -> Block {
        let mut block = Block {
            index,
            timestamp,
            previous_hash: previous_hash.to_string(),
            hash: String::new(),
            nonce: 0,
            difficulty,
            miner: miner.to_string(),
            transactions,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The agreed first block. Identical on every node.
    pub fn genesis() -> &'static Block {
        &GENESIS
    }

    pub fn is_genesis(&self) -> bool {
        self == Block::genesis()
    }

    /// Canonical encoding of every hashed field except the nonce, which the
    /// miner appends last.
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut enc = CanonicalEncoder::new();
        enc.put_u64(self.index)
            .put_i64(self.timestamp)
            .put_str(&self.previous_hash)
            .put_u32(self.difficulty)
            .put_str(&self.miner)
            .put_len(self.transactions.len());
        for tx in &self.transactions {
            tx.encode_into(&mut enc);
        }
        enc.into_bytes()
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        let mut bytes = self.header_bytes();
        bytes.extend(nonce.to_be_bytes());
        hash_hex(&bytes)
    }

    pub fn calculate_hash(&self) -> String {
        self.hash_with_nonce(self.nonce)
    }

    pub(crate) fn seal(&mut self, nonce: u64, hash: String) {
        self.nonce = nonce;
        self.hash = hash;
    }

    /// Hash recomputation and difficulty predicate, with the reason on failure.
    pub fn check(&self) -> Result<()> {
        if self.hash != self.calculate_hash() {
            return Err(BlockchainError::ProofOfWork(format!(
                "block {} hash does not match its content",
                self.index
            )));
        }
        if !ProofOfWork::new_proof_of_work(self.difficulty).hash_meets_target(&self.hash) {
            return Err(BlockchainError::ProofOfWork(format!(
                "block {} hash misses difficulty {}",
                self.index, self.difficulty
            )));
        }
        Ok(())
    }

    pub fn verify(&self) -> bool {
        self.check().is_ok()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_miner(&self) -> &str {
        self.miner.as_str()
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    #[cfg(test)]
    pub(crate) fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }

    #[cfg(test)]
    pub(crate) fn set_previous_hash(&mut self, previous_hash: &str) {
        self.previous_hash = previous_hash.to_string();
    }

    #[cfg(test)]
    pub(crate) fn transactions_mut(&mut self) -> &mut Vec<Transaction> {
        &mut self.transactions
    }
}
