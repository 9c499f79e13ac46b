use crate::core::Block;
use crate::utils::sha256_context;
use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;

/// How many nonces the search tries between two cancellation checks.
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;

// Each unit of difficulty is one leading zero hex digit of the hash.
const BITS_PER_DIFFICULTY: u32 = 4;
const HASH_BITS: u32 = 256;

pub struct ProofOfWork {
    target: BigInt,
    difficulty: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found { nonce: u64, hash: String },
    Cancelled,
    /// Every u64 nonce was tried. Only reachable with absurd difficulties.
    Exhausted,
}

impl ProofOfWork {
    pub fn new_proof_of_work(difficulty: u32) -> ProofOfWork {
        let zero_bits = difficulty.saturating_mul(BITS_PER_DIFFICULTY);
        let target = if zero_bits > HASH_BITS {
            // No 256-bit hash can have more than 64 leading zero digits
            BigInt::from(0)
        } else {
            let mut target = BigInt::from(1);
            target.shl_assign(HASH_BITS - zero_bits);
            target
        };
        ProofOfWork { target, difficulty }
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Hash read as an unsigned big-endian integer must be below the target.
    pub fn meets_target(&self, digest: &[u8]) -> bool {
        BigInt::from_bytes_be(Sign::Plus, digest) < self.target
    }

    pub fn hash_meets_target(&self, hash_hex: &str) -> bool {
        match HEXLOWER_PERMISSIVE.decode(hash_hex.as_bytes()) {
            Ok(digest) if digest.len() == 32 => self.meets_target(&digest),
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn run(&self, block: &Block) -> SearchOutcome {
        self.run_cancellable(block, || false)
    }

    /// Brute-force nonce search starting at 0. `should_stop` is polled every
    /// `CANCEL_CHECK_INTERVAL` nonces; returning true abandons the search.
    pub fn run_cancellable<F>(&self, block: &Block, should_stop: F) -> SearchOutcome
    where
        F: Fn() -> bool,
    {
        let prefix = sha256_context(&block.header_bytes());
        let mut nonce: u64 = 0;
        loop {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && should_stop() {
                return SearchOutcome::Cancelled;
            }

            let mut context = prefix.clone();
            context.update(&nonce.to_be_bytes());
            let digest = context.finish();
            if self.meets_target(digest.as_ref()) {
                return SearchOutcome::Found {
                    nonce,
                    hash: HEXLOWER.encode(digest.as_ref()),
                };
            }

            nonce = match nonce.checked_add(1) {
                Some(next) => next,
                None => return SearchOutcome::Exhausted,
            };
        }
    }
}
