//! The node's current chain
//!
//! Readers take an `Arc<Chain>` snapshot and never block writers for longer
//! than a pointer clone. Writers build the next chain on the side, persist
//! it, and only then publish it; a failed store write leaves the published
//! chain untouched. Every publish bumps a version counter that running
//! mining searches poll to notice they were overtaken.
//!
//! Lock order: chain, then memory pool. The `on_commit` hooks run while the
//! chain write lock is held, which is how committed transactions leave the
//! pool before any reader can observe the new chain.

use crate::core::{AppendOutcome, Block, Chain};
use crate::error::{BlockchainError, Result};
use crate::storage::chain_store::ChainStore;
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct Ledger {
    current: RwLock<Arc<Chain>>,
    version: AtomicU64,
    store: Box<dyn ChainStore>,
}

impl Ledger {
    /// Load and validate whatever the store holds, or seed it with genesis.
    pub fn open(store: Box<dyn ChainStore>) -> Result<Ledger> {
        let stored = store.load()?;
        let chain = if stored.is_empty() {
            let chain = Chain::new();
            store.replace(chain.blocks())?;
            info!("Initialised new chain at genesis {}", chain.tip_hash());
            chain
        } else {
            let chain = Chain::from_blocks(stored).map_err(|e| {
                BlockchainError::Database(format!("stored chain failed validation: {e}"))
            })?;
            info!(
                "Loaded stored chain of length {} (tip {})",
                chain.len(),
                chain.tip_hash()
            );
            chain
        };

        Ok(Ledger {
            current: RwLock::new(Arc::new(chain)),
            version: AtomicU64::new(0),
            store,
        })
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Ledger {
        Ledger {
            current: RwLock::new(Arc::new(Chain::new())),
            version: AtomicU64::new(0),
            store: Box::new(crate::storage::MemoryChainStore::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Arc<Chain>> {
        // Only pointer swaps happen under the write lock, so a poisoned lock
        // still guards a complete chain
        self.current.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<Chain>> {
        self.current.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn current_snapshot(&self) -> Arc<Chain> {
        Arc::clone(&self.read())
    }

    /// Snapshot together with the version it was published as.
    pub fn versioned_snapshot(&self) -> (u64, Arc<Chain>) {
        let guard = self.read();
        (self.version.load(Ordering::SeqCst), Arc::clone(&guard))
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Run `f` while holding the read lock, so no commit can land in between
    /// the check `f` makes and whatever the caller does with its answer
    /// (inside `f`).
    pub fn with_current<R>(&self, f: impl FnOnce(&Chain) -> R) -> R {
        let guard = self.read();
        f(&guard)
    }

    /// Append one block on top of the current tip.
    pub fn append<F>(&self, block: Block, on_commit: F) -> Result<AppendOutcome>
    where
        F: FnOnce(&Block),
    {
        let mut current = self.write();
        let outcome = current.check_append(&block);
        if !outcome.is_appended() {
            return Ok(outcome);
        }

        self.store.append(&block)?;
        on_commit(&block);
        let mut next = Chain::clone(&current);
        // Already checked against this exact tip under the same lock
        next.append(block);
        *current = Arc::new(next);
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(AppendOutcome::Appended)
    }

    /// Replace the chain with `candidate` if the tip is still
    /// `expected_tip_hash`. Fails with `StaleChain` otherwise.
    pub fn compare_and_swap<F>(
        &self,
        expected_tip_hash: &str,
        candidate: Chain,
        on_commit: F,
    ) -> Result<Arc<Chain>>
    where
        F: FnOnce(&Chain),
    {
        let mut current = self.write();
        if current.tip_hash() != expected_tip_hash {
            warn!(
                "Chain replacement lost a race: expected tip {expected_tip_hash}, found {}",
                current.tip_hash()
            );
            return Err(BlockchainError::StaleChain {
                expected: expected_tip_hash.to_string(),
                actual: current.tip_hash().to_string(),
            });
        }

        self.store.replace(candidate.blocks())?;
        on_commit(&candidate);
        let next = Arc::new(candidate);
        *current = Arc::clone(&next);
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(next)
    }
}
