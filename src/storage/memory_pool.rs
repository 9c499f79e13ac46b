use crate::core::{Block, Chain, Transaction, TxValidity};
use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// What happened to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// Same tx_id and same content is already pending.
    Duplicate,
    Rejected(String),
}

#[derive(Default)]
struct PoolInner {
    entries: HashMap<String, Transaction>, // K -> tx_id, V -> Transaction
    order: VecDeque<String>,               // tx_ids in arrival order
}

/// Pending transactions, keyed by tx_id and kept in arrival order.
pub struct MemoryPool {
    inner: RwLock<PoolInner>,
    require_signatures: bool,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        Self::with_policy(false)
    }

    pub fn with_policy(require_signatures: bool) -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(PoolInner::default()),
            require_signatures,
        }
    }

    // A poisoned lock only means another thread panicked mid-operation; the
    // map and queue are still consistent after every statement, so I carry on.
    fn read(&self) -> RwLockReadGuard<'_, PoolInner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            log::error!("Memory pool lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, PoolInner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            log::error!("Memory pool lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Admit a transaction. The caller checks "already committed" against
    /// the chain; the pool only knows what is pending.
    pub fn submit(&self, tx: Transaction) -> SubmitOutcome {
        match tx.validate() {
            TxValidity::Valid => {}
            TxValidity::InvalidSignature => {
                return SubmitOutcome::Rejected("invalid signature".to_string())
            }
            TxValidity::MalformedFields(reason) => return SubmitOutcome::Rejected(reason),
        }
        if tx.is_system() {
            return SubmitOutcome::Rejected(
                "reward transactions cannot be submitted".to_string(),
            );
        }
        if self.require_signatures && !tx.is_signed() {
            return SubmitOutcome::Rejected("transaction must be signed".to_string());
        }

        let mut pool = self.write();
        if let Some(existing) = pool.entries.get(tx.get_id()) {
            if existing == &tx {
                return SubmitOutcome::Duplicate;
            }
            return SubmitOutcome::Rejected(format!(
                "a different transaction with id {} is already pending",
                tx.get_id()
            ));
        }
        let id = tx.get_id().to_string();
        pool.order.push_back(id.clone());
        pool.entries.insert(id, tx);
        SubmitOutcome::Accepted
    }

    /// Up to `max_count` pending transactions, oldest first. Nothing is
    /// removed: a transaction leaves the pool only once a block holding it
    /// is committed.
    pub fn drain_for_block(&self, max_count: usize) -> Vec<Transaction> {
        let pool = self.read();
        pool.order
            .iter()
            .filter_map(|id| pool.entries.get(id))
            .take(max_count)
            .cloned()
            .collect()
    }

    pub fn remove_committed(&self, block: &Block) -> usize {
        let mut pool = self.write();
        let mut removed = 0;
        for tx in block.get_transactions() {
            if pool.entries.remove(tx.get_id()).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            let PoolInner { entries, order } = &mut *pool;
            order.retain(|id| entries.contains_key(id));
        }
        removed
    }

    /// Drop everything the given chain already holds. Used after a chain
    /// replacement, when whole branches may have been committed at once.
    pub fn remove_all_committed(&self, chain: &Chain) -> usize {
        let mut pool = self.write();
        let before = pool.entries.len();
        pool.entries.retain(|id, _| !chain.contains_transaction(id));
        let removed = before - pool.entries.len();
        if removed > 0 {
            let PoolInner { entries, order } = &mut *pool;
            order.retain(|id| entries.contains_key(id));
        }
        removed
    }

    pub fn get(&self, txid: &str) -> Option<Transaction> {
        self.read().entries.get(txid).cloned()
    }

    pub fn contains(&self, txid: &str) -> bool {
        self.read().entries.contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Every pending transaction in arrival order.
    pub fn get_all(&self) -> Vec<Transaction> {
        self.drain_for_block(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::test_utils::{mine_on, signed_transaction, TestKey};

    fn tx(nonce: u64) -> Transaction {
        Transaction::new_unsigned("alice", "bob", 10, nonce)
    }

    #[test]
    fn test_submit_and_duplicate() {
        let pool = MemoryPool::new();
        assert_eq!(pool.submit(tx(1)), SubmitOutcome::Accepted);
        assert_eq!(pool.submit(tx(1)), SubmitOutcome::Duplicate);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(tx(1).get_id()));
    }

    #[test]
    fn test_same_id_different_content_is_rejected() {
        let pool = MemoryPool::new();
        let key = TestKey::generate();
        let signed = signed_transaction(&key, "bob", 5, 1);
        assert_eq!(pool.submit(signed.clone()), SubmitOutcome::Accepted);

        // Same fields, so same id, but the signature was dropped
        let stripped = Transaction::from_parts(
            signed.get_id(),
            signed.get_sender(),
            "bob",
            5,
            1,
            None,
        );
        assert!(matches!(pool.submit(stripped), SubmitOutcome::Rejected(_)));
        assert_eq!(pool.get(signed.get_id()), Some(signed));
    }

    #[test]
    fn test_invalid_and_system_transactions_are_rejected() {
        let pool = MemoryPool::new();
        assert!(matches!(
            pool.submit(Transaction::new_unsigned("", "bob", 1, 1)),
            SubmitOutcome::Rejected(_)
        ));
        assert!(matches!(
            pool.submit(Transaction::new_reward("me", 50, 1)),
            SubmitOutcome::Rejected(_)
        ));
        assert!(matches!(
            pool.submit(Transaction::new_signed("alice", "bob", 1, 1, "00")),
            SubmitOutcome::Rejected(_)
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_signature_policy() {
        let pool = MemoryPool::with_policy(true);
        assert!(matches!(pool.submit(tx(1)), SubmitOutcome::Rejected(_)));

        let key = TestKey::generate();
        assert_eq!(
            pool.submit(signed_transaction(&key, "bob", 1, 1)),
            SubmitOutcome::Accepted
        );
    }

    #[test]
    fn test_drain_is_fifo_and_bounded() {
        let pool = MemoryPool::new();
        for nonce in 1..=5 {
            pool.submit(tx(nonce));
        }
        let batch = pool.drain_for_block(3);
        let nonces: Vec<u64> = batch.iter().map(|t| t.get_nonce()).collect();
        assert_eq!(nonces, vec![1, 2, 3]);
        // Draining leaves the pool alone
        assert_eq!(pool.len(), 5);
        assert!(pool.drain_for_block(0).is_empty());
    }

    #[test]
    fn test_remove_committed_keeps_order_of_the_rest() {
        let pool = MemoryPool::new();
        for nonce in 1..=4 {
            pool.submit(tx(nonce));
        }
        let block = mine_on(Block::genesis(), 1, "node-a", vec![tx(2), tx(3)], 1);
        assert_eq!(pool.remove_committed(&block), 2);

        let nonces: Vec<u64> = pool.get_all().iter().map(|t| t.get_nonce()).collect();
        assert_eq!(nonces, vec![1, 4]);
    }

    #[test]
    fn test_remove_all_committed_against_chain() {
        let pool = MemoryPool::new();
        for nonce in 1..=3 {
            pool.submit(tx(nonce));
        }
        let mut chain = Chain::new();
        let block = mine_on(chain.tip(), 1, "node-a", vec![tx(1), tx(3)], 1);
        assert!(chain.append(block).is_appended());

        assert_eq!(pool.remove_all_committed(&chain), 2);
        assert_eq!(pool.get_all(), vec![tx(2)]);
    }
}
