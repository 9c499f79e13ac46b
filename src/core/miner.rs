// This is the miner - it turns pending transactions into a new block
// One search runs at a time per node. A search is abandoned as soon as the
// ledger publishes a different chain, because the candidate no longer builds
// on the tip.

use crate::core::{AppendOutcome, Block, ProofOfWork, SearchOutcome, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::events::{EventBroadcaster, NodeEvent};
use crate::storage::{Ledger, MemoryPool};
use crate::utils::current_timestamp;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinerConfig {
    pub difficulty: u32,
    pub max_block_transactions: usize,
    pub allow_empty_blocks: bool,
    pub block_reward: u64, // 0 means no reward transaction
}

impl Default for MinerConfig {
    fn default() -> Self {
        MinerConfig {
            difficulty: 4,
            max_block_transactions: 100,
            allow_empty_blocks: true,
            block_reward: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningOutcome {
    Mined(Block),
    NothingToMine,
}

// Height value meaning "not mining"; real candidates always have index >= 1
const IDLE: u64 = 0;

pub struct Miner {
    config: MinerConfig,
    busy: AtomicBool,
    mining_height: AtomicU64,
}

// Clears the busy flag however the search ends
struct BusyGuard<'a>(&'a Miner);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.mining_height.store(IDLE, Ordering::SeqCst);
        self.0.busy.store(false, Ordering::SeqCst);
    }
}

impl Miner {
    pub fn new(config: MinerConfig) -> Miner {
        Miner {
            config,
            busy: AtomicBool::new(false),
            mining_height: AtomicU64::new(IDLE),
        }
    }

    pub fn is_mining(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Index of the block currently being searched for, if any.
    pub fn mining_height(&self) -> Option<u64> {
        match self.mining_height.load(Ordering::SeqCst) {
            IDLE => None,
            height => Some(height),
        }
    }

    /// Mine one block on the current tip and commit it.
    ///
    /// Fails with `MiningInProgress` when another search is running and with
    /// `StaleBlock` when the chain changed before the block could be
    /// committed. Either way nothing was committed and the pending
    /// transactions stay in the pool.
    pub fn mine_next_block(
        &self,
        ledger: &Ledger,
        mempool: &MemoryPool,
        events: &EventBroadcaster,
        identity: &str,
    ) -> Result<MiningOutcome> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BlockchainError::MiningInProgress);
        }
        let _guard = BusyGuard(self);

        let (start_version, snapshot) = ledger.versioned_snapshot();
        let pending = mempool.drain_for_block(self.config.max_block_transactions);
        if pending.is_empty() && !self.config.allow_empty_blocks {
            info!("Nothing to mine: memory pool is empty");
            return Ok(MiningOutcome::NothingToMine);
        }

        let tip = snapshot.tip();
        let index = tip.get_index() + 1;
        let mut transactions = Vec::with_capacity(pending.len() + 1);
        if self.config.block_reward > 0 {
            transactions.push(Transaction::new_reward(
                identity,
                self.config.block_reward,
                index,
            ));
        }
        transactions.extend(pending);
        let transaction_count = transactions.len();

        let mut candidate = Block::new_candidate(
            index,
            tip.get_hash(),
            current_timestamp()?,
            transactions,
            identity,
            self.config.difficulty,
        );
        drop(snapshot);

        self.mining_height.store(index, Ordering::SeqCst);
        events.publish(NodeEvent::MiningStarted {
            index,
            transactions: transaction_count,
        });
        info!(
            "Mining block {index} with {transaction_count} transaction(s) at difficulty {}",
            self.config.difficulty
        );

        let pow = ProofOfWork::new_proof_of_work(self.config.difficulty);
        match pow.run_cancellable(&candidate, || ledger.version() != start_version) {
            SearchOutcome::Found { nonce, hash } => candidate.seal(nonce, hash),
            SearchOutcome::Cancelled => {
                return Err(self.discard(events, index, "chain changed during search"));
            }
            SearchOutcome::Exhausted => {
                return Err(BlockchainError::Mining(format!(
                    "no nonce satisfies difficulty {} for block {index}",
                    self.config.difficulty
                )));
            }
        }

        self.commit(ledger, mempool, events, candidate)
    }

    // The tip may have moved between the end of the search and the append
    fn commit(
        &self,
        ledger: &Ledger,
        mempool: &MemoryPool,
        events: &EventBroadcaster,
        candidate: Block,
    ) -> Result<MiningOutcome> {
        let index = candidate.get_index();
        match ledger.append(candidate.clone(), |block| {
            mempool.remove_committed(block);
        })? {
            AppendOutcome::Appended => {
                info!("Mined block {index}: {}", candidate.get_hash());
                events.publish(NodeEvent::BlockMined {
                    index,
                    hash: candidate.get_hash().to_string(),
                    transactions: candidate.get_transactions().len(),
                });
                Ok(MiningOutcome::Mined(candidate))
            }
            AppendOutcome::RejectedLinkage(_) => {
                Err(self.discard(events, index, "tip moved before commit"))
            }
            AppendOutcome::RejectedProofOfWork(reason)
            | AppendOutcome::RejectedTransaction(reason) => Err(BlockchainError::Mining(reason)),
        }
    }

    fn discard(&self, events: &EventBroadcaster, index: u64, reason: &str) -> BlockchainError {
        warn!("Discarding candidate block {index}: {reason}");
        events.publish(NodeEvent::MiningDiscarded {
            index,
            reason: reason.to_string(),
        });
        BlockchainError::StaleBlock { index }
    }
}
