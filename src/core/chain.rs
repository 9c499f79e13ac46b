// This is the chain itself - the ordered, validated sequence of blocks
// A Chain value is always valid: it can only be built from genesis, from a
// sequence that passed validate(), or by append() which checks the new block.
// Nothing here knows about storage or locking; the ledger wraps a Chain in a
// copy-on-write snapshot for that.

use crate::core::{Block, TxValidity};
use crate::error::{BlockchainError, Result};
use std::collections::HashSet;

// Why a block was refused by append(). The chain is untouched in every
// non-Appended case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    RejectedLinkage(String),
    RejectedProofOfWork(String),
    RejectedTransaction(String),
}

impl AppendOutcome {
    pub fn is_appended(&self) -> bool {
        matches!(self, AppendOutcome::Appended)
    }
}

#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,        // Index-contiguous, genesis first, never empty
    committed: HashSet<String>, // Every tx_id in the chain, for replay checks
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    // A fresh chain holding only the agreed genesis block
    pub fn new() -> Chain {
        Chain {
            blocks: vec![Block::genesis().clone()],
            committed: HashSet::new(),
        }
    }

    // When I receive a full sequence (from a peer or from disk) I only accept
    // it after checking every block from genesis to tip
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Chain> {
        let committed = Self::validate_sequence(&blocks)?;
        Ok(Chain { blocks, committed })
    }

    pub fn is_valid(blocks: &[Block]) -> bool {
        Self::validate(blocks).is_ok()
    }

    /// Same rule as `is_valid`, reporting the first violation.
    pub fn validate(blocks: &[Block]) -> Result<()> {
        Self::validate_sequence(blocks).map(|_| ())
    }

    fn validate_sequence(blocks: &[Block]) -> Result<HashSet<String>> {
        let first = blocks
            .first()
            .ok_or_else(|| BlockchainError::InvalidChain("chain is empty".to_string()))?;
        if !first.is_genesis() {
            return Err(BlockchainError::InvalidChain(
                "first block is not the agreed genesis block".to_string(),
            ));
        }

        let mut committed = HashSet::new();
        for pair in blocks.windows(2) {
            let (previous, block) = (&pair[0], &pair[1]);
            check_linkage(previous, block).map_err(BlockchainError::Linkage)?;
            block.check()?;
            check_transactions(block, &committed).map_err(BlockchainError::Validation)?;
            committed.extend(block.get_transactions().iter().map(|tx| tx.get_id().to_string()));
        }
        Ok(committed)
    }

    // I run the same checks as validate(), but only for one new block on top of my tip
    pub fn check_append(&self, block: &Block) -> AppendOutcome {
        if let Err(reason) = check_linkage(self.tip(), block) {
            return AppendOutcome::RejectedLinkage(reason);
        }
        if let Err(e) = block.check() {
            return AppendOutcome::RejectedProofOfWork(e.to_string());
        }
        if let Err(reason) = check_transactions(block, &self.committed) {
            return AppendOutcome::RejectedTransaction(reason);
        }
        AppendOutcome::Appended
    }

    pub fn append(&mut self, block: Block) -> AppendOutcome {
        let outcome = self.check_append(&block);
        if outcome.is_appended() {
            self.committed
                .extend(block.get_transactions().iter().map(|tx| tx.get_id().to_string()));
            self.blocks.push(block);
        }
        outcome
    }

    pub fn tip(&self) -> &Block {
        // blocks is never empty: every constructor starts from genesis
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn tip_hash(&self) -> &str {
        self.tip().get_hash()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        self.blocks.as_slice()
    }

    pub fn get_block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn contains_transaction(&self, tx_id: &str) -> bool {
        self.committed.contains(tx_id)
    }
}

fn check_linkage(previous: &Block, block: &Block) -> std::result::Result<(), String> {
    if block.get_previous_hash() != previous.get_hash() {
        return Err(format!(
            "block {} does not build on {} (previous_hash {})",
            block.get_index(),
            previous.get_hash(),
            block.get_previous_hash()
        ));
    }
    if previous.get_index().checked_add(1) != Some(block.get_index()) {
        return Err(format!(
            "block index {} does not follow {}",
            block.get_index(),
            previous.get_index()
        ));
    }
    Ok(())
}

// Transaction rules inside one block, given what the chain already committed:
// each transaction valid on its own, a reward only in first position and only
// to the block's miner, and no tx_id seen twice.
fn check_transactions(
    block: &Block,
    committed: &HashSet<String>,
) -> std::result::Result<(), String> {
    let mut in_block = HashSet::new();
    for (position, tx) in block.get_transactions().iter().enumerate() {
        match tx.validate() {
            TxValidity::Valid => {}
            TxValidity::InvalidSignature => {
                return Err(format!(
                    "transaction {} in block {} has an invalid signature",
                    tx.get_id(),
                    block.get_index()
                ));
            }
            TxValidity::MalformedFields(reason) => {
                return Err(format!(
                    "transaction {} in block {} is malformed: {reason}",
                    tx.get_id(),
                    block.get_index()
                ));
            }
        }

        if tx.is_system() {
            if position != 0 {
                return Err(format!(
                    "reward transaction {} must be first in block {}",
                    tx.get_id(),
                    block.get_index()
                ));
            }
            if tx.get_receiver() != block.get_miner() {
                return Err(format!(
                    "reward transaction {} does not pay the miner of block {}",
                    tx.get_id(),
                    block.get_index()
                ));
            }
        }

        if committed.contains(tx.get_id()) || !in_block.insert(tx.get_id()) {
            return Err(format!("transaction {} is already committed", tx.get_id()));
        }
    }
    Ok(())
}
