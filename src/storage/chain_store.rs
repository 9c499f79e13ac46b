// Durable block storage behind the ledger
// The ledger owns the in-memory chain; a ChainStore only has to remember the
// committed blocks so a restarted node comes back with the same chain.

use crate::core::Block;
use crate::error::{BlockchainError, Result};
use log::info;
use sled::{Db, Tree, Transactional};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const BLOCKS_TREE: &str = "blocks"; // K -> big-endian block index, V -> encoded block
const META_TREE: &str = "meta";
const TIP_BLOCK_HASH_KEY: &str = "tip_block_hash"; // Key to store the hash of the latest block

pub trait ChainStore: Send + Sync {
    /// Every stored block in index order. Empty when nothing was stored yet.
    fn load(&self) -> Result<Vec<Block>>;

    /// Record one block on top of what is stored.
    fn append(&self, block: &Block) -> Result<()>;

    /// Replace the stored chain with `blocks`, all or nothing.
    fn replace(&self, blocks: &[Block]) -> Result<()>;
}

pub struct SledChainStore {
    db: Db,
}

impl SledChainStore {
    // Each node gets its own directory so several can share a machine
    pub fn node_db_path(data_dir: &Path, node_id: &str) -> PathBuf {
        data_dir.join(format!("node_{node_id}"))
    }

    pub fn open_for_node(data_dir: &Path, node_id: &str) -> Result<SledChainStore> {
        Self::open(&Self::node_db_path(data_dir, node_id))
    }

    pub fn open(path: &Path) -> Result<SledChainStore> {
        let db = sled::open(path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        info!("Opened chain store at {}", path.display());
        Ok(SledChainStore { db })
    }

    fn blocks_tree(&self) -> Result<Tree> {
        self.db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))
    }

    fn meta_tree(&self) -> Result<Tree> {
        self.db
            .open_tree(META_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open meta tree: {e}")))
    }

    pub fn get_tip_hash(&self) -> Result<Option<String>> {
        let tip = self
            .meta_tree()?
            .get(TIP_BLOCK_HASH_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to get tip hash: {e}")))?;
        tip.map(|bytes| {
            String::from_utf8(bytes.to_vec())
                .map_err(|e| BlockchainError::Database(format!("Invalid tip hash format: {e}")))
        })
        .transpose()
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| BlockchainError::Database(format!("Failed to flush database: {e}")))?;
        Ok(())
    }
}

fn block_key(index: u64) -> [u8; 8] {
    index.to_be_bytes()
}

impl ChainStore for SledChainStore {
    fn load(&self) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        // Big-endian keys iterate in index order
        for item in self.blocks_tree()?.iter() {
            let (key, value) = item.map_err(|e| {
                BlockchainError::Database(format!("Failed to iterate blocks tree: {e}"))
            })?;
            let block = Block::deserialize(value.as_ref())?;
            if key.as_ref() != block_key(block.get_index()).as_slice() {
                return Err(BlockchainError::Database(format!(
                    "block {} stored under the wrong key",
                    block.get_index()
                )));
            }
            if block.get_index() != blocks.len() as u64 {
                return Err(BlockchainError::Database(format!(
                    "stored chain has a gap before block {}",
                    block.get_index()
                )));
            }
            blocks.push(block);
        }

        if let (Some(last), Some(tip)) = (blocks.last(), self.get_tip_hash()?) {
            if last.get_hash() != tip {
                return Err(BlockchainError::Database(format!(
                    "stored tip {tip} does not match last block {}",
                    last.get_hash()
                )));
            }
        }
        Ok(blocks)
    }

    fn append(&self, block: &Block) -> Result<()> {
        let blocks_tree = self.blocks_tree()?;
        let meta_tree = self.meta_tree()?;
        let key = block_key(block.get_index());
        let block_data = block.serialize()?;

        (&blocks_tree, &meta_tree)
            .transaction(|(tx_blocks, tx_meta)| {
                tx_blocks.insert(&key[..], block_data.as_slice())?;
                tx_meta.insert(TIP_BLOCK_HASH_KEY, block.get_hash())?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError| {
                BlockchainError::Database(format!("Failed to append block: {e}"))
            })?;

        self.flush()
    }

    fn replace(&self, blocks: &[Block]) -> Result<()> {
        let tip = blocks
            .last()
            .ok_or_else(|| BlockchainError::Database("refusing to store an empty chain".into()))?;
        let blocks_tree = self.blocks_tree()?;
        let meta_tree = self.meta_tree()?;

        let records = blocks
            .iter()
            .map(|block| Ok((block_key(block.get_index()), block.serialize()?)))
            .collect::<Result<Vec<_>>>()?;
        // Anything above the new tip belongs to the abandoned branch
        let stale_keys = blocks_tree
            .range(&block_key(blocks.len() as u64)[..]..)
            .keys()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        (&blocks_tree, &meta_tree)
            .transaction(|(tx_blocks, tx_meta)| {
                for (key, data) in &records {
                    tx_blocks.insert(&key[..], data.as_slice())?;
                }
                for key in &stale_keys {
                    tx_blocks.remove(key.clone())?;
                }
                tx_meta.insert(TIP_BLOCK_HASH_KEY, tip.get_hash())?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError| {
                BlockchainError::Database(format!("Failed to replace chain: {e}"))
            })?;

        self.flush()
    }
}

/// Keeps blocks in memory only. Used by `--ephemeral` nodes and tests.
#[derive(Default)]
pub struct MemoryChainStore {
    blocks: RwLock<Vec<Block>>,
}

impl MemoryChainStore {
    pub fn new() -> MemoryChainStore {
        MemoryChainStore::default()
    }
}

impl ChainStore for MemoryChainStore {
    fn load(&self) -> Result<Vec<Block>> {
        let blocks = self
            .blocks
            .read()
            .map_err(|_| BlockchainError::Database("chain store lock poisoned".to_string()))?;
        Ok(blocks.clone())
    }

    fn append(&self, block: &Block) -> Result<()> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| BlockchainError::Database("chain store lock poisoned".to_string()))?;
        blocks.push(block.clone());
        Ok(())
    }

    fn replace(&self, new_blocks: &[Block]) -> Result<()> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| BlockchainError::Database("chain store lock poisoned".to_string()))?;
        *blocks = new_blocks.to_vec();
        Ok(())
    }
}
