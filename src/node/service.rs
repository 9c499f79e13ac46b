// The node - everything one ledger participant does, without the HTTP layer
// NodeService owns the shared state (ledger, memory pool, miner, peers, event
// bus) and exposes the operations the API needs. Calls that touch the network
// block on the transport, so async callers run them with spawn_blocking.
// Gossip to peers always happens on background threads and never fails the
// operation that triggered it.

use crate::config::Config;
use crate::core::{
    AppendOutcome, Block, Chain, ConsensusResolver, Miner, MiningOutcome, Transaction,
};
use crate::error::{BlockchainError, Result};
use crate::network::events::{EventBroadcaster, NodeEvent};
use crate::network::peers::{normalize_peer_url, PeerRegistry};
use crate::network::sync::{PeerSyncCoordinator, PeerSyncResult, SyncOutcome};
use crate::network::transport::{HttpTransport, PeerTransport};
use crate::storage::{
    ChainStore, Ledger, MemoryChainStore, MemoryPool, SledChainStore, SubmitOutcome,
};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread;
use tokio::sync::broadcast;

/// What happened to a block announced by a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReceipt {
    Appended,
    /// The block is already part of the local chain.
    AlreadyKnown,
    /// The block did not extend the tip, so the node synced with the sender.
    Synced(SyncOutcome),
}

pub struct NodeService {
    config: Config,
    node_id: String,
    ledger: Arc<Ledger>,
    mempool: Arc<MemoryPool>,
    miner: Miner,
    events: EventBroadcaster,
    peers: Arc<PeerRegistry>,
    transport: Arc<dyn PeerTransport>,
    sync: PeerSyncCoordinator,
}

impl NodeService {
    pub fn new(
        config: Config,
        store: Box<dyn ChainStore>,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<NodeService> {
        config.validate()?;
        let node_id = config.get_node_id();
        let ledger = Arc::new(Ledger::open(store)?);
        let mempool = Arc::new(MemoryPool::with_policy(config.require_signatures));
        let events = EventBroadcaster::new(config.event_buffer);
        let peers = Arc::new(PeerRegistry::new(&config.get_public_url()));
        for peer in &config.peers {
            peers.add_peer(peer)?;
        }
        let sync = PeerSyncCoordinator::new(
            ledger.clone(),
            mempool.clone(),
            events.clone(),
            transport.clone(),
            ConsensusResolver::with_min_difficulty(config.min_peer_difficulty),
        );

        info!(
            "Node {node_id} ready at {} with chain length {}",
            peers.get_own_url(),
            ledger.current_snapshot().len()
        );
        Ok(NodeService {
            miner: Miner::new(config.miner_config()),
            config,
            node_id,
            ledger,
            mempool,
            events,
            peers,
            transport,
            sync,
        })
    }

    /// Build a node the way the binary runs it: sled storage under
    /// `data_dir` (or memory when `persist` is off) and HTTP to peers.
    pub fn start(config: Config) -> Result<Arc<NodeService>> {
        config.validate()?;
        let store: Box<dyn ChainStore> = if config.persist {
            Box::new(SledChainStore::open_for_node(
                &config.data_dir,
                &config.get_node_id(),
            )?)
        } else {
            Box::new(MemoryChainStore::new())
        };
        let transport = Arc::new(HttpTransport::new(config.get_peer_timeout())?);
        Ok(Arc::new(NodeService::new(config, store, transport)?))
    }

    pub fn get_node_id(&self) -> &str {
        self.node_id.as_str()
    }

    pub fn get_public_url(&self) -> &str {
        self.peers.get_own_url()
    }

    pub fn chain(&self) -> Arc<Chain> {
        self.ledger.current_snapshot()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.mempool.get_all()
    }

    pub fn get_peers(&self) -> Vec<String> {
        self.peers.get_peers()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    pub fn is_mining(&self) -> bool {
        self.miner.is_mining()
    }

    /// Admit a transaction into the memory pool. `origin` is the peer that
    /// gossiped it, if any; it is registered and not gossiped back to.
    pub fn submit_transaction(
        self: &Arc<Self>,
        tx: Transaction,
        origin: Option<&str>,
    ) -> Result<SubmitOutcome> {
        if let Some(origin) = origin {
            self.learn_peer(origin);
        }

        // Held for reading so no commit lands between the check and the insert
        let outcome = self.ledger.with_current(|chain| {
            if chain.contains_transaction(tx.get_id()) {
                SubmitOutcome::Rejected(format!("transaction {} is already committed", tx.get_id()))
            } else {
                self.mempool.submit(tx.clone())
            }
        });

        match &outcome {
            SubmitOutcome::Accepted => {
                info!("Accepted transaction {}", tx.get_id());
                self.events.publish(NodeEvent::TransactionAccepted {
                    tx_id: tx.get_id().to_string(),
                    sender: tx.get_sender().to_string(),
                    receiver: tx.get_receiver().to_string(),
                    amount: tx.get_amount(),
                });
                self.gossip_transaction(&tx, origin);
                if self.config.auto_mine {
                    self.spawn_auto_mine();
                }
            }
            SubmitOutcome::Duplicate => debug!("Duplicate transaction {}", tx.get_id()),
            SubmitOutcome::Rejected(reason) => {
                warn!("Rejected transaction {}: {reason}", tx.get_id())
            }
        }
        Ok(outcome)
    }

    /// Mine one block on the current tip and announce it to peers. With
    /// auto-mining on, whatever arrived during the search is mined next.
    pub fn mine(self: &Arc<Self>) -> Result<MiningOutcome> {
        let outcome = self.mine_once();
        if self.config.auto_mine && !self.mempool.is_empty() {
            self.spawn_auto_mine();
        }
        outcome
    }

    fn mine_once(&self) -> Result<MiningOutcome> {
        let outcome = self.miner.mine_next_block(
            &self.ledger,
            &self.mempool,
            &self.events,
            &self.node_id,
        )?;
        if let MiningOutcome::Mined(block) = &outcome {
            self.gossip_block(block);
        }
        Ok(outcome)
    }

    pub fn sync_with_peer(&self, peer: &str) -> Result<SyncOutcome> {
        let peer = self.learn_peer(peer).ok_or_else(|| {
            BlockchainError::Validation(format!("{peer} is not a usable peer URL"))
        })?;
        self.sync.sync_with(&peer)
    }

    pub fn sync_with_peers(&self) -> Result<Vec<PeerSyncResult>> {
        self.sync.sync_all(&self.peers.get_peers())
    }

    /// Handle a block announced by `from`: append it when it extends the
    /// tip, otherwise sync with the sender to pick up its branch.
    pub fn receive_block(&self, block: Block, from: &str) -> Result<BlockReceipt> {
        let peer = self.learn_peer(from);
        let known = self.ledger.with_current(|chain| {
            chain
                .get_block(block.get_index())
                .is_some_and(|b| b.get_hash() == block.get_hash())
        });
        if known {
            return Ok(BlockReceipt::AlreadyKnown);
        }
        if block.get_difficulty() < self.config.min_peer_difficulty {
            return Err(BlockchainError::ProofOfWork(format!(
                "block {} declares difficulty {}, below the minimum of {}",
                block.get_index(),
                block.get_difficulty(),
                self.config.min_peer_difficulty
            )));
        }

        let index = block.get_index();
        let hash = block.get_hash().to_string();
        match self.ledger.append(block, |b| {
            self.mempool.remove_committed(b);
        })? {
            AppendOutcome::Appended => {
                info!("Appended block {index} announced by {from}");
                self.events.publish(NodeEvent::BlockAccepted {
                    index,
                    hash,
                    peer: from.to_string(),
                });
                Ok(BlockReceipt::Appended)
            }
            AppendOutcome::RejectedLinkage(reason) => {
                info!("Block {index} from {from} does not extend the tip ({reason}), syncing");
                let peer = peer.ok_or_else(|| {
                    BlockchainError::Validation(format!("{from} is not a usable peer URL"))
                })?;
                Ok(BlockReceipt::Synced(self.sync.sync_with(&peer)?))
            }
            AppendOutcome::RejectedProofOfWork(reason) => Err(BlockchainError::ProofOfWork(reason)),
            AppendOutcome::RejectedTransaction(reason) => Err(BlockchainError::Validation(reason)),
        }
    }

    /// Add a peer and return every peer now known.
    pub fn register_peer(&self, addr: &str) -> Result<Vec<String>> {
        if let Some(peer) = self.peers.add_peer(addr)? {
            info!("Registered peer {peer}");
            self.events.publish(NodeEvent::PeerDiscovered { peer });
        }
        Ok(self.peers.get_peers())
    }

    /// Register with the configured peers and learn the peers they know,
    /// register with those too, then sync. Unreachable peers are logged and
    /// skipped.
    pub fn bootstrap(&self) -> Result<Vec<PeerSyncResult>> {
        let own_url = self.get_public_url().to_string();
        let configured = self.peers.get_peers();
        let mut discovered = Vec::new();
        for peer in &configured {
            match self.transport.register_with(peer, &own_url) {
                Ok(known) => {
                    // A peer's list may hold garbage; that is its problem
                    for addr in known {
                        let Some(learned) = self.learn_peer(&addr) else {
                            continue;
                        };
                        if !configured.contains(&learned) && !discovered.contains(&learned) {
                            discovered.push(learned);
                        }
                    }
                }
                Err(e) => warn!("Could not register with {peer}: {e}"),
            }
        }

        for peer in &discovered {
            if let Err(e) = self.transport.register_with(peer, &own_url) {
                warn!("Could not register with discovered peer {peer}: {e}");
            }
        }
        self.sync_with_peers()
    }

    // Register quietly. Returns the normalized URL unless it is unusable or
    // this node's own.
    fn learn_peer(&self, addr: &str) -> Option<String> {
        let peer = match normalize_peer_url(addr) {
            Ok(peer) => peer,
            Err(e) => {
                debug!("Ignoring peer {addr}: {e}");
                return None;
            }
        };
        if peer == self.peers.get_own_url() {
            return None;
        }
        if let Err(e) = self.register_peer(&peer) {
            debug!("Ignoring peer {peer}: {e}");
            return None;
        }
        Some(peer)
    }

    fn gossip_transaction(&self, tx: &Transaction, origin: Option<&str>) {
        let origin = origin.and_then(|o| normalize_peer_url(o).ok());
        let targets: Vec<String> = self
            .peers
            .get_peers()
            .into_iter()
            .filter(|peer| Some(peer) != origin.as_ref())
            .collect();
        if targets.is_empty() {
            return;
        }
        let transport = self.transport.clone();
        let own_url = self.get_public_url().to_string();
        let tx = tx.clone();
        thread::spawn(move || {
            for peer in targets {
                if let Err(e) = transport.announce_transaction(&peer, &tx, &own_url) {
                    warn!("Failed to forward transaction {} to {peer}: {e}", tx.get_id());
                }
            }
        });
    }

    fn gossip_block(&self, block: &Block) {
        let targets = self.peers.get_peers();
        if targets.is_empty() {
            return;
        }
        let transport = self.transport.clone();
        let own_url = self.get_public_url().to_string();
        let block = block.clone();
        thread::spawn(move || {
            for peer in targets {
                if let Err(e) = transport.announce_block(&peer, &block, &own_url) {
                    warn!("Failed to announce block {} to {peer}: {e}", block.get_index());
                }
            }
        });
    }

    // Keep mining while there is work. A running search picks up nothing
    // new, so the loop re-checks the pool after each block.
    fn spawn_auto_mine(self: &Arc<Self>) {
        if self.miner.is_mining() {
            return;
        }
        let node = Arc::clone(self);
        thread::spawn(move || {
            while !node.mempool.is_empty() {
                match node.mine_once() {
                    Ok(MiningOutcome::Mined(block)) => {
                        debug!("Auto-mined block {}", block.get_index())
                    }
                    Ok(MiningOutcome::NothingToMine) => break,
                    Err(BlockchainError::MiningInProgress) => break,
                    Err(BlockchainError::StaleBlock { index }) => {
                        debug!("Auto-mined block {index} went stale, retrying on the new tip")
                    }
                    Err(e) => {
                        warn!("Auto-mining stopped: {e}");
                        break;
                    }
                }
            }
        });
    }
}
