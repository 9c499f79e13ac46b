// Pulling chains from peers
// I fetch a peer's whole chain, let the consensus rule decide, and publish
// the winner with a compare-and-swap on the tip I decided against. If another
// writer got in first I re-decide against the new tip a few times before
// giving up.

use crate::core::{ConsensusResolver, RejectReason, Resolution};
use crate::error::{BlockchainError, Result};
use crate::network::events::{EventBroadcaster, NodeEvent};
use crate::network::transport::PeerTransport;
use crate::storage::{Ledger, MemoryPool};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

pub const MAX_SWAP_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Updated { length: usize },
    NoChange,
    PeerUnreachable { reason: String },
    RejectedInvalidChain { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerSyncResult {
    pub peer: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

pub struct PeerSyncCoordinator {
    ledger: Arc<Ledger>,
    mempool: Arc<MemoryPool>,
    events: EventBroadcaster,
    transport: Arc<dyn PeerTransport>,
    resolver: ConsensusResolver,
}

impl PeerSyncCoordinator {
    pub fn new(
        ledger: Arc<Ledger>,
        mempool: Arc<MemoryPool>,
        events: EventBroadcaster,
        transport: Arc<dyn PeerTransport>,
        resolver: ConsensusResolver,
    ) -> PeerSyncCoordinator {
        PeerSyncCoordinator {
            ledger,
            mempool,
            events,
            transport,
            resolver,
        }
    }

    /// Sync against one peer. An `Err` means local storage failed; every
    /// peer-side problem is an outcome.
    pub fn sync_with(&self, peer: &str) -> Result<SyncOutcome> {
        let blocks = match self.transport.fetch_chain(peer) {
            Ok(blocks) => blocks,
            Err(BlockchainError::InvalidChain(reason)) => {
                warn!("Rejected chain from {peer}: {reason}");
                return Ok(SyncOutcome::RejectedInvalidChain { reason });
            }
            Err(e) => {
                warn!("Could not fetch chain from {peer}: {e}");
                return Ok(SyncOutcome::PeerUnreachable {
                    reason: e.to_string(),
                });
            }
        };

        let local = self.ledger.current_snapshot();
        let foreign = match self.resolver.resolve(&local, blocks) {
            Resolution::Adopted(chain) => chain,
            Resolution::Rejected(RejectReason::InvalidChain(reason)) => {
                warn!("Rejected chain from {peer}: {reason}");
                return Ok(SyncOutcome::RejectedInvalidChain { reason });
            }
            Resolution::Rejected(reason @ RejectReason::NotLonger { .. }) => {
                info!("Keeping local chain over {peer}: {reason}");
                return Ok(SyncOutcome::NoChange);
            }
        };

        let mut expected_tip = local.tip_hash().to_string();
        for attempt in 1..=MAX_SWAP_ATTEMPTS {
            match self.ledger.compare_and_swap(&expected_tip, foreign.clone(), |chain| {
                self.mempool.remove_all_committed(chain);
            }) {
                Ok(adopted) => {
                    info!("Adopted chain of length {} from {peer}", adopted.len());
                    self.events.publish(NodeEvent::ChainUpdated {
                        peer: peer.to_string(),
                        length: adopted.len(),
                    });
                    return Ok(SyncOutcome::Updated {
                        length: adopted.len(),
                    });
                }
                Err(BlockchainError::StaleChain { .. }) => {
                    let latest = self.ledger.current_snapshot();
                    if !self.resolver.prefers(&latest, &foreign) {
                        return Ok(SyncOutcome::NoChange);
                    }
                    warn!("Retrying adoption from {peer} (attempt {attempt}/{MAX_SWAP_ATTEMPTS})");
                    expected_tip = latest.tip_hash().to_string();
                }
                Err(e) => return Err(e),
            }
        }
        warn!("Gave up adopting the chain from {peer} after {MAX_SWAP_ATTEMPTS} lost races");
        Ok(SyncOutcome::NoChange)
    }

    /// Sync against each peer in turn. A local storage failure stops the run.
    pub fn sync_all(&self, peers: &[String]) -> Result<Vec<PeerSyncResult>> {
        let mut results = Vec::with_capacity(peers.len());
        for peer in peers {
            let outcome = self.sync_with(peer)?;
            results.push(PeerSyncResult {
                peer: peer.clone(),
                outcome,
            });
        }
        if !results.is_empty()
            && !results
                .iter()
                .any(|r| matches!(r.outcome, SyncOutcome::Updated { .. }))
        {
            self.events.publish(NodeEvent::ChainUpToDate {
                length: self.ledger.current_snapshot().len(),
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use crate::network::transport::HttpTransport;
    use crate::testnet::test_utils::{build_chain, serve_once, StubTransport};
    use std::time::Duration;

    struct Fixture {
        ledger: Arc<Ledger>,
        mempool: Arc<MemoryPool>,
        transport: Arc<StubTransport>,
        sync: PeerSyncCoordinator,
        events: EventBroadcaster,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(Ledger::in_memory());
        let mempool = Arc::new(MemoryPool::new());
        let transport = Arc::new(StubTransport::new());
        let events = EventBroadcaster::new(16);
        let sync = PeerSyncCoordinator::new(
            ledger.clone(),
            mempool.clone(),
            events.clone(),
            transport.clone(),
            ConsensusResolver::new(),
        );
        Fixture {
            ledger,
            mempool,
            transport,
            sync,
            events,
        }
    }

    #[test]
    fn test_longer_chain_is_adopted() {
        let f = fixture();
        let mut receiver = f.events.subscribe();
        let peer_chain = build_chain("peer", 4, 1);
        f.transport.serve_chain("http://peer", peer_chain.clone());

        let committed = peer_chain[1].get_transactions()[0].clone();
        f.mempool.submit(committed.clone());
        let pending = Transaction::new_unsigned("carol", "dave", 1, 1);
        f.mempool.submit(pending.clone());

        assert_eq!(
            f.sync.sync_with("http://peer").unwrap(),
            SyncOutcome::Updated { length: 4 }
        );
        assert_eq!(f.ledger.current_snapshot().blocks(), peer_chain.as_slice());
        assert!(!f.mempool.contains(committed.get_id()));
        assert!(f.mempool.contains(pending.get_id()));
        assert_eq!(
            receiver.try_recv().unwrap(),
            NodeEvent::ChainUpdated {
                peer: "http://peer".into(),
                length: 4
            }
        );
    }

    #[test]
    fn test_equal_chain_is_no_change() {
        let f = fixture();
        f.transport.serve_chain("http://peer", build_chain("peer", 1, 1));
        assert_eq!(f.sync.sync_with("http://peer").unwrap(), SyncOutcome::NoChange);
        assert_eq!(f.ledger.version(), 0);
    }

    #[test]
    fn test_invalid_chain_is_rejected() {
        let f = fixture();
        let mut broken = build_chain("peer", 6, 1);
        broken.remove(3);
        f.transport.serve_chain("http://peer", broken);
        assert!(matches!(
            f.sync.sync_with("http://peer").unwrap(),
            SyncOutcome::RejectedInvalidChain { .. }
        ));
        assert_eq!(f.ledger.current_snapshot().len(), 1);
    }

    #[test]
    fn test_malformed_chain_over_http_is_rejected() {
        let ledger = Arc::new(Ledger::in_memory());
        let sync = PeerSyncCoordinator::new(
            ledger.clone(),
            Arc::new(MemoryPool::new()),
            EventBroadcaster::default(),
            Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap()),
            ConsensusResolver::new(),
        );
        let peer = serve_once("200 OK", r#"[{"index":0,"previous_hash":"0","timestamp":1.5}]"#);
        assert!(matches!(
            sync.sync_with(&peer).unwrap(),
            SyncOutcome::RejectedInvalidChain { .. }
        ));
        assert_eq!(ledger.version(), 0);
    }

    #[test]
    fn test_unreachable_peer() {
        let f = fixture();
        assert!(matches!(
            f.sync.sync_with("http://nobody").unwrap(),
            SyncOutcome::PeerUnreachable { .. }
        ));
    }

    #[test]
    fn test_sync_all_picks_the_longest() {
        let f = fixture();
        let mut receiver = f.events.subscribe();
        f.transport.serve_chain("http://a", build_chain("a", 3, 1));
        f.transport.serve_chain("http://b", build_chain("b", 5, 1));
        let peers = vec![
            "http://a".to_string(),
            "http://b".to_string(),
            "http://down".to_string(),
        ];
        let results = f.sync.sync_all(&peers).unwrap();
        let outcomes: Vec<_> = results.into_iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes[0], SyncOutcome::Updated { length: 3 });
        assert_eq!(outcomes[1], SyncOutcome::Updated { length: 5 });
        assert!(matches!(outcomes[2], SyncOutcome::PeerUnreachable { .. }));
        assert_eq!(f.ledger.current_snapshot().len(), 5);

        assert!(matches!(
            receiver.try_recv().unwrap(),
            NodeEvent::ChainUpdated { length: 3, .. }
        ));
        assert!(matches!(
            receiver.try_recv().unwrap(),
            NodeEvent::ChainUpdated { length: 5, .. }
        ));

        // Nothing new the second time round
        f.sync.sync_all(&peers).unwrap();
        assert_eq!(
            receiver.try_recv().unwrap(),
            NodeEvent::ChainUpToDate { length: 5 }
        );
    }

    #[test]
    fn test_outcome_json() {
        let result = PeerSyncResult {
            peer: "http://a".into(),
            outcome: SyncOutcome::Updated { length: 3 },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["peer"], "http://a");
        assert_eq!(json["outcome"], "updated");
        assert_eq!(json["length"], 3);
    }
}
