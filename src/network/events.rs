//! Node event fan-out
//!
//! Every interesting state change is published as a `NodeEvent`. Publishing
//! never blocks: subscribers that fall behind the buffer lose the oldest
//! events and are told how many they missed. With no subscribers an event is
//! simply dropped.

use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;

pub const DEFAULT_EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NodeEvent {
    TransactionAccepted { tx_id: String, sender: String, receiver: String, amount: u64 },
    MiningStarted { index: u64, transactions: usize },
    BlockMined { index: u64, hash: String, transactions: usize },
    MiningDiscarded { index: u64, reason: String },
    BlockAccepted { index: u64, hash: String, peer: String },
    ChainUpdated { peer: String, length: usize },
    ChainUpToDate { length: usize },
    PeerDiscovered { peer: String },
}

impl fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeEvent::TransactionAccepted { tx_id, sender, receiver, amount } => write!(
                f,
                "Transaction {tx_id} accepted: {sender} -> {receiver} ({amount})"
            ),
            NodeEvent::MiningStarted { index, transactions } => write!(
                f,
                "Mining block {index} with {transactions} transaction(s)"
            ),
            NodeEvent::BlockMined { index, hash, transactions } => write!(
                f,
                "Block {index} mined with {transactions} transaction(s): {hash}"
            ),
            NodeEvent::MiningDiscarded { index, reason } => {
                write!(f, "Mining of block {index} discarded: {reason}")
            }
            NodeEvent::BlockAccepted { index, hash, peer } => {
                write!(f, "Block {index} received from {peer} and appended: {hash}")
            }
            NodeEvent::ChainUpdated { peer, length } => {
                write!(f, "Chain replaced with length {length} from {peer}")
            }
            NodeEvent::ChainUpToDate { length } => {
                write!(f, "No updates from peers, chain length {length} is current")
            }
            NodeEvent::PeerDiscovered { peer } => write!(f, "Discovered peer {peer}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<NodeEvent>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> EventBroadcaster {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBroadcaster { sender }
    }

    /// Returns how many subscribers will see the event.
    pub fn publish(&self, event: NodeEvent) -> usize {
        log::debug!("event: {event}");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let events = EventBroadcaster::new(4);
        assert_eq!(events.publish(NodeEvent::ChainUpToDate { length: 1 }), 0);
    }

    #[test]
    fn test_subscribers_see_events_in_order() {
        let events = EventBroadcaster::new(8);
        let mut first = events.subscribe();
        let mut second = events.subscribe();
        events.publish(NodeEvent::MiningStarted { index: 1, transactions: 0 });
        events.publish(NodeEvent::PeerDiscovered { peer: "http://a".into() });

        for receiver in [&mut first, &mut second] {
            assert_eq!(
                receiver.try_recv().unwrap(),
                NodeEvent::MiningStarted { index: 1, transactions: 0 }
            );
            assert_eq!(
                receiver.try_recv().unwrap(),
                NodeEvent::PeerDiscovered { peer: "http://a".into() }
            );
            assert_eq!(receiver.try_recv(), Err(TryRecvError::Empty));
        }
    }

    #[test]
    fn test_slow_subscriber_skips_oldest() {
        let events = EventBroadcaster::new(2);
        let mut slow = events.subscribe();
        for length in 1..=4 {
            events.publish(NodeEvent::ChainUpToDate { length });
        }
        assert_eq!(slow.try_recv(), Err(TryRecvError::Lagged(2)));
        assert_eq!(
            slow.try_recv().unwrap(),
            NodeEvent::ChainUpToDate { length: 3 }
        );
    }

    #[tokio::test]
    async fn test_async_receive() {
        let events = EventBroadcaster::default();
        let mut receiver = events.subscribe();
        events.publish(NodeEvent::ChainUpdated { peer: "http://b".into(), length: 4 });
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.to_string(), "Chain replaced with length 4 from http://b");
        drop(events);
        assert_eq!(receiver.recv().await, Err(RecvError::Closed));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(NodeEvent::BlockMined {
            index: 2,
            hash: "00ab".into(),
            transactions: 1,
        })
        .unwrap();
        assert_eq!(json["event"], "block_mined");
        assert_eq!(json["index"], 2);
    }
}
