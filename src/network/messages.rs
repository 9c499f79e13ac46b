//! JSON bodies exchanged between nodes and with clients

use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

/// Body of `POST /submit`. `tx_id` and `peer` are set when another node
/// gossips a transaction it accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub sender: String,
    pub receiver: String,
    // Signed so a negative amount reaches validation instead of failing JSON parsing
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

impl SubmitRequest {
    pub fn from_transaction(tx: &Transaction, peer: Option<&str>) -> Result<SubmitRequest> {
        let amount = i64::try_from(tx.get_amount()).map_err(|_| {
            BlockchainError::Validation(format!("amount {} is out of range", tx.get_amount()))
        })?;
        Ok(SubmitRequest {
            sender: tx.get_sender().to_string(),
            receiver: tx.get_receiver().to_string(),
            amount,
            nonce: Some(tx.get_nonce()),
            signature: tx.get_signature().map(str::to_string),
            tx_id: Some(tx.get_id().to_string()),
            peer: peer.map(str::to_string),
        })
    }

    /// Build the transaction this request describes. A missing nonce is
    /// filled with `default_nonce`.
    pub fn to_transaction(&self, default_nonce: u64) -> Result<Transaction> {
        let amount = u64::try_from(self.amount).map_err(|_| {
            BlockchainError::Validation(format!("amount must be non-negative, got {}", self.amount))
        })?;
        let nonce = self.nonce.unwrap_or(default_nonce);
        Ok(match (&self.tx_id, &self.signature) {
            (Some(tx_id), signature) => Transaction::from_parts(
                tx_id,
                &self.sender,
                &self.receiver,
                amount,
                nonce,
                signature.clone(),
            ),
            (None, Some(signature)) => {
                Transaction::new_signed(&self.sender, &self.receiver, amount, nonce, signature)
            }
            (None, None) => Transaction::new_unsigned(&self.sender, &self.receiver, amount, nonce),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerRequest {
    #[serde(default)]
    pub peer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: Vec<String>,
}

/// Body of `POST /receive_block`. Older nodes name the sender `miner`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockAnnouncement {
    #[serde(alias = "miner")]
    pub peer: String,
    pub block: Block,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::test_utils::{signed_transaction, TestKey};

    fn request(amount: i64) -> SubmitRequest {
        SubmitRequest {
            sender: "alice".into(),
            receiver: "bob".into(),
            amount,
            nonce: Some(3),
            signature: None,
            tx_id: None,
            peer: None,
        }
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        assert!(matches!(
            request(-5).to_transaction(0),
            Err(BlockchainError::Validation(_))
        ));
    }

    #[test]
    fn test_unsigned_request_builds_transaction() {
        let tx = request(10).to_transaction(99).unwrap();
        assert_eq!(tx, Transaction::new_unsigned("alice", "bob", 10, 3));

        let mut no_nonce = request(10);
        no_nonce.nonce = None;
        assert_eq!(no_nonce.to_transaction(99).unwrap().get_nonce(), 99);
    }

    #[test]
    fn test_gossiped_request_keeps_identity() {
        let key = TestKey::generate();
        let tx = signed_transaction(&key, "bob", 7, 2);
        let gossip = SubmitRequest::from_transaction(&tx, Some("http://127.0.0.1:5000")).unwrap();
        assert_eq!(gossip.peer.as_deref(), Some("http://127.0.0.1:5000"));
        assert_eq!(gossip.to_transaction(0).unwrap(), tx);
    }

    #[test]
    fn test_announcement_accepts_miner_alias() {
        let json = serde_json::json!({
            "miner": "http://127.0.0.1:5001",
            "block": Block::genesis(),
        });
        let announcement: BlockAnnouncement = serde_json::from_value(json).unwrap();
        assert_eq!(announcement.peer, "http://127.0.0.1:5001");
        assert!(announcement.block.is_genesis());
    }
}
