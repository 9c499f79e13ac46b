// How this node talks to its peers
// The rest of the node only sees the PeerTransport trait, so sync and gossip
// can be driven by a stub in tests. HttpTransport is the real thing and uses
// blocking reqwest: call it from plain threads or spawn_blocking, never from
// inside an async task.
// A peer that cannot be reached is PeerUnreachable. A peer that answers /chain
// with an error status or a body that is not a chain is InvalidChain.

use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::messages::{BlockAnnouncement, PeerRequest, PeersResponse, SubmitRequest};
use reqwest::blocking::{Client, Response};
use std::time::Duration;

pub trait PeerTransport: Send + Sync {
    /// The peer's full chain, genesis first.
    fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>>;

    /// Tell `peer` about us and return the peers it knows.
    fn register_with(&self, peer: &str, own_url: &str) -> Result<Vec<String>>;

    fn announce_transaction(&self, peer: &str, tx: &Transaction, own_url: &str) -> Result<()>;

    fn announce_block(&self, peer: &str, block: &Block, own_url: &str) -> Result<()>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<HttpTransport> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| BlockchainError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(HttpTransport { client })
    }

    fn unreachable(peer: &str, reason: impl std::fmt::Display) -> BlockchainError {
        BlockchainError::PeerUnreachable {
            peer: peer.to_string(),
            reason: reason.to_string(),
        }
    }

    fn check_status(peer: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(BlockchainError::Network(format!("{peer} answered {status}")))
        }
    }

    fn post_json<T: serde::Serialize>(
        &self,
        peer: &str,
        path: &str,
        body: &T,
    ) -> Result<Response> {
        let response = self
            .client
            .post(format!("{peer}{path}"))
            .json(body)
            .send()
            .map_err(|e| Self::unreachable(peer, e))?;
        Self::check_status(peer, response)
    }
}

impl PeerTransport for HttpTransport {
    fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>> {
        let response = self
            .client
            .get(format!("{peer}/chain"))
            .send()
            .map_err(|e| Self::unreachable(peer, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BlockchainError::InvalidChain(format!(
                "{peer} answered {status} for its chain"
            )));
        }
        let chain: Vec<Block> = response.json().map_err(|e| {
            BlockchainError::InvalidChain(format!("{peer} sent a malformed chain: {e}"))
        })?;
        Ok(chain)
    }

    fn register_with(&self, peer: &str, own_url: &str) -> Result<Vec<String>> {
        let body = PeerRequest {
            peer: Some(own_url.to_string()),
        };
        let peers: PeersResponse = self
            .post_json(peer, "/register", &body)?
            .json()
            .map_err(|e| {
                BlockchainError::Network(format!("{peer} sent a malformed peer list: {e}"))
            })?;
        Ok(peers.peers)
    }

    fn announce_transaction(&self, peer: &str, tx: &Transaction, own_url: &str) -> Result<()> {
        let body = SubmitRequest::from_transaction(tx, Some(own_url))?;
        self.post_json(peer, "/submit", &body)?;
        Ok(())
    }

    fn announce_block(&self, peer: &str, block: &Block, own_url: &str) -> Result<()> {
        let body = BlockAnnouncement {
            peer: own_url.to_string(),
            block: block.clone(),
        };
        self.post_json(peer, "/receive_block", &body)?;
        Ok(())
    }
}
