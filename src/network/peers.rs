use crate::error::{BlockchainError, Result};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;

/// Check that `addr` is an http(s) base URL and return it in the form the
/// registry stores: no trailing slash, no path, query or fragment.
pub fn normalize_peer_url(addr: &str) -> Result<String> {
    let parsed = Url::parse(addr.trim())
        .map_err(|e| BlockchainError::Validation(format!("invalid peer URL {addr}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(BlockchainError::Validation(format!(
            "peer URL {addr} must use http or https"
        )));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| BlockchainError::Validation(format!("peer URL {addr} has no host")))?;
    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(BlockchainError::Validation(format!(
            "peer URL {addr} must not carry a path"
        )));
    }
    Ok(match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    })
}

/// Known peers of this node, by base URL. Never contains the node itself.
pub struct PeerRegistry {
    own_url: String,
    inner: RwLock<Vec<String>>,
}

impl PeerRegistry {
    pub fn new(own_url: &str) -> PeerRegistry {
        PeerRegistry {
            own_url: normalize_peer_url(own_url).unwrap_or_else(|_| own_url.to_string()),
            inner: RwLock::new(vec![]),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<String>> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<String>> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn get_own_url(&self) -> &str {
        self.own_url.as_str()
    }

    /// Returns the normalized URL when it was not known before.
    pub fn add_peer(&self, addr: &str) -> Result<Option<String>> {
        let peer = normalize_peer_url(addr)?;
        if peer == self.own_url {
            return Ok(None);
        }
        let mut inner = self.write();
        if inner.iter().any(|known| known == &peer) {
            return Ok(None);
        }
        inner.push(peer.clone());
        Ok(Some(peer))
    }

    pub fn get_peers(&self) -> Vec<String> {
        self.read().clone()
    }
}
