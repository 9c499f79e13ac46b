use crate::core::MinerConfig;
use crate::error::{BlockchainError, Result};
use crate::network::peers::normalize_peer_url;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

static DEFAULT_NODE_ADDR: &str = "127.0.0.1:5000";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const NODE_ID_KEY: &str = "NODE_ID";
const NODE_PEERS_KEY: &str = "NODE_PEERS"; // comma separated URLs
const NODE_DIFFICULTY_KEY: &str = "NODE_DIFFICULTY";
const NODE_DATA_DIR_KEY: &str = "NODE_DATA_DIR";

/// Highest difficulty a 256-bit hash can satisfy (64 leading zero hex digits).
pub const MAX_DIFFICULTY: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity used as block `miner` and in the database directory name.
    /// Falls back to the listen port.
    pub node_id: Option<String>,
    pub listen_addr: String,
    /// URL peers use to reach this node. Falls back to `http://{listen_addr}`.
    pub public_url: Option<String>,
    pub peers: Vec<String>,
    pub difficulty: u32,
    /// Lowest difficulty accepted on a peer's non-genesis blocks.
    pub min_peer_difficulty: u32,
    pub max_block_transactions: usize,
    pub allow_empty_blocks: bool,
    pub require_signatures: bool,
    pub block_reward: u64,
    pub auto_mine: bool,
    pub data_dir: PathBuf,
    pub persist: bool,
    pub event_buffer: usize,
    pub peer_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_id: None,
            listen_addr: DEFAULT_NODE_ADDR.to_string(),
            public_url: None,
            peers: Vec::new(),
            difficulty: 4,
            min_peer_difficulty: 1,
            max_block_transactions: 100,
            allow_empty_blocks: true,
            require_signatures: false,
            block_reward: 0,
            auto_mine: false,
            data_dir: PathBuf::from("data"),
            persist: true,
            event_buffer: 256,
            peer_timeout_ms: 3000,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path).map_err(|e| {
            BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay environment variables. `lookup` stands in for `env::var` so
    /// tests do not have to touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(NODE_ADDRESS_KEY) {
            self.listen_addr = addr;
        }
        if let Some(node_id) = lookup(NODE_ID_KEY) {
            self.node_id = Some(node_id);
        }
        if let Some(peers) = lookup(NODE_PEERS_KEY) {
            self.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(difficulty) = lookup(NODE_DIFFICULTY_KEY) {
            self.difficulty = difficulty.trim().parse().map_err(|e| {
                BlockchainError::Config(format!("{NODE_DIFFICULTY_KEY}={difficulty}: {e}"))
            })?;
        }
        if let Some(data_dir) = lookup(NODE_DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(data_dir);
        }
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) {
        let host = self
            .listen_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        self.listen_addr = format!("{host}:{port}");
    }

    /// Extract node ID from address (e.g., "127.0.0.1:5000" -> "5000")
    pub fn extract_node_id_from_addr(&self) -> String {
        match self.listen_addr.rsplit_once(':') {
            Some((_, port)) if !port.is_empty() => port.to_string(),
            _ => "default".to_string(),
        }
    }

    pub fn get_node_id(&self) -> String {
        self.node_id
            .clone()
            .unwrap_or_else(|| self.extract_node_id_from_addr())
    }

    pub fn get_public_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.listen_addr),
        }
    }

    pub fn get_peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn miner_config(&self) -> MinerConfig {
        MinerConfig {
            difficulty: self.difficulty,
            max_block_transactions: self.max_block_transactions,
            allow_empty_blocks: self.allow_empty_blocks,
            block_reward: self.block_reward,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Config(format!(
                "difficulty {} exceeds the maximum of {MAX_DIFFICULTY}",
                self.difficulty
            )));
        }
        if self.min_peer_difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Config(format!(
                "min_peer_difficulty {} exceeds the maximum of {MAX_DIFFICULTY}",
                self.min_peer_difficulty
            )));
        }
        if self.max_block_transactions == 0 {
            return Err(BlockchainError::Config(
                "max_block_transactions must be at least 1".to_string(),
            ));
        }
        if self.get_node_id().trim().is_empty() {
            return Err(BlockchainError::Config("node id must not be empty".to_string()));
        }
        if self.event_buffer == 0 {
            return Err(BlockchainError::Config("event_buffer must be at least 1".to_string()));
        }
        normalize_peer_url(&self.get_public_url())
            .map_err(|e| BlockchainError::Config(format!("public url: {e}")))?;
        for peer in &self.peers {
            normalize_peer_url(peer).map_err(|e| BlockchainError::Config(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.get_node_id(), "5000");
        assert_eq!(config.get_public_url(), "http://127.0.0.1:5000");
        assert_eq!(config.miner_config(), MinerConfig::default());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = Config::from_toml(
            r#"
            node_id = "alpha"
            difficulty = 2
            min_peer_difficulty = 2
            peers = ["http://127.0.0.1:5001"]
            "#,
        )
        .unwrap();
        assert_eq!(config.get_node_id(), "alpha");
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.min_peer_difficulty, 2);
        assert_eq!(config.peers, vec!["http://127.0.0.1:5001".to_string()]);
        assert_eq!(config.max_block_transactions, 100);
    }

    #[test]
    fn test_file_loading() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("node.toml");
        fs::write(&path, "listen_addr = \"127.0.0.1:6000\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.get_node_id(), "6000");

        assert!(Config::from_file(&temp_dir.path().join("missing.toml")).is_err());
        fs::write(&path, "difficulty = \"hard\"").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("NODE_ADDRESS", "0.0.0.0:7000"),
            ("NODE_PEERS", "http://a:1, http://b:2,"),
            ("NODE_DIFFICULTY", "3"),
            ("NODE_DATA_DIR", "/var/lib/ledger"),
        ]);
        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:7000");
        assert_eq!(config.get_node_id(), "7000");
        assert_eq!(
            config.peers,
            vec!["http://a:1".to_string(), "http://b:2".to_string()]
        );
        assert_eq!(config.difficulty, 3);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ledger"));

        let mut bad = Config::default();
        assert!(bad
            .apply_env(|key| (key == "NODE_DIFFICULTY").then(|| "four".to_string()))
            .is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config {
            difficulty: 65,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.difficulty = 4;
        config.min_peer_difficulty = 65;
        assert!(config.validate().is_err());

        config.min_peer_difficulty = 1;
        config.max_block_transactions = 0;
        assert!(config.validate().is_err());

        config.max_block_transactions = 10;
        config.node_id = Some("  ".to_string());
        assert!(config.validate().is_err());

        config.node_id = None;
        config.peers = vec!["localhost:5001".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_set_port() {
        let mut config = Config::default();
        config.set_port(5005);
        assert_eq!(config.listen_addr, "127.0.0.1:5005");
        assert_eq!(config.get_node_id(), "5005");
    }
}
