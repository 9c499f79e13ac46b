use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ledger-node", about = "A proof-of-work ledger node")]
pub struct Opt {
    #[arg(short, long, global = true, help = "Log at debug level")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a node and serve its HTTP API")]
    StartNode(StartNodeArgs),
    #[command(name = "printchain", about = "Print every block stored by a node")]
    PrintChain {
        #[arg(long = "data-dir", default_value = "data", help = "Directory holding node databases")]
        data_dir: PathBuf,
        #[arg(long = "node-id", help = "Node whose database to read")]
        node_id: String,
    },
    #[command(name = "verifychain", about = "Validate the chain stored by a node")]
    VerifyChain {
        #[arg(long = "data-dir", default_value = "data", help = "Directory holding node databases")]
        data_dir: PathBuf,
        #[arg(long = "node-id", help = "Node whose database to read")]
        node_id: String,
    },
}

/// Flags for `startnode`. Anything given here wins over the config file and
/// the environment.
#[derive(Args, Debug, Default)]
pub struct StartNodeArgs {
    #[arg(short, long, help = "TOML config file")]
    pub config: Option<PathBuf>,
    #[arg(short, long, help = "Port to listen on")]
    pub port: Option<u16>,
    #[arg(long = "node-id", help = "Node identity, defaults to the port")]
    pub node_id: Option<String>,
    #[arg(long = "peer", help = "Peer base URL, repeatable")]
    pub peers: Vec<String>,
    #[arg(long, help = "Leading zero hex digits required of block hashes")]
    pub difficulty: Option<u32>,
    #[arg(long = "data-dir", help = "Directory holding node databases")]
    pub data_dir: Option<PathBuf>,
    #[arg(long, help = "Keep the chain in memory only")]
    pub ephemeral: bool,
    #[arg(long = "auto-mine", help = "Mine as soon as transactions arrive")]
    pub auto_mine: bool,
    #[arg(long = "require-signatures", help = "Reject unsigned transactions")]
    pub require_signatures: bool,
}

impl StartNodeArgs {
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.set_port(port);
        }
        if let Some(node_id) = &self.node_id {
            config.node_id = Some(node_id.clone());
        }
        if !self.peers.is_empty() {
            config.peers = self.peers.clone();
        }
        if let Some(difficulty) = self.difficulty {
            config.difficulty = difficulty;
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if self.ephemeral {
            config.persist = false;
        }
        if self.auto_mine {
            config.auto_mine = true;
        }
        if self.require_signatures {
            config.require_signatures = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_startnode_flags() {
        let opt = Opt::parse_from([
            "ledger-node",
            "startnode",
            "--port",
            "5001",
            "--peer",
            "http://127.0.0.1:5000",
            "--peer",
            "http://127.0.0.1:5002",
            "--difficulty",
            "2",
            "--ephemeral",
        ]);
        let Command::StartNode(args) = opt.command else {
            panic!("expected startnode");
        };

        let mut config = Config::default();
        args.apply_to(&mut config);
        assert_eq!(config.listen_addr, "127.0.0.1:5001");
        assert_eq!(config.get_node_id(), "5001");
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.difficulty, 2);
        assert!(!config.persist);
        assert!(!config.auto_mine);
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let mut config = Config {
            difficulty: 6,
            peers: vec!["http://127.0.0.1:5000".to_string()],
            ..Config::default()
        };
        StartNodeArgs::default().apply_to(&mut config);
        assert_eq!(config.difficulty, 6);
        assert_eq!(config.peers.len(), 1);
        assert!(config.persist);
    }

    #[test]
    fn test_verbose_is_global() {
        let opt = Opt::parse_from(["ledger-node", "verifychain", "--node-id", "5000", "-v"]);
        assert!(opt.verbose);
        assert!(matches!(opt.command, Command::VerifyChain { .. }));
    }
}
