// Entry point for the ledger node binary
// startnode runs a node with its HTTP API; printchain and verifychain read a
// stopped node's database directly.
use clap::Parser;
use ledger_node::cli::StartNodeArgs;
use ledger_node::network::server;
use ledger_node::storage::{ChainStore, SledChainStore};
use ledger_node::{Chain, Command, Config, NodeService, Opt};
use log::{error, info, warn, LevelFilter};
use std::path::Path;
use std::process;

fn main() {
    // Info by default, debug with --verbose, and RUST_LOG still wins
    let opt = Opt::parse();
    let level = if opt.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::builder()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::StartNode(args) => start_node(args)?,
        Command::PrintChain { data_dir, node_id } => {
            let blocks = open_store(&data_dir, &node_id)?.load()?;
            for block in &blocks {
                println!("Block #{}", block.get_index());
                println!("Prev hash: {}", block.get_previous_hash());
                println!("Hash: {}", block.get_hash());
                println!("Timestamp: {}", block.get_timestamp());
                println!("Miner: {}", block.get_miner());
                println!(
                    "Nonce: {} (difficulty {})",
                    block.get_nonce(),
                    block.get_difficulty()
                );
                for tx in block.get_transactions() {
                    println!(
                        "- {} : {} -> {} amount {}",
                        tx.get_id(),
                        tx.get_sender(),
                        tx.get_receiver(),
                        tx.get_amount()
                    );
                }
                println!()
            }
        }
        Command::VerifyChain { data_dir, node_id } => {
            let blocks = open_store(&data_dir, &node_id)?.load()?;
            Chain::validate(&blocks)?;
            println!("Chain of {} blocks is valid", blocks.len());
        }
    }
    Ok(())
}

fn open_store(data_dir: &Path, node_id: &str) -> ledger_node::Result<SledChainStore> {
    let path = SledChainStore::node_db_path(data_dir, node_id);
    if !path.exists() {
        return Err(ledger_node::BlockchainError::Config(format!(
            "No database for node {node_id} at {}",
            path.display()
        )));
    }
    SledChainStore::open(&path)
}

fn start_node(args: StartNodeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    let listen_addr = config.listen_addr.clone();

    // The HTTP transport blocks, so bootstrap runs before the runtime exists
    let node = NodeService::start(config)?;
    match node.bootstrap() {
        Ok(results) => {
            for result in results {
                info!("Startup sync with {}: {:?}", result.peer, result.outcome);
            }
        }
        Err(e) => warn!("Startup sync failed: {e}"),
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::serve(node.clone(), &listen_addr))?;
    // Shut the runtime down before the last handle to the node goes away
    drop(runtime);
    drop(node);
    Ok(())
}
