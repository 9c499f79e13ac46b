//! Test utilities for ledger testing

use crate::config::Config;
use crate::core::{Block, ProofOfWork, SearchOutcome, Transaction, GENESIS_TIMESTAMP};
use crate::error::{BlockchainError, Result};
use crate::network::transport::PeerTransport;
use crate::storage::ChainStore;
use crate::utils::{ecdsa_p256_sha256_sign_digest, new_key_pair, public_key_from_pkcs8};
use data_encoding::HEXLOWER;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Mutex;
use std::thread;

/// A P-256 key pair for signing test transactions
pub struct TestKey {
    pkcs8: Vec<u8>,
    public_key_hex: String,
}

impl TestKey {
    pub fn generate() -> TestKey {
        let pkcs8 = new_key_pair().unwrap();
        let public_key = public_key_from_pkcs8(&pkcs8).unwrap();
        TestKey {
            pkcs8,
            public_key_hex: HEXLOWER.encode(&public_key),
        }
    }

    pub fn public_key_hex(&self) -> &str {
        self.public_key_hex.as_str()
    }

    pub fn sign_hex(&self, message: &[u8]) -> String {
        HEXLOWER.encode(&ecdsa_p256_sha256_sign_digest(&self.pkcs8, message).unwrap())
    }
}

/// A transaction from `key`'s address, signed the way a client would
pub fn signed_transaction(key: &TestKey, receiver: &str, amount: u64, nonce: u64) -> Transaction {
    let payload = Transaction::signing_payload(key.public_key_hex(), receiver, amount, nonce);
    Transaction::new_signed(
        key.public_key_hex(),
        receiver,
        amount,
        nonce,
        &key.sign_hex(&payload),
    )
}

/// Mine a block on top of `parent` with a deterministic timestamp
pub fn mine_on(
    parent: &Block,
    index: u64,
    miner: &str,
    transactions: Vec<Transaction>,
    difficulty: u32,
) -> Block {
    let mut block = Block::new_candidate(
        index,
        parent.get_hash(),
        GENESIS_TIMESTAMP + index as i64 * 1000,
        transactions,
        miner,
        difficulty,
    );
    match ProofOfWork::new_proof_of_work(difficulty).run(&block) {
        SearchOutcome::Found { nonce, hash } => block.seal(nonce, hash),
        other => panic!("test block could not be mined: {other:?}"),
    }
    block
}

/// A valid chain of `length` blocks (genesis included), one transaction per
/// mined block. Different miners produce chains with different transactions.
pub fn build_chain(miner: &str, length: usize, difficulty: u32) -> Vec<Block> {
    let genesis = vec![Block::genesis().clone()];
    extend_chain(&genesis, length.saturating_sub(1), miner, difficulty)
}

/// `base` plus `count` more blocks
pub fn extend_chain(base: &[Block], count: usize, miner: &str, difficulty: u32) -> Vec<Block> {
    let mut blocks = base.to_vec();
    for _ in 0..count {
        let parent = &blocks[blocks.len() - 1];
        let index = parent.get_index() + 1;
        let tx = Transaction::new_unsigned(&format!("{miner}-wallet"), "bob", index, index);
        let block = mine_on(parent, index, miner, vec![tx], difficulty);
        blocks.push(block);
    }
    blocks
}

/// A loopback HTTP peer that answers exactly one request with `status` and
/// a JSON `body`, whatever was asked. Returns its base URL.
pub fn serve_once(status: &str, body: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        stream.write_all(response.as_bytes()).unwrap();
    });
    url
}

/// Ephemeral config with trivial difficulty
pub fn test_config() -> Config {
    Config {
        difficulty: 1,
        persist: false,
        ..Config::default()
    }
}

/// Holds only genesis and fails every write
pub struct FailingStore;

impl FailingStore {
    pub fn new() -> FailingStore {
        FailingStore
    }
}

impl ChainStore for FailingStore {
    fn load(&self) -> Result<Vec<Block>> {
        Ok(vec![Block::genesis().clone()])
    }

    fn append(&self, _block: &Block) -> Result<()> {
        Err(BlockchainError::Database("disk full".to_string()))
    }

    fn replace(&self, _blocks: &[Block]) -> Result<()> {
        Err(BlockchainError::Database("disk full".to_string()))
    }
}

/// In-process stand-in for peers. Unknown peers are unreachable.
#[derive(Default)]
pub struct StubTransport {
    chains: Mutex<HashMap<String, Vec<Block>>>,
    peer_lists: Mutex<HashMap<String, Vec<String>>>,
    registrations: Mutex<Vec<String>>,
    announced_transactions: Mutex<Vec<(String, String)>>,
    announced_blocks: Mutex<Vec<(String, String)>>,
}

impl StubTransport {
    pub fn new() -> StubTransport {
        StubTransport::default()
    }

    pub fn serve_chain(&self, peer: &str, blocks: Vec<Block>) {
        self.chains.lock().unwrap().insert(peer.to_string(), blocks);
    }

    pub fn serve_peers(&self, peer: &str, peers: Vec<String>) {
        self.peer_lists.lock().unwrap().insert(peer.to_string(), peers);
    }

    /// Peers registered with, in order
    pub fn registrations(&self) -> Vec<String> {
        self.registrations.lock().unwrap().clone()
    }

    /// (peer, tx_id) pairs in the order they were sent
    pub fn announced_transactions(&self) -> Vec<(String, String)> {
        self.announced_transactions.lock().unwrap().clone()
    }

    /// (peer, block hash) pairs in the order they were sent
    pub fn announced_blocks(&self) -> Vec<(String, String)> {
        self.announced_blocks.lock().unwrap().clone()
    }

    fn unreachable(peer: &str) -> BlockchainError {
        BlockchainError::PeerUnreachable {
            peer: peer.to_string(),
            reason: "connection refused".to_string(),
        }
    }
}

impl PeerTransport for StubTransport {
    fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>> {
        self.chains
            .lock()
            .unwrap()
            .get(peer)
            .cloned()
            .ok_or_else(|| Self::unreachable(peer))
    }

    fn register_with(&self, peer: &str, _own_url: &str) -> Result<Vec<String>> {
        self.registrations.lock().unwrap().push(peer.to_string());
        self.peer_lists
            .lock()
            .unwrap()
            .get(peer)
            .cloned()
            .ok_or_else(|| Self::unreachable(peer))
    }

    fn announce_transaction(&self, peer: &str, tx: &Transaction, _own_url: &str) -> Result<()> {
        self.announced_transactions
            .lock()
            .unwrap()
            .push((peer.to_string(), tx.get_id().to_string()));
        Ok(())
    }

    fn announce_block(&self, peer: &str, block: &Block, _own_url: &str) -> Result<()> {
        self.announced_blocks
            .lock()
            .unwrap()
            .push((peer.to_string(), block.get_hash().to_string()));
        Ok(())
    }
}
