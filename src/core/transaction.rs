// This file implements the transaction - the atomic unit of change in my ledger
// A transaction moves an amount from a sender address to a receiver address.
// Its id is the hash of its canonical content, and an optional ECDSA signature
// proves the sender authorised it.

use crate::core::hasher::{hash_hex, CanonicalEncoder};
use crate::utils::ecdsa_p256_sha256_sign_verify;
use data_encoding::HEXLOWER_PERMISSIVE;
use serde::{Deserialize, Serialize};

// Block rewards are paid from this address. Nobody holds a key for it, so
// clients can never submit transactions from it.
pub const SYSTEM_ADDRESS: &str = "SYSTEM";

// I cap address length so canonical encodings stay small and bounded
pub const MAX_ADDRESS_LEN: usize = 256;

// The outcome of checking a transaction on its own (no chain context)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxValidity {
    Valid,
    InvalidSignature,
    MalformedFields(String),
}

impl TxValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, TxValidity::Valid)
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    tx_id: String,    // Hash of (sender, receiver, amount, nonce)
    sender: String,   // Sender address; the hex public key for signed transactions
    receiver: String, // Receiver address
    amount: u64,      // Amount moved (never negative)
    nonce: u64,       // Disambiguates otherwise identical transfers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>, // Hex ECDSA P-256 signature over the signing payload
}

impl Transaction {
    // When a legacy client submits without a signature
    pub fn new_unsigned(sender: &str, receiver: &str, amount: u64, nonce: u64) -> Transaction {
        Self::build(sender, receiver, amount, nonce, None)
    }

    // When a client signed the payload with the key behind `sender_public_key_hex`
    pub fn new_signed(
        sender_public_key_hex: &str,
        receiver: &str,
        amount: u64,
        nonce: u64,
        signature_hex: &str,
    ) -> Transaction {
        Self::build(
            sender_public_key_hex,
            receiver,
            amount,
            nonce,
            Some(signature_hex.to_string()),
        )
    }

    // The reward transaction a miner may put first in its block
    pub fn new_reward(miner: &str, amount: u64, nonce: u64) -> Transaction {
        Self::build(SYSTEM_ADDRESS, miner, amount, nonce, None)
    }

    // When a transaction arrives with an id already attached (peer gossip).
    // I keep the claimed id as-is; validate() will catch a mismatch.
    pub fn from_parts(
        tx_id: &str,
        sender: &str,
        receiver: &str,
        amount: u64,
        nonce: u64,
        signature: Option<String>,
    ) -> Transaction {
        Transaction {
            tx_id: tx_id.to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            nonce,
            signature,
        }
    }

    fn build(
        sender: &str,
        receiver: &str,
        amount: u64,
        nonce: u64,
        signature: Option<String>,
    ) -> Transaction {
        let mut tx = Transaction {
            tx_id: String::new(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            nonce,
            signature,
        };
        tx.tx_id = tx.calculate_id();
        tx
    }

    /// The exact bytes a client signs and the node hashes into `tx_id`.
    pub fn signing_payload(sender: &str, receiver: &str, amount: u64, nonce: u64) -> Vec<u8> {
        let mut enc = CanonicalEncoder::new();
        enc.put_str(sender)
            .put_str(receiver)
            .put_u64(amount)
            .put_u64(nonce);
        enc.into_bytes()
    }

    pub fn calculate_id(&self) -> String {
        hash_hex(&Self::signing_payload(
            &self.sender,
            &self.receiver,
            self.amount,
            self.nonce,
        ))
    }

    // Full canonical form, signature and id included, as it goes into a block hash
    pub fn encode_into(&self, enc: &mut CanonicalEncoder) {
        enc.put_str(&self.tx_id)
            .put_str(&self.sender)
            .put_str(&self.receiver)
            .put_u64(self.amount)
            .put_u64(self.nonce)
            .put_opt_str(self.signature.as_deref());
    }

    // I check everything I can know about a transaction without the chain
    pub fn validate(&self) -> TxValidity {
        if self.sender.is_empty() {
            return TxValidity::MalformedFields("sender is empty".to_string());
        }
        if self.receiver.is_empty() {
            return TxValidity::MalformedFields("receiver is empty".to_string());
        }
        if self.sender.len() > MAX_ADDRESS_LEN || self.receiver.len() > MAX_ADDRESS_LEN {
            return TxValidity::MalformedFields(format!(
                "address longer than {MAX_ADDRESS_LEN} bytes"
            ));
        }
        if self.tx_id != self.calculate_id() {
            return TxValidity::MalformedFields("tx_id does not match content".to_string());
        }

        if self.is_system() {
            if self.signature.is_some() {
                return TxValidity::MalformedFields(
                    "system transactions carry no signature".to_string(),
                );
            }
            return TxValidity::Valid;
        }

        match &self.signature {
            None => TxValidity::Valid,
            Some(signature_hex) => {
                if self.verify_signature(signature_hex) {
                    TxValidity::Valid
                } else {
                    TxValidity::InvalidSignature
                }
            }
        }
    }

    fn verify_signature(&self, signature_hex: &str) -> bool {
        // A sender that is not a hex public key cannot have signed anything
        let Ok(public_key) = HEXLOWER_PERMISSIVE.decode(self.sender.as_bytes()) else {
            return false;
        };
        let Ok(signature) = HEXLOWER_PERMISSIVE.decode(signature_hex.as_bytes()) else {
            return false;
        };
        let payload =
            Self::signing_payload(&self.sender, &self.receiver, self.amount, self.nonce);
        ecdsa_p256_sha256_sign_verify(&public_key, &signature, &payload)
    }

    pub fn is_system(&self) -> bool {
        self.sender == SYSTEM_ADDRESS
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn get_id(&self) -> &str {
        self.tx_id.as_str()
    }

    pub fn get_sender(&self) -> &str {
        self.sender.as_str()
    }

    pub fn get_receiver(&self) -> &str {
        self.receiver.as_str()
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
}
