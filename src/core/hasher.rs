//! Canonical encoding and content hashing
//!
//! Every node must hash logically identical blocks and transactions to the
//! same digest, so nothing here goes through serde: field order and number
//! formatting are fixed by hand.
//!
//! Encoding rules:
//! - unsigned/signed integers: fixed-width big-endian
//! - strings: `u32` big-endian byte length, then UTF-8 bytes
//! - optional values: one tag byte (`0` absent, `1` present), then the value
//! - sequences: `u32` big-endian element count, then the elements

use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;

#[derive(Debug, Default, Clone)]
pub struct CanonicalEncoder {
    bytes: Vec<u8>,
}

impl CanonicalEncoder {
    pub fn new() -> CanonicalEncoder {
        CanonicalEncoder { bytes: Vec::new() }
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.bytes.extend(value.to_be_bytes());
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.bytes.extend(value.to_be_bytes());
        self
    }

    pub fn put_i64(&mut self, value: i64) -> &mut Self {
        self.bytes.extend(value.to_be_bytes());
        self
    }

    pub fn put_str(&mut self, value: &str) -> &mut Self {
        self.put_len(value.len());
        self.bytes.extend(value.as_bytes());
        self
    }

    pub fn put_opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => {
                self.bytes.push(1);
                self.put_str(v)
            }
            None => {
                self.bytes.push(0);
                self
            }
        }
    }

    /// Sequence header; the caller encodes the elements right after.
    pub fn put_len(&mut self, len: usize) -> &mut Self {
        // Field lengths are capped well below u32::MAX by validation.
        self.put_u32(len as u32)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn hash_hex(bytes: &[u8]) -> String {
    HEXLOWER.encode(&sha256_digest(bytes))
}
