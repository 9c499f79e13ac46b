//! Utility functions and helpers
//!
//! Hashing, signature verification, timestamps and the bincode helpers used by
//! the durable store.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    current_timestamp, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    new_key_pair, public_key_from_pkcs8, sha256_context, sha256_digest, P256_PUBLIC_KEY_LEN,
};

pub use serialization::{deserialize, serialize};
