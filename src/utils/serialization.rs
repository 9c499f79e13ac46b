// Binary encoding for the durable store: bincode 2 with the standard
// configuration, behind a one-byte format tag so a store written by an
// incompatible build is refused instead of misread.
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

pub const STORE_FORMAT_VERSION: u8 = 1;

pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    let body = bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))?;
    let mut bytes = Vec::with_capacity(body.len() + 1);
    bytes.push(STORE_FORMAT_VERSION);
    bytes.extend(body);
    Ok(bytes)
}

pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let (version, body) = bytes
        .split_first()
        .ok_or_else(|| BlockchainError::Serialization("Empty record".to_string()))?;
    if *version != STORE_FORMAT_VERSION {
        return Err(BlockchainError::Serialization(format!(
            "Unsupported store format version {version} (expected {STORE_FORMAT_VERSION})"
        )));
    }
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(body, config)
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;

    #[test]
    fn test_transaction_survives_store_encoding() {
        let tx = Transaction::new_unsigned("alice", "bob", 10, 1);
        let bytes = serialize(&tx).unwrap();
        assert_eq!(bytes[0], STORE_FORMAT_VERSION);

        let decoded: Transaction = deserialize(&bytes).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn test_unknown_format_version_is_refused() {
        let tx = Transaction::new_unsigned("alice", "bob", 10, 1);
        let mut bytes = serialize(&tx).unwrap();
        bytes[0] = STORE_FORMAT_VERSION + 1;

        let result: Result<Transaction> = deserialize(&bytes);
        assert!(matches!(result, Err(BlockchainError::Serialization(_))));
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let empty: Result<Transaction> = deserialize(&[]);
        assert!(empty.is_err());

        let garbage: Result<Transaction> = deserialize(&[STORE_FORMAT_VERSION, 0xFF, 0xFF]);
        assert!(garbage.is_err());
    }
}
