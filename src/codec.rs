//! Opaque binary encoding for tables, maps and transport payloads.

use crate::error::Error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Encode a value to bytes.
pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
    Ok(bincode::serialize(value)?)
}

/// Decode a value from bytes produced by [`serialize`].
pub fn parse<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    Ok(bincode::deserialize(bytes)?)
}

/// A payload exchanged between ranks during a collective.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum Message<K, V> {
    /// Buffered writes for keys owned by the receiver: `(key, hash, value)`.
    Writes(Vec<(K, u64, V)>),
    /// The sender's local key count.
    KeyCount(u64),
}
