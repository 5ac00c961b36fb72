//! Payload codec for `UltraCache`: JSON via serde, then gzip via flate2.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{de::DeserializeOwned, Serialize};

use crate::cache::CacheError;

/// Serializes `value` to JSON and gzip-compresses the result.
pub fn encode<V: Serialize>(value: &V, level: Compression) -> Result<Vec<u8>, CacheError> {
    let json = serde_json::to_vec(value)?;

    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), level);
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`encode`]. Corrupt or truncated payloads surface as `CacheError`.
pub fn decode<V: DeserializeOwned>(payload: &[u8]) -> Result<V, CacheError> {
    let mut decoder = GzDecoder::new(payload);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}
