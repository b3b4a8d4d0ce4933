//! Payload codec for cache entries.
//!
//! Values are serialized with serde_json. Payloads above the compression
//! threshold are gzip-compressed, and the compressed form is kept only when
//! it is actually smaller.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::error::{ResilienceError, Result};

/// Encoded payload ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPayload {
    pub bytes: Vec<u8>,
    pub compressed: bool,
}

/// Serializes `value`, compressing it when that pays off.
pub fn encode(value: &Value, compression_threshold: usize) -> Result<EncodedPayload> {
    let raw = serde_json::to_vec(value)
        .map_err(|e| ResilienceError::Cache(format!("serialize failed: {}", e)))?;

    if raw.len() <= compression_threshold {
        return Ok(EncodedPayload {
            bytes: raw,
            compressed: false,
        });
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder
        .write_all(&raw)
        .map_err(|e| ResilienceError::Cache(format!("compress failed: {}", e)))?;
    let packed = encoder
        .finish()
        .map_err(|e| ResilienceError::Cache(format!("compress failed: {}", e)))?;

    if packed.len() < raw.len() {
        Ok(EncodedPayload {
            bytes: packed,
            compressed: true,
        })
    } else {
        Ok(EncodedPayload {
            bytes: raw,
            compressed: false,
        })
    }
}

/// Restores a value from stored bytes.
pub fn decode(bytes: &[u8], compressed: bool) -> Result<Value> {
    if !compressed {
        return serde_json::from_slice(bytes)
            .map_err(|e| ResilienceError::Cache(format!("corrupt payload: {}", e)));
    }

    let mut raw = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut raw)
        .map_err(|e| ResilienceError::Cache(format!("corrupt compressed payload: {}", e)))?;
    serde_json::from_slice(&raw)
        .map_err(|e| ResilienceError::Cache(format!("corrupt payload: {}", e)))
}
