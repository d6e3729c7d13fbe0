//! Stateless tool-history capsule.
//!
//! Local (in-process) tool calls completed before a turn is handed to the host
//! are packed into an opaque string carried in `extra_state`. When the host
//! returns the deferred results, the capsule is unpacked and the local calls
//! are replayed into history, so the bridge never keeps state across requests.
//!
//! Format: JSON `{"entries": [...]}`, zlib (level 9), standard base64.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::limits::{MAX_CAPSULE_PACKED_CHARS, MAX_CAPSULE_UNPACKED_BYTES};

/// One local tool call together with its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalToolEntry {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LocalToolState {
    #[serde(default)]
    entries: Vec<LocalToolEntry>,
}

/// Why a capsule could not be packed or unpacked.
#[derive(Error, Debug)]
pub enum CapsuleError {
    #[error("capsule payload must be a non-empty string")]
    Empty,

    #[error("capsule payload is not ASCII")]
    NonAscii,

    #[error("packed capsule is {actual} chars, limit is {limit}")]
    PackedTooLarge { actual: usize, limit: usize },

    #[error("unpacked capsule exceeds {limit} bytes")]
    UnpackedTooLarge { limit: usize },

    #[error("invalid capsule encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("capsule compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("invalid capsule payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Serialize entries into a compact ASCII payload.
pub fn pack_tool_history(entries: &[LocalToolEntry]) -> Result<String, CapsuleError> {
    let raw = serde_json::to_vec(&LocalToolState {
        entries: entries.to_vec(),
    })?;
    if raw.len() > MAX_CAPSULE_UNPACKED_BYTES {
        return Err(CapsuleError::UnpackedTooLarge {
            limit: MAX_CAPSULE_UNPACKED_BYTES,
        });
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(9));
    encoder.write_all(&raw)?;
    let packed = STANDARD.encode(encoder.finish()?);

    if packed.len() > MAX_CAPSULE_PACKED_CHARS {
        return Err(CapsuleError::PackedTooLarge {
            actual: packed.len(),
            limit: MAX_CAPSULE_PACKED_CHARS,
        });
    }
    Ok(packed)
}

/// Decode a payload produced by [`pack_tool_history`].
///
/// The packed bound is checked before decoding; the unpacked bound is
/// enforced while inflating, so an oversized payload is never materialized.
pub fn unpack_tool_history(packed: &str) -> Result<Vec<LocalToolEntry>, CapsuleError> {
    if packed.is_empty() {
        return Err(CapsuleError::Empty);
    }
    if !packed.is_ascii() {
        return Err(CapsuleError::NonAscii);
    }
    if packed.len() > MAX_CAPSULE_PACKED_CHARS {
        return Err(CapsuleError::PackedTooLarge {
            actual: packed.len(),
            limit: MAX_CAPSULE_PACKED_CHARS,
        });
    }

    let compressed = STANDARD.decode(packed)?;
    let mut raw = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .take(MAX_CAPSULE_UNPACKED_BYTES as u64 + 1)
        .read_to_end(&mut raw)?;
    if raw.len() > MAX_CAPSULE_UNPACKED_BYTES {
        return Err(CapsuleError::UnpackedTooLarge {
            limit: MAX_CAPSULE_UNPACKED_BYTES,
        });
    }

    let state: LocalToolState = serde_json::from_slice(&raw)?;
    Ok(state.entries)
}

/// Unpack a capsule found in a side channel; anything but a string fails.
pub fn unpack_value(value: &Value) -> Result<Vec<LocalToolEntry>, CapsuleError> {
    match value {
        Value::String(packed) => unpack_tool_history(packed),
        _ => Err(CapsuleError::Empty),
    }
}

/// Short content hash used to correlate a capsule across requests in logs.
pub(crate) fn fingerprint(packed: &str) -> String {
    let digest = Sha256::digest(packed.as_bytes());
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}
