//! Value codec for tiers
//!
//! Values travel as JSON text. `serde_json` is built with
//! `arbitrary_precision`, so integers outside the 64-bit range keep every
//! digit across an encode/decode cycle.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::CacheValue;
use crate::error::Result;

/// Serialize a value for storage
pub fn encode(value: &CacheValue) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Deserialize a stored payload
///
/// Payloads that are not valid JSON (e.g. written by another client) come
/// back as a plain string value.
pub fn decode(raw: &str) -> CacheValue {
    serde_json::from_str(raw).unwrap_or_else(|_| CacheValue::String(raw.to_string()))
}

/// Serialized length of a value in bytes
pub fn byte_len(value: &CacheValue) -> u64 {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len() as u64)
        .unwrap_or(0)
}

/// Convert a typed value into a tier value
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<CacheValue> {
    Ok(serde_json::to_value(value)?)
}

/// Convert a tier value back into a typed value
pub fn from_value<T: DeserializeOwned>(value: CacheValue) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

// =============================================================================
// Tests
// =============================================================================
