//! Entity tags for conditional requests.
//!
//! A 32-bit polynomial rolling hash (`h = h * 31 + b`) over the canonical
//! JSON of the payload. Collisions only cost a missed 304.

use serde::Serialize;

use super::kv::CacheError;

/// Quoted hex tag for raw bytes.
pub fn etag_for_bytes(bytes: &[u8]) -> String {
    let hash = bytes
        .iter()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(*b)));
    format!("\"{:08x}\"", hash)
}

/// Quoted hex tag for the JSON serialization of `value`.
pub fn etag_for<T: Serialize + ?Sized>(value: &T) -> Result<String, CacheError> {
    let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
    Ok(etag_for_bytes(&bytes))
}

/// Evaluate an `If-None-Match` header value against the current tag.
///
/// Accepts `*`, comma-separated lists and weak validators.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    let current = etag.trim_start_matches("W/");
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.trim_start_matches("W/") == current
    })
}
