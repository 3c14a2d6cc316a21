//! Content fingerprints for conditional responses
//!
//! The fingerprint is a SHA-256 hash of the canonical JSON serialization,
//! truncated to 16 hex characters and wrapped in double quotes to match
//! wire ETag syntax. Identical content always produces identical
//! fingerprints; fingerprints are computed per table, so a client watching
//! one tab is unaffected by sibling tabs changing.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex characters kept from the full digest.
const ETAG_LEN: usize = 16;

/// Compute a quoted ETag from any serializable content.
///
/// `serde_json::Value` keeps object keys sorted, which makes the
/// serialization canonical regardless of insertion order.
pub fn compute_etag<T: Serialize>(data: &T) -> String {
    let canonical = serde_json::to_value(data)
        .map(|value| value.to_string())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("\"{}\"", &digest[..ETAG_LEN])
}
