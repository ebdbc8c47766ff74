//! Content hashing helpers
//!
//! Everything identity- or content-addressed in the report (artifact
//! directories, diff dedup keys) goes through SHA-256.

use sha2::{Digest, Sha256};

/// Hex digits kept for directory-naming hashes
const SHORT_HASH_LEN: usize = 8;

/// Compute the SHA-256 hash of data, hex-encoded
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Short identity hash used to name artifact directories.
///
/// Deterministic, so repeated runs of the same test converge on the same
/// directory.
pub fn short_hash(input: &str) -> String {
    let mut digest = content_hash(input.as_bytes());
    digest.truncate(SHORT_HASH_LEN);
    digest
}
