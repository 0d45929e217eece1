//! Static API keys.
//!
//! Keys never expire and are stored as SHA-256 digests.

use sha2::{Digest, Sha256};

/// SHA-256 hash a key for storage and lookup.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}
