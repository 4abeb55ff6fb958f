//! Request fingerprints naming cache entries on disk.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of the request path plus its raw query, when present.
pub fn fingerprint(path: &str, query: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    if let Some(query) = query.filter(|query| !query.is_empty()) {
        hasher.update(b"?");
        hasher.update(query.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Whether `name` looks like a content file produced by [`fingerprint`].
pub fn is_fingerprint(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|byte| byte.is_ascii_hexdigit())
}
