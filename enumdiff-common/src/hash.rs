//! Content hashing helpers
//!
//! All durable keys in enumdiff are SHA-256 digests rendered as lowercase hex,
//! so they stay stable across processes and platforms.

use sha2::{Digest, Sha256};

/// SHA-256 over a sequence of fields.
///
/// Each field is length-prefixed before hashing so that `["ab", "c"]` and
/// `["a", "bc"]` never collide.
pub fn sha256_fields<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    to_hex(&hasher.finalize())
}

/// SHA-256 of a single string, lowercase hex
pub fn sha256_hex(value: &str) -> String {
    to_hex(&Sha256::digest(value.as_bytes()))
}

/// Short form of a digest for log output
pub fn short(digest: &str) -> &str {
    let end = digest.len().min(12);
    &digest[..end]
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
