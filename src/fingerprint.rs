//! Content fingerprinting.

use sha2::{Digest, Sha256};

use crate::models::Document;

/// Stable identity digest for one revision of a document.
///
/// Hashes the document id, content snippet, and modified time (unix
/// seconds) with NUL separators so field boundaries cannot collide. Equal
/// fingerprints are classification-equivalent: the cache serves them
/// without another LLM call for as long as the TTL allows.
pub fn fingerprint(doc: &Document) -> String {
    let mut hasher = Sha256::new();
    hasher.update(doc.id.as_bytes());
    hasher.update([0u8]);
    hasher.update(doc.content_snippet.as_bytes());
    hasher.update([0u8]);
    hasher.update(doc.modified_time.timestamp().to_le_bytes());
    format!("{:x}", hasher.finalize())
}
