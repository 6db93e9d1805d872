//! Content hashing

use sha2::{Digest, Sha256};

/// Hash content using SHA-256
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Key identifying an embedding of `text` under `model`.
///
/// Shared by the embedding cache and the vector index, so a vector is only
/// recomputed when the chunk text or the model changes.
pub fn embedding_key(text: &str, model: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(model.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}
