//! Core data models used throughout clause-harness.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the pipeline.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content-derived identity of a document: the SHA-256 of its raw bytes,
/// hex-encoded. Used as the cache and index-registry key, so identical
/// documents never re-parse or re-embed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint raw document bytes.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bounded passage of document text, the unit of retrieval.
///
/// Chunks are immutable once produced. `seq` is the position among the
/// chunks of one document; consecutive chunks share a configured overlap
/// region. Chunk text is whitespace-normalized (words joined by single
/// spaces).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub seq: usize,
    pub text: String,
}

/// A retrieval result entry: a chunk paired with its relevance score.
///
/// Scores are cosine similarity throughout (vectors are unit-normalized,
/// so dot product equals cosine) — higher is always more similar. Coarse
/// and fine stages share this convention, so scores are never mixed.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = Fingerprint::of_bytes(b"policy text");
        let b = Fingerprint::of_bytes(b"policy text");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn fingerprint_differs_on_content() {
        let a = Fingerprint::of_bytes(b"policy text");
        let b = Fingerprint::of_bytes(b"policy text.");
        assert_ne!(a, b);
    }
}
