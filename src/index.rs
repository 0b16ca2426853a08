//! In-memory vector index over document chunks.
//!
//! Exact nearest-neighbor search by dot product over unit-normalized
//! vectors (equal to cosine similarity; higher = more similar). The vector
//! table and the chunk table are built together in one pass and never
//! mutated afterward, so position `i` of each side always refers to the
//! same chunk — the invariant cannot be broken by construction.
//!
//! # Persistence
//!
//! [`VectorIndex::persist`] writes a two-part artifact into a directory:
//!
//! - `vectors.bin` — magic + dims + count header, then every vector as
//!   little-endian `f32` bytes in index order.
//! - `chunks.json` — a manifest with the document fingerprint, embedding
//!   model name, dims, and the ordered chunk table.
//!
//! Both parts are required to restore; a missing part or any
//! header/count/payload mismatch fails with `CorruptIndex`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::embedding::{dot, Embedder};
use crate::error::{Result, RetrievalError};
use crate::models::{Chunk, Fingerprint, ScoredChunk};

const VECTORS_FILE: &str = "vectors.bin";
const CHUNKS_FILE: &str = "chunks.json";
const MAGIC: &[u8; 8] = b"CLQIDX01";

/// A read-only similarity index over one document's chunks.
#[derive(Debug)]
pub struct VectorIndex {
    fingerprint: Fingerprint,
    model: String,
    dims: usize,
    vectors: Vec<Vec<f32>>,
    chunks: Vec<Chunk>,
}

/// JSON side of the persisted artifact: manifest + ordered chunk table.
#[derive(Serialize, Deserialize)]
struct Manifest {
    fingerprint: Fingerprint,
    model: String,
    dims: usize,
    chunks: Vec<Chunk>,
}

impl VectorIndex {
    /// Embed all chunks and build the index.
    ///
    /// Texts are fed to the provider in `batch_size` slices to bound peak
    /// memory; the resulting vectors are identical for any batch size.
    /// The index only exists once every embedding has completed — there is
    /// no partially-searchable state.
    ///
    /// # Errors
    ///
    /// `EmptyIndex` for an empty chunk list; embedding failures propagate.
    pub async fn build(
        fingerprint: Fingerprint,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RetrievalError::EmptyIndex);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for slice in texts.chunks(batch_size.max(1)) {
            vectors.extend(embedder.embed(slice).await?);
        }

        if vectors.len() != chunks.len() {
            return Err(RetrievalError::Embedding(format!(
                "provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let dims = vectors[0].len();
        if vectors.iter().any(|v| v.len() != dims) {
            return Err(RetrievalError::Embedding(
                "provider returned vectors of mixed dimensionality".to_string(),
            ));
        }

        Ok(Self {
            fingerprint,
            model: embedder.model_name().to_string(),
            dims,
            vectors,
            chunks,
        })
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Return up to `top_k` nearest chunks, most similar first.
    ///
    /// Ties keep insertion order (stable sort). `top_k` larger than the
    /// index returns every entry.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<ScoredChunk> {
        debug_assert_eq!(query.len(), self.dims);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, dot(query, v)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }

    /// Write the two-part artifact into `dir` (created if needed).
    pub fn persist(&self, dir: &Path) -> Result<()> {
        let unavailable = |e: std::io::Error| RetrievalError::SourceUnavailable {
            location: dir.display().to_string(),
            reason: e.to_string(),
        };

        std::fs::create_dir_all(dir).map_err(unavailable)?;

        let mut blob = Vec::with_capacity(16 + self.vectors.len() * self.dims * 4);
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&(self.dims as u32).to_le_bytes());
        blob.extend_from_slice(&(self.vectors.len() as u32).to_le_bytes());
        for vector in &self.vectors {
            for &v in vector {
                blob.extend_from_slice(&v.to_le_bytes());
            }
        }
        std::fs::write(dir.join(VECTORS_FILE), blob).map_err(unavailable)?;

        let manifest = Manifest {
            fingerprint: self.fingerprint.clone(),
            model: self.model.clone(),
            dims: self.dims,
            chunks: self.chunks.clone(),
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| RetrievalError::CorruptIndex(format!("manifest encode: {e}")))?;
        std::fs::write(dir.join(CHUNKS_FILE), json).map_err(unavailable)?;

        Ok(())
    }

    /// Reconstruct an index from a persisted artifact.
    ///
    /// The restored index returns the same nearest-neighbor results as the
    /// original for any query.
    ///
    /// # Errors
    ///
    /// `CorruptIndex` when either part is missing, the binary header or
    /// payload length is wrong, or the two parts disagree on dims/count.
    pub fn restore(dir: &Path) -> Result<Self> {
        let vectors_path = dir.join(VECTORS_FILE);
        let chunks_path = dir.join(CHUNKS_FILE);

        for (part, path) in [(VECTORS_FILE, &vectors_path), (CHUNKS_FILE, &chunks_path)] {
            if !path.exists() {
                return Err(RetrievalError::CorruptIndex(format!(
                    "artifact part missing: {part}"
                )));
            }
        }

        let blob = std::fs::read(&vectors_path)
            .map_err(|e| RetrievalError::CorruptIndex(format!("read {VECTORS_FILE}: {e}")))?;
        if blob.len() < 16 || &blob[..8] != MAGIC {
            return Err(RetrievalError::CorruptIndex(format!(
                "{VECTORS_FILE} has an invalid header"
            )));
        }
        let dims = u32::from_le_bytes([blob[8], blob[9], blob[10], blob[11]]) as usize;
        let count = u32::from_le_bytes([blob[12], blob[13], blob[14], blob[15]]) as usize;

        let payload = &blob[16..];
        if dims == 0 || payload.len() != dims * count * 4 {
            return Err(RetrievalError::CorruptIndex(format!(
                "{VECTORS_FILE} payload does not match header ({count} x {dims})"
            )));
        }

        let flat: Vec<f32> = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let vectors: Vec<Vec<f32>> = flat.chunks_exact(dims).map(|v| v.to_vec()).collect();

        let json = std::fs::read(&chunks_path)
            .map_err(|e| RetrievalError::CorruptIndex(format!("read {CHUNKS_FILE}: {e}")))?;
        let manifest: Manifest = serde_json::from_slice(&json)
            .map_err(|e| RetrievalError::CorruptIndex(format!("parse {CHUNKS_FILE}: {e}")))?;

        if manifest.dims != dims {
            return Err(RetrievalError::CorruptIndex(format!(
                "dims disagree between parts ({} vs {dims})",
                manifest.dims
            )));
        }
        if manifest.chunks.len() != count {
            return Err(RetrievalError::CorruptIndex(format!(
                "chunk table has {} entries but the vector table has {count}",
                manifest.chunks.len()
            )));
        }

        Ok(Self {
            fingerprint: manifest.fingerprint,
            model: manifest.model,
            dims,
            vectors,
            chunks: manifest.chunks,
        })
    }
}
