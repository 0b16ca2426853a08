//! Parsed-chunk cache keyed by document fingerprint.
//!
//! Identical documents never re-parse: the orchestrator looks up the
//! fingerprint before extraction and stores the chunk sequence after.
//! The cache is a best-effort collaborator — read and write failures are
//! logged by the caller and never abort the pipeline, so implementations
//! report plain errors rather than pipeline failures.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::{Chunk, Fingerprint};

/// Durable (or in-process) store of parsed chunk sequences.
#[async_trait]
pub trait ChunkCache: Send + Sync {
    /// Look up the chunks for a document. `None` means absent.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<Chunk>>>;

    /// Store the chunks for a document, replacing any previous entry.
    async fn put(&self, fingerprint: &Fingerprint, chunks: &[Chunk]) -> Result<()>;
}

/// In-process cache; entries live for the process lifetime.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkCache for MemoryCache {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<Chunk>>> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(fingerprint.as_str()).cloned())
    }

    async fn put(&self, fingerprint: &Fingerprint, chunks: &[Chunk]) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(fingerprint.as_str().to_string(), chunks.to_vec());
        Ok(())
    }
}

/// Durable cache: one `<fingerprint>.json` file per document.
pub struct JsonFileCache {
    dir: PathBuf,
}

impl JsonFileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }
}

#[async_trait]
impl ChunkCache for JsonFileCache {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<Chunk>>> {
        let path = self.entry_path(fingerprint);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading cache entry {}", path.display()))
            }
        };
        let chunks: Vec<Chunk> = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing cache entry {}", path.display()))?;
        Ok(Some(chunks))
    }

    async fn put(&self, fingerprint: &Fingerprint, chunks: &[Chunk]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating cache dir {}", self.dir.display()))?;
        let path = self.entry_path(fingerprint);
        let json = serde_json::to_vec(chunks)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing cache entry {}", path.display()))?;
        Ok(())
    }
}
