//! Retrieval orchestration.
//!
//! Composes loader → chunker → embedder → index → reranker into two
//! operations: build an index for a document (once per fingerprint) and
//! query it (many times). Per query the pipeline moves through fetch,
//! extract, chunk, index, search, and rerank; a failure at any stage
//! surfaces as one typed [`RetrievalError`](crate::error::RetrievalError)
//! for that document.
//!
//! Index reuse is the main performance lever, since embedding is the most
//! expensive stage:
//! - an already-registered fingerprint skips extraction, chunking, and
//!   embedding entirely;
//! - a chunk-cache hit skips extraction and chunking;
//! - otherwise the full pipeline runs and the result is cached.
//!
//! An index is registered only once fully built. Cancelling a build
//! mid-flight drops the partial state (temp files are released by RAII),
//! so a half-built index is never searchable.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use futures::future::join_all;

use crate::cache::ChunkCache;
use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::loader::{self, DocumentSource};
use crate::models::{Fingerprint, ScoredChunk};
use crate::observe::{EventSink, NullSink, PipelineEvent};
use crate::reason::Reasoner;
use crate::rerank::{rerank, EmbeddingScorer, Scorer};

/// Handle to a fully-built, registered index. Cheap to clone; the index
/// behind it is immutable and shared.
#[derive(Clone, Debug)]
pub struct IndexHandle {
    fingerprint: Fingerprint,
    index: Arc<VectorIndex>,
}

impl IndexHandle {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }
}

/// Per-question result of a batch run. One question's failure never
/// aborts its siblings; callers get a sentinel instead.
#[derive(Debug)]
pub enum QuestionOutcome {
    Answered(String),
    Unavailable { reason: String },
}

impl QuestionOutcome {
    /// The answer text, or the sentinel for failed questions.
    pub fn text(&self) -> &str {
        match self {
            Self::Answered(answer) => answer,
            Self::Unavailable { .. } => "Answer not available due to an error.",
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered(_))
    }
}

/// The retrieval orchestrator.
pub struct Retriever {
    config: Config,
    embedder: Arc<dyn Embedder>,
    cache: Arc<dyn ChunkCache>,
    scorer: Arc<dyn Scorer>,
    sink: Arc<dyn EventSink>,
    indexes: RwLock<HashMap<Fingerprint, Arc<VectorIndex>>>,
}

impl Retriever {
    /// Create an orchestrator with the default fine scorer (embedding
    /// similarity recomputation) and no event sink.
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, cache: Arc<dyn ChunkCache>) -> Self {
        let scorer = Arc::new(EmbeddingScorer::new(Arc::clone(&embedder)));
        Self {
            config,
            embedder,
            cache,
            scorer,
            sink: Arc::new(NullSink),
            indexes: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Build (or reuse) the index for a document. Idempotent per
    /// fingerprint: repeated calls for the same content return a handle to
    /// the same index without re-embedding.
    pub async fn build_index(&self, source: &DocumentSource) -> Result<IndexHandle> {
        let bytes = loader::fetch_document(&self.config.fetch, source).await?;
        let fingerprint = Fingerprint::of_bytes(&bytes);

        if let Some(index) = self.registered(&fingerprint) {
            tracing::debug!(%fingerprint, "index already built, reusing");
            self.sink.record(&PipelineEvent::IndexReused {
                fingerprint: fingerprint.clone(),
                at: Utc::now(),
            });
            return Ok(IndexHandle { fingerprint, index });
        }

        let cached = match self.cache.get(&fingerprint).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(%fingerprint, error = %e, "chunk cache read failed, re-parsing");
                None
            }
        };

        let (chunks, from_cache) = match cached {
            Some(chunks) if !chunks.is_empty() => {
                tracing::debug!(%fingerprint, chunks = chunks.len(), "chunk cache hit");
                (chunks, true)
            }
            _ => {
                let text = loader::extract_text(bytes).await?;
                let chunks = chunk_text(
                    &text,
                    self.config.chunking.max_words,
                    self.config.chunking.overlap_words,
                )?;
                if let Err(e) = self.cache.put(&fingerprint, &chunks).await {
                    tracing::warn!(%fingerprint, error = %e, "chunk cache write failed");
                }
                (chunks, false)
            }
        };

        let index = VectorIndex::build(
            fingerprint.clone(),
            chunks,
            self.embedder.as_ref(),
            self.config.embedding.batch_size,
        )
        .await?;

        let chunk_count = index.len();
        let index = self.register(fingerprint.clone(), index);
        self.sink.record(&PipelineEvent::IndexBuilt {
            fingerprint: fingerprint.clone(),
            chunks: chunk_count,
            chunks_from_cache: from_cache,
            at: Utc::now(),
        });

        Ok(IndexHandle { fingerprint, index })
    }

    /// Retrieve the `top_k` most relevant passages for a question.
    ///
    /// Coarse stage over-fetches `top_k * fan_out` candidates; the fine
    /// stage re-scores them and keeps `top_k`. With reranking disabled (or
    /// degraded) the coarse order is served. Scores are cosine similarity,
    /// descending.
    pub async fn query(
        &self,
        handle: &IndexHandle,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let query_vec = self.embedder.embed_query(question).await?;

        if !self.config.retrieval.rerank {
            return Ok(handle.index.search(&query_vec, top_k));
        }

        let fan_out = self.config.retrieval.fan_out.max(1);
        let candidates = handle.index.search(&query_vec, top_k.saturating_mul(fan_out));

        let outcome = rerank(self.scorer.as_ref(), question, candidates, top_k).await;
        if outcome.degraded {
            self.sink.record(&PipelineEvent::RerankDegraded {
                question: question.to_string(),
                at: Utc::now(),
            });
        }
        Ok(outcome.ranked)
    }

    /// Answer a batch of questions against one built index.
    ///
    /// Questions run concurrently and independently: a timeout or reasoner
    /// failure on one yields [`QuestionOutcome::Unavailable`] for that
    /// question only. The reasoner receives exactly the reranked passage
    /// texts, in order.
    pub async fn answer_batch(
        &self,
        handle: &IndexHandle,
        questions: &[String],
        reasoner: &dyn Reasoner,
    ) -> Vec<QuestionOutcome> {
        let runs = questions
            .iter()
            .map(|question| self.answer_one(handle, question, reasoner));
        join_all(runs).await
    }

    async fn answer_one(
        &self,
        handle: &IndexHandle,
        question: &str,
        reasoner: &dyn Reasoner,
    ) -> QuestionOutcome {
        let passages = match self.query(handle, question, self.config.retrieval.top_k).await {
            Ok(passages) => passages,
            Err(e) => {
                return self.question_failed(question, format!("retrieval: {e}"));
            }
        };

        let texts: Vec<String> = passages.iter().map(|p| p.chunk.text.clone()).collect();

        match reasoner.answer(question, &texts).await {
            Ok(answer) => {
                self.sink.record(&PipelineEvent::QuestionAnswered {
                    question: question.to_string(),
                    passages: texts.len(),
                    at: Utc::now(),
                });
                QuestionOutcome::Answered(answer)
            }
            Err(e) => self.question_failed(question, format!("reasoning: {e}")),
        }
    }

    fn question_failed(&self, question: &str, reason: String) -> QuestionOutcome {
        tracing::warn!(question, reason = %reason, "question failed");
        self.sink.record(&PipelineEvent::QuestionFailed {
            question: question.to_string(),
            reason: reason.clone(),
            at: Utc::now(),
        });
        QuestionOutcome::Unavailable { reason }
    }

    /// Write the two-part index artifact for a built index.
    pub fn persist_index(&self, handle: &IndexHandle, dir: &Path) -> Result<()> {
        handle.index.persist(dir)
    }

    /// Restore a persisted index artifact and register it.
    ///
    /// Rejects artifacts recorded under a different embedding model than
    /// the active provider — their query vectors would be incomparable.
    pub fn restore_index(&self, dir: &Path) -> Result<IndexHandle> {
        let index = VectorIndex::restore(dir)?;

        if index.model_name() != self.embedder.model_name() {
            return Err(crate::error::RetrievalError::CorruptIndex(format!(
                "artifact was built with model '{}' but the active model is '{}'",
                index.model_name(),
                self.embedder.model_name()
            )));
        }

        let fingerprint = index.fingerprint().clone();
        let chunks = index.len();
        let index = self.register(fingerprint.clone(), index);
        self.sink.record(&PipelineEvent::IndexRestored {
            fingerprint: fingerprint.clone(),
            chunks,
            at: Utc::now(),
        });

        Ok(IndexHandle { fingerprint, index })
    }

    fn registered(&self, fingerprint: &Fingerprint) -> Option<Arc<VectorIndex>> {
        // Poisoning cannot leave partial state here (only complete indexes
        // are ever inserted), so recover the guard.
        let indexes = self
            .indexes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        indexes.get(fingerprint).cloned()
    }

    /// Register a fully-built index. If a racing build already registered
    /// one for this fingerprint, the first registration wins.
    fn register(&self, fingerprint: Fingerprint, index: VectorIndex) -> Arc<VectorIndex> {
        let mut indexes = self
            .indexes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            indexes
                .entry(fingerprint)
                .or_insert_with(|| Arc::new(index)),
        )
    }
}
