//! Second-stage retrieval: fine re-scoring of a coarse candidate set.
//!
//! Stage 1 (the vector index) over-fetches `top_k * fan_out` candidates;
//! stage 2 re-scores each (query, candidate) pair with a more precise
//! relevance function and keeps the top `top_k` by the finer score.
//!
//! Degenerate cases are handled here: a candidate set of one is returned
//! directly without invoking the expensive scorer, and a scorer failure
//! degrades to the coarse order (truncated) rather than failing the query.
//! Degradation is reported to the caller and logged, never silent.

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::Result;
use crate::models::ScoredChunk;

/// A fine relevance scorer for (query, passage) pairs.
///
/// Higher scores mean more relevant. Implementations are expected to be
/// more precise — and more expensive — than the coarse vector distance.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Score every passage against the query, in passage order.
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}

/// Fine scorer that re-embeds the query and each candidate and compares
/// by cosine similarity.
pub struct EmbeddingScorer {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingScorer {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl Scorer for EmbeddingScorer {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let query_vec = self.embedder.embed_query(query).await?;
        let passage_vecs = self.embedder.embed(passages).await?;
        Ok(passage_vecs
            .iter()
            .map(|v| cosine_similarity(&query_vec, v))
            .collect())
    }
}

/// Outcome of the fine-ranking stage.
pub struct RerankResult {
    /// Up to `top_k` chunks, best first. Scores are fine scores, except
    /// when `degraded` — then they are the original coarse scores.
    pub ranked: Vec<ScoredChunk>,
    /// True when the scorer failed and the coarse order was kept.
    pub degraded: bool,
}

/// Re-rank `candidates` (pre-ordered by coarse rank) and keep `top_k`.
///
/// The result is always a subset of the candidate set. Ties on the fine
/// score keep the coarse order (stable sort). A scorer failure falls back
/// to the coarse order truncated to `top_k` — logged, not fatal.
pub async fn rerank(
    scorer: &dyn Scorer,
    query: &str,
    candidates: Vec<ScoredChunk>,
    top_k: usize,
) -> RerankResult {
    if candidates.len() <= 1 {
        let mut ranked = candidates;
        ranked.truncate(top_k);
        return RerankResult {
            ranked,
            degraded: false,
        };
    }

    let passages: Vec<String> = candidates.iter().map(|c| c.chunk.text.clone()).collect();

    match scorer.score(query, &passages).await {
        Ok(scores) if scores.len() == candidates.len() => {
            let mut rescored: Vec<ScoredChunk> = candidates
                .into_iter()
                .zip(scores)
                .map(|(candidate, score)| ScoredChunk {
                    chunk: candidate.chunk,
                    score,
                })
                .collect();
            rescored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            rescored.truncate(top_k);
            RerankResult {
                ranked: rescored,
                degraded: false,
            }
        }
        Ok(scores) => {
            tracing::warn!(
                expected = candidates.len(),
                got = scores.len(),
                "fine scorer returned a mismatched score count, keeping coarse order"
            );
            let mut ranked = candidates;
            ranked.truncate(top_k);
            RerankResult {
                ranked,
                degraded: true,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "fine scoring failed, keeping coarse order");
            let mut ranked = candidates;
            ranked.truncate(top_k);
            RerankResult {
                ranked,
                degraded: true,
            }
        }
    }
}
