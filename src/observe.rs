//! Pipeline observability.
//!
//! The orchestrator reports notable events to an injected [`EventSink`]
//! rather than writing anywhere itself, which keeps the core testable
//! without filesystem side effects. [`LogSink`] forwards events to
//! `tracing`; [`NullSink`] drops them.

use chrono::{DateTime, Utc};

use crate::models::Fingerprint;

/// Something worth recording about a pipeline run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A new index was embedded and registered.
    IndexBuilt {
        fingerprint: Fingerprint,
        chunks: usize,
        chunks_from_cache: bool,
        at: DateTime<Utc>,
    },
    /// A build request hit an already-registered index.
    IndexReused {
        fingerprint: Fingerprint,
        at: DateTime<Utc>,
    },
    /// An index was restored from a persisted artifact.
    IndexRestored {
        fingerprint: Fingerprint,
        chunks: usize,
        at: DateTime<Utc>,
    },
    /// Fine scoring failed; the coarse order was served instead.
    RerankDegraded {
        question: String,
        at: DateTime<Utc>,
    },
    /// A question was answered.
    QuestionAnswered {
        question: String,
        passages: usize,
        at: DateTime<Utc>,
    },
    /// A question failed; siblings in the batch were unaffected.
    QuestionFailed {
        question: String,
        reason: String,
        at: DateTime<Utc>,
    },
}

/// Receiver for pipeline events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &PipelineEvent);
}

/// Drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &PipelineEvent) {}
}

/// Forwards events to `tracing` at info/warn level.
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::IndexBuilt {
                fingerprint,
                chunks,
                chunks_from_cache,
                ..
            } => {
                tracing::info!(%fingerprint, chunks, chunks_from_cache, "index built");
            }
            PipelineEvent::IndexReused { fingerprint, .. } => {
                tracing::info!(%fingerprint, "index reused");
            }
            PipelineEvent::IndexRestored {
                fingerprint,
                chunks,
                ..
            } => {
                tracing::info!(%fingerprint, chunks, "index restored");
            }
            PipelineEvent::RerankDegraded { question, .. } => {
                tracing::warn!(question = %question, "rerank degraded to coarse order");
            }
            PipelineEvent::QuestionAnswered {
                question, passages, ..
            } => {
                tracing::info!(question = %question, passages, "question answered");
            }
            PipelineEvent::QuestionFailed {
                question, reason, ..
            } => {
                tracing::warn!(question = %question, reason = %reason, "question failed");
            }
        }
    }
}
