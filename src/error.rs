//! Failure taxonomy for the retrieval core.
//!
//! Every stage of the pipeline reports one of these variants; the calling
//! service decides retry policy and user-facing translation. The core never
//! speaks HTTP.

use thiserror::Error;

/// Errors produced by the retrieval pipeline.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Fetching the document failed (HTTP non-success, connection error,
    /// or unreadable local path).
    #[error("document source unavailable ({location}): {reason}")]
    SourceUnavailable {
        /// URL or path that could not be fetched.
        location: String,
        /// Underlying failure description.
        reason: String,
    },

    /// The document yielded no text (e.g. a scanned PDF without a text
    /// layer). Surfaced before chunking, never passed downstream as empty
    /// chunks.
    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    /// Chunker configured with `overlap_words >= max_words`.
    #[error("invalid chunk config: overlap ({overlap_words}) must be smaller than max size ({max_words})")]
    InvalidChunkConfig {
        max_words: usize,
        overlap_words: usize,
    },

    /// Embedding model failure (initialization or inference).
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// An index cannot be built over zero chunks.
    #[error("cannot build an index over zero chunks")]
    EmptyIndex,

    /// A persisted index artifact is missing a part or internally
    /// inconsistent.
    #[error("corrupt index artifact: {0}")]
    CorruptIndex(String),

    /// A bounded timeout elapsed on a network or model call.
    #[error("{stage} timed out after {secs}s")]
    Timeout {
        /// Which stage hit the deadline (e.g. "document fetch").
        stage: &'static str,
        /// The configured deadline.
        secs: u64,
    },
}

/// Convenience result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;
