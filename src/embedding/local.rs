//! Local embedding inference via fastembed.
//!
//! Model weights are downloaded on first use from Hugging Face and
//! cached; after that, embeddings run entirely offline. Loading the model
//! is expensive, so it happens at most once per [`LocalEmbedder`]
//! instance, lazily on the first embed call. fastembed inference needs
//! `&mut`, so concurrent callers are serialized behind a mutex and the
//! work runs on a blocking worker thread.

use std::sync::{Arc, Mutex};

use anyhow::bail;
use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::{l2_normalize, Embedder};
use crate::config::EmbeddingConfig;
use crate::error::{Result, RetrievalError};

/// Embedding provider backed by a local fastembed model.
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    model: Arc<OnceCell<Mutex<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    /// Create a provider for the configured model without loading weights.
    ///
    /// Defaults to `bge-small-en-v1.5` (384 dims). Unknown model names are
    /// rejected here, before any download is attempted.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "bge-small-en-v1.5".to_string());

        // Validate the name early; embed() resolves it again at init time.
        fastembed_model(&model_name)?;

        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "all-minilm-l6-v2" => 384,
            "bge-small-en-v1.5" => 384,
            "bge-base-en-v1.5" => 768,
            "bge-large-en-v1.5" => 1024,
            "nomic-embed-text-v1.5" => 768,
            "multilingual-e5-small" => 384,
            _ => 384,
        });

        Ok(Self {
            model_name,
            dims,
            model: Arc::new(OnceCell::new()),
        })
    }
}

fn fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model_name = self.model_name.clone();
        self.model
            .get_or_try_init(|| async move {
                let model = fastembed_model(&model_name)
                    .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
                tokio::task::spawn_blocking(move || {
                    fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(model).with_show_download_progress(false),
                    )
                    .map(Mutex::new)
                    .map_err(|e| RetrievalError::Embedding(format!("model init failed: {e}")))
                })
                .await
                .map_err(|e| RetrievalError::Embedding(format!("model init task: {e}")))?
            })
            .await?;

        let cell = Arc::clone(&self.model);
        let texts = texts.to_vec();

        let embeddings = tokio::task::spawn_blocking(move || {
            let mutex = cell
                .get()
                .ok_or_else(|| RetrievalError::Embedding("model not initialized".to_string()))?;
            let mut model = mutex
                .lock()
                .map_err(|_| RetrievalError::Embedding("model mutex poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| RetrievalError::Embedding(e.to_string()))
        })
        .await
        .map_err(|e| RetrievalError::Embedding(format!("embed task: {e}")))??;

        Ok(embeddings.into_iter().map(l2_normalize).collect())
    }
}
