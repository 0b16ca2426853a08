//! TOML configuration parsing and validation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub reasoner: ReasonerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: default_max_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_max_words() -> usize {
    200
}
fn default_overlap_words() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Provider name: `"local"` (fastembed) or `"ollama"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Ollama base URL (ignored by the local provider).
    #[serde(default)]
    pub url: Option<String>,
    /// Number of chunk texts embedded per provider call during index build.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Passages handed to the reasoner per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Over-fetch multiplier for the coarse stage (`top_k * fan_out`
    /// candidates go to the reranker).
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
    /// Disable to return coarse order directly.
    #[serde(default = "default_rerank")]
    pub rerank: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            fan_out: default_fan_out(),
            rerank: default_rerank(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_fan_out() -> usize {
    3
}
fn default_rerank() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CacheConfig {
    /// Directory for the parsed-chunk cache. Absent means in-memory only.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReasonerConfig {
    /// Providers tried in order; first success wins.
    #[serde(default = "default_reasoner_providers")]
    pub providers: Vec<String>,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub ollama: OllamaReasonerConfig,
    #[serde(default = "default_reason_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            providers: default_reasoner_providers(),
            gemini: GeminiConfig::default(),
            ollama: OllamaReasonerConfig::default(),
            timeout_secs: default_reason_timeout_secs(),
        }
    }
}

fn default_reasoner_providers() -> Vec<String> {
    vec!["gemini".to_string(), "ollama".to_string()]
}
fn default_reason_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_model")]
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_gemini_model(),
        }
    }
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaReasonerConfig {
    #[serde(default = "default_ollama_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
}

impl Default for OllamaReasonerConfig {
    fn default() -> Self {
        Self {
            model: default_ollama_model(),
            url: default_ollama_url(),
        }
    }
}

fn default_ollama_model() -> String {
    "mistral".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_words == 0 {
        anyhow::bail!("chunking.max_words must be > 0");
    }
    if config.chunking.overlap_words >= config.chunking.max_words {
        anyhow::bail!(
            "chunking.overlap_words ({}) must be smaller than chunking.max_words ({})",
            config.chunking.overlap_words,
            config.chunking.max_words
        );
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.fan_out == 0 {
        anyhow::bail!("retrieval.fan_out must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }
    match config.embedding.provider.as_str() {
        "local" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local or ollama.",
            other
        ),
    }
    if config.embedding.provider == "ollama"
        && (config.embedding.model.is_none() || config.embedding.dims.is_none())
    {
        anyhow::bail!("embedding.model and embedding.dims are required for the ollama provider");
    }

    for p in &config.reasoner.providers {
        match p.as_str() {
            "gemini" | "ollama" => {}
            other => anyhow::bail!(
                "Unknown reasoner provider: '{}'. Must be gemini or ollama.",
                other
            ),
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_apply_for_empty_config() {
        let f = write_config("");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.fetch.timeout_secs, 15);
        assert_eq!(cfg.chunking.max_words, 200);
        assert_eq!(cfg.chunking.overlap_words, 20);
        assert_eq!(cfg.retrieval.top_k, 3);
        assert_eq!(cfg.retrieval.fan_out, 3);
        assert!(cfg.retrieval.rerank);
        assert_eq!(cfg.embedding.provider, "local");
    }

    #[test]
    fn rejects_overlap_at_least_max() {
        let f = write_config("[chunking]\nmax_words = 10\noverlap_words = 10\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn rejects_unknown_embedding_provider() {
        let f = write_config("[embedding]\nprovider = \"openai\"\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn ollama_embedding_requires_model_and_dims() {
        let f = write_config("[embedding]\nprovider = \"ollama\"\n");
        assert!(load_config(f.path()).is_err());

        let f = write_config(
            "[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n",
        );
        assert!(load_config(f.path()).is_ok());
    }

    #[test]
    fn rejects_unknown_reasoner_provider() {
        let f = write_config("[reasoner]\nproviders = [\"claude\"]\n");
        assert!(load_config(f.path()).is_err());
    }
}
