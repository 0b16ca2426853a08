//! # Clause Harness CLI (`clq`)
//!
//! The `clq` binary drives the retrieval pipeline from the command line:
//! build a document index, inspect retrieval results, or answer questions
//! end to end.
//!
//! ## Usage
//!
//! ```bash
//! clq --config ./config/clq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `clq index <source>` | Fetch, chunk, and embed a document |
//! | `clq search <source> "<query>"` | Print the top retrieved passages |
//! | `clq ask <source> -q "<question>"` | Answer questions over the document |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index and persist the artifact
//! clq index ./policy.pdf --persist ./data/index
//!
//! # Retrieval only (no reasoner call)
//! clq search ./policy.pdf "grace period for premium payment"
//!
//! # Answer several questions concurrently against one index
//! clq ask https://example.com/policy.pdf \
//!     -q "What is the grace period?" \
//!     -q "Are pre-existing diseases covered?"
//! ```

mod cache;
mod chunk;
mod config;
mod embedding;
mod error;
mod index;
mod loader;
mod models;
mod observe;
mod reason;
mod rerank;
mod retriever;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::cache::{ChunkCache, JsonFileCache, MemoryCache};
use crate::loader::DocumentSource;
use crate::observe::LogSink;
use crate::reason::create_reasoner;
use crate::retriever::Retriever;

/// Clause Harness CLI — retrieval-augmented question answering for policy
/// documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/clq.example.toml` for a full example; without a
/// config file, built-in defaults apply.
#[derive(Parser)]
#[command(
    name = "clq",
    about = "Clause Harness — retrieval-augmented question answering for policy documents",
    version,
    long_about = "Clause Harness fetches a policy document, chunks and embeds it into a \
    vector index, and answers questions by two-stage retrieval (coarse vector search plus \
    rerank) feeding a configurable reasoning backend."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/clq.toml`. Built-in defaults apply when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/clq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Build the vector index for a document.
    ///
    /// Fetches the document, extracts and chunks its text (reusing the
    /// chunk cache on repeat runs), embeds every chunk, and reports the
    /// fingerprint and chunk count.
    Index {
        /// Document source: an `http(s)://` URL or a local path.
        source: String,

        /// Persist the index artifact (vectors + chunk table) into this
        /// directory.
        #[arg(long)]
        persist: Option<PathBuf>,
    },

    /// Retrieve passages for a query without calling a reasoner.
    ///
    /// Prints the reranked passages with their similarity scores. Useful
    /// for inspecting what the reasoner would see.
    Search {
        /// Document source: an `http(s)://` URL or a local path.
        source: String,

        /// The search query.
        query: String,

        /// Number of passages to return.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Answer questions about a document.
    ///
    /// Builds (or reuses) the document index, then answers all questions
    /// concurrently. A failing question reports a sentinel answer without
    /// affecting the others.
    Ask {
        /// Document source: an `http(s)://` URL or a local path.
        source: String,

        /// A question to answer; repeat for multiple questions.
        #[arg(short = 'q', long = "question", required = true)]
        questions: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        config::Config::default()
    };

    let embedder = embedding::create_embedder(&cfg.embedding)?;
    let chunk_cache: Arc<dyn ChunkCache> = match &cfg.cache.dir {
        Some(dir) => Arc::new(JsonFileCache::new(dir.clone())),
        None => Arc::new(MemoryCache::new()),
    };
    let retriever =
        Retriever::new(cfg.clone(), embedder, chunk_cache).with_sink(Arc::new(LogSink));

    match cli.command {
        Commands::Index { source, persist } => {
            let source = DocumentSource::parse(&source);
            let handle = retriever.build_index(&source).await?;
            println!("fingerprint: {}", handle.fingerprint());
            println!("chunks: {}", handle.chunk_count());
            if let Some(dir) = persist {
                retriever.persist_index(&handle, &dir)?;
                println!("artifact: {}", dir.display());
            }
        }
        Commands::Search {
            source,
            query,
            top_k,
        } => {
            let source = DocumentSource::parse(&source);
            let handle = retriever.build_index(&source).await?;
            let top_k = top_k.unwrap_or(cfg.retrieval.top_k);
            let passages = retriever.query(&handle, &query, top_k).await?;

            if passages.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, passage) in passages.iter().enumerate() {
                println!(
                    "{}. [{:.3}] (chunk {})",
                    i + 1,
                    passage.score,
                    passage.chunk.seq
                );
                println!("    {}", passage.chunk.text.replace('\n', " "));
                println!();
            }
        }
        Commands::Ask { source, questions } => {
            let source = DocumentSource::parse(&source);
            let handle = retriever.build_index(&source).await?;
            let reasoner = create_reasoner(&cfg.reasoner)?;
            let outcomes = retriever.answer_batch(&handle, &questions, &reasoner).await;

            for (question, outcome) in questions.iter().zip(outcomes.iter()) {
                println!("Q: {question}");
                println!("A: {}", outcome.text());
                println!();
            }
        }
    }

    Ok(())
}
