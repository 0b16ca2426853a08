//! Reasoning collaborators: synthesize an answer from retrieved passages.
//!
//! The retrieval core hands a reasoner exactly the reranked passage texts,
//! in order, and nothing else. Reasoners are external capabilities — given
//! a prompt they return text, and they may fail or time out — so their
//! errors stay untyped (`anyhow`) at this boundary.
//!
//! [`ReasonerChain`] models provider fallback as a prioritized list: each
//! provider is tried in order, the first success wins, and if every
//! provider fails the failures are aggregated into one reported error.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::config::{GeminiConfig, OllamaReasonerConfig, ReasonerConfig};

/// Answers a question grounded in the supplied passages.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Provider name, for logs and failure reports.
    fn name(&self) -> &str;

    /// Produce an answer from the question and the ordered passages.
    async fn answer(&self, question: &str, passages: &[String]) -> Result<String>;
}

/// Render the answering prompt: the question plus the retrieved clauses.
pub fn build_prompt(question: &str, passages: &[String]) -> String {
    let clauses = passages
        .iter()
        .map(|clause| format!("- {clause}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an expert in insurance policy interpretation. Given the user's question \
         and relevant clauses from the policy document, answer concisely, factually, and \
         in a single paragraph.\n\
         \n\
         User Question:\n\
         \"{question}\"\n\
         \n\
         Relevant Policy Clauses:\n\
         {clauses}\n\
         \n\
         Instructions:\n\
         - Do NOT repeat the clauses.\n\
         - DO answer directly with a yes/no if applicable.\n\
         - DO justify briefly using facts from the policy.\n\
         - DO NOT provide disclaimers.\n\
         - DO NOT say \"refer to the policy\" or \"consult the insurer\".\n\
         - Format the answer in 1-2 precise sentences using facts only.\n\
         \n\
         Answer:"
    )
}

// ============ Gemini ============

/// Reasoner backed by the Gemini `generateContent` API.
///
/// Requires the `GEMINI_API_KEY` environment variable.
pub struct GeminiReasoner {
    model: String,
    timeout_secs: u64,
}

impl GeminiReasoner {
    pub fn new(config: &GeminiConfig, timeout_secs: u64) -> Self {
        Self {
            model: config.model.clone(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl Reasoner for GeminiReasoner {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn answer(&self, question: &str, passages: &[String]) -> Result<String> {
        let api_key =
            std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY environment variable not set")?;

        let prompt = build_prompt(question, passages);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, api_key
        );

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let response = client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Gemini request timed out after {}s", self.timeout_secs)
                } else {
                    anyhow::anyhow!("Gemini request failed: {e}")
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {status}: {body_text}");
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|t| t.as_str())
            .context("invalid Gemini response: missing candidate text")?;

        Ok(text.trim().to_string())
    }
}

// ============ Ollama ============

/// Reasoner backed by a local Ollama instance's `/api/generate` endpoint.
pub struct OllamaReasoner {
    model: String,
    url: String,
    timeout_secs: u64,
}

impl OllamaReasoner {
    pub fn new(config: &OllamaReasonerConfig, timeout_secs: u64) -> Self {
        Self {
            model: config.model.clone(),
            url: config.url.clone(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl Reasoner for OllamaReasoner {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn answer(&self, question: &str, passages: &[String]) -> Result<String> {
        let prompt = build_prompt(question, passages);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = client
            .post(format!("{}/api/generate", self.url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Ollama request timed out after {}s", self.timeout_secs)
                } else {
                    anyhow::anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {e}",
                        self.url
                    )
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {status}: {body_text}");
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .get("response")
            .and_then(|t| t.as_str())
            .context("invalid Ollama response: missing response text")?;

        Ok(text.trim().to_string())
    }
}

// ============ Chain ============

/// Prioritized list of reasoners: first success wins.
pub struct ReasonerChain {
    providers: Vec<Box<dyn Reasoner>>,
}

impl ReasonerChain {
    pub fn new(providers: Vec<Box<dyn Reasoner>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl Reasoner for ReasonerChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn answer(&self, question: &str, passages: &[String]) -> Result<String> {
        if self.providers.is_empty() {
            bail!("no reasoning providers configured");
        }

        let mut failures: Vec<String> = Vec::new();

        for provider in &self.providers {
            match provider.answer(question, passages).await {
                Ok(answer) => return Ok(answer),
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "reasoner failed, trying next");
                    failures.push(format!("{}: {e}", provider.name()));
                }
            }
        }

        bail!("all reasoning providers failed: {}", failures.join("; "))
    }
}

/// Build the configured [`ReasonerChain`].
pub fn create_reasoner(config: &ReasonerConfig) -> Result<ReasonerChain> {
    let mut providers: Vec<Box<dyn Reasoner>> = Vec::new();
    for name in &config.providers {
        match name.as_str() {
            "gemini" => providers.push(Box::new(GeminiReasoner::new(
                &config.gemini,
                config.timeout_secs,
            ))),
            "ollama" => providers.push(Box::new(OllamaReasoner::new(
                &config.ollama,
                config.timeout_secs,
            ))),
            other => bail!("Unknown reasoner provider: {}", other),
        }
    }
    Ok(ReasonerChain::new(providers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn prompt_contains_question_and_clauses() {
        let passages = vec![
            "Grace period is 30 days.".to_string(),
            "Pre-existing diseases have a 2-year wait.".to_string(),
        ];
        let prompt = build_prompt("What is the grace period?", &passages);

        assert!(prompt.contains("\"What is the grace period?\""));
        assert!(prompt.contains("- Grace period is 30 days."));
        assert!(prompt.contains("- Pre-existing diseases have a 2-year wait."));
        assert!(prompt.ends_with("Answer:"));
    }

    struct FixedReasoner {
        name: &'static str,
        reply: Option<&'static str>,
        calls: std::sync::Arc<AtomicUsize>,
    }

    impl FixedReasoner {
        fn ok(name: &'static str, reply: &'static str) -> Self {
            Self {
                name,
                reply: Some(reply),
                calls: Default::default(),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                reply: None,
                calls: Default::default(),
            }
        }
    }

    #[async_trait]
    impl Reasoner for FixedReasoner {
        fn name(&self) -> &str {
            self.name
        }

        async fn answer(&self, _question: &str, _passages: &[String]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(reply) => Ok(reply.to_string()),
                None => bail!("{} is down", self.name),
            }
        }
    }

    #[tokio::test]
    async fn chain_returns_first_success() {
        let chain = ReasonerChain::new(vec![
            Box::new(FixedReasoner::failing("first")),
            Box::new(FixedReasoner::ok("second", "30 days")),
            Box::new(FixedReasoner::ok("third", "never reached")),
        ]);
        let answer = chain.answer("q", &[]).await.unwrap();
        assert_eq!(answer, "30 days");
    }

    #[tokio::test]
    async fn chain_stops_after_success() {
        let second = FixedReasoner::ok("second", "never reached");
        let second_calls = std::sync::Arc::clone(&second.calls);
        let chain = ReasonerChain::new(vec![
            Box::new(FixedReasoner::ok("first", "yes")),
            Box::new(second),
        ]);
        chain.answer("q", &[]).await.unwrap();
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn chain_aggregates_all_failures() {
        let chain = ReasonerChain::new(vec![
            Box::new(FixedReasoner::failing("gemini")),
            Box::new(FixedReasoner::failing("ollama")),
        ]);
        let err = chain.answer("q", &[]).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("gemini"));
        assert!(msg.contains("ollama"));
    }

    #[tokio::test]
    async fn empty_chain_is_an_error() {
        let chain = ReasonerChain::new(Vec::new());
        assert!(chain.answer("q", &[]).await.is_err());
    }
}
