//! Document loading: fetch raw bytes from a URL or local path, extract
//! plain text.
//!
//! PDF bytes (detected by the `%PDF` magic) are spooled to a scoped temp
//! file and extracted page by page; pages are joined with a blank line so
//! sentence splitting downstream never runs across a page boundary.
//! Anything else is treated as UTF-8 text. Extraction runs on a blocking
//! worker thread — PDF parsing is CPU-bound.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::FetchConfig;
use crate::error::{Result, RetrievalError};
use crate::models::Fingerprint;

/// Where a document comes from: an HTTP(S) URL or a local file path.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Url(String),
    Path(PathBuf),
}

impl DocumentSource {
    /// Interpret a CLI/user-supplied string: `http://`/`https://` prefixes
    /// mean a URL, everything else a local path.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::Path(PathBuf::from(raw))
        }
    }
}

impl std::fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Fetch the raw document bytes.
///
/// URLs are fetched with a bounded timeout; a non-success status or
/// connection failure is `SourceUnavailable`, an elapsed deadline is
/// `Timeout`. Local paths are read directly.
pub async fn fetch_document(config: &FetchConfig, source: &DocumentSource) -> Result<Vec<u8>> {
    match source {
        DocumentSource::Url(url) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(|e| RetrievalError::SourceUnavailable {
                    location: url.clone(),
                    reason: format!("http client: {e}"),
                })?;

            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| fetch_error(url, config.timeout_secs, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(RetrievalError::SourceUnavailable {
                    location: url.clone(),
                    reason: format!("HTTP {status}"),
                });
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| fetch_error(url, config.timeout_secs, e))?;
            Ok(bytes.to_vec())
        }
        DocumentSource::Path(path) => {
            tokio::fs::read(path)
                .await
                .map_err(|e| RetrievalError::SourceUnavailable {
                    location: path.display().to_string(),
                    reason: e.to_string(),
                })
        }
    }
}

fn fetch_error(url: &str, timeout_secs: u64, e: reqwest::Error) -> RetrievalError {
    if e.is_timeout() {
        RetrievalError::Timeout {
            stage: "document fetch",
            secs: timeout_secs,
        }
    } else {
        RetrievalError::SourceUnavailable {
            location: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Extract plain text from raw document bytes.
///
/// Fails with `ExtractionFailed` when the document yields no text (e.g. a
/// scanned PDF without a text layer) — detected here, never passed
/// downstream as empty chunks.
pub async fn extract_text(bytes: Vec<u8>) -> Result<String> {
    tokio::task::spawn_blocking(move || extract_text_blocking(&bytes))
        .await
        .map_err(|e| RetrievalError::ExtractionFailed(format!("extraction task: {e}")))?
}

fn extract_text_blocking(bytes: &[u8]) -> Result<String> {
    let text = if bytes.starts_with(b"%PDF") {
        extract_pdf(bytes)?
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };

    if text.trim().is_empty() {
        return Err(RetrievalError::ExtractionFailed(
            "document contains no extractable text".to_string(),
        ));
    }
    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    // Scoped acquisition: NamedTempFile unlinks the file on drop, on every
    // exit path including extractor panics and task cancellation.
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| RetrievalError::ExtractionFailed(format!("temp file: {e}")))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| RetrievalError::ExtractionFailed(format!("temp file write: {e}")))?;

    let pages = pdf_extract::extract_text_by_pages(tmp.path())
        .map_err(|e| RetrievalError::ExtractionFailed(format!("PDF parse: {e}")))?;

    Ok(pages.join("\n\n"))
}

/// Fetch a document and extract its text in one step, returning the
/// content fingerprint alongside. The fingerprint is computed over the raw
/// bytes, before extraction, so it is stable across parser versions.
pub async fn fetch_and_extract(
    config: &FetchConfig,
    source: &DocumentSource,
) -> Result<(Fingerprint, String)> {
    let bytes = fetch_document(config, source).await?;
    let fingerprint = Fingerprint::of_bytes(&bytes);
    let text = extract_text(bytes).await?;
    Ok((fingerprint, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_distinguishes_url_from_path() {
        assert!(matches!(
            DocumentSource::parse("https://example.com/policy.pdf"),
            DocumentSource::Url(_)
        ));
        assert!(matches!(
            DocumentSource::parse("http://example.com/policy.pdf"),
            DocumentSource::Url(_)
        ));
        assert!(matches!(
            DocumentSource::parse("./docs/policy.pdf"),
            DocumentSource::Path(_)
        ));
    }

    #[tokio::test]
    async fn missing_path_is_source_unavailable() {
        let source = DocumentSource::parse("/nonexistent/policy.pdf");
        let err = fetch_document(&FetchConfig::default(), &source)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn plain_text_passes_through() {
        let text = extract_text(b"Grace period is 30 days.".to_vec())
            .await
            .unwrap();
        assert_eq!(text, "Grace period is 30 days.");
    }

    #[tokio::test]
    async fn empty_document_is_extraction_failed() {
        let err = extract_text(Vec::new()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::ExtractionFailed(_)));

        let err = extract_text(b"   \n\n  ".to_vec()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::ExtractionFailed(_)));
    }

    #[tokio::test]
    async fn invalid_pdf_is_extraction_failed() {
        let err = extract_text(b"%PDF-1.4 not actually a pdf".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::ExtractionFailed(_)));
    }
}
