//! PDF extraction tests against handcrafted minimal documents.
//!
//! The fixtures build valid single- and multi-page PDFs byte by byte,
//! with correct xref offsets, so pdf-extract can parse them without any
//! external files.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use clause_harness::cache::MemoryCache;
use clause_harness::config::{Config, FetchConfig};
use clause_harness::embedding::{l2_normalize, Embedder};
use clause_harness::error::Result;
use clause_harness::loader::{fetch_and_extract, DocumentSource};
use clause_harness::models::Fingerprint;
use clause_harness::retriever::Retriever;

/// Build a minimal valid PDF with one Helvetica text run per page.
fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    let font_obj = 3 + 2 * n;
    let kids = (0..n)
        .map(|i| format!("{} 0 R", 3 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects: Vec<String> = Vec::new();
    objects.push("1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n".to_string());
    objects.push(format!(
        "2 0 obj << /Type /Pages /Kids [{kids}] /Count {n} >> endobj\n"
    ));
    for (i, text) in pages.iter().enumerate() {
        let page_obj = 3 + 2 * i;
        let content_obj = page_obj + 1;
        objects.push(format!(
            "{page_obj} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Contents {content_obj} 0 R /Resources << /Font << /F1 {font_obj} 0 R >> >> >> endobj\n"
        ));
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        objects.push(format!(
            "{content_obj} 0 obj << /Length {} >> stream\n{content}\nendstream endobj\n",
            content.len()
        ));
    }
    objects.push(format!(
        "{font_obj} 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n"
    ));

    let mut out: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for obj in &objects {
        offsets.push(out.len());
        out.extend_from_slice(obj.as_bytes());
    }

    let xref_start = out.len();
    let total = objects.len() + 1;
    out.extend_from_slice(format!("xref\n0 {total}\n").as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!("trailer << /Size {total} /Root 1 0 R >>\nstartxref\n{xref_start}\n%%EOF\n")
            .as_bytes(),
    );
    out
}

fn write_pdf(dir: &TempDir, name: &str, pages: &[&str]) -> DocumentSource {
    let path = dir.path().join(name);
    std::fs::write(&path, build_pdf(pages)).unwrap();
    DocumentSource::Path(path)
}

#[tokio::test]
async fn extracts_text_from_single_page_pdf() {
    let dir = TempDir::new().unwrap();
    let source = write_pdf(&dir, "policy.pdf", &["Grace period is thirty days."]);

    let (_, text) = fetch_and_extract(&FetchConfig::default(), &source)
        .await
        .unwrap();

    assert!(text.contains("Grace"));
    assert!(text.contains("thirty"));
}

#[tokio::test]
async fn pages_concatenate_in_order_with_separation() {
    let dir = TempDir::new().unwrap();
    let source = write_pdf(
        &dir,
        "policy.pdf",
        &[
            "Grace period is thirty days.",
            "Maternity cover begins after nine months.",
        ],
    );

    let (_, text) = fetch_and_extract(&FetchConfig::default(), &source)
        .await
        .unwrap();

    let first = text.find("Grace").expect("page 1 text missing");
    let second = text.find("Maternity").expect("page 2 text missing");
    assert!(first < second, "pages out of order");

    // A paragraph break separates pages, so sentence splitting never runs
    // across the boundary.
    assert!(text[first..second].contains("\n\n"));
}

#[tokio::test]
async fn fingerprint_is_stable_across_fetches() {
    let dir = TempDir::new().unwrap();
    let source = write_pdf(&dir, "policy.pdf", &["Grace period is thirty days."]);

    let (fp1, _) = fetch_and_extract(&FetchConfig::default(), &source)
        .await
        .unwrap();
    let (fp2, _) = fetch_and_extract(&FetchConfig::default(), &source)
        .await
        .unwrap();
    assert_eq!(fp1, fp2);

    let raw = std::fs::read(dir.path().join("policy.pdf")).unwrap();
    assert_eq!(fp1, Fingerprint::of_bytes(&raw));
}

/// Minimal embedder for the end-to-end PDF test.
struct WordCountEmbedder;

#[async_trait]
impl Embedder for WordCountEmbedder {
    fn model_name(&self) -> &str {
        "wordcount-stub"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                l2_normalize(vec![
                    lower.matches("grace").count() as f32,
                    lower.matches("maternity").count() as f32,
                ])
            })
            .collect())
    }
}

#[tokio::test]
async fn pdf_document_is_retrievable_end_to_end() {
    let dir = TempDir::new().unwrap();
    let source = write_pdf(
        &dir,
        "policy.pdf",
        &[
            "Grace period is thirty days.",
            "Maternity cover begins after nine months.",
        ],
    );

    let mut cfg = Config::default();
    cfg.chunking.max_words = 6;
    cfg.chunking.overlap_words = 1;

    let retriever = Retriever::new(cfg, Arc::new(WordCountEmbedder), Arc::new(MemoryCache::new()));
    let handle = retriever.build_index(&source).await.unwrap();
    assert!(handle.chunk_count() >= 2);

    let passages = retriever.query(&handle, "maternity", 1).await.unwrap();
    assert_eq!(passages.len(), 1);
    assert!(passages[0].chunk.text.to_lowercase().contains("maternity"));
}
