//! Boundary-respecting text chunker with overlap.
//!
//! Splits document text into [`Chunk`]s bounded by a configurable word
//! count. Splitting prefers semantic boundaries in priority order —
//! paragraph (`\n\n`), line (`\n`), sentence end — and only falls down the
//! list when a span still exceeds `max_words`. A sentence that exceeds the
//! bound on its own is windowed word by word rather than dropped or
//! truncated: no word of the input is ever lost.
//!
//! Every chunk after the first begins with the trailing `overlap_words`
//! words of the previous chunk, so context at chunk boundaries survives
//! retrieval. Chunk text is whitespace-normalized (words joined by single
//! spaces), which keeps the output a pure function of the word sequence.
//!
//! Same input + same config always yields the identical chunk sequence.

use crate::error::{Result, RetrievalError};
use crate::models::Chunk;

/// Split `text` into overlapping chunks of at most `max_words` words.
///
/// Returns chunks with contiguous `seq` starting at 0. Empty (or
/// whitespace-only) input produces zero chunks.
///
/// # Errors
///
/// `InvalidChunkConfig` when `overlap_words >= max_words` (the window
/// could never advance) or `max_words == 0`.
pub fn chunk_text(text: &str, max_words: usize, overlap_words: usize) -> Result<Vec<Chunk>> {
    if max_words == 0 || overlap_words >= max_words {
        return Err(RetrievalError::InvalidChunkConfig {
            max_words,
            overlap_words,
        });
    }

    let mut units: Vec<Vec<&str>> = Vec::new();
    for para in text.split("\n\n") {
        split_span(para, max_words, 0, &mut units);
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    // Number of leading words in `current` that were carried over from the
    // previous chunk; a buffer holding only carry is never flushed.
    let mut carry_len = 0usize;

    for unit in units {
        if current.len() + unit.len() <= max_words {
            current.extend(unit);
            continue;
        }

        if current.len() > carry_len {
            carry_len = flush(&mut chunks, &mut current, overlap_words);
        }

        if current.len() + unit.len() <= max_words {
            current.extend(unit);
        } else {
            // The unit does not fit even in a fresh window: slide over it
            // word by word, flushing full windows as they close.
            for word in unit {
                if current.len() == max_words {
                    carry_len = flush(&mut chunks, &mut current, overlap_words);
                }
                current.push(word);
            }
        }
    }

    if current.len() > carry_len {
        flush(&mut chunks, &mut current, overlap_words);
    }

    Ok(chunks)
}

/// Emit `current` as a chunk, then reset it to its trailing
/// `overlap_words` words. Returns the new carry length.
fn flush(chunks: &mut Vec<Chunk>, current: &mut Vec<&str>, overlap_words: usize) -> usize {
    chunks.push(Chunk {
        seq: chunks.len(),
        text: current.join(" "),
    });
    let keep_from = current.len().saturating_sub(overlap_words);
    let tail = current.split_off(keep_from);
    *current = tail;
    current.len()
}

/// Recursively split a span at the finest boundary needed to get units
/// under `max_words`. Level 0 splits lines, level 1 splits sentences;
/// an oversized sentence stays whole (the merge loop windows it).
fn split_span<'a>(span: &'a str, max_words: usize, level: u8, out: &mut Vec<Vec<&'a str>>) {
    let words: Vec<&str> = span.split_whitespace().collect();
    if words.is_empty() {
        return;
    }
    if words.len() <= max_words || level >= 2 {
        out.push(words);
        return;
    }
    match level {
        0 => {
            for line in span.split('\n') {
                split_span(line, max_words, 1, out);
            }
        }
        _ => {
            for sentence in split_sentences(span) {
                split_span(sentence, max_words, 2, out);
            }
        }
    }
}

/// Split a span after sentence-ending punctuation (`.` `!` `?`) followed
/// by whitespace. The punctuation stays with its sentence.
fn split_sentences(span: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let bytes = span.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if (b == b'.' || b == b'!' || b == b'?')
            && bytes.get(i + 1).is_some_and(|next| next.is_ascii_whitespace())
        {
            out.push(&span[start..=i]);
            start = i + 1;
        }
        i += 1;
    }
    if start < span.len() {
        out.push(&span[start..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<&str> {
        s.split_whitespace().collect()
    }

    #[test]
    fn grace_period_scenario() {
        let text = "Grace period is 30 days. Pre-existing diseases have a 2-year wait.";
        let chunks = chunk_text(text, 6, 2).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Grace period is 30 days.",
                "30 days. Pre-existing diseases have a",
                "have a 2-year wait.",
            ]
        );
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.seq, i);
        }
    }

    #[test]
    fn empty_input_produces_zero_chunks() {
        assert!(chunk_text("", 10, 2).unwrap().is_empty());
        assert!(chunk_text("   \n\n  \n ", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn overlap_at_least_max_is_rejected() {
        let err = chunk_text("some text", 5, 5).unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidChunkConfig { .. }));
        let err = chunk_text("some text", 5, 9).unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidChunkConfig { .. }));
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("The policy covers maternity.", 50, 5).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "The policy covers maternity.");
        assert_eq!(chunks[0].seq, 0);
    }

    #[test]
    fn chunks_respect_word_bound() {
        let text = (0..40)
            .map(|i| format!("Clause {} applies to inpatient treatment only.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 12, 3).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(
                words(&c.text).len() <= 12,
                "chunk exceeds bound: {:?}",
                c.text
            );
        }
    }

    #[test]
    fn overlap_repeats_previous_tail() {
        let text = (0..40)
            .map(|i| format!("Clause {} applies to inpatient treatment only.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let overlap = 3;
        let chunks = chunk_text(&text, 12, overlap).unwrap();
        for pair in chunks.windows(2) {
            let prev = words(&pair[0].text);
            let next = words(&pair[1].text);
            assert_eq!(
                &prev[prev.len() - overlap..],
                &next[..overlap],
                "chunk {} does not start with the previous chunk's tail",
                pair[1].seq
            );
        }
    }

    #[test]
    fn no_word_is_dropped() {
        let text = "First clause.\nSecond clause follows here.\n\nA new section begins. \
                    It has a fairly long sentence that will not fit in one window at all.";
        let chunks = chunk_text(text, 6, 2).unwrap();
        let emitted: Vec<&str> = chunks.iter().flat_map(|c| words(&c.text)).collect();
        for w in words(text) {
            assert!(emitted.contains(&w), "word {:?} was dropped", w);
        }
    }

    #[test]
    fn paragraph_boundary_preferred() {
        // Both paragraphs fit whole, so neither is split mid-sentence.
        let text = "Alpha beta gamma.\n\nDelta epsilon zeta eta theta.";
        let chunks = chunk_text(text, 6, 1).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Alpha beta gamma.");
        assert_eq!(chunks[1].text, "gamma. Delta epsilon zeta eta theta.");
    }

    #[test]
    fn deterministic() {
        let text = "Grace period is 30 days. Pre-existing diseases have a 2-year wait.\n\n\
                    Maternity cover starts after 9 months of continuous coverage.";
        let a = chunk_text(text, 6, 2).unwrap();
        let b = chunk_text(text, 6, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sentence_split_keeps_punctuation() {
        let parts = split_sentences("One here. Two there! Three? Four");
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].trim(), "One here.");
        assert_eq!(parts[1].trim(), "Two there!");
        assert_eq!(parts[2].trim(), "Three?");
        assert_eq!(parts[3].trim(), "Four");
    }
}
