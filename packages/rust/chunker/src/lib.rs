//! Text chunking for extraction input.
//!
//! Splits crawled page text into overlapping, bounded-size segments.
//! Each pass is a pure function over the page text; chunk boundaries are
//! seeded with the tail of the previous chunk so local context survives
//! across boundaries for downstream extraction.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use firmfacts_shared::{ChunkingConfig, CrawledPage, TextChunk};

/// Sentences shorter than this are merged into their neighbor to avoid
/// degenerate micro-chunks.
const MIN_SENTENCE_LEN: usize = 50;

/// Split all pages into chunks. Chunk indexes restart per page.
pub fn chunk_pages(pages: &[CrawledPage], config: &ChunkingConfig) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    for page in pages {
        let page_chunks = chunk_page(page, config);
        debug!(url = %page.url, count = page_chunks.len(), "chunked page");
        chunks.extend(page_chunks);
    }
    chunks
}

/// Split one page into 0..N chunks bounded by the configured sizes.
///
/// Pages below `min_chunk_size` yield exactly one chunk; empty pages yield
/// none. Every emitted chunk except possibly the final one satisfies
/// `min_chunk_size <= len <= max_chunk_size + overlap_size`.
pub fn chunk_page(page: &CrawledPage, config: &ChunkingConfig) -> Vec<TextChunk> {
    let normalized = normalize_text(&page.text);
    if normalized.is_empty() {
        return Vec::new();
    }

    if normalized.len() < config.min_chunk_size {
        return vec![make_chunk(&normalized, &page.url, 0)];
    }

    let units = merge_short_sentences(split_sentences(&normalized, config.max_chunk_size));

    let mut chunks: Vec<TextChunk> = Vec::new();
    let mut current = String::new();
    let mut seeded_len = 0usize; // length of the overlap seed in `current`

    for unit in units {
        let would_be = if current.is_empty() {
            unit.len()
        } else {
            current.len() + 1 + unit.len()
        };

        // A chunk holding only its overlap seed must still accept one unit,
        // otherwise a long unit after a long seed could never be placed.
        let only_seed = current.len() == seeded_len;
        if would_be > config.max_chunk_size && !only_seed {
            let closed = current.trim().to_string();
            if closed.len() >= config.min_chunk_size {
                let seed = overlap_tail(&closed, config.overlap_size);
                chunks.push(make_chunk(&closed, &page.url, chunks.len()));
                current = seed;
                seeded_len = current.len();
            }
            // Below-minimum accumulations keep growing instead of closing.
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&unit);
    }

    // The final partial chunk is emitted only if it meets the minimum,
    // and only if it holds more than the seed carried over.
    let tail = current.trim();
    if tail.len() >= config.min_chunk_size && current.len() > seeded_len {
        chunks.push(make_chunk(tail, &page.url, chunks.len()));
    }

    chunks
}

fn make_chunk(content: &str, source_url: &str, index: usize) -> TextChunk {
    TextChunk {
        id: Uuid::now_v7().to_string(),
        content: content.to_string(),
        source_url: source_url.to_string(),
        chunk_index: index,
        word_count: content.split_whitespace().count() as u64,
        created_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Collapse whitespace runs and strip characters outside the approved
/// word/punctuation set.
pub fn normalize_text(text: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let filtered: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || is_approved_punct(*c))
        .collect();

    WS_RE.replace_all(filtered.trim(), " ").to_string()
}

fn is_approved_punct(c: char) -> bool {
    matches!(
        c,
        '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '"' | '(' | ')' | '-' | '&' | '$' | '%'
            | '/' | '@' | '#'
    )
}

// ---------------------------------------------------------------------------
// Sentence splitting
// ---------------------------------------------------------------------------

/// Split on sentence-terminal punctuation followed by whitespace. Units
/// longer than `max_len` are hard-split at word boundaries so a single
/// run-on sentence cannot blow the chunk size bound.
fn split_sentences(text: &str, max_len: usize) -> Vec<String> {
    static SENT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)(.*?[.!?])\s+").expect("valid regex"));

    let mut sentences: Vec<String> = Vec::new();
    let mut last_end = 0;

    for caps in SENT_RE.captures_iter(text) {
        let m = caps.get(1).expect("capture group");
        sentences.push(m.as_str().trim().to_string());
        last_end = caps.get(0).expect("match").end();
    }
    let rest = text[last_end..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }

    sentences
        .into_iter()
        .flat_map(|s| hard_split(s, max_len))
        .collect()
}

/// Break an oversized unit into `max_len`-bounded pieces at word boundaries.
fn hard_split(sentence: String, max_len: usize) -> Vec<String> {
    if sentence.len() <= max_len {
        return vec![sentence];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > max_len {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Merge adjacent sentences shorter than [`MIN_SENTENCE_LEN`] into their
/// successor.
fn merge_short_sentences(sentences: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for sentence in sentences {
        match merged.last_mut() {
            Some(last) if last.len() < MIN_SENTENCE_LEN => {
                last.push(' ');
                last.push_str(&sentence);
            }
            _ => merged.push(sentence),
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Overlap seeding
// ---------------------------------------------------------------------------

/// The trailing `overlap` characters of a closed chunk, broken at the
/// nearest preceding word boundary.
fn overlap_tail(chunk: &str, overlap: usize) -> String {
    if overlap == 0 || chunk.len() <= overlap {
        return String::new();
    }

    // Step back to a char boundary, then forward to the next space.
    let mut start = chunk.len() - overlap;
    while !chunk.is_char_boundary(start) {
        start += 1;
    }
    let tail = &chunk[start..];
    match tail.find(' ') {
        Some(space) => tail[space..].trim_start().to_string(),
        None => tail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str) -> CrawledPage {
        CrawledPage {
            url: "https://acme.com/about".into(),
            title: Some("About".into()),
            html: String::new(),
            text: text.into(),
            status_code: 200,
            content_type: Some("text/html".into()),
            word_count: text.split_whitespace().count() as u64,
            fetched_at: Utc::now(),
        }
    }

    fn config() -> ChunkingConfig {
        ChunkingConfig {
            max_chunk_size: 200,
            overlap_size: 40,
            min_chunk_size: 50,
        }
    }

    /// Sentences long enough not to trigger the micro-sentence merge.
    fn long_text(sentences: usize) -> String {
        (0..sentences)
            .map(|i| {
                format!(
                    "Sentence number {i} describes the operations of the company in some region."
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn normalize_strips_and_collapses() {
        let text = "Hello\t\tworld…\n\nAcme™ has   5,000 employees!";
        let normalized = normalize_text(text);
        assert_eq!(normalized, "Hello world Acme has 5,000 employees!");
    }

    #[test]
    fn empty_page_yields_no_chunks() {
        assert!(chunk_page(&page("   \n\t "), &config()).is_empty());
    }

    #[test]
    fn small_page_yields_single_chunk() {
        let chunks = chunk_page(&page("Acme makes rockets."), &config());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Acme makes rockets.");
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn chunks_respect_size_bounds() {
        let cfg = config();
        let chunks = chunk_page(&page(&long_text(40)), &cfg);
        assert!(chunks.len() > 1);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            if i < chunks.len() - 1 {
                assert!(
                    chunk.content.len() >= cfg.min_chunk_size,
                    "chunk {i} below min: {}",
                    chunk.content.len()
                );
            }
            assert!(
                chunk.content.len() <= cfg.max_chunk_size + cfg.overlap_size,
                "chunk {i} above max+overlap: {}",
                chunk.content.len()
            );
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let cfg = config();
        let chunks = chunk_page(&page(&long_text(40)), &cfg);
        assert!(chunks.len() > 1);

        // The second chunk starts with a word-aligned tail of the first.
        let first = &chunks[0].content;
        let second = &chunks[1].content;
        let seed = second.split(' ').next().expect("non-empty chunk");
        assert!(
            first.contains(seed),
            "overlap seed {seed:?} missing from previous chunk"
        );
        // Seed starts at a word boundary, not mid-word.
        assert!(!second.starts_with(' '));
    }

    #[test]
    fn short_sentences_are_merged() {
        let merged = merge_short_sentences(vec![
            "Yes.".into(),
            "It is.".into(),
            "A sentence that is comfortably longer than fifty characters in total.".into(),
        ]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn oversized_sentence_is_hard_split() {
        let word = "infrastructure";
        let run_on = vec![word; 60].join(" "); // ~900 chars, no terminal punctuation
        let pieces = hard_split(run_on, 200);
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| p.len() <= 200));
    }

    #[test]
    fn overlap_tail_breaks_at_word_boundary() {
        let chunk = "The company operates manufacturing facilities across three continents";
        let tail = overlap_tail(chunk, 25);
        assert!(chunk.ends_with(&tail));
        assert!(!tail.starts_with(' '));
        // First fragment of the tail is a whole word from the source.
        let first_word = tail.split(' ').next().unwrap();
        assert!(chunk.split(' ').any(|w| w == first_word));
    }

    #[test]
    fn chunk_pages_spans_multiple_pages() {
        let cfg = config();
        let pages = vec![page(&long_text(10)), page("Acme builds engines.")];
        let chunks = chunk_pages(&pages, &cfg);
        assert!(chunks.len() >= 2);
        // Index restarts on the second page.
        let last = chunks.last().unwrap();
        assert_eq!(last.chunk_index, 0);
        assert_eq!(last.content, "Acme builds engines.");
    }
}
