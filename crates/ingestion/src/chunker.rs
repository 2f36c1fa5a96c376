//! Text chunking module
//!
//! Splits a document into sentence-aligned chunks for embedding. Sentences
//! are never split; a chunk is flushed once the next sentence would push it
//! to the size limit.

use tracing::debug;

/// Default chunk size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 500;

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Collapse every whitespace run (newlines included) into one space and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split normalized text into trimmed sentences without their terminators
///
/// Runs of terminators act as a single split point; blank fragments are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(SENTENCE_TERMINATORS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split `text` into ordered chunks of at most `max_chunk_size` characters
///
/// A single sentence longer than the limit becomes its own oversized chunk.
/// Every returned chunk is non-empty and trimmed.
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    let sentences = split_sentences(&normalized);

    let mut chunks = Vec::new();
    let mut buffer = String::new();
    // Char count of `buffer`, kept alongside to avoid rescanning it.
    let mut buffer_chars = 0usize;

    for sentence in &sentences {
        let sentence_chars = sentence.chars().count();

        if buffer_chars + sentence_chars >= max_chunk_size {
            let flushed = buffer.trim();
            if !flushed.is_empty() {
                chunks.push(flushed.to_string());
            }
            buffer.clear();
            buffer_chars = 0;
        }

        buffer.push_str(sentence);
        buffer.push_str(". ");
        buffer_chars += sentence_chars + 2;
    }

    let rest = buffer.trim();
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }

    debug!(
        input_chars = normalized.chars().count(),
        sentences = sentences.len(),
        chunk_count = chunks.len(),
        max_chunk_size,
        "Text chunked"
    );

    chunks
}
