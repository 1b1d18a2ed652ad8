//! Sliding-window text chunker for the vector cache.
//!
//! Splits extracted page text into overlapping windows whose offsets
//! become part of the cache key, so re-chunking the same text with the
//! same parameters yields the same content addresses.
//!
//! # Algorithm
//!
//! 1. Start a window at character offset `0`.
//! 2. Take up to `size` characters from the window start.
//! 3. Keep the window if its trimmed text is at least `min_chars` long.
//! 4. Advance the window start by `size - overlap` and repeat until the
//!    start passes the end of the text.
//!
//! Offsets and lengths are counted in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use evidence_harness_core::chunk::{chunk_text, ChunkParams};
//!
//! let text = "a".repeat(2500);
//! let params = ChunkParams { size: 1000, overlap: 100, min_chars: 200 };
//! let chunks = chunk_text(&text, &params);
//! let offsets: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
//! assert_eq!(offsets, vec![(0, 1000), (900, 1900), (1800, 2500)]);
//! ```

use uuid::Uuid;

/// Window parameters for [`chunk_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub size: usize,
    pub overlap: usize,
    /// Minimum trimmed length for a window to be kept.
    pub min_chars: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 120,
            min_chars: 200,
        }
    }
}

/// One kept window of a page's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position among the kept chunks, starting at 0.
    pub chunk_index: usize,
    pub start: usize,
    pub end: usize,
    /// Trimmed window text.
    pub text: String,
}

/// Split `text` into overlapping windows.
///
/// Returns an empty list when no window reaches `min_chars`, which is
/// always the case for text shorter than `min_chars`.
pub fn chunk_text(text: &str, params: &ChunkParams) -> Vec<TextChunk> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let size = params.size.max(1);
    let step = size.saturating_sub(params.overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < len {
        let end = len.min(start + size);
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if trimmed.chars().count() >= params.min_chars {
            chunks.push(TextChunk {
                chunk_index: chunks.len(),
                start,
                end,
                text: trimmed.to_string(),
            });
        }
        start += step;
    }
    chunks
}

/// Content address of a cached chunk: `url_norm|chunk_index|start|end`.
pub fn chunk_key(url_norm: &str, chunk_index: usize, start: usize, end: usize) -> String {
    format!("{}|{}|{}|{}", url_norm, chunk_index, start, end)
}

/// Deterministic UUID for a chunk key, for stores that require UUID ids.
pub fn chunk_point_id(key: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes())
}
