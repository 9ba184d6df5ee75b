//! Separator-aware sliding-window text chunker.
//!
//! Splits the aggregated document text into [`Chunk`]s of at most
//! `chunk_size` chars. Each chunk ends right after the last separator that
//! keeps it within the window, falling back to a hard cut when the window
//! has none. Every chunk after the first starts exactly `chunk_overlap`
//! chars before its predecessor ends.
//!
//! Lengths are counted in chars, not bytes, so multi-byte text is never
//! split inside a code point.

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Split text into overlapping chunks. Returns an empty vector for empty
/// input; otherwise indices are contiguous starting at 0.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(size - 1);

    // Byte offset of every char plus the end of the string, so char
    // positions map straight to slice bounds.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = offsets.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total {
        let window_end = (start + size).min(total);
        let end = if window_end == total {
            total
        } else {
            split_point(text, &offsets, start + overlap, window_end, config.separator)
                .unwrap_or(window_end)
        };

        chunks.push(make_chunk(
            chunks.len(),
            start,
            &text[offsets[start]..offsets[end]],
        ));

        if end == total {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// Char position just after the last `separator` in `(lower, upper]`.
fn split_point(
    text: &str,
    offsets: &[usize],
    lower: usize,
    upper: usize,
    separator: char,
) -> Option<usize> {
    let window = &text[offsets[lower]..offsets[upper]];
    let sep_byte = window.rfind(separator)?;
    let chars_before = window[..sep_byte].chars().count();
    let candidate = lower + chars_before + 1;
    (candidate > lower).then_some(candidate)
}

fn make_chunk(index: usize, start: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        index,
        start,
        text: text.to_string(),
        hash,
    }
}

/// Rebuilds the source text from a chunk sequence by dropping each
/// chunk's overlapping prefix.
pub fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(&chunk.text);
        } else {
            out.extend(chunk.text.chars().skip(overlap));
        }
    }
    out
}
