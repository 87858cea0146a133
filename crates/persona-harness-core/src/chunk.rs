//! Sliding-window text chunker with page provenance.
//!
//! Splits extracted document text into [`Chunk`]s of at most `chunk_size`
//! characters. Consecutive windows share `overlap` characters so that
//! sentences straddling a boundary appear whole in at least one chunk.
//!
//! # Algorithm
//!
//! 1. Validate `0 <= overlap < chunk_size`.
//! 2. Place a window of `chunk_size` chars at offset 0.
//! 3. Advance the window by `chunk_size - overlap` chars until a window
//!    reaches the end of the text. The last chunk may be shorter.
//! 4. Record the pages each window intersects using the [`PageMap`].
//!
//! Offsets are counted in chars, never bytes, so multi-byte text is never
//! split inside a code point.
//!
//! # Example
//!
//! ```rust
//! use persona_harness_core::chunk::chunk_text;
//! use persona_harness_core::models::PageMap;
//!
//! let chunks = chunk_text("doc-1", "abcdefghij", &PageMap::default(), 4, 1).unwrap();
//! let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(texts, vec!["abcd", "defg", "ghij"]);
//! ```

use crate::error::KnowledgeError;
use crate::models::{Chunk, PageMap};

/// Split `text` into overlapping chunks.
///
/// # Guarantees
///
/// - Empty text yields an empty vec.
/// - Chunk indices are contiguous: `0, 1, 2, …, N-1`.
/// - The union of all `[char_start, char_end)` spans is `[0, len)`.
/// - Identical input always produces identical output.
///
/// # Errors
///
/// [`KnowledgeError::InvalidInput`] when `chunk_size == 0` or
/// `overlap >= chunk_size`.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    page_map: &PageMap,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, KnowledgeError> {
    if chunk_size == 0 {
        return Err(KnowledgeError::invalid("chunk_size must be > 0"));
    }
    if overlap >= chunk_size {
        return Err(KnowledgeError::invalid(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }

    // Byte offset of every char, plus the end of the string.
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total_chars = offsets.len();
    offsets.push(text.len());

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total_chars {
        let end = (start + chunk_size).min(total_chars);
        chunks.push(make_chunk(
            document_id,
            chunks.len(),
            &text[offsets[start]..offsets[end]],
            start,
            end,
            page_map,
        ));
        if end == total_chars {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

fn make_chunk(
    document_id: &str,
    index: usize,
    text: &str,
    start: usize,
    end: usize,
    page_map: &PageMap,
) -> Chunk {
    Chunk {
        id: format!("{}#{}", document_id, index),
        document_id: document_id.to_string(),
        index,
        text: text.to_string(),
        char_start: start,
        char_end: end,
        pages: page_map.pages_for(start, end),
    }
}
