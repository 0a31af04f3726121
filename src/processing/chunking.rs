//! Fixed-size sliding-window chunking.
//!
//! Windows are measured in Unicode scalar values so multi-byte characters are never split.
//! Window `i` starts at `i * (size - overlap)` and spans at most `size` characters; the sequence
//! stops at the first window that reaches the end of the text. For text longer than `size` this
//! yields `ceil((len - overlap) / (size - overlap))` chunks.

use super::types::{Chunk, ChunkingError};

/// Split `text` into overlapping windows.
///
/// Returns an empty vector for empty text and a single chunk equal to the input when the text is
/// no longer than `size` characters.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>, ChunkingError> {
    if size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= size {
        return Err(ChunkingError::InvalidOverlap { size, overlap });
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every character plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;
    let step = size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(char_count);
        chunks.push(Chunk {
            text: text[boundaries[start]..boundaries[end]].to_string(),
            index: chunks.len(),
        });
        if start + size >= char_count {
            break;
        }
        start += step;
    }

    tracing::trace!(
        chars = char_count,
        size,
        overlap,
        chunks = chunks.len(),
        "Chunked text"
    );
    Ok(chunks)
}
