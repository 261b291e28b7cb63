use std::ops::Range;

use common::error::AppError;

/// A contiguous window of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    /// Position in the source text, in chars.
    pub char_range: Range<usize>,
    /// Chars shared with the previous chunk; 0 for the first.
    pub overlap: usize,
}

/// Splits `text` into windows of `size` chars, each starting `size - overlap` chars after
/// the previous one. Text of at most `size` chars yields a single chunk; empty text
/// yields none.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>, AppError> {
    if size == 0 || overlap >= size {
        return Err(AppError::Configuration(format!(
            "invalid chunking parameters: size {size}, overlap {overlap} (need 0 <= overlap < size)"
        )));
    }

    // Byte offset of every char boundary, including the end of the text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = boundaries.len() - 1;

    if len == 0 {
        return Ok(Vec::new());
    }

    if len <= size {
        return Ok(vec![Chunk {
            index: 0,
            text: text.to_string(),
            char_range: 0..len,
            overlap: 0,
        }]);
    }

    let step = size - overlap;
    let mut chunks = Vec::with_capacity(len.div_ceil(step));
    let mut start = 0;
    let mut previous_end: usize = 0;

    while start < len {
        let end = (start + size).min(len);
        chunks.push(Chunk {
            index: chunks.len(),
            text: text[boundaries[start]..boundaries[end]].to_string(),
            char_range: start..end,
            overlap: previous_end.saturating_sub(start),
        });
        previous_end = end;
        start += step;
    }

    Ok(chunks)
}
