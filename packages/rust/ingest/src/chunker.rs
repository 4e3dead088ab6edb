//! Overlapping character-window chunker.
//!
//! Splits extracted document text into fixed-size windows with a configured
//! overlap. Boundaries are character-based, not semantic; windows never
//! split a UTF-8 scalar.

/// Split `text` into overlapping windows of `size` characters.
///
/// Consecutive windows share `overlap` characters. The final window may be
/// shorter than `size`. Whitespace-only windows are dropped. An `overlap`
/// of `size` or more would never advance; it is clamped to a step of one
/// character.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || size == 0 {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end sentinel.
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());
    let char_count = boundaries.len() - 1;

    let step = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < char_count {
        let end = (start + size).min(char_count);
        let slice = &text[boundaries[start]..boundaries[end]];
        if !slice.trim().is_empty() {
            chunks.push(slice.to_string());
        }
        if end == char_count {
            break;
        }
        start += step;
    }

    chunks
}
