//! Document chunking.
//!
//! Splits extracted text into overlapping windows of at most `chunk_size`
//! characters, preferring to cut at paragraph, then sentence, then word
//! boundaries in the second half of each window.

/// A chunk of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk index within the document.
    pub index: usize,
    /// Trimmed chunk text.
    pub text: String,
    /// Start byte offset in the (trimmed) source text.
    pub start: usize,
    /// End byte offset in the (trimmed) source text.
    pub end: usize,
}

/// Split `text` into chunks of at most `chunk_size` characters, with roughly
/// `overlap` characters repeated between neighbours.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let text = text.trim();
    let mut chunks = Vec::new();
    if text.is_empty() || chunk_size == 0 {
        return chunks;
    }

    let overlap = overlap.min(chunk_size - 1);
    let mut start = 0;

    while start < text.len() {
        let hard_end = advance_chars(text, start, chunk_size);
        let mut end = if hard_end >= text.len() {
            text.len()
        } else {
            let min_end = advance_chars(text, start, chunk_size / 2);
            find_break(&text[min_end..hard_end])
                .map(|offset| min_end + offset)
                .unwrap_or(hard_end)
        };
        if end <= start {
            end = hard_end;
        }

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(Chunk {
                index: chunks.len(),
                text: piece.to_string(),
                start,
                end,
            });
        }

        if end >= text.len() {
            break;
        }

        let next = retreat_chars(text, end, overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

/// Byte offset just past the best break point in `window`, if any.
fn find_break(window: &str) -> Option<usize> {
    if let Some(i) = window.rfind("\n\n") {
        return Some(i + 2);
    }

    let sentence = [". ", ".\n", "? ", "! "]
        .iter()
        .filter_map(|pat| window.rfind(pat).map(|i| i + pat.len()))
        .max();
    if sentence.is_some() {
        return sentence;
    }

    window
        .rfind(char::is_whitespace)
        .and_then(|i| window[i..].chars().next().map(|c| i + c.len_utf8()))
}

/// Byte offset `n` characters after `from` (clamped to the end).
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

/// Byte offset `n` characters before `from` (clamped to the start).
fn retreat_chars(text: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text("   \n ", 100, 10).is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_text("  A short abstract.  ", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A short abstract.");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn chunks_respect_size_limit() {
        let text = "The sequencing reads were trimmed and aligned. ".repeat(40);
        let chunks = chunk_text(&text, 200, 40);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 200);
        }
        // Indexes are sequential
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn neighbouring_chunks_overlap() {
        let text = "word ".repeat(200);
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.len() > 2);
        assert!(chunks[1].start < chunks[0].end);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let first = "a".repeat(60);
        let second = "b".repeat(60);
        let text = format!("{first}\n\n{second}");
        let chunks = chunk_text(&text, 100, 0);
        assert_eq!(chunks[0].text, first);
        assert_eq!(chunks[1].text, second);
    }

    #[test]
    fn handles_multibyte_text() {
        let text = "Análisis de secuenciación genómica. ".repeat(30);
        let chunks = chunk_text(&text, 50, 10);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 50);
        }
    }

    #[test]
    fn overlap_larger_than_chunk_terminates() {
        let text = "x".repeat(500);
        let chunks = chunk_text(&text, 10, 50);
        assert!(!chunks.is_empty());
        assert!(chunks.len() <= 500);
    }
}
