//! Sliding-window text chunker.
//!
//! Splits document body text into overlapping windows of `size` characters
//! advancing by `step` characters, so each piece of text appears in up to
//! `ceil(size / step)` chunks and no retrieval boundary can cut a passage
//! in half. Window geometry is validated at config load; `size >= step > 0`
//! holds by the time this module runs.
//!
//! Each chunk records the character offset where its window starts, receives
//! a fresh UUID, and carries a SHA-256 hash of its text for staleness
//! detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split `text` into overlapping character windows of `size`, advancing by
/// `step`. Returns chunks with contiguous indices starting at 0; the final
/// window may be shorter than `size`. An empty text yields one empty chunk
/// so every document has at least one indexed row.
pub fn chunk_text(document_id: &str, text: &str, size: usize, step: usize) -> Vec<Chunk> {
    if text.is_empty() {
        return vec![make_chunk(document_id, 0, 0, "")];
    }

    // Byte offset of every char boundary, plus the end of the text, so
    // windows can be sliced without landing inside a multi-byte char.
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());
    let n = boundaries.len() - 1; // char count

    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;
    let mut start = 0usize;

    while start < n {
        let end = (start + size).min(n);
        let piece = &text[boundaries[start]..boundaries[end]];
        chunks.push(make_chunk(document_id, chunk_index, start as i64, piece));
        chunk_index += 1;

        // The window that reaches the end of the text is the last one.
        if start + size >= n {
            break;
        }
        start += step;
    }

    chunks
}

fn make_chunk(document_id: &str, index: i64, start_offset: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        start_offset,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 2000, 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn empty_text_yields_one_chunk() {
        let chunks = chunk_text("doc1", "", 2000, 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn windows_overlap_by_size_minus_step() {
        let text: String = ('a'..='z').cycle().take(25).collect();
        let chunks = chunk_text("doc1", &text, 10, 5);
        // Windows start at 0, 5, 10, 15, 20; the one starting at 15 reaches
        // the end (15 + 10 = 25) and is the last.
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text.len(), 10);
        assert_eq!(chunks[1].start_offset, 5);
        // Overlap: the back half of window 0 is the front half of window 1
        assert_eq!(&chunks[0].text[5..], &chunks[1].text[..5]);
        assert_eq!(chunks[3].start_offset, 15);
        assert_eq!(chunks[3].text.len(), 10);
    }

    #[test]
    fn trailing_partial_window_included() {
        let text = "x".repeat(12);
        let chunks = chunk_text("doc1", &text, 10, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].start_offset, 10);
        assert_eq!(chunks[1].text.len(), 2);
    }

    #[test]
    fn exact_fit_has_no_empty_trailing_chunk() {
        let text = "x".repeat(10);
        let chunks = chunk_text("doc1", &text, 10, 5);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text.len(), 10);
    }

    #[test]
    fn indices_contiguous_and_offsets_step_apart() {
        let text = "y".repeat(95);
        let chunks = chunk_text("doc1", &text, 20, 10);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.start_offset, (i as i64) * 10);
        }
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "héllo wörld ünïcode tëxt grüß".repeat(4);
        let chunks = chunk_text("doc1", &text, 16, 8);
        for c in &chunks {
            // Would panic during slicing if a boundary were wrong; also
            // verify the window length in chars, not bytes.
            assert!(c.text.chars().count() <= 16);
        }
    }

    #[test]
    fn deterministic_hashes() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta";
        let c1 = chunk_text("doc1", text, 12, 6);
        let c2 = chunk_text("doc1", text, 12, 6);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.start_offset, b.start_offset);
        }
    }
}
