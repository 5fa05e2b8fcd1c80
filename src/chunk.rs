//! Recursive separator-priority text chunker.
//!
//! Splits document text into [`Chunk`]s that respect a configurable
//! `max_chunk_size`, preferring coarse boundaries over fine ones so each
//! chunk stays semantically coherent. Adjacent chunks share up to
//! `overlap` characters of trailing context so meaning is not lost at a
//! boundary.
//!
//! # Algorithm
//!
//! 1. Try separators from coarsest to finest: paragraph (`\n\n`),
//!    line (`\n`), sentence (`. `), word (` `).
//! 2. Split on the first separator that occurs in the text; pieces that
//!    still exceed `max_chunk_size` are recursively split with the
//!    remaining, finer separators.
//! 3. Merge adjacent pieces back together (rejoined with the separator
//!    that produced them) until adding the next piece would exceed
//!    `max_chunk_size`; on flush, retain trailing pieces totalling at
//!    most `overlap` characters as the start of the next chunk.
//! 4. If no separator applies at all, fall back to a hard character cut
//!    into windows of `max_chunk_size` stepping by
//!    `max_chunk_size - overlap`, snapped to UTF-8 boundaries.
//! 5. Text at or under `max_chunk_size` produces exactly one chunk.
//!
//! Chunk indices are contiguous from 0 and chunk ids are deterministic
//! (`{document_id}_chunk_{index}`), so re-splitting the same document
//! addresses the same index keys. Splitting is a pure function of the
//! input and configuration; empty or whitespace-only documents are
//! rejected upstream before the chunker runs.

use crate::config::ChunkingConfig;
use crate::models::{Chunk, NormalizedDocument};

/// Boundary tokens tried from coarse to fine. A hard character cut is the
/// implicit final fallback.
const SEPARATOR_PRIORITY: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split a normalized document into chunks carrying its source metadata.
///
/// Chunks are ordered by `chunk_index` starting at 0. At least one chunk
/// is returned for any non-empty text.
pub fn split_document(document: &NormalizedDocument, config: &ChunkingConfig) -> Vec<Chunk> {
    split_text(&document.text, config)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            chunk_id: Chunk::id_for(&document.document_id, i as i64),
            document_id: document.document_id.clone(),
            chunk_index: i as i64,
            text,
            meta: document.meta.clone(),
        })
        .collect()
}

/// Split raw text into overlapping segments of at most
/// `config.max_chunk_size` characters.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.len() <= config.max_chunk_size {
        return vec![trimmed.to_string()];
    }

    let chunks = split_with_separators(
        trimmed,
        config.max_chunk_size,
        config.overlap,
        &SEPARATOR_PRIORITY,
    );

    if chunks.is_empty() {
        vec![trimmed.to_string()]
    } else {
        chunks
    }
}

fn split_with_separators(
    text: &str,
    max: usize,
    overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    // Pick the coarsest separator that actually occurs.
    let (sep, rest) = match separators.iter().position(|s| text.contains(s)) {
        Some(i) => (separators[i], &separators[i + 1..]),
        None => return hard_cut(text, max, overlap),
    };

    let mut final_chunks: Vec<String> = Vec::new();
    let mut good: Vec<&str> = Vec::new();

    for piece in text.split(sep) {
        if piece.len() <= max {
            good.push(piece);
        } else {
            // Flush accumulated short pieces before descending.
            if !good.is_empty() {
                merge_pieces(&good, sep, max, overlap, &mut final_chunks);
                good.clear();
            }
            if rest.is_empty() {
                final_chunks.extend(hard_cut(piece, max, overlap));
            } else {
                final_chunks.extend(split_with_separators(piece, max, overlap, rest));
            }
        }
    }

    if !good.is_empty() {
        merge_pieces(&good, sep, max, overlap, &mut final_chunks);
    }

    final_chunks
}

/// Greedily pack pieces into chunks of at most `max` characters, rejoined
/// with `sep`. When a chunk is flushed, trailing pieces totalling at most
/// `overlap` characters carry over as the start of the next chunk.
fn merge_pieces(pieces: &[&str], sep: &str, max: usize, overlap: usize, out: &mut Vec<String>) {
    let sep_len = sep.len();
    let mut window: Vec<&str> = Vec::new();
    let mut total = 0usize;

    for &piece in pieces {
        let piece_len = piece.len();
        let joined = if window.is_empty() { 0 } else { sep_len };

        if total + joined + piece_len > max && !window.is_empty() {
            push_chunk(&window.join(sep), out);

            // Retain a trailing overlap window, dropping from the front
            // until both the overlap budget and the size limit hold.
            loop {
                let joined_now = if window.is_empty() { 0 } else { sep_len };
                if total <= overlap && (total + joined_now + piece_len <= max || total == 0) {
                    break;
                }
                let dropped = window.remove(0);
                total -= dropped.len();
                if !window.is_empty() {
                    total -= sep_len;
                }
            }
        }

        if !window.is_empty() {
            total += sep_len;
        }
        window.push(piece);
        total += piece_len;
    }

    if !window.is_empty() {
        push_chunk(&window.join(sep), out);
    }
}

fn push_chunk(text: &str, out: &mut Vec<String>) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Character-window fallback for text with no usable separator. Windows
/// are `max` characters long and step by `max - overlap`, snapped back to
/// UTF-8 char boundaries.
fn hard_cut(text: &str, max: usize, overlap: usize) -> Vec<String> {
    let step = max - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let end = snap_to_char_boundary(text, (start + max).min(text.len()));
        push_chunk(&text[start..end], &mut chunks);
        if end == text.len() {
            break;
        }
        let mut next = snap_to_char_boundary(text, start + step);
        if next <= start {
            // A multi-byte char straddles the step; advance past it.
            next = text[start..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| start + i)
                .unwrap_or(text.len());
        }
        start = next;
    }

    chunks
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocMeta, SourceDetail, SourceType};

    fn cfg(max: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chunk_size: max,
            overlap,
        }
    }

    fn doc(text: &str) -> NormalizedDocument {
        NormalizedDocument {
            document_id: "doc1".to_string(),
            text: text.to_string(),
            meta: DocMeta {
                title: "Title".to_string(),
                source_url: "https://wiki.example.com/p".to_string(),
                detail: SourceDetail::Wiki {
                    space: "ENG".to_string(),
                    page_id: "1".to_string(),
                },
            },
        }
    }

    /// Strip chunks down to their word sequence so reconstruction can be
    /// compared modulo separator whitespace and punctuation.
    fn words(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_string())
            .collect()
    }

    /// Rebuild the original word stream from overlapping chunks by
    /// dropping each chunk's longest word-level prefix that matches the
    /// accumulated suffix.
    fn reconstruct_words(chunks: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for chunk in chunks {
            let chunk_words = words(chunk);
            let max_overlap = chunk_words.len().min(out.len());
            let mut skip = 0;
            for k in (1..=max_overlap).rev() {
                if out[out.len() - k..] == chunk_words[..k] {
                    skip = k;
                    break;
                }
            }
            out.extend(chunk_words.into_iter().skip(skip));
        }
        out
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_document(&doc("Hello, world!"), &cfg(1000, 200));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].chunk_id, "doc1_chunk_0");
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_exactly_max_is_single_chunk() {
        let text = "a".repeat(1000);
        let chunks = split_text(&text, &cfg(1000, 200));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_chunks_respect_max_size() {
        let text = (0..40)
            .map(|i| format!("Paragraph number {i} with a little bit of body text."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_text(&text, &cfg(200, 40));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.len() <= 200, "chunk of {} chars exceeds max", c.len());
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "First paragraph about apples.\n\nSecond paragraph about oranges.\n\nThird paragraph about pears.";
        let chunks = split_text(&text, &cfg(40, 10));
        assert!(chunks.iter().any(|c| c.contains("apples")));
        // No chunk should start mid-word.
        for c in &chunks {
            assert!(!c.starts_with(' '));
        }
    }

    #[test]
    fn test_adjacent_chunks_share_overlap() {
        let text = (0..30)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = split_text(&text, &cfg(60, 20));
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev_words = words(&pair[0]);
            let next_words = words(&pair[1]);
            // The next chunk begins with a run of words repeated from the
            // previous chunk's tail.
            let shared = (1..=prev_words.len().min(next_words.len()))
                .rev()
                .find(|&k| prev_words[prev_words.len() - k..] == next_words[..k]);
            assert!(
                shared.is_some(),
                "no overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_reconstruction_modulo_separators() {
        let text = "Rust is a systems language.\n\nIt is used for CLIs, services, and parsers.\nMemory safety without garbage collection.\n\nCargo is the build tool. Crates are packages.";
        let chunks = split_text(&text, &cfg(60, 20));
        assert_eq!(reconstruct_words(&chunks), words(text));
    }

    #[test]
    fn test_reconstruction_of_long_word_stream() {
        let text = (0..80)
            .map(|i| format!("token{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = split_text(&text, &cfg(100, 30));
        assert_eq!(reconstruct_words(&chunks), words(&text));
    }

    #[test]
    fn test_hard_cut_for_unbroken_text() {
        let text = "x".repeat(2500);
        let chunks = split_text(&text, &cfg(1000, 200));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.len() <= 1000);
        }
        let distinct: usize = chunks.iter().map(|c| c.len() - 200.min(c.len())).sum();
        assert!(distinct + 200 >= 2500, "hard cut lost characters");
    }

    #[test]
    fn test_multibyte_utf8_hard_cut() {
        let text = "é".repeat(900); // 1800 bytes, no separators
        let chunks = split_text(&text, &cfg(100, 20));
        assert!(!chunks.is_empty());
        for c in &chunks {
            // Must not split inside a code point.
            assert!(c.chars().all(|ch| ch == 'é'));
        }
    }

    #[test]
    fn test_indices_contiguous_and_metadata_copied() {
        let text = (0..50)
            .map(|i| format!("Line {i} of the incident log."))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_document(&doc(&text), &cfg(120, 30));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.chunk_id, format!("doc1_chunk_{i}"));
            assert_eq!(c.meta.source_type(), SourceType::Wiki);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha section.\n\nBeta section.\n\nGamma section.\n\nDelta section.";
        let a = split_text(text, &cfg(30, 10));
        let b = split_text(text, &cfg(30, 10));
        assert_eq!(a, b);
    }
}
