//! Fixed-window document chunking

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};

/// Half-open character range `[start, end)` of a chunk within its document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Document chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub sequence_index: usize,
    pub text: String,
    pub char_span: CharSpan,
}

/// Stable chunk identifier for position `seq` of `document_id`
pub fn chunk_id(document_id: &str, seq: usize) -> String {
    format!("{}#{}", document_id, seq)
}

/// Sliding-window chunker over Unicode scalar values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails with `InvalidConfig` unless `0 <= overlap < size`
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(RagError::InvalidConfig("chunk size must be > 0".into()));
        }
        if overlap >= size {
            return Err(RagError::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Split `text` into windows of `size` chars advancing by `size - overlap`.
    ///
    /// The last window may be shorter. Windowing stops at the first window that
    /// reaches the end of the text, so no chunk is wholly contained in the
    /// previous one.
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        // byte offset of every char start, plus the end of the string
        let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let char_count = offsets.len();
        offsets.push(text.len());

        let mut chunks = Vec::with_capacity(char_count / self.step() + 1);
        let mut start = 0;
        loop {
            let end = (start + self.size).min(char_count);
            let seq = chunks.len();
            chunks.push(Chunk {
                id: chunk_id(document_id, seq),
                document_id: document_id.to_string(),
                sequence_index: seq,
                text: text[offsets[start]..offsets[end]].to_string(),
                char_span: CharSpan { start, end },
            });

            if end >= char_count {
                break;
            }
            start += self.step();
        }

        chunks
    }
}

/// Convenience wrapper: validate the window and chunk in one call
pub fn chunk_text(document_id: &str, text: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(Chunker::new(size, overlap)?.chunk(document_id, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_chunk_small_content() {
        let content = "Small content.";
        let chunks = chunk_text("doc", content, 100, 20).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, content);
        assert_eq!(chunks[0].id, "doc#0");
        assert_eq!(chunks[0].char_span, CharSpan { start: 0, end: 14 });
    }

    #[test]
    fn test_sliding_window() {
        let chunks = chunk_text("d", "abcdefghij", 4, 1).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "defg", "ghij"]);

        let chunks = chunk_text("d", "abcdefghijk", 4, 1).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "defg", "ghij", "jk"]);
        assert_eq!(chunks[3].char_span, CharSpan { start: 9, end: 11 });
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("d", "", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_overlap() {
        assert!(matches!(
            Chunker::new(10, 10),
            Err(RagError::InvalidConfig(_))
        ));
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn test_chunk_handles_unicode() {
        let content = "Hello 世界! This is a test with emoji 🎉 and special chars ─ here.";
        let chunks = chunk_text("u", content, 20, 5).unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 20);
            let expected: String = content
                .chars()
                .skip(chunk.char_span.start)
                .take(chunk.char_span.len())
                .collect();
            assert_eq!(chunk.text, expected);
        }
    }

    proptest! {
        #[test]
        fn prop_chunking_is_deterministic(text in "\\PC{0,400}", size in 1usize..64, overlap_seed in 0usize..64) {
            let overlap = overlap_seed % size;
            let a = chunk_text("doc", &text, size, overlap).unwrap();
            let b = chunk_text("doc", &text, size, overlap).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_chunks_cover_text(text in "\\PC{1,400}", size in 1usize..64, overlap_seed in 0usize..64) {
            let overlap = overlap_seed % size;
            let chunks = chunk_text("doc", &text, size, overlap).unwrap();
            let char_count = text.chars().count();

            prop_assert_eq!(chunks[0].char_span.start, 0);
            prop_assert_eq!(chunks.last().unwrap().char_span.end, char_count);
            for (i, c) in chunks.iter().enumerate() {
                prop_assert_eq!(c.sequence_index, i);
                prop_assert!(c.char_span.len() <= size);
                prop_assert!(!c.char_span.is_empty());
                if i > 0 {
                    prop_assert_eq!(c.char_span.start, chunks[i - 1].char_span.start + size - overlap);
                }
            }
        }
    }
}
