//! Text chunking
//!
//! Splits document text into overlapping, semantically bounded chunks.
//! Used by the index builder and by low-confidence escalation, which
//! re-chunks a single document at coarser sizes.

use crate::errors::{AppError, Result};
use crate::text;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Chunk size with a 10% overlap
    pub fn with_overlap_ratio(chunk_size: usize) -> Self {
        Self::new(chunk_size, chunk_size / 10)
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::new(300, 100)
    }
}

/// A text chunk with its character range in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    /// Index of this chunk in the document
    pub index: usize,
    pub start_char: usize,
    pub end_char: usize,
}

/// Split text into chunks.
///
/// Chunks are whitespace-trimmed and `start_char`/`end_char` address the
/// trimmed content, so `char_slice(text, start_char, end_char) == content`.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>> {
    let chunk_config = ChunkConfig::new(config.chunk_size.max(1))
        .with_overlap(config.chunk_overlap)
        .map_err(|e| AppError::Configuration {
            message: format!(
                "invalid chunking (size {}, overlap {}): {}",
                config.chunk_size, config.chunk_overlap, e
            ),
        })?;
    let splitter = TextSplitter::new(chunk_config);

    // chunk_indices yields byte offsets in ascending order; convert them
    // incrementally instead of rescanning from the start each time
    let mut last_byte = 0;
    let mut last_char = 0;
    let mut chunks = Vec::new();

    for (index, (byte_offset, content)) in splitter.chunk_indices(text).enumerate() {
        if byte_offset >= last_byte {
            last_char += text::char_len(&text[last_byte..byte_offset]);
        } else {
            last_char -= text::char_len(&text[byte_offset..last_byte]);
        }
        last_byte = byte_offset;

        chunks.push(TextChunk {
            content: content.to_string(),
            index,
            start_char: last_char,
            end_char: last_char + text::char_len(content),
        });
    }

    debug!(
        input_chars = text::char_len(text),
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        "Text chunked"
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "コンバインは、一台で穀物の収穫・脱穀・選別をする自走機能を有した農業機械です。日本で使われているコンバインは普通型と自立型の2種類に大別されます。普通型は主にアメリカやヨーロッパ等大規模農業で使われていて、稲・麦・大豆の他にも小豆・菜種・トウモロコシなどの幅広い作物に対応した汎用性の農業機械です。";

    #[test]
    fn test_chunks_map_back_to_source() {
        let chunks = chunk_text(DOC, &ChunkingConfig::new(50, 10)).unwrap();
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(text::char_len(&chunk.content) <= 50);
            assert_eq!(text::char_slice(DOC, chunk.start_char, chunk.end_char), chunk.content);
        }
    }

    #[test]
    fn test_small_text_is_single_chunk() {
        let chunks = chunk_text("稲を収穫する。", &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, 7);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", &ChunkingConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn test_overlap_larger_than_size_is_rejected() {
        let err = chunk_text(DOC, &ChunkingConfig::new(10, 20)).unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[test]
    fn test_overlap_ratio() {
        assert_eq!(ChunkingConfig::with_overlap_ratio(1000), ChunkingConfig::new(1000, 100));
    }
}
