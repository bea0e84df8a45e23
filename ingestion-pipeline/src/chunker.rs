use common::{
    storage::types::{Chunk, Document},
    utils::config::AppConfig,
};

/// Approximate number of words per model token.
pub const WORDS_PER_TOKEN: f32 = 0.75;

/// Window sizes expressed in tokens, converted to words when chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

impl From<&AppConfig> for ChunkerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

impl ChunkerConfig {
    pub fn words_per_chunk(&self) -> usize {
        tokens_to_words(self.chunk_size).max(1)
    }

    pub fn words_overlap(&self) -> usize {
        tokens_to_words(self.chunk_overlap)
    }

    pub fn stride(&self) -> usize {
        self.words_per_chunk()
            .saturating_sub(self.words_overlap())
            .max(1)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn tokens_to_words(tokens: usize) -> usize {
    (tokens as f32 * WORDS_PER_TOKEN).floor() as usize
}

/// Word windows `[start, end)` covering `word_count` words.
pub fn windows(word_count: usize, config: &ChunkerConfig) -> Vec<(usize, usize)> {
    let size = config.words_per_chunk();
    let stride = config.stride();
    let mut spans = Vec::new();
    let mut start = 0;
    while start < word_count {
        let end = (start + size).min(word_count);
        spans.push((start, end));
        if end == word_count {
            break;
        }
        start += stride;
    }
    spans
}

/// Splits a document into overlapping word windows. Whitespace is normalized
/// to single spaces in the chunk text.
pub fn chunk_document(document: &Document, config: &ChunkerConfig) -> Vec<Chunk> {
    let words: Vec<&str> = document.content.split_whitespace().collect();
    let spans = windows(words.len(), config);
    let total = spans.len();

    spans
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| {
            let text = words.get(start..end).unwrap_or_default().join(" ");
            let mut chunk = Chunk::from_document(document, text, index, start, end);
            chunk.total_chunks = total;
            chunk
        })
        .collect()
}
