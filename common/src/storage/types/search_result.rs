use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chunk::Chunk;

/// Wire representation of one ranked chunk, shared by the daemon, the
/// one-shot CLI and the interop client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub chunk_id: String,
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default = "default_total_chunks")]
    pub total_chunks: usize,
    pub score: f32,
    #[serde(default)]
    pub semantic_score: f32,
    #[serde(default)]
    pub keyword_score: f32,
}

const fn default_total_chunks() -> usize {
    1
}

impl SearchResult {
    pub fn from_chunk(chunk: &Chunk, score: f32, semantic_score: f32, keyword_score: f32) -> Self {
        Self {
            id: chunk.doc_id.clone(),
            chunk_id: chunk.chunk_id(),
            title: chunk.title.clone(),
            url: chunk.url.clone(),
            content: chunk.text.clone(),
            category: chunk.category.clone(),
            last_updated: chunk.last_updated.clone(),
            chunk_index: chunk.chunk_index,
            total_chunks: chunk.total_chunks,
            score,
            semantic_score,
            keyword_score,
        }
    }
}

/// Summary of a loaded index snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub unique_documents: usize,
    pub embedding_dimension: usize,
    /// When the loaded metadata file was last written, by a build or a sync.
    /// `None` for snapshots built in memory.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}
