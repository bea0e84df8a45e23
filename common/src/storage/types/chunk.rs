use serde::{Deserialize, Serialize};

use super::document::Document;

/// One overlapping word window of a document, the unit of indexing and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub doc_id: String,
    pub title: String,
    pub url: String,
    pub category: String,
    pub last_updated: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub chunk_start_word: usize,
    pub chunk_end_word: usize,
}

impl Chunk {
    /// Builds a chunk carrying the document's metadata. `total_chunks` is filled
    /// in by the chunker once the window count is known.
    pub fn from_document(
        document: &Document,
        text: String,
        chunk_index: usize,
        chunk_start_word: usize,
        chunk_end_word: usize,
    ) -> Self {
        Self {
            text,
            doc_id: document.id.clone(),
            title: document.title.clone(),
            url: document.url.clone(),
            category: document.category.clone(),
            last_updated: document.last_updated.clone(),
            chunk_index,
            total_chunks: 0,
            chunk_start_word,
            chunk_end_word,
        }
    }

    /// Stable identity used to merge semantic and keyword hits.
    pub fn chunk_id(&self) -> String {
        format!("{}_chunk_{}", self.doc_id, self.chunk_index)
    }
}
