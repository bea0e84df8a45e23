use std::{path::Path, sync::Arc, time::Instant};

use common::{
    error::AppError,
    storage::{snapshot::IndexSnapshot, types::Chunk},
    utils::embedding::EmbeddingProvider,
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{chunker::chunk_document, source::DocumentSource, ChunkerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
}

/// Offline job turning documents into an index snapshot on disk.
pub struct IndexBuilder {
    provider: Arc<EmbeddingProvider>,
    chunker: ChunkerConfig,
}

impl IndexBuilder {
    pub fn new(provider: Arc<EmbeddingProvider>, chunker: ChunkerConfig) -> Self {
        Self { provider, chunker }
    }

    /// Chunks and embeds every non-empty document, then replaces the snapshot
    /// in `out_dir`. Any provider failure aborts the run before anything is
    /// written.
    #[instrument(skip_all, fields(out_dir = %out_dir.display()))]
    pub async fn build(
        &self,
        source: &dyn DocumentSource,
        out_dir: &Path,
    ) -> Result<BuildReport, AppError> {
        let started = Instant::now();
        let documents = source.documents().await?;

        let mut indexed_documents = 0usize;
        let mut chunks: Vec<Chunk> = Vec::new();
        for document in &documents {
            let document_chunks = chunk_document(document, &self.chunker);
            if document_chunks.is_empty() {
                info!(doc_id = %document.id, "Skipping document without content");
                continue;
            }
            indexed_documents += 1;
            chunks.extend(document_chunks);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.provider.embed_batch(&texts).await?;
        let embed_ms = started.elapsed().as_millis();

        let snapshot = IndexSnapshot::new(vectors, chunks)?;
        let out = out_dir.to_path_buf();
        let chunk_count = snapshot.len();
        tokio::task::spawn_blocking(move || snapshot.write_to(&out)).await??;

        info!(
            documents = indexed_documents,
            chunks = chunk_count,
            embed_ms,
            total_ms = started.elapsed().as_millis(),
            "Index build finished"
        );

        Ok(BuildReport {
            documents: indexed_documents,
            chunks: chunk_count,
        })
    }
}
