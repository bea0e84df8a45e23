use std::path::PathBuf;

use async_trait::async_trait;
use common::{error::AppError, storage::types::Document};
use tracing::info;

/// Anything that can hand the indexer a batch of documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn documents(&self) -> Result<Vec<Document>, AppError>;
}

/// A JSON file holding an array of documents.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DocumentSource for JsonFileSource {
    async fn documents(&self) -> Result<Vec<Document>, AppError> {
        let raw = tokio::fs::read(&self.path).await.map_err(|err| {
            AppError::NotFound(format!(
                "document source {} unreadable: {err}",
                self.path.display()
            ))
        })?;
        let documents: Vec<Document> = serde_json::from_slice(&raw)?;
        info!(path = %self.path.display(), count = documents.len(), "Loaded documents");
        Ok(documents)
    }
}

#[async_trait]
impl DocumentSource for Vec<Document> {
    async fn documents(&self) -> Result<Vec<Document>, AppError> {
        Ok(self.clone())
    }
}
