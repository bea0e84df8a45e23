use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::{error::AppError, storage::snapshot::write_atomic};

/// Cache key to embedding vector.
type Entries = HashMap<String, Vec<f32>>;

/// Content-addressed embedding memo persisted as one JSON map.
///
/// The file is read at most once, on first access, and rewritten whole on
/// every flush. Concurrent writers from different processes are not
/// coordinated.
#[derive(Debug)]
pub struct EmbeddingCache {
    path: PathBuf,
    entries: Mutex<Option<Entries>>,
}

/// Key under which an embedding is stored. Changing the model or the
/// dimensions yields a different key, so stale entries are never reused.
pub fn cache_key(model: &str, dimensions: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b"\n");
    hasher.update(dimensions.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl EmbeddingCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Locks the map, reading the file on the blocking pool on first use.
    async fn loaded(&self) -> MutexGuard<'_, Option<Entries>> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            let path = self.path.clone();
            let entries = tokio::task::spawn_blocking(move || load_entries(&path))
                .await
                .unwrap_or_else(|err| {
                    warn!(error = %err, "Embedding cache load task failed, starting empty");
                    Entries::new()
                });
            *guard = Some(entries);
        }
        guard
    }

    /// Looks up every key, returning hits in input order.
    pub async fn get_many(&self, keys: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut guard = self.loaded().await;
        let entries = guard.get_or_insert_with(Entries::new);
        keys.iter().map(|key| entries.get(key).cloned()).collect()
    }

    /// Adds entries and persists the whole map when anything new was added.
    pub async fn insert_and_flush(
        &self,
        new_entries: Vec<(String, Vec<f32>)>,
    ) -> Result<usize, AppError> {
        if new_entries.is_empty() {
            return Ok(0);
        }

        let (bytes, total) = {
            let mut guard = self.loaded().await;
            let entries = guard.get_or_insert_with(Entries::new);
            let mut added = 0usize;
            for (key, vector) in new_entries {
                if let std::collections::hash_map::Entry::Vacant(slot) = entries.entry(key) {
                    slot.insert(vector);
                    added += 1;
                }
            }
            if added == 0 {
                return Ok(0);
            }
            (serde_json::to_vec(&*entries)?, entries.len())
        };

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || persist(&path, &bytes)).await??;
        debug!(path = %self.path.display(), total, "Flushed embedding cache");
        Ok(total)
    }

    pub async fn len(&self) -> usize {
        let mut guard = self.loaded().await;
        guard.get_or_insert_with(Entries::new).len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn load_entries(path: &Path) -> Entries {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return HashMap::new(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Embedding cache unreadable, starting empty");
            return HashMap::new();
        }
    };

    match serde_json::from_slice::<HashMap<String, Vec<f32>>>(&raw) {
        Ok(entries) => {
            info!(path = %path.display(), entries = entries.len(), "Loaded embedding cache");
            entries
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Embedding cache corrupt, starting empty");
            HashMap::new()
        }
    }
}

fn persist(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            AppError::Configuration(format!("invalid embedding cache path {}", path.display()))
        })?;
    write_atomic(dir, name, bytes)
}
