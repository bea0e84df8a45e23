use std::{
    collections::HashSet,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::{
    error::AppError,
    storage::types::{Chunk, IndexStats},
};

pub const EMBEDDINGS_FILE: &str = "embeddings.bin";
pub const METADATA_FILE: &str = "metadata.json";

const MAGIC: &[u8; 4] = b"SVIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 8;

/// Immutable embedding matrix plus parallel chunk metadata.
///
/// Rows are stored flat and L2-normalized so that a dot product against a
/// normalized query is the cosine similarity.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    embeddings: Vec<f32>,
    dimension: usize,
    metadata: Vec<Chunk>,
    modified_at: Option<DateTime<Utc>>,
}

impl IndexSnapshot {
    /// Builds a snapshot from raw vectors, normalizing each row.
    pub fn new(vectors: Vec<Vec<f32>>, metadata: Vec<Chunk>) -> Result<Self, AppError> {
        if vectors.len() != metadata.len() {
            return Err(AppError::Validation(format!(
                "snapshot has {} vectors but {} metadata records",
                vectors.len(),
                metadata.len()
            )));
        }

        let dimension = vectors.first().map_or(0, Vec::len);
        let mut embeddings = Vec::with_capacity(vectors.len() * dimension);
        for (idx, mut vector) in vectors.into_iter().enumerate() {
            if vector.len() != dimension {
                return Err(AppError::Validation(format!(
                    "vector {idx} has dimension {} (expected {dimension})",
                    vector.len()
                )));
            }
            l2_normalize(&mut vector);
            embeddings.extend_from_slice(&vector);
        }

        Ok(Self {
            embeddings,
            dimension,
            metadata,
            modified_at: None,
        })
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metadata(&self) -> &[Chunk] {
        &self.metadata
    }

    /// Iterates `(row, chunk)` pairs in index order.
    pub fn rows(&self) -> impl Iterator<Item = (&[f32], &Chunk)> {
        self.embeddings
            .chunks_exact(self.dimension.max(1))
            .zip(self.metadata.iter())
    }

    /// Distinct document titles in first-seen order.
    pub fn titles(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.metadata
            .iter()
            .filter(|chunk| seen.insert(chunk.doc_id.as_str()))
            .map(|chunk| chunk.title.as_str())
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        let unique_documents = self
            .metadata
            .iter()
            .map(|chunk| chunk.doc_id.as_str())
            .filter(|id| !id.is_empty())
            .collect::<HashSet<_>>()
            .len();

        IndexStats {
            total_chunks: self.len(),
            unique_documents,
            embedding_dimension: self.dimension,
            last_sync: self.modified_at,
        }
    }

    /// Loads the snapshot in `dir`. Missing or unreadable files yield `None` so
    /// callers can keep serving without an index.
    pub fn load(dir: &Path) -> Option<Self> {
        match Self::try_load(dir) {
            Ok(snapshot) => {
                info!(
                    dir = %dir.display(),
                    chunks = snapshot.len(),
                    dimension = snapshot.dimension,
                    "Loaded index snapshot"
                );
                Some(snapshot)
            }
            Err(AppError::NotFound(reason)) => {
                warn!(dir = %dir.display(), %reason, "Index snapshot not found");
                None
            }
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "Index snapshot unreadable, treating as missing");
                None
            }
        }
    }

    pub fn try_load(dir: &Path) -> Result<Self, AppError> {
        let embeddings_path = dir.join(EMBEDDINGS_FILE);
        let metadata_path = dir.join(METADATA_FILE);

        let raw = read_or_not_found(&embeddings_path)?;
        let metadata_raw = read_or_not_found(&metadata_path)?;

        let (count, dimension, embeddings) = decode_embeddings(&raw)?;
        let metadata: Vec<Chunk> = serde_json::from_slice(&metadata_raw)
            .map_err(|err| AppError::CorruptIndex(format!("metadata unreadable: {err}")))?;

        if metadata.len() != count {
            return Err(AppError::CorruptIndex(format!(
                "{count} vectors but {} metadata records",
                metadata.len()
            )));
        }

        let modified_at = fs::metadata(&metadata_path)
            .and_then(|meta| meta.modified())
            .map(DateTime::<Utc>::from)
            .ok();

        Ok(Self {
            embeddings,
            dimension,
            metadata,
            modified_at,
        })
    }

    /// Writes both files through temp files in `dir`. Embeddings are persisted
    /// first; a reader that sees a new metadata file always finds matching vectors.
    pub fn write_to(&self, dir: &Path) -> Result<(), AppError> {
        fs::create_dir_all(dir)?;

        let mut buffer = BytesMut::with_capacity(HEADER_LEN + self.embeddings.len() * 4);
        buffer.put_slice(MAGIC);
        buffer.put_u32_le(FORMAT_VERSION);
        buffer.put_u64_le(self.len() as u64);
        buffer.put_u64_le(self.dimension as u64);
        for value in &self.embeddings {
            buffer.put_f32_le(*value);
        }

        write_atomic(dir, EMBEDDINGS_FILE, &buffer)?;
        write_atomic(dir, METADATA_FILE, &serde_json::to_vec(&self.metadata)?)?;

        debug!(
            dir = %dir.display(),
            chunks = self.len(),
            "Wrote index snapshot"
        );
        Ok(())
    }
}

/// Paths of the two snapshot files inside `dir`.
pub fn snapshot_files(dir: &Path) -> [PathBuf; 2] {
    [dir.join(EMBEDDINGS_FILE), dir.join(METADATA_FILE)]
}

pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

pub(crate) fn write_atomic(dir: &Path, file_name: &str, contents: &[u8]) -> Result<(), AppError> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(dir.join(file_name))
        .map_err(|err| AppError::Io(err.error))?;
    Ok(())
}

fn read_or_not_found(path: &Path) -> Result<Vec<u8>, AppError> {
    fs::read(path).map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            AppError::NotFound(format!("{} does not exist", path.display()))
        } else {
            AppError::Io(err)
        }
    })
}

fn decode_embeddings(raw: &[u8]) -> Result<(usize, usize, Vec<f32>), AppError> {
    let mut buf = raw;
    if buf.remaining() < HEADER_LEN {
        return Err(AppError::CorruptIndex("embeddings header truncated".into()));
    }

    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if &magic != MAGIC {
        return Err(AppError::CorruptIndex("bad embeddings magic".into()));
    }

    let version = buf.get_u32_le();
    if version != FORMAT_VERSION {
        return Err(AppError::CorruptIndex(format!(
            "unsupported embeddings format version {version}"
        )));
    }

    let count = usize::try_from(buf.get_u64_le())
        .map_err(|_| AppError::CorruptIndex("row count overflow".into()))?;
    let dimension = usize::try_from(buf.get_u64_le())
        .map_err(|_| AppError::CorruptIndex("dimension overflow".into()))?;

    let expected = count
        .checked_mul(dimension)
        .and_then(|values| values.checked_mul(4))
        .ok_or_else(|| AppError::CorruptIndex("embedding matrix size overflow".into()))?;
    if buf.remaining() != expected {
        return Err(AppError::CorruptIndex(format!(
            "expected {expected} bytes of embeddings, found {}",
            buf.remaining()
        )));
    }

    let mut embeddings = Vec::with_capacity(count * dimension);
    while buf.has_remaining() {
        embeddings.push(buf.get_f32_le());
    }

    Ok((count, dimension, embeddings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::Document;

    fn chunk(doc: &Document, index: usize) -> Chunk {
        let mut chunk = Chunk::from_document(doc, format!("text {index}"), index, index, index + 1);
        chunk.total_chunks = 2;
        chunk
    }

    fn sample_snapshot() -> IndexSnapshot {
        let doc = Document::new("doc-1", "Line Weight Guidelines", "https://x/lw", "a b");
        IndexSnapshot::new(
            vec![vec![3.0, 4.0, 0.0], vec![0.0, 0.0, 2.0]],
            vec![chunk(&doc, 0), chunk(&doc, 1)],
        )
        .expect("valid snapshot")
    }

    #[test]
    fn rows_are_unit_length() {
        let snapshot = sample_snapshot();
        for (row, _) in snapshot.rows() {
            let norm: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
        let first: Vec<f32> = snapshot.rows().next().expect("row").0.to_vec();
        assert!((first[0] - 0.6).abs() < 1e-6);
        assert!((first[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn write_then_load_preserves_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshot = sample_snapshot();
        snapshot.write_to(dir.path()).expect("write snapshot");

        let loaded = IndexSnapshot::load(dir.path()).expect("snapshot should load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dimension(), 3);
        assert_eq!(loaded.metadata(), snapshot.metadata());
        let stats = loaded.stats();
        assert_eq!(
            (stats.total_chunks, stats.unique_documents, stats.embedding_dimension),
            (2, 1, 3)
        );
        assert_eq!(snapshot.stats().last_sync, None);

        let written = fs::metadata(dir.path().join(METADATA_FILE))
            .and_then(|meta| meta.modified())
            .expect("metadata mtime");
        assert_eq!(stats.last_sync, Some(DateTime::<Utc>::from(written)));
        assert_eq!(loaded.titles(), vec!["Line Weight Guidelines"]);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(IndexSnapshot::load(&dir.path().join("nope")).is_none());
        assert!(matches!(
            IndexSnapshot::try_load(&dir.path().join("nope")),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn truncated_embeddings_are_treated_as_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        sample_snapshot().write_to(dir.path()).expect("write snapshot");

        let path = dir.path().join(EMBEDDINGS_FILE);
        let mut raw = fs::read(&path).expect("read embeddings");
        raw.truncate(raw.len() - 4);
        fs::write(&path, raw).expect("rewrite embeddings");

        assert!(matches!(
            IndexSnapshot::try_load(dir.path()),
            Err(AppError::CorruptIndex(_))
        ));
        assert!(IndexSnapshot::load(dir.path()).is_none());
    }

    #[test]
    fn metadata_count_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        sample_snapshot().write_to(dir.path()).expect("write snapshot");
        fs::write(dir.path().join(METADATA_FILE), "[]").expect("overwrite metadata");

        assert!(matches!(
            IndexSnapshot::try_load(dir.path()),
            Err(AppError::CorruptIndex(_))
        ));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let result = IndexSnapshot::new(vec![vec![1.0]], Vec::new());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
