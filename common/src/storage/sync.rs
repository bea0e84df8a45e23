use std::{
    fs::{self, File},
    io,
    path::Path,
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};

use crate::{
    error::AppError,
    storage::snapshot::{EMBEDDINGS_FILE, METADATA_FILE},
    utils::status::StatusCell,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Checking,
    Copying,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl SyncStatus {
    pub fn new(phase: SyncPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            updated_at: Utc::now(),
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::new(SyncPhase::Idle, "")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    UpToDate,
    Refreshed,
    SourceMissing,
}

/// Refreshes the local index copy from the network source of truth when the
/// source files are newer (or the local copy is missing).
#[instrument(skip_all, fields(source = %source.display(), local = %local.display()))]
pub fn sync_index(
    source: &Path,
    local: &Path,
    status: &StatusCell<SyncStatus>,
) -> Result<SyncOutcome, AppError> {
    status.publish(SyncStatus::new(
        SyncPhase::Checking,
        "Checking for index updates",
    ));

    let result = sync_inner(source, local, status);
    match &result {
        Ok(SyncOutcome::Refreshed) => {
            status.publish(SyncStatus::new(SyncPhase::Done, "Index updated"));
        }
        Ok(SyncOutcome::UpToDate) => {
            status.publish(SyncStatus::new(SyncPhase::Done, "Index is up to date"));
        }
        Ok(SyncOutcome::SourceMissing) => {
            status.publish(SyncStatus::new(
                SyncPhase::Done,
                "Index source unavailable, using local copy",
            ));
        }
        Err(err) => {
            warn!(error = %err, "Index sync failed");
            status.publish(SyncStatus::new(
                SyncPhase::Failed,
                format!("Index sync failed: {err}"),
            ));
        }
    }
    result
}

fn sync_inner(
    source: &Path,
    local: &Path,
    status: &StatusCell<SyncStatus>,
) -> Result<SyncOutcome, AppError> {
    let files = [EMBEDDINGS_FILE, METADATA_FILE];

    let mut source_times = Vec::with_capacity(files.len());
    for name in files {
        match modified(&source.join(name))? {
            Some(time) => source_times.push(time),
            None => {
                info!(file = name, "Index source file missing, skipping sync");
                return Ok(SyncOutcome::SourceMissing);
            }
        }
    }

    let mut needs_refresh = false;
    for (name, source_time) in files.iter().zip(&source_times) {
        match modified(&local.join(name))? {
            Some(local_time) if local_time >= *source_time => {}
            _ => needs_refresh = true,
        }
    }

    if !needs_refresh {
        return Ok(SyncOutcome::UpToDate);
    }

    fs::create_dir_all(local)?;
    // Metadata goes last; a reader pairing new metadata with old vectors would
    // see a count mismatch and treat the index as missing.
    for (step, name) in files.iter().enumerate() {
        status.publish(SyncStatus::new(
            SyncPhase::Copying,
            format!("Copying {name} ({}/{})", step + 1, files.len()),
        ));
        copy_atomic(&source.join(name), local, name)?;
    }

    info!("Local index refreshed from source");
    Ok(SyncOutcome::Refreshed)
}

fn modified(path: &Path) -> Result<Option<SystemTime>, AppError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.modified()?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(AppError::Io(err)),
    }
}

fn copy_atomic(from: &Path, dir: &Path, name: &str) -> Result<(), AppError> {
    let mut reader = File::open(from)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    io::copy(&mut reader, temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(dir.join(name))
        .map_err(|err| AppError::Io(err.error))?;
    Ok(())
}
