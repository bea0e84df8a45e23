use std::{path::PathBuf, process::Stdio, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{error::AppError, storage::types::SearchResult};
use tokio::process::Command;
use tracing::{debug, info};

use crate::SearchResponse;

/// Runs one search in a fresh `search-once` process. Slow, since the whole
/// index is loaded per call.
pub struct OneShotSearch {
    binary: PathBuf,
    config_path: Option<PathBuf>,
    timeout: Duration,
}

impl OneShotSearch {
    pub fn new(binary: PathBuf, timeout: Duration) -> Self {
        Self {
            binary,
            config_path: None,
            timeout,
        }
    }

    /// Passes `--config <path>` to every one-shot run.
    pub fn with_config_path(mut self, config_path: Option<PathBuf>) -> Self {
        self.config_path = config_path;
        self
    }

    pub async fn search(
        &self,
        query: &str,
        n_results: usize,
        deduplicate: bool,
    ) -> Result<Vec<SearchResult>, AppError> {
        let output = tempfile::Builder::new()
            .prefix("search-once-")
            .suffix(".json")
            .tempfile()?;
        let output_path = output.path().to_path_buf();

        let mut command = Command::new(&self.binary);
        command
            .arg("--base64")
            .arg(STANDARD.encode(query.as_bytes()))
            .arg("--output")
            .arg(&output_path)
            .arg("--n-results")
            .arg(n_results.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if !deduplicate {
            command.arg("--no-dedupe");
        }
        if let Some(config_path) = &self.config_path {
            command.arg("--config").arg(config_path);
        }

        info!(binary = %self.binary.display(), "Running one-shot search");
        let child = command.spawn().map_err(|err| {
            AppError::Discovery(format!("could not start {}: {err}", self.binary.display()))
        })?;
        let finished = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::Discovery(format!(
                    "one-shot search timed out after {}s",
                    self.timeout.as_secs()
                ))
            })??;
        debug!(status = %finished.status, "One-shot search exited");

        let written = tokio::fs::read(&output_path).await?;
        let raw = if written.is_empty() {
            // Without an output file the result is the last stdout line.
            last_line(&finished.stdout)
        } else {
            written
        };
        let response: SearchResponse = serde_json::from_slice(&raw)?;
        response.into_results()
    }
}

fn last_line(stdout: &[u8]) -> Vec<u8> {
    stdout
        .split(|byte| *byte == b'\n')
        .rev()
        .find(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}
