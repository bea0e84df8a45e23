//! Finding a live daemon, or starting one.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use common::{
    error::AppError,
    utils::{
        config::AppConfig,
        daemon_state::{is_pid_alive, DaemonState},
    },
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tracing::{debug, info, warn};

const PING_TIMEOUT: Duration = Duration::from_secs(2);

pub struct DaemonLauncher {
    state_file: PathBuf,
    binary: PathBuf,
    config_path: Option<PathBuf>,
    startup_timeout: Duration,
    http: reqwest::Client,
}

impl DaemonLauncher {
    pub fn new(
        state_file: PathBuf,
        binary: PathBuf,
        startup_timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder().timeout(PING_TIMEOUT).build()?;
        Ok(Self {
            state_file,
            binary,
            config_path: None,
            startup_timeout,
            http,
        })
    }

    /// `config_path` is the file `config` was read from, handed on to the
    /// daemon so both sides agree on the state file and index.
    pub fn from_config(config: &AppConfig, config_path: Option<&Path>) -> Result<Self, AppError> {
        Ok(Self::new(
            config.state_file(),
            resolve_binary(&config.daemon_binary),
            Duration::from_secs(config.daemon_startup_timeout_secs),
        )?
        .with_config_path(config_path.map(Path::to_path_buf)))
    }

    /// Passes `--config <path>` to every spawned daemon.
    pub fn with_config_path(mut self, config_path: Option<PathBuf>) -> Self {
        self.config_path = config_path;
        self
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// The published daemon, if its process is alive and answers `/ping`.
    /// A state file failing either check is stale and gets removed.
    pub async fn find_live(&self) -> Option<DaemonState> {
        let state = DaemonState::read(&self.state_file)?;

        if !is_pid_alive(state.pid) {
            info!(pid = state.pid, port = state.port, "Removing stale daemon state (process gone)");
            DaemonState::clear(&self.state_file);
            return None;
        }

        if self.ping(state.port).await {
            return Some(state);
        }

        info!(pid = state.pid, port = state.port, "Removing stale daemon state (no ping answer)");
        DaemonState::clear(&self.state_file);
        None
    }

    pub async fn ping(&self, port: u16) -> bool {
        match self
            .http
            .get(format!("http://127.0.0.1:{port}/ping"))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(port, error = %err, "Daemon ping failed");
                false
            }
        }
    }

    /// Reuses a live daemon or starts a new one.
    pub async fn ensure(&self) -> Result<DaemonState, AppError> {
        if let Some(state) = self.find_live().await {
            debug!(pid = state.pid, port = state.port, "Reusing running daemon");
            return Ok(state);
        }
        self.spawn().await
    }

    /// Starts the daemon binary and waits for its ready line. The child is
    /// left running on its own; it exits when idle.
    pub async fn spawn(&self) -> Result<DaemonState, AppError> {
        info!(binary = %self.binary.display(), "Starting search daemon");
        let mut command = Command::new(&self.binary);
        if let Some(config_path) = &self.config_path {
            command.arg("--config").arg(config_path);
        }
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                AppError::Discovery(format!(
                    "could not start {}: {err}",
                    self.binary.display()
                ))
            })?;

        let pid = child
            .id()
            .ok_or_else(|| AppError::Discovery("daemon exited immediately".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Discovery("daemon stdout unavailable".into()))?;

        let wait_for_ready = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(port) = DaemonState::parse_ready_line(&line) {
                    return Ok::<_, AppError>(Some(port));
                }
                debug!(line = %line, "Daemon output before ready line");
            }
            Ok(None)
        };

        let port = match tokio::time::timeout(self.startup_timeout, wait_for_ready).await {
            Ok(Ok(Some(port))) => port,
            Ok(Ok(None)) => {
                return Err(AppError::Discovery(
                    "daemon closed stdout without becoming ready".into(),
                ));
            }
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                warn!(
                    pid,
                    timeout_secs = self.startup_timeout.as_secs(),
                    "Daemon did not become ready in time, stopping it"
                );
                child.start_kill().ok();
                return Err(AppError::Discovery(format!(
                    "daemon not ready after {}s",
                    self.startup_timeout.as_secs()
                )));
            }
        };

        // The daemon publishes its own state; fill in only when it did not.
        let state = match DaemonState::read(&self.state_file) {
            Some(published) if published.port == port => published,
            _ => {
                let state = DaemonState::new(pid, port);
                state.write(&self.state_file)?;
                state
            }
        };

        info!(pid = state.pid, port = state.port, "Search daemon ready");
        Ok(state)
    }
}

/// A bare binary name is looked up next to the current executable first,
/// then left to the `PATH` search.
pub fn resolve_binary(name: &str) -> PathBuf {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.to_path_buf();
    }
    let sibling = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(name)))
        .filter(|path| path.is_file());
    sibling.unwrap_or_else(|| candidate.to_path_buf())
}
