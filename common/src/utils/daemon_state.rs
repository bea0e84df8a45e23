//! The state file through which independent processes find a live daemon.
//!
//! Written once the daemon has bound its port, removed on graceful shutdown.
//! A crashed daemon leaves the file behind, so readers must check that the
//! recorded PID is still alive before trusting the port.

use std::{
    fs, io,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{error::AppError, storage::snapshot::write_atomic};

/// Line the daemon prints on stdout once it is ready to accept requests.
pub const READY_PREFIX: &str = "DAEMON_READY port=";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DaemonState {
    pub pid: u32,
    pub port: u16,
    /// Seconds since the Unix epoch.
    pub started: f64,
}

impl DaemonState {
    pub fn new(pid: u32, port: u16) -> Self {
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |elapsed| elapsed.as_secs_f64());
        Self { pid, port, started }
    }

    pub fn for_current_process(port: u16) -> Self {
        Self::new(std::process::id(), port)
    }

    pub fn write(&self, path: &Path) -> Result<(), AppError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AppError::Configuration(format!("invalid state file path {}", path.display()))
            })?;
        write_atomic(dir, file_name, &serde_json::to_vec(self)?)?;
        debug!(path = %path.display(), pid = self.pid, port = self.port, "Wrote daemon state");
        Ok(())
    }

    /// Returns `None` when the file is absent or unreadable.
    pub fn read(path: &Path) -> Option<Self> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Could not read daemon state");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Daemon state file is corrupt");
                None
            }
        }
    }

    pub fn clear(path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed daemon state"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "Could not remove daemon state"),
        }
    }

    /// Removes the state file only while it still names `pid`, so a daemon
    /// that shuts down late never deletes a successor's state.
    pub fn clear_if_owned(path: &Path, pid: u32) {
        match Self::read(path) {
            Some(state) if state.pid == pid => Self::clear(path),
            Some(state) => {
                debug!(owner = state.pid, pid, "State file belongs to another daemon, leaving it");
            }
            None => {}
        }
    }

    /// Parses the port out of a ready line printed by the daemon.
    pub fn parse_ready_line(line: &str) -> Option<u16> {
        line.trim().strip_prefix(READY_PREFIX)?.trim().parse().ok()
    }
}

/// Whether a process with `pid` currently exists.
#[cfg(unix)]
pub fn is_pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // Signal 0 performs the existence and permission checks only.
    // SAFETY: kill with signal 0 never delivers a signal.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Without a cheap liveness probe the `/ping` check is authoritative.
#[cfg(not(unix))]
pub fn is_pid_alive(pid: u32) -> bool {
    pid != 0
}
