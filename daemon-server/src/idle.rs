use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use common::utils::daemon_state::DaemonState;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Tracks the last request so the daemon can exit once nobody uses it.
#[derive(Debug)]
pub struct IdleTimer {
    timeout: Duration,
    last_activity: Mutex<Instant>,
}

impl IdleTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn touch(&self) {
        let now = Instant::now();
        match self.last_activity.lock() {
            Ok(mut last) => *last = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    /// Time left before the daemon counts as idle; zero once expired.
    pub fn remaining(&self) -> Duration {
        let last = match self.last_activity.lock() {
            Ok(last) => *last,
            Err(poisoned) => *poisoned.into_inner(),
        };
        self.timeout.saturating_sub(last.elapsed())
    }
}

/// Waits until the timer expires without activity, then removes the state
/// file and cancels `shutdown`. Returns early if `shutdown` fires first.
pub async fn watch(timer: Arc<IdleTimer>, state_file: PathBuf, shutdown: CancellationToken) {
    loop {
        let remaining = timer.remaining();
        if remaining.is_zero() {
            info!(
                idle_timeout_secs = timer.timeout().as_secs(),
                "Idle timeout reached, shutting down"
            );
            DaemonState::clear_if_owned(&state_file, std::process::id());
            shutdown.cancel();
            return;
        }

        tokio::select! {
            () = tokio::time::sleep(remaining) => {}
            () = shutdown.cancelled() => return,
        }
    }
}
