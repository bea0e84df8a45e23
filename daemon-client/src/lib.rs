#![allow(clippy::missing_docs_in_private_items)]

pub mod discovery;
pub mod oneshot;

use std::{path::Path, time::Duration};

use common::{
    error::AppError,
    storage::types::SearchResult,
    utils::{config::AppConfig, daemon_state::DaemonState},
};
use discovery::{resolve_binary, DaemonLauncher};
use oneshot::OneShotSearch;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

pub const MIN_CLIENT_TIMEOUT: Duration = Duration::from_secs(8);
pub const MAX_CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

/// Body returned by `/search` and printed by `search-once`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl SearchResponse {
    pub fn into_results(self) -> Result<Vec<SearchResult>, AppError> {
        if self.success {
            Ok(self.results)
        } else {
            Err(AppError::InternalError(
                self.error.unwrap_or_else(|| "search failed".to_string()),
            ))
        }
    }
}

/// Caller-side entry point. Never fails a search: every problem is logged
/// and turned into an empty result list.
pub struct SearchClient {
    launcher: DaemonLauncher,
    oneshot: OneShotSearch,
    http: reqwest::Client,
}

impl SearchClient {
    pub fn new(
        launcher: DaemonLauncher,
        oneshot: OneShotSearch,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(clamp_timeout(timeout))
            .build()?;
        Ok(Self {
            launcher,
            oneshot,
            http,
        })
    }

    /// `config_path` is forwarded to every daemon or one-shot process this
    /// client starts; `None` leaves them on their default `./config` lookup.
    pub fn from_config(config: &AppConfig, config_path: Option<&Path>) -> Result<Self, AppError> {
        let startup = Duration::from_secs(config.daemon_startup_timeout_secs);
        Self::new(
            DaemonLauncher::from_config(config, config_path)?,
            OneShotSearch::new(resolve_binary(&config.oneshot_binary), startup)
                .with_config_path(config_path.map(Path::to_path_buf)),
            Duration::from_secs(config.client_timeout_secs),
        )
    }

    /// Searches through the daemon, starting one when needed. Only when no
    /// daemon can be started at all does it fall back to a one-shot process.
    pub async fn hybrid_search(
        &self,
        query: &str,
        n_results: usize,
        deduplicate: bool,
    ) -> Vec<SearchResult> {
        let daemon = match self.launcher.ensure().await {
            Ok(daemon) => daemon,
            Err(err) => {
                warn!(error = %err, "Search daemon unavailable, using one-shot search");
                return self
                    .oneshot
                    .search(query, n_results, deduplicate)
                    .await
                    .unwrap_or_else(|err| {
                        warn!(error = %err, "One-shot search failed");
                        Vec::new()
                    });
            }
        };

        match self.query_daemon(daemon, query, n_results, deduplicate).await {
            Ok(results) => results,
            Err(err) => {
                warn!(port = daemon.port, error = %err, "Daemon search failed");
                Vec::new()
            }
        }
    }

    async fn query_daemon(
        &self,
        daemon: DaemonState,
        query: &str,
        n_results: usize,
        deduplicate: bool,
    ) -> Result<Vec<SearchResult>, AppError> {
        let response = self
            .http
            .post(format!("http://127.0.0.1:{}/search", daemon.port))
            .json(&json!({
                "query": query,
                "n_results": n_results,
                "deduplicate": deduplicate,
            }))
            .send()
            .await?;
        // Failures still carry a JSON body, so the status is not checked.
        let body: SearchResponse = response.json().await?;
        body.into_results()
    }

    /// Asks a running daemon to exit. Returns whether one was found.
    pub async fn shutdown(&self) -> Result<bool, AppError> {
        let Some(daemon) = self.launcher.find_live().await else {
            return Ok(false);
        };
        self.http
            .post(format!("http://127.0.0.1:{}/shutdown", daemon.port))
            .send()
            .await?
            .error_for_status()?;
        info!(pid = daemon.pid, port = daemon.port, "Asked search daemon to shut down");
        Ok(true)
    }
}

pub fn clamp_timeout(requested: Duration) -> Duration {
    requested.clamp(MIN_CLIENT_TIMEOUT, MAX_CLIENT_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::Value;
    use std::{
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    fn client(state_file: &Path) -> SearchClient {
        SearchClient::new(
            DaemonLauncher::new(
                state_file.to_path_buf(),
                PathBuf::from("/nonexistent/search-daemon"),
                Duration::from_secs(1),
            )
            .expect("launcher"),
            OneShotSearch::new(PathBuf::from("/nonexistent/search-once"), Duration::from_secs(1)),
            Duration::from_secs(10),
        )
        .expect("client")
    }

    async fn fake_daemon(shutdowns: Arc<AtomicUsize>) -> u16 {
        let app = Router::new()
            .route("/ping", axum::routing::get(|| async { Json(json!({"ok": true})) }))
            .route(
                "/search",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "success": true,
                        "results": [{
                            "id": "line-weights",
                            "chunk_id": "line-weights_chunk_0",
                            "title": "Line Weight Guidelines",
                            "url": "https://standards/line-weights",
                            "content": body["query"],
                            "score": 0.93,
                            "semantic_score": 0.9,
                            "keyword_score": 1.0
                        }]
                    }))
                }),
            )
            .route(
                "/shutdown",
                post(move || {
                    let shutdowns = Arc::clone(&shutdowns);
                    async move {
                        shutdowns.fetch_add(1, Ordering::SeqCst);
                        Json(json!({"ok": true}))
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        port
    }

    #[test]
    fn timeout_is_clamped() {
        assert_eq!(clamp_timeout(Duration::from_secs(1)), MIN_CLIENT_TIMEOUT);
        assert_eq!(clamp_timeout(Duration::from_secs(10)), Duration::from_secs(10));
        assert_eq!(clamp_timeout(Duration::from_secs(60)), MAX_CLIENT_TIMEOUT);
    }

    #[tokio::test]
    async fn results_come_back_typed_from_a_live_daemon() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_file = dir.path().join("state.json");
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let port = fake_daemon(Arc::clone(&shutdowns)).await;
        DaemonState::for_current_process(port)
            .write(&state_file)
            .expect("write state");

        let client = client(&state_file);
        let results = client.hybrid_search("line weights", 5, true).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "line weights");
        assert_eq!(results[0].total_chunks, 1);

        assert!(client.shutdown().await.expect("shutdown"));
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dead_daemon_with_nothing_to_spawn_yields_no_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_file = dir.path().join("state.json");
        // A live port whose recorded owner is dead must not be queried.
        let port = fake_daemon(Arc::new(AtomicUsize::new(0))).await;
        let mut child = std::process::Command::new("true").spawn().expect("spawn");
        let pid = child.id();
        child.wait().expect("reap");
        DaemonState::new(pid, port).write(&state_file).expect("write");

        let client = client(&state_file);
        assert!(client.hybrid_search("line weights", 5, true).await.is_empty());
        assert!(!state_file.exists());
        assert!(!client.shutdown().await.expect("shutdown"));
    }

    #[test]
    fn failure_response_becomes_error() {
        let response: SearchResponse = serde_json::from_value(json!({
            "success": false,
            "error": "query is required"
        }))
        .expect("parse");
        let err = response.into_results().expect_err("failure");
        assert!(err.to_string().contains("query is required"));
    }
}
