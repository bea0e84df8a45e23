#![allow(clippy::missing_docs_in_private_items)]

use std::sync::Arc;

use api_state::ApiState;
use axum::{
    extract::{Request, State},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use common::{error::AppError, utils::daemon_state::DaemonState};
use routes::{
    not_found::not_found, ping::ping, search::search, shutdown::shutdown, stats::stats,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod api_state;
pub mod error;
pub mod idle;
mod routes;

/// Routes of the local search protocol. Every matched request counts as
/// activity for the idle timer; unknown paths do not.
pub fn daemon_routes(app_state: &ApiState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/search", post(search))
        .route("/shutdown", post(shutdown))
        .route("/stats", get(stats))
        .route_layer(from_fn_with_state(app_state.clone(), record_activity))
        .fallback(not_found)
        .with_state(app_state.clone())
}

async fn record_activity(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    state.idle.touch();
    next.run(request).await
}

/// Serves until the idle timer fires, `/shutdown` is called, or the
/// shutdown token is cancelled from outside. The state file is removed
/// before this returns.
pub async fn serve(listener: TcpListener, state: ApiState) -> Result<(), AppError> {
    let app = daemon_routes(&state);
    let token = state.shutdown.clone();
    let watcher = tokio::spawn(idle::watch(
        Arc::clone(&state.idle),
        state.state_file.clone(),
        token.clone(),
    ));

    info!(
        addr = %listener.local_addr()?,
        idle_timeout_secs = state.idle.timeout().as_secs(),
        "Search daemon serving"
    );
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await;

    watcher.abort();
    DaemonState::clear_if_owned(&state.state_file, std::process::id());
    result?;
    info!("Search daemon stopped");
    Ok(())
}

/// Cancels `token` on ctrl-c or, on unix, SIGTERM.
pub async fn shutdown_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received ctrl-c"),
        () = terminate => info!("Received SIGTERM"),
        () = token.cancelled() => return,
    }
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request as HttpRequest, StatusCode},
    };
    use common::{
        storage::{
            snapshot::IndexSnapshot,
            types::{Chunk, Document},
        },
        utils::embedding::EmbeddingProvider,
    };
    use retrieval_pipeline::{RetrievalTuning, SearchEngine};
    use serde_json::{json, Value};
    use std::{path::Path, time::Duration};
    use tower::ServiceExt;

    async fn engine(with_index: bool) -> Arc<SearchEngine> {
        let provider = Arc::new(EmbeddingProvider::new_hashed(32).expect("provider"));
        let snapshot = if with_index {
            let docs = [
                Document::new(
                    "line-weights",
                    "Line Weight Guidelines",
                    "https://standards/line-weights",
                    "Cut lines use heavier pens than projection lines",
                ),
                Document::new(
                    "sheets",
                    "Sheet Setup",
                    "https://standards/sheets",
                    "Title blocks and sheet numbering",
                ),
            ];
            let chunks: Vec<Chunk> = docs
                .iter()
                .map(|doc| {
                    let mut chunk =
                        Chunk::from_document(doc, doc.content.clone(), 0, 0, doc.word_count());
                    chunk.total_chunks = 1;
                    chunk
                })
                .collect();
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let vectors = provider.embed_batch(&texts).await.expect("embed");
            Some(Arc::new(IndexSnapshot::new(vectors, chunks).expect("snapshot")))
        } else {
            None
        };
        let tuning = RetrievalTuning {
            similarity_threshold: 0.0,
            ..RetrievalTuning::default()
        };
        Arc::new(SearchEngine::new(snapshot, provider, tuning))
    }

    async fn state(with_index: bool, state_file: &Path) -> ApiState {
        ApiState::new(
            engine(with_index).await,
            Duration::from_secs(60),
            state_file.to_path_buf(),
        )
    }

    async fn call(app: Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(body)
                    .expect("request"),
            )
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn ping_and_unknown_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(true, &dir.path().join("state.json")).await;
        let app = daemon_routes(&state);

        let (status, body) = call(app.clone(), "GET", "/ping", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));

        let (status, body) = call(app, "GET", "/nowhere", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "not found"}));
    }

    #[tokio::test]
    async fn search_requires_a_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(true, &dir.path().join("state.json")).await;
        let app = daemon_routes(&state);

        for payload in [json!({}), json!({"query": "   "}), json!({"n_results": 3})] {
            let (status, body) =
                call(app.clone(), "POST", "/search", Body::from(payload.to_string())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({"success": false, "error": "query is required"}));
        }

        let (status, body) = call(app, "POST", "/search", Body::from("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn search_returns_ranked_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(true, &dir.path().join("state.json")).await;
        let app = daemon_routes(&state);

        let payload = json!({"query": "line weight pens", "n_results": 1, "deduplicate": true});
        let (status, body) = call(app, "POST", "/search", Body::from(payload.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let results = body["results"].as_array().expect("results array");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["title"], "Line Weight Guidelines");
        assert_eq!(results[0]["chunk_id"], "line-weights_chunk_0");
    }

    #[tokio::test]
    async fn missing_index_reports_failure_and_stats() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(false, &dir.path().join("state.json")).await;
        let app = daemon_routes(&state);

        let payload = json!({"query": "line weights"});
        let (status, body) =
            call(app.clone(), "POST", "/search", Body::from(payload.to_string())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert!(body["error"]
            .as_str()
            .expect("error string")
            .starts_with("search index is not available"));

        let (status, body) = call(app, "GET", "/stats", Body::empty()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn stats_describe_the_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(true, &dir.path().join("state.json")).await;
        let (status, body) = call(daemon_routes(&state), "GET", "/stats", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["total_chunks"], 2);
        assert_eq!(body["stats"]["unique_documents"], 2);
        assert_eq!(body["stats"]["embedding_dimension"], 32);
    }

    #[tokio::test]
    async fn shutdown_acknowledges_then_cancels() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_file = dir.path().join("state.json");
        DaemonState::for_current_process(5555)
            .write(&state_file)
            .expect("write state");
        let state = state(true, &state_file).await;

        let (status, body) =
            call(daemon_routes(&state), "POST", "/shutdown", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));

        tokio::time::timeout(Duration::from_secs(1), state.shutdown.cancelled())
            .await
            .expect("shutdown token cancelled");
        assert!(!state_file.exists());
    }

    #[tokio::test]
    async fn idle_daemon_exits_and_removes_state_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_file = dir.path().join("state.json");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        DaemonState::for_current_process(port)
            .write(&state_file)
            .expect("write state");

        let state = ApiState::new(
            engine(true).await,
            Duration::from_millis(400),
            state_file.clone(),
        );
        let server = tokio::spawn(serve(listener, state));

        let client = reqwest::Client::new();
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(250)).await;
            let response = client
                .get(format!("http://127.0.0.1:{port}/ping"))
                .send()
                .await
                .expect("daemon still serving");
            assert!(response.status().is_success());
        }
        assert!(state_file.exists());
        drop(client);

        tokio::time::timeout(Duration::from_secs(3), server)
            .await
            .expect("daemon exits after idling")
            .expect("server task")
            .expect("clean shutdown");
        assert!(!state_file.exists());
    }
}
