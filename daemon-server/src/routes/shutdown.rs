use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::utils::daemon_state::DaemonState;
use serde_json::json;
use tracing::info;

use crate::api_state::ApiState;

/// Acknowledges first; the state file is removed and the server stopped from
/// a separate task, and graceful shutdown lets this response finish.
pub async fn shutdown(State(state): State<ApiState>) -> impl IntoResponse {
    info!("Shutdown requested");
    tokio::spawn(async move {
        DaemonState::clear_if_owned(&state.state_file, std::process::id());
        state.shutdown.cancel();
    });
    (StatusCode::OK, Json(json!({"ok": true})))
}
