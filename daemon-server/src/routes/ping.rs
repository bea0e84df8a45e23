use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Liveness probe used by discovery. Counts as activity.
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"ok": true})))
}
