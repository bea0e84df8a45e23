use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub n_results: Option<usize>,
    #[serde(default)]
    pub deduplicate: Option<bool>,
}

pub async fn search(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: SearchRequest = if body.is_empty() {
        SearchRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::ValidationError(format!("invalid request body: {err}")))?
    };

    let query = request
        .query
        .filter(|query| !query.trim().is_empty())
        .ok_or_else(|| ApiError::ValidationError("query is required".to_string()))?;
    let n_results = request
        .n_results
        .unwrap_or(state.engine.tuning().default_results);
    let deduplicate = request.deduplicate.unwrap_or(true);

    let started = Instant::now();
    let preview: String = query.chars().take(80).collect();
    let results = state
        .engine
        .hybrid_search(&query, n_results, deduplicate)
        .await?;
    info!(
        query = %preview,
        results = results.len(),
        elapsed_ms = started.elapsed().as_millis(),
        "Search served"
    );

    Ok((
        StatusCode::OK,
        Json(json!({"success": true, "results": results})),
    ))
}
