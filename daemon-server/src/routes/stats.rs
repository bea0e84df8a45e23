use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError};

pub async fn stats(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.engine.stats()?;
    Ok((
        StatusCode::OK,
        Json(json!({"success": true, "stats": stats})),
    ))
}
