use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::Configuration(msg) => Self::Unavailable(msg),
            other => {
                tracing::error!(error = ?other, "Search request failed");
                Self::InternalError(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::InternalError(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            Self::ValidationError(message) => (StatusCode::BAD_REQUEST, message),
            Self::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error,
            }),
        )
            .into_response()
    }
}

/// Failure body shared by every endpoint that reports `success`.
#[derive(Serialize, Debug)]
struct ErrorResponse {
    success: bool,
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_errors_map_to_api_errors() {
        let api_error = ApiError::from(AppError::Validation("query is required".into()));
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg == "query is required"));

        let api_error = ApiError::from(AppError::Configuration("no index".into()));
        assert!(matches!(api_error, ApiError::Unavailable(msg) if msg == "no index"));

        let api_error = ApiError::from(AppError::Io(std::io::Error::other("disk gone")));
        assert!(matches!(api_error, ApiError::InternalError(msg) if msg.contains("disk gone")));
    }

    #[test]
    fn responses_carry_status_codes() {
        assert_eq!(
            ApiError::ValidationError("bad".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unavailable("later".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::InternalError("boom".into())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
