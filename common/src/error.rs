use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Embedding provider error: {0}")]
    Provider(String),
    #[error("Transient embedding provider error: {0}")]
    TransientProvider(String),
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),
    #[error("Daemon discovery failed: {0}")]
    Discovery(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Whether a failed provider call is worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientProvider(_) => true,
            Self::Reqwest(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            _ => false,
        }
    }
}
