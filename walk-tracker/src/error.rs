//! Error types for walk-tracker
//!
//! Three layers:
//! - [`StageError`]: outcome of one photo search or download attempt. The
//!   variant decides whether the checkpoint is retried later or marked failed.
//! - [`SessionError`]: walk lifecycle misuse and purge failures.
//! - [`ApiError`]: HTTP-facing errors rendered as JSON.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure of a single pipeline stage attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// Network unreachable, connection refused, timeout
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// The remote side answered but the answer is unusable
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The stage cannot run with the current configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Local photo storage failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl StageError {
    /// Retryable errors leave the checkpoint untouched so a later
    /// resume or rescan picks it up again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Connectivity(_))
    }
}

impl From<reqwest::Error> for StageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() || err.is_redirect() || err.is_status() || err.is_decode() {
            StageError::Upstream(err.to_string())
        } else {
            // connect, timeout, request and body errors all mean the
            // network went away under us
            StageError::Connectivity(err.to_string())
        }
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        StageError::Storage(err.to_string())
    }
}

/// Walk session lifecycle errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A walk is already in progress")]
    AlreadyRunning,

    #[error("No walk is in progress")]
    NotRunning,

    #[error("Invalid location sample: {0}")]
    InvalidSample(String),

    #[error("Photo purge failed: {0}")]
    Purge(#[from] StageError),

    #[error(transparent)]
    Common(#[from] walk_common::Error),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., walk already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// walk-common error
    #[error("Common error: {0}")]
    Common(#[from] walk_common::Error),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AlreadyRunning | SessionError::NotRunning => {
                ApiError::Conflict(err.to_string())
            }
            SessionError::InvalidSample(msg) => ApiError::BadRequest(msg),
            SessionError::Purge(e) => ApiError::Internal(e.to_string()),
            SessionError::Common(e) => ApiError::Common(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(walk_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(walk_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
