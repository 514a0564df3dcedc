// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use packetpress_jobs::{JobId, JobKind, StartError};
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("No executor registered for job kind: {0:?}")]
    UnknownKind(JobKind),

    #[error("A job is already running for this target: {0}")]
    Conflict(JobId),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<StartError> for ApiError {
    fn from(err: StartError) -> Self {
        match err {
            StartError::Conflict { existing } => ApiError::Conflict(existing),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = %id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {}", id)),
                )
            }
            ApiError::UnknownKind(kind) => {
                tracing::warn!(kind = ?kind, "No executor for job kind");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Unknown job kind", format!("{:?}", kind)),
                )
            }
            ApiError::Conflict(existing) => {
                tracing::warn!(existing_job = %existing, "Start conflict");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details(
                        "A job is already running for this target",
                        format!("Job ID: {}", existing),
                    ),
                )
            }
            ApiError::Collaborator(msg) => {
                tracing::error!(message = %msg, "Collaborator error");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::with_details("Collaborator error", msg.clone()),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
