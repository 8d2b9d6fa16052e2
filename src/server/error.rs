//! API error types and response formatting.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::ingest::IngestError;
use crate::orchestrate::CompareError;
use crate::queue::QueueError;
use crate::store::StoreError;

/// API error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Structurally invalid request; no job was created.
    #[error("{0}")]
    Validation(String),

    /// Unknown or expired job id.
    #[error("job {0} not found")]
    NotFound(String),

    /// Result requested before the job reached a terminal state.
    #[error("job {job_id} is not complete yet (status: {status})")]
    NotReady { job_id: String, status: String },

    /// The job finished with a stored error.
    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// Queue or store unreachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::NotReady { .. } => (StatusCode::ACCEPTED, "not_ready"),
            Self::JobFailed { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "job_failed"),
            Self::Unavailable(message) => {
                tracing::error!(error = %message, "infrastructure unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
            Self::Internal(message) => {
                tracing::error!(error = %message, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = ErrorBody {
            error,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Validation(message) => ApiError::Validation(message),
            IngestError::Queue(inner) => ApiError::Unavailable(inner.to_string()),
            IngestError::Store(inner) => ApiError::Unavailable(inner.to_string()),
            IngestError::Spool(inner) => ApiError::Internal(inner.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Connection(message) => ApiError::Unavailable(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Connection(message) => ApiError::Unavailable(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CompareError> for ApiError {
    fn from(e: CompareError) -> Self {
        match e {
            CompareError::TooFewParsers(_) | CompareError::UnknownParser(_) => {
                ApiError::Validation(e.to_string())
            }
            CompareError::Ingest(inner) => inner.into(),
        }
    }
}
