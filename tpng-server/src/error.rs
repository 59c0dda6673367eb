//! Error types for tpng-server
//!
//! Every HTTP error body has the shape `{"error": {"code", "message"}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Why an upload was rejected or failed
///
/// Rejections happen before any write.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unknown recorder")]
    UnknownRecorder,

    #[error("Recorder {0} is disabled")]
    RecorderDisabled(String),

    #[error("Unknown talkgroup {decimal_id} on system {system}")]
    UnknownTalkgroup { system: String, decimal_id: i64 },

    #[error("Talkgroup {0} not permitted for this recorder")]
    TalkgroupNotPermitted(i64),

    #[error("Invalid submission: {0}")]
    ValidationError(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::UnknownRecorder | IngestError::RecorderDisabled(_) => StatusCode::UNAUTHORIZED,
            IngestError::TalkgroupNotPermitted(_) => StatusCode::FORBIDDEN,
            IngestError::UnknownTalkgroup { .. } => StatusCode::NOT_FOUND,
            IngestError::ValidationError(_) => StatusCode::BAD_REQUEST,
            IngestError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            IngestError::UnknownRecorder => "UNKNOWN_RECORDER",
            IngestError::RecorderDisabled(_) => "RECORDER_DISABLED",
            IngestError::UnknownTalkgroup { .. } => "UNKNOWN_TALKGROUP",
            IngestError::TalkgroupNotPermitted(_) => "TALKGROUP_NOT_PERMITTED",
            IngestError::ValidationError(_) => "VALIDATION_ERROR",
            IngestError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
        }
    }
}

impl From<tpng_common::Error> for IngestError {
    fn from(err: tpng_common::Error) -> Self {
        IngestError::PersistenceFailure(err.to_string())
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        error_response(self.status(), self.code(), self.to_string())
    }
}

/// Failure of one dispatch job
///
/// Stays inside the task runner; never reaches the submitter.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Notification gateway error: {0}")]
    Gateway(String),

    #[error("Forward to {url} failed: {reason}")]
    Forward { url: String, reason: String },

    #[error("Blob store error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or unknown caller identity (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller may not see or change the resource (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// tpng-common error
    #[error("Common error: {0}")]
    Common(#[from] tpng_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Ingest(err) => return err.into_response(),
            ApiError::Common(tpng_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(tpng_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        error_response(status, error_code, message)
    }
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    let body = Json(json!({
        "error": {
            "code": code,
            "message": message,
        }
    }));

    (status, body).into_response()
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_error_status_mapping() {
        assert_eq!(IngestError::UnknownRecorder.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            IngestError::RecorderDisabled("r".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(IngestError::TalkgroupNotPermitted(1).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            IngestError::UnknownTalkgroup {
                system: "s".into(),
                decimal_id: 1
            }
            .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            IngestError::ValidationError("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IngestError::PersistenceFailure("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_common_not_found_maps_to_404() {
        let response =
            ApiError::Common(tpng_common::Error::NotFound("gone".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
