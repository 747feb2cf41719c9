//! API error types.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use slidecast_worker::WorkerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "invalid_request",
            ApiError::RateLimited => "rate_limited",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Input(e) => ApiError::Validation(e.to_string()),
            WorkerError::JobNotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
            other => {
                error!("Render service error: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Extension set on responses built from [`ApiError::Internal`], so they can
/// be redacted when running in production.
#[derive(Debug, Clone, Copy)]
pub struct InternalErrorDetail;

/// Generic message shown instead of internal error details.
pub const REDACTED_INTERNAL_ERROR: &str = "An internal error occurred";

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl ApiError {
    /// Response for an internal error with its details withheld.
    pub fn redacted_internal() -> Response {
        let body = ErrorResponse {
            detail: REDACTED_INTERNAL_ERROR.to_string(),
            code: Some("internal_error"),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let internal = matches!(self, ApiError::Internal(_));

        let body = ErrorResponse {
            detail: self.to_string(),
            code: Some(self.code()),
        };

        let mut response = (status, Json(body)).into_response();
        if internal {
            response.extensions_mut().insert(InternalErrorDetail);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slidecast_models::{InputError, JobId};

    #[test]
    fn test_worker_error_mapping() {
        let err = ApiError::from(WorkerError::Input(InputError::NoScenes));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "invalid_request");

        let err = ApiError::from(WorkerError::JobNotFound(JobId::from_string("abc")));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Not found: Job abc not found");

        let err = ApiError::from(WorkerError::internal("boom"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_errors_are_marked() {
        let response = ApiError::internal("store offline").into_response();
        assert!(response.extensions().get::<InternalErrorDetail>().is_some());

        let response = ApiError::not_found("Job x not found").into_response();
        assert!(response.extensions().get::<InternalErrorDetail>().is_none());
    }
}
