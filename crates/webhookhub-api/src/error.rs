//! API error taxonomy and HTTP response mapping.
//!
//! Every error renders the structured body
//! `{"error": {"code": ..., "message": ...}}`. Authorization failures
//! carry no discriminating detail: a missing signature, a bad signature,
//! and an inactive source are indistinguishable to the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use webhookhub_core::CoreError;

/// Errors surfaced by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request input.
    #[error("{0}")]
    Validation(String),

    /// Request body exceeds the ingest limit.
    #[error("payload of {0} bytes exceeds limit")]
    PayloadTooLarge(usize),

    /// Missing/invalid signature or inactive source.
    #[error("unauthorized")]
    Unauthorized,

    /// Unknown entity.
    #[error("{0}")]
    NotFound(String),

    /// Unique name already taken.
    #[error("{0}")]
    Conflict(String),

    /// Database or broker outage.
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable code for the error body.
    ///
    /// An oversized payload is a validation failure; it keeps its own
    /// variant only for the 413 status.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::PayloadTooLarge(_) => "validation",
            Self::Unauthorized => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(message) => Self::NotFound(message),
            CoreError::UniqueViolation(message) => Self::Conflict(message),
            CoreError::InvalidInput(message) => Self::Validation(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<webhookhub_broker::BrokerError> for ApiError {
    fn from(err: webhookhub_broker::BrokerError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Structured JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details.
    pub error: ErrorDetail,
}

/// Code and message rendered to the caller.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Internal details stay in logs, not in the response body.
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(detail = %detail, "internal error serving request");
                "internal error".to_string()
            },
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: ErrorDetail { code: self.code().to_string(), message },
        };

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        let validation = ApiError::Validation("blank type".into());
        assert_eq!(validation.code(), "validation");
        assert_eq!(validation.into_response().status(), StatusCode::BAD_REQUEST);

        let unauthorized = ApiError::Unauthorized;
        assert_eq!(unauthorized.code(), "unauthorized");
        assert_eq!(unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);

        let not_found = ApiError::NotFound("unknown source".into());
        assert_eq!(not_found.code(), "not_found");
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let conflict = ApiError::Conflict("name taken".into());
        assert_eq!(conflict.code(), "conflict");
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);

        let internal = ApiError::Internal("db down".into());
        assert_eq!(internal.code(), "internal");
        assert_eq!(internal.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn oversized_payload_is_a_validation_error_with_413() {
        let err = ApiError::PayloadTooLarge(11 * 1024 * 1024);
        assert_eq!(err.code(), "validation");
        assert_eq!(err.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn core_unique_violation_becomes_conflict() {
        let err = ApiError::from(CoreError::UniqueViolation("sources.name".into()));
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn internal_error_body_hides_detail() {
        let err = ApiError::Internal("password=hunter2 in dsn".into());
        assert_eq!(err.to_string(), "internal error");
    }
}
