//! JSON error envelope returned by every endpoint.

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use gomess_auth::KeyringError;
use gomess_core::{AuthError, ErrorCode, LifecycleFault, LookupError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Header carrying the machine-readable error code.
pub const ERROR_CODE_HEADER: &str = "x-error-code";

/// Message of the fixed timeout body.
pub const TIMEOUT_MESSAGE: &str =
    "Processing this request timed out, please retry after a moment.";

/// Message of the generic internal-fault body.
pub const UNEXPECTED_MESSAGE: &str =
    "Unexpected failure, please check server logs for more information";

/// Error body: `{"code": <status>, "error_code": "...", "message": "...", "error_id": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    /// HTTP status code.
    pub code: u16,
    /// Stable machine-readable code.
    pub error_code: ErrorCode,
    /// Human-readable, client-safe message.
    pub message: String,
    /// Request id for correlating 5xx responses with server logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
}

impl ApiError {
    /// Build an error with an explicit status.
    pub fn new(status: StatusCode, error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            error_code,
            message: message.into(),
            error_id: None,
        }
    }

    /// 504 `request_timeout`.
    pub fn timeout() -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, ErrorCode::RequestTimeout, TIMEOUT_MESSAGE)
    }

    /// 500 `unexpected_failure`.
    pub fn unexpected() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::UnexpectedFailure,
            UNEXPECTED_MESSAGE,
        )
    }

    /// 404 `not_found`.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, "Not found")
    }

    /// 409 `conflict`.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, ErrorCode::Conflict, message)
    }

    /// 501 `not_implemented`.
    pub fn not_implemented() -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, ErrorCode::NotImplemented, "Not implemented")
    }

    /// 503 `service_unavailable`.
    pub fn shutting_down() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::ServiceUnavailable,
            "Server is shutting down",
        )
    }

    /// Override the HTTP status, keeping code and message.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.code = status.as_u16();
        self
    }

    /// Attach a request id.
    #[must_use]
    pub fn with_error_id(mut self, error_id: Option<String>) -> Self {
        self.error_id = error_id;
        self
    }

    /// HTTP status of this error.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match err {
            AuthError::NoCredential => StatusCode::UNAUTHORIZED,
            AuthError::NoResolvableKey(_) | AuthError::Invalid(_) => StatusCode::FORBIDDEN,
        };
        Self::new(status, err.error_code(), err.public_message())
    }
}

impl From<&LifecycleFault> for ApiError {
    fn from(fault: &LifecycleFault) -> Self {
        match fault {
            LifecycleFault::DeadlineExceeded { .. } => Self::timeout(),
            LifecycleFault::Panicked { .. } => Self::unexpected(),
        }
    }
}

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound => {
                Self::new(StatusCode::NOT_FOUND, ErrorCode::UserNotFound, err.to_string())
            }
            LookupError::Unavailable(detail) => {
                error!(error = %detail, "user directory lookup failed");
                Self::unexpected()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = HeaderValue::from_static(self.error_code.as_str());
        let mut response = (status, Json(self)).into_response();
        let _ = response.headers_mut().insert(ERROR_CODE_HEADER, code);
        response
    }
}

/// Failures starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The verification keyring could not be built.
    #[error("invalid JWT keyring: {0}")]
    Keyring(#[from] KeyringError),
    /// Listener I/O failed.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}
