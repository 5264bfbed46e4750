//! Stable, machine-readable error codes surfaced to clients.
//!
//! Codes are part of the public contract: clients branch on them, so a
//! variant's wire name never changes once shipped.

use serde::{Deserialize, Serialize};
use std::fmt;

/// User-visible error code carried in every error body and in the
/// `x-error-code` response header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No usable `Authorization` header.
    NoAuthorization,
    /// Token could not be parsed, resolved to a key, or verified.
    BadJwt,
    /// The request did not finish before its deadline.
    RequestTimeout,
    /// Internal fault; details only in server logs.
    UnexpectedFailure,
    /// Requested user does not exist.
    UserNotFound,
    /// Request was well-formed but failed validation.
    ValidationFailed,
    /// Resource already exists (duplicate connection).
    Conflict,
    /// Endpoint is reserved but not implemented.
    NotImplemented,
    /// Route does not exist.
    NotFound,
    /// The server is shutting down and takes no new work.
    ServiceUnavailable,
}

impl ErrorCode {
    /// Wire representation of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoAuthorization => "no_authorization",
            Self::BadJwt => "bad_jwt",
            Self::RequestTimeout => "request_timeout",
            Self::UnexpectedFailure => "unexpected_failure",
            Self::UserNotFound => "user_not_found",
            Self::ValidationFailed => "validation_failed",
            Self::Conflict => "conflict",
            Self::NotImplemented => "not_implemented",
            Self::NotFound => "not_found",
            Self::ServiceUnavailable => "service_unavailable",
        }
    }

    /// Whether a client may retry the same request unchanged.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RequestTimeout | Self::ServiceUnavailable)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
