//! Error taxonomy for the gateway.
//!
//! - [`AuthError`]: credential extraction and verification failures
//! - [`TransportError`]: read/write failures on one connection, fatal to it
//! - [`LifecycleFault`]: a guarded request panicked or ran past its deadline
//! - [`RegistryConflict`]: duplicate admission of a live connection key
//!
//! Every error that reaches a client maps onto an [`ErrorCode`]. Internal
//! detail stays in the `Display` text, which is logged but never sent.

pub mod codes;

use std::time::Duration;

use thiserror::Error;

pub use codes::ErrorCode;

use crate::ids::ConnectionId;

// ─────────────────────────────────────────────────────────────────────────────
// AuthError
// ─────────────────────────────────────────────────────────────────────────────

/// Why a request could not be turned into an authenticated identity.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Header missing, empty, or not a `Bearer <token>` value.
    #[error("no bearer credential in request")]
    NoCredential,
    /// Neither a key id nor the shared-secret path can verify the token.
    #[error("no verification key for credential: {0}")]
    NoResolvableKey(String),
    /// Signature, expiry, audience, or shape check failed.
    #[error("invalid credential: {0}")]
    Invalid(String),
}

impl AuthError {
    /// Stable user-visible code for this failure.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NoCredential => ErrorCode::NoAuthorization,
            Self::NoResolvableKey(_) | Self::Invalid(_) => ErrorCode::BadJwt,
        }
    }

    /// Client-safe message. Never includes the verification detail.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::NoCredential => "This endpoint requires a Bearer token",
            Self::NoResolvableKey(_) | Self::Invalid(_) => {
                "Invalid JWT: unable to parse or verify signature"
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TransportError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure on a connection's underlying transport.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Reading the next inbound frame failed.
    #[error("transport read failed: {0}")]
    Read(String),
    /// Writing an outbound frame failed.
    #[error("transport write failed: {0}")]
    Write(String),
    /// The transport was already closed.
    #[error("transport closed")]
    Closed,
}

// ─────────────────────────────────────────────────────────────────────────────
// LifecycleFault
// ─────────────────────────────────────────────────────────────────────────────

/// Abnormal end of a guarded request.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LifecycleFault {
    /// The handler panicked before any response was committed.
    #[error("handler panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text (logged only).
        message: String,
    },
    /// The deadline fired before the handler finished.
    #[error("handler exceeded deadline of {deadline:?}")]
    DeadlineExceeded {
        /// The deadline that was applied.
        deadline: Duration,
    },
}

impl LifecycleFault {
    /// Stable user-visible code for this fault.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Panicked { .. } => ErrorCode::UnexpectedFailure,
            Self::DeadlineExceeded { .. } => ErrorCode::RequestTimeout,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RegistryConflict
// ─────────────────────────────────────────────────────────────────────────────

/// A connection key was admitted while another connection held it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("connection {id} is already registered")]
pub struct RegistryConflict {
    /// The contested key.
    pub id: ConnectionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_codes() {
        assert_eq!(AuthError::NoCredential.error_code(), ErrorCode::NoAuthorization);
        assert_eq!(
            AuthError::NoResolvableKey("kid k9".into()).error_code(),
            ErrorCode::BadJwt
        );
        assert_eq!(AuthError::Invalid("expired".into()).error_code(), ErrorCode::BadJwt);
    }

    #[test]
    fn auth_public_message_hides_detail() {
        let err = AuthError::Invalid("signature mismatch for key 42".into());
        assert!(!err.public_message().contains("42"));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn lifecycle_codes() {
        let timeout = LifecycleFault::DeadlineExceeded {
            deadline: Duration::from_secs(1),
        };
        assert_eq!(timeout.error_code(), ErrorCode::RequestTimeout);
        let panicked = LifecycleFault::Panicked {
            message: "boom".into(),
        };
        assert_eq!(panicked.error_code(), ErrorCode::UnexpectedFailure);
    }

    #[test]
    fn registry_conflict_display() {
        let err = RegistryConflict {
            id: ConnectionId::from("a"),
        };
        assert_eq!(err.to_string(), "connection a is already registered");
    }

    #[test]
    fn transport_error_display() {
        assert_eq!(
            TransportError::Write("broken pipe".into()).to_string(),
            "transport write failed: broken pipe"
        );
        assert_eq!(TransportError::Closed.to_string(), "transport closed");
    }
}
