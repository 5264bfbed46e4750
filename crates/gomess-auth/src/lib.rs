//! # gomess-auth
//!
//! Turns a request's `Authorization` header into an
//! [`AuthenticatedIdentity`](gomess_core::AuthenticatedIdentity).
//!
//! - [`bearer`]: `Bearer <token>` extraction
//! - [`verifier`]: the [`TokenVerifier`] capability and its `jsonwebtoken` implementation
//! - [`resolver`]: key selection, expiry and audience policy

#![deny(unsafe_code)]

pub mod bearer;
pub mod resolver;
pub mod verifier;

pub use bearer::extract_bearer;
pub use resolver::{AuthRequest, AuthResolver};
pub use verifier::{JwtVerifier, KeyRef, KeyringError, TokenVerifier, VerificationFailure};
