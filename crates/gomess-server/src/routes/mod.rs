//! HTTP route handlers.

pub mod auth;
pub mod health;
pub mod users;
pub mod ws;

use crate::errors::ApiError;

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::not_found()
}
