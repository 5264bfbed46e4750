//! Account endpoints. Accounts are managed outside the gateway, so every
//! one of these answers 501.

use crate::errors::ApiError;

/// POST /api/auth/login
pub async fn login() -> ApiError {
    ApiError::not_implemented()
}

/// POST /api/auth/register
pub async fn register() -> ApiError {
    ApiError::not_implemented()
}

/// POST /api/auth/logout
pub async fn logout() -> ApiError {
    ApiError::not_implemented()
}

/// POST /api/auth/refresh
pub async fn refresh() -> ApiError {
    ApiError::not_implemented()
}

/// POST /api/auth/forgot-password
pub async fn forgot_password() -> ApiError {
    ApiError::not_implemented()
}
