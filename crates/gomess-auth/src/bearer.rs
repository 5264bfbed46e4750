//! `Authorization: Bearer <token>` parsing.

use gomess_core::AuthError;

const PREFIX: &str = "bearer ";

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively and must be followed by exactly
/// one space and a token containing no whitespace.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::NoCredential)?;
    let scheme = value.get(..PREFIX.len()).ok_or(AuthError::NoCredential)?;
    if !scheme.eq_ignore_ascii_case(PREFIX) {
        return Err(AuthError::NoCredential);
    }
    let token = &value[PREFIX.len()..];
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(AuthError::NoCredential);
    }
    Ok(token)
}
