//! Request-scoped identity for guarded handlers and the upgrade endpoint.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use gomess_auth::{AuthRequest, AuthResolver};
use gomess_core::AuthenticatedIdentity;
use tracing::debug;

use crate::errors::ApiError;

/// Header that overrides the expected token audience for one request.
pub const JWT_AUDIENCE_HEADER: &str = "x-jwt-aud";

/// Borrow the credential headers of a request. Non-ASCII values count as absent.
pub fn auth_request(headers: &HeaderMap) -> AuthRequest<'_> {
    AuthRequest {
        authorization: headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
        audience: headers.get(JWT_AUDIENCE_HEADER).and_then(|v| v.to_str().ok()),
    }
}

/// Extractor: the caller's resolved identity, or an error response.
#[derive(Clone, Debug)]
pub struct Authenticated(pub AuthenticatedIdentity);

impl<S> FromRequestParts<S> for Authenticated
where
    Arc<AuthResolver>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let resolver = Arc::<AuthResolver>::from_ref(state);
        match resolver.resolve(&auth_request(&parts.headers)) {
            Ok(identity) => Ok(Self(identity)),
            Err(e) => {
                debug!(path = %parts.uri.path(), error = %e, "request not authenticated");
                Err(ApiError::from(e))
            }
        }
    }
}
