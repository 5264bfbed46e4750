//! AuthContext resolver: request headers in, identity or typed failure out.
//!
//! Key selection policy:
//! - token header carries a `kid` → verify with the key registered under it
//! - no `kid` and `alg` is HS256 → verify with the shared secret
//! - anything else → [`AuthError::NoResolvableKey`]
//!
//! After verification the resolver checks expiry against the injected
//! [`Clock`] and the audience against the configured (or request-supplied)
//! audience.

use std::sync::Arc;

use gomess_core::{AuthError, AuthenticatedIdentity, Clock};
use gomess_settings::JwtSettings;
use jsonwebtoken::{Algorithm, decode_header};
use tracing::debug;

use crate::bearer::extract_bearer;
use crate::verifier::{JwtVerifier, KeyRef, KeyringError, TokenVerifier, VerificationFailure};

/// The parts of a request the resolver looks at.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuthRequest<'a> {
    /// Raw `Authorization` header value.
    pub authorization: Option<&'a str>,
    /// Raw `X-JWT-AUD` header value; overrides the configured audience.
    pub audience: Option<&'a str>,
}

/// Resolves bearer credentials into [`AuthenticatedIdentity`] values.
pub struct AuthResolver {
    verifier: Arc<dyn TokenVerifier>,
    clock: Arc<dyn Clock>,
    audience: String,
}

impl AuthResolver {
    /// Create a resolver over an arbitrary verifier.
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        clock: Arc<dyn Clock>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            clock,
            audience: audience.into(),
        }
    }

    /// Create a resolver backed by [`JwtVerifier`].
    pub fn from_settings(settings: &JwtSettings, clock: Arc<dyn Clock>) -> Result<Self, KeyringError> {
        let verifier = JwtVerifier::from_settings(settings)?;
        Ok(Self::new(Arc::new(verifier), clock, settings.aud.clone()))
    }

    /// Configured default audience.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Resolve the caller's identity.
    pub fn resolve(&self, request: &AuthRequest<'_>) -> Result<AuthenticatedIdentity, AuthError> {
        let token = extract_bearer(request.authorization)?;
        let key = select_key(token)?;

        let claims = self.verifier.verify(token, &key).map_err(|failure| {
            debug!(?key, error = %failure, "token verification failed");
            match failure {
                VerificationFailure::UnknownKey(_) | VerificationFailure::NoSharedSecret => {
                    AuthError::NoResolvableKey(failure.to_string())
                }
                VerificationFailure::AlgorithmNotAllowed(_) | VerificationFailure::Rejected(_) => {
                    AuthError::Invalid(failure.to_string())
                }
            }
        })?;

        let now = self.clock.now().timestamp();
        if claims.exp <= now {
            debug!(sub = %claims.sub, exp = claims.exp, now, "token expired");
            return Err(AuthError::Invalid("token expired".into()));
        }

        let expected = request
            .audience
            .filter(|aud| !aud.is_empty())
            .unwrap_or(&self.audience);
        if !claims.aud.contains(expected) {
            debug!(sub = %claims.sub, expected, "token audience mismatch");
            return Err(AuthError::Invalid(format!(
                "token audience does not include {expected}"
            )));
        }

        AuthenticatedIdentity::from_claims(claims)
    }
}

/// Decide which key verifies `token`, from its header alone.
pub fn select_key(token: &str) -> Result<KeyRef, AuthError> {
    let header = decode_header(token)
        .map_err(|e| AuthError::Invalid(format!("malformed token header: {e}")))?;
    match (header.kid, header.alg) {
        (Some(kid), _) => Ok(KeyRef::Kid(kid)),
        (None, Algorithm::HS256) => Ok(KeyRef::SharedSecret),
        (None, alg) => Err(AuthError::NoResolvableKey(format!(
            "missing kid for {alg:?} token"
        ))),
    }
}
