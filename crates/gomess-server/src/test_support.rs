//! Shared fixtures for unit tests.

use std::sync::Arc;

use chrono::Utc;
use gomess_auth::AuthResolver;
use gomess_core::SystemClock;
use gomess_settings::JwtSettings;
use jsonwebtoken::{EncodingKey, Header, encode};

pub(crate) const SECRET: &str = "unit-test-shared-secret-0123456789";

pub(crate) fn resolver() -> Arc<AuthResolver> {
    let settings = JwtSettings {
        secret: SECRET.into(),
        ..JwtSettings::default()
    };
    Arc::new(AuthResolver::from_settings(&settings, Arc::new(SystemClock)).unwrap())
}

pub(crate) fn token(sub: &str) -> String {
    token_for(sub, "authenticated")
}

pub(crate) fn token_for(sub: &str, aud: &str) -> String {
    let claims = serde_json::json!({
        "sub": sub,
        "aud": aud,
        "exp": Utc::now().timestamp() + 3600,
        "session_id": "session-1",
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}
