//! Verified claims and the request-scoped identity built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AuthError;
use crate::ids::{SessionId, UserId};

/// `aud` claim: a single string or a list of strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "authenticated"`
    One(String),
    /// `"aud": ["authenticated", "service"]`
    Many(Vec<String>),
}

impl Audience {
    /// All audience values in token order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::One(a) => vec![a.as_str()],
            Self::Many(list) => list.iter().map(String::as_str).collect(),
        }
    }

    /// Whether `expected` is one of the token's audiences.
    pub fn contains(&self, expected: &str) -> bool {
        self.values().contains(&expected)
    }
}

impl Default for Audience {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

/// Claim set carried by an access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id).
    pub sub: String,
    /// Intended audience(s).
    #[serde(default)]
    pub aud: Audience,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    /// Issued-at, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Auth session the token was minted for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub phone: Option<String>,
    /// Role granted to the subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Whether the subject signed in anonymously.
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Principal resolved for one request or one connection's lifetime.
///
/// Passed explicitly to whoever needs it. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedIdentity {
    /// Subject of the verified token.
    pub user_id: UserId,
    /// Auth session, if the token carried one.
    pub session_id: Option<SessionId>,
    /// Audiences the token was issued for.
    pub audience: Vec<String>,
    /// Role granted to the subject.
    pub role: Option<String>,
    /// Email claim, if present.
    pub email: Option<String>,
    /// Whether the subject signed in anonymously.
    pub is_anonymous: bool,
    /// When the token stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl AuthenticatedIdentity {
    /// Build an identity from claims that already passed verification.
    pub fn from_claims(claims: Claims) -> Result<Self, AuthError> {
        if claims.sub.is_empty() {
            return Err(AuthError::Invalid("token has an empty subject".into()));
        }
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::Invalid(format!("exp {} out of range", claims.exp)))?;
        Ok(Self {
            audience: claims.aud.values().into_iter().map(str::to_owned).collect(),
            user_id: UserId::from(claims.sub),
            session_id: claims.session_id.map(SessionId::from),
            role: claims.role,
            email: claims.email,
            is_anonymous: claims.is_anonymous,
            expires_at,
        })
    }

    /// Whether the identity was issued for `audience`.
    pub fn has_audience(&self, audience: &str) -> bool {
        self.audience.iter().any(|a| a == audience)
    }
}
