//! Signature verification capability.
//!
//! [`TokenVerifier`] maps a token plus a [`KeyRef`] to a claim set. The
//! resolver decides *which* key to use; the verifier owns the key material
//! and the cryptography. [`JwtVerifier`] is the `jsonwebtoken` implementation.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use gomess_core::Claims;
use gomess_settings::{JwtKeySettings, JwtSettings};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use thiserror::Error;

/// Which key a token must be verified with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyRef {
    /// Key registered under the token's `kid`.
    Kid(String),
    /// The shared HMAC secret (HS256, no `kid`).
    SharedSecret,
}

/// Why a verifier refused a token.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    /// No key is registered under the requested `kid`.
    #[error("no key registered under kid {0}")]
    UnknownKey(String),
    /// The shared-secret path is not configured.
    #[error("shared-secret verification is not configured")]
    NoSharedSecret,
    /// The token's algorithm is not accepted for this key.
    #[error("algorithm {0} is not accepted")]
    AlgorithmNotAllowed(String),
    /// Malformed token or bad signature.
    #[error("token rejected: {0}")]
    Rejected(String),
}

/// Maps a credential string to verified claims.
pub trait TokenVerifier: Send + Sync {
    /// Verify `token`'s signature with the referenced key and decode its claims.
    ///
    /// Expiry and audience are not checked here.
    fn verify(&self, token: &str, key: &KeyRef) -> Result<Claims, VerificationFailure>;
}

/// Errors building a keyring from settings.
#[derive(Debug, Error)]
pub enum KeyringError {
    /// Algorithm name not recognised.
    #[error("unknown JWT algorithm: {0}")]
    UnknownAlgorithm(String),
    /// The key's algorithm needs material the settings did not provide.
    #[error("jwt key {kid} is missing its {expected}")]
    MissingMaterial {
        /// Key identifier.
        kid: String,
        /// `secret` or `pem`.
        expected: &'static str,
    },
    /// Key material could not be parsed.
    #[error("jwt key {kid} is invalid: {source}")]
    InvalidKey {
        /// Key identifier.
        kid: String,
        /// Parse failure.
        #[source]
        source: jsonwebtoken::errors::Error,
    },
}

struct KeyEntry {
    alg: Algorithm,
    key: DecodingKey,
}

/// `jsonwebtoken`-backed verifier with a `kid` keyring and an optional
/// shared HMAC secret.
pub struct JwtVerifier {
    shared_secret: Option<DecodingKey>,
    keys: HashMap<String, KeyEntry>,
    valid_methods: HashSet<Algorithm>,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("shared_secret", &self.shared_secret.is_some())
            .field("kids", &self.keys.keys().collect::<Vec<_>>())
            .field("valid_methods", &self.valid_methods)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    /// Build from JWT settings.
    pub fn from_settings(settings: &JwtSettings) -> Result<Self, KeyringError> {
        let valid_methods = settings
            .valid_methods
            .iter()
            .map(|name| parse_algorithm(name))
            .collect::<Result<HashSet<_>, _>>()?;

        let shared_secret = (!settings.secret.is_empty())
            .then(|| DecodingKey::from_secret(settings.secret.as_bytes()));

        let mut keys = HashMap::with_capacity(settings.keys.len());
        for key in &settings.keys {
            let entry = build_key(key)?;
            let _ = keys.insert(key.kid.clone(), entry);
        }

        Ok(Self {
            shared_secret,
            keys,
            valid_methods,
        })
    }

    /// Number of keys addressable by `kid`.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn select(&self, key: &KeyRef) -> Result<(Algorithm, &DecodingKey), VerificationFailure> {
        match key {
            KeyRef::Kid(kid) => self
                .keys
                .get(kid)
                .map(|entry| (entry.alg, &entry.key))
                .ok_or_else(|| VerificationFailure::UnknownKey(kid.clone())),
            KeyRef::SharedSecret => self
                .shared_secret
                .as_ref()
                .map(|key| (Algorithm::HS256, key))
                .ok_or(VerificationFailure::NoSharedSecret),
        }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str, key: &KeyRef) -> Result<Claims, VerificationFailure> {
        let header =
            decode_header(token).map_err(|e| VerificationFailure::Rejected(e.to_string()))?;
        if !self.valid_methods.contains(&header.alg) {
            return Err(VerificationFailure::AlgorithmNotAllowed(format!("{:?}", header.alg)));
        }

        let (alg, decoding_key) = self.select(key)?;
        if header.alg != alg {
            return Err(VerificationFailure::AlgorithmNotAllowed(format!("{:?}", header.alg)));
        }

        let mut validation = Validation::new(alg);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<Claims>(token, decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| VerificationFailure::Rejected(e.to_string()))
    }
}

fn parse_algorithm(name: &str) -> Result<Algorithm, KeyringError> {
    Algorithm::from_str(name).map_err(|_| KeyringError::UnknownAlgorithm(name.to_owned()))
}

fn build_key(settings: &JwtKeySettings) -> Result<KeyEntry, KeyringError> {
    let alg = parse_algorithm(&settings.alg)?;
    let kid = &settings.kid;
    let invalid = |source| KeyringError::InvalidKey {
        kid: kid.clone(),
        source,
    };

    let key = match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            let secret = settings.secret.as_ref().ok_or_else(|| KeyringError::MissingMaterial {
                kid: kid.clone(),
                expected: "secret",
            })?;
            DecodingKey::from_secret(secret.as_bytes())
        }
        _ => {
            let pem = settings.pem.as_ref().ok_or_else(|| KeyringError::MissingMaterial {
                kid: kid.clone(),
                expected: "pem",
            })?;
            match alg {
                Algorithm::ES256 | Algorithm::ES384 => {
                    DecodingKey::from_ec_pem(pem.as_bytes()).map_err(invalid)?
                }
                Algorithm::EdDSA => DecodingKey::from_ed_pem(pem.as_bytes()).map_err(invalid)?,
                _ => DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(invalid)?,
            }
        }
    };

    Ok(KeyEntry { alg, key })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use gomess_core::Audience;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn claims() -> Claims {
        Claims {
            sub: "user-1".into(),
            aud: Audience::One("authenticated".into()),
            exp: 2_000_000_000,
            iat: None,
            session_id: Some("sess-1".into()),
            email: None,
            phone: None,
            role: None,
            is_anonymous: false,
        }
    }

    fn sign(alg: Algorithm, kid: Option<&str>, secret: &str) -> String {
        let mut header = Header::new(alg);
        header.kid = kid.map(str::to_owned);
        encode(&header, &claims(), &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn settings() -> JwtSettings {
        JwtSettings {
            secret: "shared-secret".into(),
            keys: vec![JwtKeySettings {
                kid: "k1".into(),
                alg: "HS384".into(),
                secret: Some("k1-secret".into()),
                pem: None,
            }],
            valid_methods: vec!["HS256".into(), "HS384".into()],
            ..JwtSettings::default()
        }
    }

    #[test]
    fn shared_secret_verifies() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        let token = sign(Algorithm::HS256, None, "shared-secret");
        let verified = verifier.verify(&token, &KeyRef::SharedSecret).unwrap();
        assert_eq!(verified, claims());
    }

    #[test]
    fn kid_key_verifies() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        let token = sign(Algorithm::HS384, Some("k1"), "k1-secret");
        let verified = verifier.verify(&token, &KeyRef::Kid("k1".into())).unwrap();
        assert_eq!(verified.sub, "user-1");
    }

    #[test]
    fn unknown_kid() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        let token = sign(Algorithm::HS256, Some("k9"), "shared-secret");
        assert_matches!(
            verifier.verify(&token, &KeyRef::Kid("k9".into())),
            Err(VerificationFailure::UnknownKey(kid)) if kid == "k9"
        );
    }

    #[test]
    fn wrong_secret_rejected() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        let token = sign(Algorithm::HS256, None, "not-the-secret");
        assert_matches!(
            verifier.verify(&token, &KeyRef::SharedSecret),
            Err(VerificationFailure::Rejected(_))
        );
    }

    #[test]
    fn algorithm_must_match_key() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        let token = sign(Algorithm::HS256, Some("k1"), "k1-secret");
        assert_matches!(
            verifier.verify(&token, &KeyRef::Kid("k1".into())),
            Err(VerificationFailure::AlgorithmNotAllowed(_))
        );
    }

    #[test]
    fn algorithm_must_be_valid_method() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        let token = sign(Algorithm::HS512, None, "shared-secret");
        assert_matches!(
            verifier.verify(&token, &KeyRef::SharedSecret),
            Err(VerificationFailure::AlgorithmNotAllowed(_))
        );
    }

    #[test]
    fn empty_secret_disables_shared_path() {
        let mut s = settings();
        s.secret = String::new();
        let verifier = JwtVerifier::from_settings(&s).unwrap();
        let token = sign(Algorithm::HS256, None, "shared-secret");
        assert_matches!(
            verifier.verify(&token, &KeyRef::SharedSecret),
            Err(VerificationFailure::NoSharedSecret)
        );
    }

    #[test]
    fn garbage_token_rejected() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        assert_matches!(
            verifier.verify("not-a-jwt", &KeyRef::SharedSecret),
            Err(VerificationFailure::Rejected(_))
        );
    }

    #[test]
    fn keyring_errors() {
        let mut s = settings();
        s.valid_methods = vec!["HS999".into()];
        assert_matches!(
            JwtVerifier::from_settings(&s),
            Err(KeyringError::UnknownAlgorithm(name)) if name == "HS999"
        );

        let mut s = settings();
        s.keys[0].secret = None;
        assert_matches!(
            JwtVerifier::from_settings(&s),
            Err(KeyringError::MissingMaterial { expected: "secret", .. })
        );

        let mut s = settings();
        s.keys.push(JwtKeySettings {
            kid: "rsa".into(),
            alg: "RS256".into(),
            secret: None,
            pem: Some("not a pem".into()),
        });
        assert_matches!(
            JwtVerifier::from_settings(&s),
            Err(KeyringError::InvalidKey { kid, .. }) if kid == "rsa"
        );
    }

    #[test]
    fn key_count() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        assert_eq!(verifier.key_count(), 1);
    }
}
