//! Settings types. Every field has a default, so a partial JSON file (or
//! none at all) always produces a complete configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root of the gateway configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Listener and request handling.
    pub api: ApiSettings,
    /// Token verification.
    pub jwt: JwtSettings,
    /// Live connection hub.
    pub hub: HubSettings,
    /// Process termination.
    pub shutdown: ShutdownSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl GatewaySettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api.max_request_duration_ms == 0 {
            return Err(SettingsError::invalid(
                "api.maxRequestDurationMs",
                "must be greater than zero",
            ));
        }
        if self.hub.send_queue_capacity == 0 {
            return Err(SettingsError::invalid(
                "hub.sendQueueCapacity",
                "must be greater than zero",
            ));
        }
        if self.hub.heartbeat_interval_ms == 0 {
            return Err(SettingsError::invalid(
                "hub.heartbeatIntervalMs",
                "must be greater than zero",
            ));
        }
        for key in &self.jwt.keys {
            if key.secret.is_none() && key.pem.is_none() {
                return Err(SettingsError::invalid(
                    "jwt.keys",
                    format!("key {} needs either a secret or a pem", key.kid),
                ));
            }
        }
        Ok(())
    }
}

// ── API ─────────────────────────────────────────────────────────────────────

/// Listener and request handling settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks an ephemeral port.
    pub port: u16,
    /// Name reported by `/health`.
    pub server_id: String,
    /// Deadline applied to every guarded request.
    pub max_request_duration_ms: u64,
    /// Largest request or buffered response body accepted.
    pub max_body_bytes: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9999,
            server_id: "gomess".into(),
            max_request_duration_ms: 10_000,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

impl ApiSettings {
    /// Guarded request deadline.
    pub fn max_request_duration(&self) -> Duration {
        Duration::from_millis(self.max_request_duration_ms)
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── JWT ─────────────────────────────────────────────────────────────────────

/// Token verification settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JwtSettings {
    /// Shared HMAC secret for tokens without a `kid`. Empty disables it.
    pub secret: String,
    /// Audience every token must carry unless the request overrides it.
    pub aud: String,
    /// Keys addressed by `kid`.
    pub keys: Vec<JwtKeySettings>,
    /// Accepted signing algorithms.
    pub valid_methods: Vec<String>,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            aud: "authenticated".into(),
            keys: Vec::new(),
            valid_methods: vec!["HS256".into()],
        }
    }
}

/// One verification key addressed by its `kid`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtKeySettings {
    /// Key identifier matched against the token header.
    pub kid: String,
    /// Algorithm name (`HS256`, `RS256`, `ES256`, ...).
    pub alg: String,
    /// HMAC secret for `HS*` keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// PEM-encoded public key for `RS*`/`ES*`/`PS*` keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pem: Option<String>,
}

// ── Hub ─────────────────────────────────────────────────────────────────────

/// How the hub keys a newly admitted connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionIdPolicy {
    /// Use the identity's subject; one live connection per user.
    #[default]
    Identity,
    /// Fresh UUID per connection.
    Generated,
}

/// Live connection hub settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Consecutive full-queue drops before a recipient is evicted.
    pub max_dropped_messages: u64,
    /// Ping interval.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a connection is considered dead.
    pub heartbeat_timeout_ms: u64,
    /// Upper bound on sending a close frame.
    pub close_timeout_ms: u64,
    /// Largest inbound frame accepted.
    pub max_message_bytes: usize,
    /// Connection key policy.
    pub connection_ids: ConnectionIdPolicy,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            send_queue_capacity: 256,
            max_dropped_messages: 64,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            close_timeout_ms: 1_000,
            max_message_bytes: 64 * 1024,
            connection_ids: ConnectionIdPolicy::Identity,
        }
    }
}

// ── Shutdown ────────────────────────────────────────────────────────────────

/// Process termination settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShutdownSettings {
    /// How long in-flight work may drain before transports are force-closed.
    pub grace_period_ms: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: 60_000,
        }
    }
}

impl ShutdownSettings {
    /// Drain budget.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

// ── Logging ─────────────────────────────────────────────────────────────────

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
