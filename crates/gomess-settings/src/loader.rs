//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GatewaySettings::default()`]
//! 2. If a settings file is given and exists, deep-merge it over the defaults
//! 3. Apply `GOMESS_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{ConnectionIdPolicy, GatewaySettings};

/// Settings file named by `GOMESS_CONFIG`, if any.
pub fn settings_path() -> Option<PathBuf> {
    read_env_string("GOMESS_CONFIG").map(PathBuf::from)
}

/// Load settings from `GOMESS_CONFIG` (when set) with env var overrides.
pub fn load_settings() -> Result<GatewaySettings> {
    match settings_path() {
        Some(path) => load_settings_from_path(&path),
        None => finish(serde_json::to_value(GatewaySettings::default())?, None),
    }
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. An unreadable file is
/// [`SettingsError::Read`]; invalid JSON or mistyped fields are
/// [`SettingsError::Malformed`].
pub fn load_settings_from_path(path: &Path) -> Result<GatewaySettings> {
    let defaults = serde_json::to_value(GatewaySettings::default())?;

    if !path.exists() {
        debug!(?path, "settings file not found, using defaults");
        return finish(defaults, None);
    }

    debug!(?path, "loading settings from file");
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    finish(deep_merge(defaults, user), Some(path))
}

fn finish(merged: Value, path: Option<&Path>) -> Result<GatewaySettings> {
    let mut settings: GatewaySettings = serde_json::from_value(merged).map_err(|source| match path {
        Some(path) => SettingsError::Malformed {
            path: path.to_path_buf(),
            source,
        },
        None => SettingsError::Encode(source),
    })?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `GOMESS_*` environment variable overrides.
///
/// Values are range-checked; invalid ones are logged and ignored so the
/// file/default value stays in effect.
pub fn apply_env_overrides(settings: &mut GatewaySettings) {
    // ── API ─────────────────────────────────────────────────────────
    if let Some(v) = read_env_string("GOMESS_API_HOST") {
        settings.api.host = v;
    }
    if let Some(v) = read_env_u16("GOMESS_API_PORT", 0, 65535) {
        settings.api.port = v;
    }
    if let Some(v) = read_env_string("GOMESS_API_SERVER_ID") {
        settings.api.server_id = v;
    }
    if let Some(v) = read_env_u64("GOMESS_API_MAX_REQUEST_DURATION_MS", 1, 3_600_000) {
        settings.api.max_request_duration_ms = v;
    }

    // ── JWT ─────────────────────────────────────────────────────────
    if let Some(v) = read_env_string("GOMESS_JWT_SECRET") {
        settings.jwt.secret = v;
    }
    if let Some(v) = read_env_string("GOMESS_JWT_AUD") {
        settings.jwt.aud = v;
    }
    if let Some(v) = read_env_string("GOMESS_JWT_VALID_METHODS") {
        settings.jwt.valid_methods = parse_list(&v);
    }

    // ── Hub ─────────────────────────────────────────────────────────
    if let Some(v) = read_env_usize("GOMESS_HUB_SEND_QUEUE", 1, 1_000_000) {
        settings.hub.send_queue_capacity = v;
    }
    if let Some(v) = read_env_u64("GOMESS_HEARTBEAT_INTERVAL_MS", 100, 600_000) {
        settings.hub.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_env_u64("GOMESS_HEARTBEAT_TIMEOUT_MS", 100, 3_600_000) {
        settings.hub.heartbeat_timeout_ms = v;
    }
    if let Some(v) = read_env_string("GOMESS_HUB_CONNECTION_IDS") {
        match parse_policy(&v) {
            Some(policy) => settings.hub.connection_ids = policy,
            None => tracing::warn!(
                key = "GOMESS_HUB_CONNECTION_IDS",
                value = %v,
                "invalid connection id policy, ignoring"
            ),
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("GOMESS_SHUTDOWN_GRACE_MS", 0, 3_600_000) {
        settings.shutdown.grace_period_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("GOMESS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("GOMESS_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, trimming blanks.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parse a connection id policy name.
pub fn parse_policy(val: &str) -> Option<ConnectionIdPolicy> {
    match val.to_lowercase().as_str() {
        "identity" => Some(ConnectionIdPolicy::Identity),
        "generated" => Some(ConnectionIdPolicy::Generated),
        _ => None,
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
