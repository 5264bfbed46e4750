//! Errors from loading and validating [`GatewaySettings`](crate::GatewaySettings).
//!
//! File errors keep the path so the binary can report which file was bad.
//! `GOMESS_*` environment overrides never fail: out-of-range values are
//! logged and skipped by the loader.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {path:?}: {source}")]
    Read {
        /// File named by `--config` or `GOMESS_CONFIG`.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not JSON, or its fields have the wrong types.
    #[error("settings file {path:?} is malformed: {source}")]
    Malformed {
        /// File named by `--config` or `GOMESS_CONFIG`.
        path: PathBuf,
        /// Parse or shape error.
        #[source]
        source: serde_json::Error,
    },
    /// The compiled defaults failed to round-trip through JSON.
    #[error("settings defaults could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    /// A merged value the gateway cannot run with; rejected by
    /// [`GatewaySettings::validate`](crate::GatewaySettings::validate).
    #[error("{field}: {reason}")]
    Invalid {
        /// camelCase path of the offending field, e.g. `hub.sendQueueCapacity`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    /// A validation failure for `field`.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
