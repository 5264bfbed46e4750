//! # gomess-settings
//!
//! Typed gateway settings loaded in three layers:
//!
//! 1. compiled defaults ([`GatewaySettings::default`])
//! 2. an optional JSON file, deep-merged over the defaults
//! 3. `GOMESS_*` environment variables (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path};
pub use types::{
    ApiSettings, ConnectionIdPolicy, GatewaySettings, HubSettings, JwtKeySettings, JwtSettings,
    LoggingSettings, ShutdownSettings,
};
