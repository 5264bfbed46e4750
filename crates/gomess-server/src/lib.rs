//! # gomess-server
//!
//! Axum HTTP + WebSocket gateway.
//!
//! - [`hub`]: registry of live connections and broadcast fan-out
//! - [`guard`]: deadline-bounded execution of ordinary requests
//! - [`shutdown`]: cooperative termination with a bounded grace period
//! - [`server`]: router, shared state, and listener
//! - [`routes`]: health, upgrade, and user endpoints

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod guard;
pub mod hub;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod shutdown;

#[cfg(test)]
mod test_support;

pub use config::ServerConfig;
pub use errors::{ApiError, ServerError};
pub use hub::{EvictReason, Hub, HubError};
pub use server::{AppState, GatewayServer, ServerHandle};
pub use shutdown::{ShutdownCoordinator, ShutdownOutcome};
