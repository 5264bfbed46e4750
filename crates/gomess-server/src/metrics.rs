//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup
/// before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric names shared across modules.

/// WebSocket connections admitted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections evicted (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Currently registered connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Admissions rejected (counter, labels: reason).
pub const WS_ADMISSIONS_REJECTED_TOTAL: &str = "ws_admissions_rejected_total";
/// Outbound frames dropped on a full queue (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Guarded requests answered with the timeout body (counter).
pub const HTTP_REQUESTS_TIMED_OUT_TOTAL: &str = "http_requests_timed_out_total";
/// Handler panics, before or after the deadline (counter).
pub const HTTP_HANDLER_PANICS_TOTAL: &str = "http_handler_panics_total";
/// Handler outputs discarded because the deadline already answered (counter).
pub const HTTP_LATE_OUTPUTS_DISCARDED_TOTAL: &str = "http_late_outputs_discarded_total";
