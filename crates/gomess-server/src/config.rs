//! Runtime configuration of the gateway server, derived from settings.

use std::time::Duration;

use gomess_settings::{ConnectionIdPolicy, GatewaySettings};

/// Hub tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Consecutive full-queue drops before a recipient is evicted.
    pub max_dropped_messages: u64,
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Silence after which a connection is evicted.
    pub heartbeat_timeout: Duration,
    /// Upper bound on sending a close frame.
    pub close_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: 256,
            max_dropped_messages: 64,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            close_timeout: Duration::from_secs(1),
        }
    }
}

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Name reported by `/health`.
    pub server_id: String,
    /// Deadline of every guarded request.
    pub request_deadline: Duration,
    /// Largest buffered response body.
    pub max_body_bytes: usize,
    /// Largest inbound WebSocket frame.
    pub max_message_bytes: usize,
    /// How connection keys are chosen.
    pub connection_ids: ConnectionIdPolicy,
    /// Drain budget on shutdown.
    pub grace_period: Duration,
    /// Hub tuning.
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&GatewaySettings::default())
    }
}

impl From<&GatewaySettings> for ServerConfig {
    fn from(settings: &GatewaySettings) -> Self {
        Self {
            server_id: settings.api.server_id.clone(),
            request_deadline: settings.api.max_request_duration(),
            max_body_bytes: settings.api.max_body_bytes,
            max_message_bytes: settings.hub.max_message_bytes,
            connection_ids: settings.hub.connection_ids,
            grace_period: settings.shutdown.grace_period(),
            hub: HubConfig {
                send_queue_capacity: settings.hub.send_queue_capacity,
                max_dropped_messages: settings.hub.max_dropped_messages,
                heartbeat_interval: Duration::from_millis(settings.hub.heartbeat_interval_ms),
                heartbeat_timeout: Duration::from_millis(settings.hub.heartbeat_timeout_ms),
                close_timeout: Duration::from_millis(settings.hub.close_timeout_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.request_deadline, Duration::from_secs(10));
        assert_eq!(config.grace_period, Duration::from_secs(60));
        assert_eq!(config.connection_ids, ConnectionIdPolicy::Identity);
        assert_eq!(config.hub, HubConfig::default());
    }

    #[test]
    fn from_settings_copies_values() {
        let mut settings = GatewaySettings::default();
        settings.api.max_request_duration_ms = 1500;
        settings.shutdown.grace_period_ms = 1000;
        settings.hub.send_queue_capacity = 8;
        settings.hub.heartbeat_interval_ms = 500;
        let config = ServerConfig::from(&settings);
        assert_eq!(config.request_deadline, Duration::from_millis(1500));
        assert_eq!(config.grace_period, Duration::from_secs(1));
        assert_eq!(config.hub.send_queue_capacity, 8);
        assert_eq!(config.hub.heartbeat_interval, Duration::from_millis(500));
    }
}
