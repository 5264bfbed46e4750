//! `/ws` upgrade endpoint.
//!
//! Not guarded: an upgraded exchange never produces a buffered response.
//! Authentication happens before the upgrade is accepted.

use axum::extract::State;
use axum::extract::ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use gomess_core::{AuthenticatedIdentity, ConnectionId, RegistryConflict};
use gomess_settings::ConnectionIdPolicy;
use tracing::{debug, info};

use crate::auth::auth_request;
use crate::errors::ApiError;
use crate::hub::ws;
use crate::server::AppState;

/// Registry key for a new connection under `policy`.
pub fn connection_id(policy: ConnectionIdPolicy, identity: &AuthenticatedIdentity) -> ConnectionId {
    match policy {
        ConnectionIdPolicy::Identity => ConnectionId::for_user(&identity.user_id),
        ConnectionIdPolicy::Generated => ConnectionId::new(),
    }
}

/// GET /ws
///
/// 401 if the caller cannot be authenticated, 503 once shutdown began,
/// 409 if the connection key is already registered. Otherwise the socket is
/// upgraded and handed to the hub.
pub async fn upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let identity = match state.auth.resolve(&auth_request(&headers)) {
        Ok(identity) => identity,
        Err(e) => {
            debug!(error = %e, "upgrade refused: not authenticated");
            return ApiError::from(e)
                .with_status(StatusCode::UNAUTHORIZED)
                .into_response();
        }
    };

    if state.shutdown.is_shutting_down() {
        return ApiError::shutting_down().into_response();
    }

    let id = connection_id(state.config.connection_ids, &identity);
    if state.hub.contains(&id) {
        let conflict = RegistryConflict { id };
        debug!(error = %conflict, "upgrade refused: duplicate connection");
        return ApiError::conflict(conflict.to_string()).into_response();
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let hub = state.hub.clone();
    upgrade
        .max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| async move {
            let (source, sink) = ws::split(socket);
            let user_id = identity.user_id.clone();
            match hub.admit(id, identity, source, sink) {
                Ok(connection) => info!(conn_id = %connection.id(), user_id = %user_id, "websocket connected"),
                Err(e) => debug!(user_id = %user_id, error = %e, "upgraded socket refused"),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::testing::identity;

    #[test]
    fn identity_policy_uses_subject() {
        let id = connection_id(ConnectionIdPolicy::Identity, &identity("user-1"));
        assert_eq!(id, ConnectionId::for_user(&identity("user-1").user_id));
    }

    #[test]
    fn generated_policy_is_unique() {
        let a = connection_id(ConnectionIdPolicy::Generated, &identity("user-1"));
        let b = connection_id(ConnectionIdPolicy::Generated, &identity("user-1"));
        assert_ne!(a, b);
    }
}
