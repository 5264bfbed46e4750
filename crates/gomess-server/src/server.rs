//! `GatewayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::FromRef;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method};
use axum::routing::{get, post};
use gomess_auth::AuthResolver;
use gomess_core::UserDirectory;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::JWT_AUDIENCE_HEADER;
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::guard::{RequestGuard, guard_request, handle_panic};
use crate::hub::Hub;
use crate::routes;
use crate::shutdown::{ShutdownCoordinator, ShutdownOutcome};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection registry.
    pub hub: Arc<Hub>,
    /// Credential resolver.
    pub auth: Arc<AuthResolver>,
    /// User lookups.
    pub users: Arc<dyn UserDirectory>,
    /// Shutdown coordinator.
    pub shutdown: ShutdownCoordinator,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl FromRef<AppState> for Arc<AuthResolver> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Handle to a running listener.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The serve task; finishes once the listener has drained.
    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

/// The gateway server.
pub struct GatewayServer {
    state: AppState,
}

impl GatewayServer {
    /// Create a server. The hub and guarded handlers share the shutdown
    /// coordinator's token and task tracker.
    pub fn new(config: ServerConfig, auth: Arc<AuthResolver>, users: Arc<dyn UserDirectory>) -> Self {
        let shutdown = ShutdownCoordinator::new(config.grace_period);
        let hub = Hub::new(config.hub.clone(), shutdown.token(), shutdown.tracker());
        Self {
            state: AppState {
                hub,
                auth,
                users,
                shutdown,
                config: Arc::new(config),
                start_time: Instant::now(),
                metrics: None,
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get the connection hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.state.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let config = &self.state.config;
        let guard = RequestGuard::new(
            config.request_deadline,
            config.max_body_bytes,
            self.state.shutdown.token(),
            self.state.shutdown.tracker(),
        );

        let guarded = Router::new()
            .route("/health", get(routes::health::health))
            .route("/metrics", get(routes::health::metrics))
            .route("/api/users", get(routes::users::list_users))
            .route("/api/users/me", get(routes::users::me))
            .route("/api/users/{id}", get(routes::users::get_user))
            .route("/api/auth/login", post(routes::auth::login))
            .route("/api/auth/register", post(routes::auth::register))
            .route("/api/auth/logout", post(routes::auth::logout))
            .route("/api/auth/refresh", post(routes::auth::refresh))
            .route("/api/auth/forgot-password", post(routes::auth::forgot_password))
            .route_layer(axum::middleware::from_fn_with_state(guard, guard_request));

        Router::new()
            .route("/ws", get(routes::ws::upgrade))
            .merge(guarded)
            .fallback(routes::not_found)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(CatchPanicLayer::custom(handle_panic))
                    .layer(cors()),
            )
            .with_state(self.state.clone())
    }

    /// Start serving on `listener`.
    ///
    /// The listener stops accepting once the shutdown token is cancelled.
    pub fn serve(&self, listener: TcpListener) -> Result<ServerHandle, ServerError> {
        let local_addr = listener.local_addr()?;
        let app = self.router();
        let token = self.state.shutdown.token();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });
        info!(%local_addr, "gateway listening");
        Ok(ServerHandle { local_addr, task })
    }

    /// Stop accepting, drain, and force-close what is left after the grace
    /// period.
    pub async fn graceful_shutdown(&self, handle: ServerHandle) -> ShutdownOutcome {
        self.state
            .shutdown
            .graceful_shutdown(&self.state.hub, vec![handle.into_task()])
            .await
    }
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-ip"),
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static(JWT_AUDIENCE_HEADER),
        ])
        .expose_headers([routes::users::TOTAL_COUNT_HEADER])
}
