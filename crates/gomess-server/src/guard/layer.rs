//! Axum middleware wiring the lifecycle guard around every guarded route.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gomess_core::LifecycleFault;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::warn;

use super::lifecycle::{LifecycleGuard, LifecycleOutcome};
use super::recover::recovered_panic;
use crate::errors::ApiError;
use crate::metrics::{HTTP_HANDLER_PANICS_TOTAL, HTTP_REQUESTS_TIMED_OUT_TOTAL};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// State of the guard middleware.
#[derive(Clone, Debug)]
pub struct RequestGuard {
    lifecycle: LifecycleGuard,
    max_body_bytes: usize,
}

impl RequestGuard {
    /// Guard requests with `deadline`, buffering at most `max_body_bytes`.
    pub fn new(
        deadline: Duration,
        max_body_bytes: usize,
        shutdown: CancellationToken,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            lifecycle: LifecycleGuard::new(deadline, shutdown, tracker),
            max_body_bytes,
        }
    }
}

/// Cancellation signal of the current guarded request.
///
/// Fires when the deadline passes or shutdown begins. Outside a guarded
/// route the token never fires.
#[derive(Clone, Debug, Default)]
pub struct RequestCancellation(pub CancellationToken);

impl<S: Send + Sync> FromRequestParts<S> for RequestCancellation {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned().unwrap_or_default())
    }
}

/// Middleware: run the rest of the stack under the lifecycle guard.
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn guard_request(
    State(guard): State<RequestGuard>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let limit = guard.max_body_bytes;

    let outcome = guard
        .lifecycle
        .run(move |scope| async move {
            let mut request = request;
            let _ = request
                .extensions_mut()
                .insert(RequestCancellation(scope.cancellation().clone()));
            let response = next.run(request).await;
            scope.capture().absorb(response, limit).await;
        })
        .await;

    commit(outcome, guard.lifecycle.deadline(), request_id)
}

/// Turn the guard's outcome into the one response that reaches the client.
fn commit(outcome: LifecycleOutcome, deadline: Duration, request_id: Option<String>) -> Response {
    match outcome {
        LifecycleOutcome::Completed(buffered) => buffered.into_response(),
        LifecycleOutcome::DeadlineExceeded => {
            let fault = LifecycleFault::DeadlineExceeded { deadline };
            warn!(
                request_id = request_id.as_deref(),
                deadline_ms = deadline.as_millis() as u64,
                error = %fault,
                "request deadline exceeded"
            );
            counter!(HTTP_REQUESTS_TIMED_OUT_TOTAL).increment(1);
            ApiError::from(&fault).with_error_id(request_id).into_response()
        }
        LifecycleOutcome::Panicked(message) => {
            counter!(HTTP_HANDLER_PANICS_TOTAL, "phase" => "guarded").increment(1);
            recovered_panic(&message, request_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode, header};
    use axum::routing::get;
    use tokio::time::Instant;
    use tower::ServiceExt;

    use crate::errors::{TIMEOUT_MESSAGE, UNEXPECTED_MESSAGE};

    fn app(deadline: Duration) -> Router {
        let guard = RequestGuard::new(deadline, 1024, CancellationToken::new(), TaskTracker::new());
        Router::new()
            .route("/fast", get(|| async { (StatusCode::CREATED, [(header::ETAG, "\"v1\"")], "fast") }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "slow"
                }),
            )
            .route(
                "/panic",
                get(|| async {
                    if std::hint::black_box(true) {
                        panic!("secret internal state");
                    }
                    "unreachable"
                }),
            )
            .route_layer(axum::middleware::from_fn_with_state(guard, guard_request))
    }

    async fn call(app: Router, path: &str) -> (StatusCode, Option<String>, serde_json::Value) {
        let request = HttpRequest::builder()
            .uri(path)
            .header(REQUEST_ID_HEADER, "req-42")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let error_code = response
            .headers()
            .get(crate::errors::ERROR_CODE_HEADER)
            .map(|v| v.to_str().unwrap().to_owned());
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, error_code, json)
    }

    #[tokio::test(start_paused = true)]
    async fn fast_response_passes_through() {
        let response = app(Duration::from_secs(1))
            .oneshot(HttpRequest::builder().uri("/fast").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get(header::ETAG).unwrap(), "\"v1\"");
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        assert_eq!(&bytes[..], b"fast");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_gets_gateway_timeout() {
        let start = Instant::now();
        let (status, error_code, json) = call(app(Duration::from_secs(1)), "/slow").await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(error_code.as_deref(), Some("request_timeout"));
        assert_eq!(
            json,
            serde_json::json!({
                "code": 504,
                "error_code": "request_timeout",
                "message": TIMEOUT_MESSAGE,
                "error_id": "req-42",
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_without_request_id_has_no_error_id() {
        let response = app(Duration::from_secs(1))
            .oneshot(HttpRequest::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json.get("error_id").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn handler_panic_becomes_generic_500() {
        let (status, error_code, json) = call(app(Duration::from_secs(1)), "/panic").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_code.as_deref(), Some("unexpected_failure"));
        assert_eq!(json["message"], UNEXPECTED_MESSAGE);
        assert_eq!(json["error_id"], "req-42");
        assert!(!json.to_string().contains("secret"));
    }

    #[tokio::test(start_paused = true)]
    async fn handler_observes_deadline_cancellation() {
        let tracker = TaskTracker::new();
        let guard = RequestGuard::new(Duration::from_secs(1), 1024, CancellationToken::new(), tracker.clone());
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Arc::new(parking_lot::Mutex::new(Some(tx)));
        let app = Router::new()
            .route(
                "/cancel",
                get(move |RequestCancellation(token): RequestCancellation| async move {
                    token.cancelled().await;
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(());
                    }
                    "cancelled"
                }),
            )
            .route_layer(axum::middleware::from_fn_with_state(guard, guard_request));

        let (status, _, _) = call(app, "/cancel").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_outside_guard_never_fires() {
        let app: Router = Router::new().route(
            "/open",
            get(|RequestCancellation(token): RequestCancellation| async move {
                if token.is_cancelled() { "cancelled" } else { "open" }
            }),
        );
        let response = app
            .oneshot(HttpRequest::builder().uri("/open").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&bytes[..], b"open");
    }
}
