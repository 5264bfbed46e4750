//! Recovery of handler panics into the generic failure body.

use std::any::Any;

use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::error;

use crate::errors::ApiError;
use crate::metrics::HTTP_HANDLER_PANICS_TOTAL;

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Log a recovered panic and build the client-facing 500.
///
/// The panic text only reaches the logs; the body is always the generic one.
pub fn recovered_panic(message: &str, request_id: Option<String>) -> Response {
    error!(request_id = request_id.as_deref(), panic = message, "request handler panicked");
    ApiError::unexpected()
        .with_error_id(request_id)
        .into_response()
}

/// Panic handler for `CatchPanicLayer::custom`, covering code outside the guard.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    counter!(HTTP_HANDLER_PANICS_TOTAL, "phase" => "unguarded").increment(1);
    recovered_panic(&panic_message(&*payload), None)
}
