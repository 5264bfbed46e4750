//! Buffering response capture.
//!
//! A guarded handler never writes to the real response. It writes into a
//! [`ResponseCapture`], which the guard seals exactly once into a
//! [`BufferedResponse`] when the handler wins the race.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::warn;

use crate::errors::{ApiError, ERROR_CODE_HEADER};

#[derive(Default)]
struct CaptureState {
    headers: HeaderMap,
    /// Status plus the headers as they were when it was first written.
    committed: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
    sealed: bool,
}

/// In-memory stand-in for the response a handler writes.
///
/// Headers set after the status is fixed are ignored; the first status wins.
/// Writing body bytes without a status fixes it at `200 OK`.
#[derive(Clone, Default)]
pub struct ResponseCapture {
    state: Arc<Mutex<CaptureState>>,
}

impl ResponseCapture {
    /// An empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing previous values. Ignored once the status is
    /// fixed. Returns whether the header was recorded.
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) -> bool {
        let mut state = self.state.lock();
        if state.sealed || state.committed.is_some() {
            return false;
        }
        let _ = state.headers.insert(name, value);
        true
    }

    /// Add a header value. Ignored once the status is fixed.
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) -> bool {
        let mut state = self.state.lock();
        if state.sealed || state.committed.is_some() {
            return false;
        }
        let _ = state.headers.append(name, value);
        true
    }

    /// Fix the status. Only the first call has any effect.
    pub fn write_status(&self, status: StatusCode) -> bool {
        let mut state = self.state.lock();
        Self::fix_status(&mut state, status)
    }

    fn fix_status(state: &mut CaptureState, status: StatusCode) -> bool {
        if state.sealed || state.committed.is_some() {
            return false;
        }
        let snapshot = state.headers.clone();
        state.committed = Some((status, snapshot));
        true
    }

    /// Append body bytes, fixing the status at 200 if none was written.
    pub fn write_body(&self, data: &[u8]) -> bool {
        let mut state = self.state.lock();
        if state.sealed {
            return false;
        }
        let _ = Self::fix_status(&mut state, StatusCode::OK);
        state.body.extend_from_slice(data);
        true
    }

    /// Status written so far.
    pub fn status(&self) -> Option<StatusCode> {
        self.state.lock().committed.as_ref().map(|(status, _)| *status)
    }

    /// Whether the capture has been flushed.
    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }

    /// Copy a complete axum response into the capture.
    ///
    /// A body that cannot be read within `limit` bytes is replaced by the
    /// generic internal-failure body.
    pub async fn absorb(&self, response: Response, limit: usize) {
        let (parts, body) = response.into_parts();
        match axum::body::to_bytes(body, limit).await {
            Ok(bytes) => {
                for (name, value) in &parts.headers {
                    let _ = self.append_header(name.clone(), value.clone());
                }
                let _ = self.write_status(parts.status);
                let _ = self.write_body(&bytes);
            }
            Err(e) => {
                warn!(error = %e, limit, "handler response body could not be buffered");
                let error = ApiError::unexpected();
                let body = serde_json::to_vec(&error).unwrap_or_default();
                let _ = self.insert_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                let _ = self.insert_header(
                    HeaderName::from_static(ERROR_CODE_HEADER),
                    HeaderValue::from_static(error.error_code.as_str()),
                );
                let _ = self.write_status(error.status());
                let _ = self.write_body(&body);
            }
        }
    }

    /// Flush the capture. Returns `None` if it was already flushed.
    pub fn seal(&self) -> Option<BufferedResponse> {
        let mut state = self.state.lock();
        if state.sealed {
            return None;
        }
        state.sealed = true;
        let body = std::mem::take(&mut state.body).freeze();
        let (status, headers) = match state.committed.take() {
            Some(committed) => committed,
            None => (StatusCode::OK, std::mem::take(&mut state.headers)),
        };
        Some(BufferedResponse {
            status,
            headers,
            body,
        })
    }
}

/// A sealed capture: status, headers, and body, ready to commit.
#[derive(Clone, Debug)]
pub struct BufferedResponse {
    /// Response status.
    pub status: StatusCode,
    /// Headers as of the first status write.
    pub headers: HeaderMap,
    /// Complete body.
    pub body: Bytes,
}

impl IntoResponse for BufferedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH};

    fn header(value: &'static str) -> HeaderValue {
        HeaderValue::from_static(value)
    }

    // ── header/status ordering ──────────────────────────────────────

    #[test]
    fn headers_after_status_are_ignored() {
        let capture = ResponseCapture::new();
        assert!(capture.insert_header(CONTENT_TYPE, header("text/plain")));
        assert!(capture.write_status(StatusCode::CREATED));
        assert!(!capture.insert_header(CACHE_CONTROL, header("no-store")));

        let sealed = capture.seal().unwrap();
        assert_eq!(sealed.status, StatusCode::CREATED);
        assert_eq!(sealed.headers.get(CONTENT_TYPE).unwrap(), "text/plain");
        assert!(sealed.headers.get(CACHE_CONTROL).is_none());
    }

    #[test]
    fn first_status_wins() {
        let capture = ResponseCapture::new();
        assert!(capture.write_status(StatusCode::ACCEPTED));
        assert!(!capture.write_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(capture.status(), Some(StatusCode::ACCEPTED));
    }

    #[test]
    fn body_without_status_is_ok() {
        let capture = ResponseCapture::new();
        assert!(capture.write_body(b"hel"));
        assert!(capture.write_body(b"lo"));
        // implicit 200 already fixed
        assert!(!capture.write_status(StatusCode::NOT_FOUND));
        let sealed = capture.seal().unwrap();
        assert_eq!(sealed.status, StatusCode::OK);
        assert_eq!(&sealed.body[..], b"hello");
    }

    #[test]
    fn untouched_capture_seals_to_empty_ok() {
        let capture = ResponseCapture::new();
        let _ = capture.insert_header(CACHE_CONTROL, header("no-store"));
        let sealed = capture.seal().unwrap();
        assert_eq!(sealed.status, StatusCode::OK);
        assert!(sealed.body.is_empty());
        assert_eq!(sealed.headers.get(CACHE_CONTROL).unwrap(), "no-store");
    }

    // ── sealing ─────────────────────────────────────────────────────

    #[test]
    fn seal_is_one_shot() {
        let capture = ResponseCapture::new();
        let _ = capture.write_body(b"x");
        assert!(capture.seal().is_some());
        assert!(capture.is_sealed());
        assert!(capture.seal().is_none());
        assert!(!capture.write_body(b"late"));
        assert!(!capture.append_header(CACHE_CONTROL, header("no-store")));
    }

    #[tokio::test]
    async fn buffered_response_round_trips_into_axum() {
        let capture = ResponseCapture::new();
        let _ = capture.insert_header(CONTENT_TYPE, header("application/json"));
        let _ = capture.write_status(StatusCode::CREATED);
        let _ = capture.write_body(br#"{"ok":true}"#);

        let response = capture.seal().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "application/json");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], br#"{"ok":true}"#);
    }

    // ── absorb ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn absorb_copies_response() {
        let capture = ResponseCapture::new();
        let response = (
            StatusCode::IM_A_TEAPOT,
            [(CACHE_CONTROL, "no-store")],
            "short and stout",
        )
            .into_response();
        capture.absorb(response, 1024).await;

        let sealed = capture.seal().unwrap();
        assert_eq!(sealed.status, StatusCode::IM_A_TEAPOT);
        assert_eq!(sealed.headers.get(CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(&sealed.body[..], b"short and stout");
    }

    #[tokio::test]
    async fn oversized_body_becomes_internal_failure() {
        let capture = ResponseCapture::new();
        let response = "x".repeat(100).into_response();
        capture.absorb(response, 10).await;

        let sealed = capture.seal().unwrap();
        assert_eq!(sealed.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(sealed.headers.get(ERROR_CODE_HEADER).unwrap(), "unexpected_failure");
        assert!(sealed.headers.get(CONTENT_LENGTH).is_none());
        let json: serde_json::Value = serde_json::from_slice(&sealed.body).unwrap();
        assert_eq!(json["code"], 500);
    }
}
