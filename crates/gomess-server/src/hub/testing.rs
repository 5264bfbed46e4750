//! Channel-backed transports and helpers for hub tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use gomess_core::{AuthenticatedIdentity, ConnectionId, TransportError, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::connection::Connection;
use super::registry::Hub;
use super::transport::{CloseCode, FrameSink, FrameSource, Inbound, Payload};
use crate::config::HubConfig;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) fn identity(sub: &str) -> AuthenticatedIdentity {
    AuthenticatedIdentity {
        user_id: UserId::from(sub),
        session_id: None,
        audience: vec!["authenticated".into()],
        role: Some("authenticated".into()),
        email: None,
        is_anonymous: false,
        expires_at: Utc.timestamp_opt(1_900_000_000, 0).unwrap(),
    }
}

pub(crate) fn hub() -> Arc<Hub> {
    hub_with_shutdown().0
}

pub(crate) fn hub_with_shutdown() -> (Arc<Hub>, CancellationToken) {
    let shutdown = CancellationToken::new();
    let hub = Hub::new(HubConfig::default(), shutdown.clone(), TaskTracker::new());
    (hub, shutdown)
}

// ─── transport ──────────────────────────────────────────────────────

/// What the writer did to the sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    Message(Payload),
    Ping,
    Close(CloseCode),
}

#[derive(Default)]
struct SinkControl {
    fail: AtomicBool,
    stall: AtomicBool,
}

pub(crate) struct MockSource {
    rx: mpsc::UnboundedReceiver<Result<Inbound, TransportError>>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn next_frame(&mut self) -> Option<Result<Inbound, TransportError>> {
        self.rx.recv().await
    }
}

pub(crate) struct MockSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
    control: Arc<SinkControl>,
}

impl MockSink {
    async fn record(&mut self, event: SinkEvent) -> Result<(), TransportError> {
        if self.control.stall.load(Ordering::Acquire) {
            std::future::pending::<()>().await;
        }
        if self.control.fail.load(Ordering::Acquire) {
            return Err(TransportError::Write("broken pipe".into()));
        }
        let _ = self.tx.send(event);
        Ok(())
    }
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, payload: &Payload) -> Result<(), TransportError> {
        self.record(SinkEvent::Message(payload.clone())).await
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.record(SinkEvent::Ping).await
    }

    async fn close(&mut self, code: CloseCode) -> Result<(), TransportError> {
        self.record(SinkEvent::Close(code)).await
    }
}

/// The remote end of a mock transport. Never closes unless told to.
pub(crate) struct MockPeer {
    inbound: mpsc::UnboundedSender<Result<Inbound, TransportError>>,
    outbound: mpsc::UnboundedReceiver<SinkEvent>,
    control: Arc<SinkControl>,
}

pub(crate) fn mock_transport() -> (MockSource, MockSink, MockPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let control = Arc::new(SinkControl::default());
    (
        MockSource { rx: in_rx },
        MockSink {
            tx: out_tx,
            control: control.clone(),
        },
        MockPeer {
            inbound: in_tx,
            outbound: out_rx,
            control,
        },
    )
}

impl MockPeer {
    pub(crate) fn push_message(&self, text: &str) {
        let _ = self.inbound.send(Ok(Inbound::Message(Payload::from(text))));
    }

    pub(crate) fn push_heartbeat(&self) {
        let _ = self.inbound.send(Ok(Inbound::Heartbeat));
    }

    pub(crate) fn push_close(&self) {
        let _ = self.inbound.send(Ok(Inbound::Close));
    }

    pub(crate) fn push_error(&self) {
        let _ = self
            .inbound
            .send(Err(TransportError::Read("connection reset".into())));
    }

    pub(crate) fn fail_writes(&self) {
        self.control.fail.store(true, Ordering::Release);
    }

    pub(crate) fn stall_writes(&self) {
        self.control.stall.store(true, Ordering::Release);
    }

    /// Next thing the writer did, or `None` if the sink was dropped or
    /// nothing happened in time.
    pub(crate) async fn next_event(&mut self) -> Option<SinkEvent> {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next message, skipping pings. `None` on close, drop, or timeout.
    pub(crate) async fn next_message(&mut self) -> Option<Payload> {
        loop {
            match self.next_event().await? {
                SinkEvent::Message(payload) => return Some(payload),
                SinkEvent::Ping => {}
                SinkEvent::Close(_) => return None,
            }
        }
    }

    /// Next close frame, skipping everything else.
    pub(crate) async fn next_close(&mut self) -> Option<CloseCode> {
        loop {
            if let SinkEvent::Close(code) = self.next_event().await? {
                return Some(code);
            }
        }
    }

    /// Whether no message arrives within `window`.
    pub(crate) async fn no_message_within(&mut self, window: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.outbound.recv()).await {
                Err(_) | Ok(None) => return true,
                Ok(Some(SinkEvent::Message(_))) => return false,
                Ok(Some(_)) => {}
            }
        }
    }
}

/// A mock peer admitted into a hub.
pub(crate) struct TestPeer {
    pub(crate) connection: Arc<Connection>,
    peer: MockPeer,
}

impl std::ops::Deref for TestPeer {
    type Target = MockPeer;

    fn deref(&self) -> &MockPeer {
        &self.peer
    }
}

impl std::ops::DerefMut for TestPeer {
    fn deref_mut(&mut self) -> &mut MockPeer {
        &mut self.peer
    }
}

pub(crate) fn admit_peer(hub: &Arc<Hub>, id: &str) -> TestPeer {
    let (source, sink, peer) = mock_transport();
    let connection = hub
        .admit(ConnectionId::from(id), identity(id), source, sink)
        .unwrap();
    TestPeer { connection, peer }
}

/// Poll `condition` until it holds, failing the test after a few seconds.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
