//! State of one live connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use gomess_core::{AuthenticatedIdentity, ConnectionId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::transport::Payload;

/// Why a payload could not be queued.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EnqueueError {
    /// Queue full; `consecutive` drops so far without a successful enqueue.
    Full { consecutive: u64 },
    /// Connection closed or its writer is gone.
    Closed,
}

/// A registered connection.
///
/// Owned by its read loop; the hub holds a shared handle for fan-out.
pub struct Connection {
    id: ConnectionId,
    identity: AuthenticatedIdentity,
    tx: mpsc::Sender<Arc<Payload>>,
    closed: AtomicBool,
    close_token: CancellationToken,
    connected_at: Instant,
    last_seen: Mutex<Instant>,
    consecutive_drops: AtomicU64,
    dropped_messages: AtomicU64,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        identity: AuthenticatedIdentity,
        tx: mpsc::Sender<Arc<Payload>>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity,
            tx,
            closed: AtomicBool::new(false),
            close_token: CancellationToken::new(),
            connected_at: now,
            last_seen: Mutex::new(now),
            consecutive_drops: AtomicU64::new(0),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Registry key.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Identity the connection was admitted with.
    pub fn identity(&self) -> &AuthenticatedIdentity {
        &self.identity
    }

    /// Whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.close_token.cancelled().await;
    }

    /// Close the connection. Returns `true` for the call that closed it.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.close_token.cancel();
        true
    }

    /// Queue a payload for the writer task without waiting.
    pub(crate) fn enqueue(&self, payload: Arc<Payload>) -> Result<(), EnqueueError> {
        if self.is_closed() {
            return Err(EnqueueError::Closed);
        }
        match self.tx.try_send(payload) {
            Ok(()) => {
                self.consecutive_drops.store(0, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                let consecutive = self.consecutive_drops.fetch_add(1, Ordering::Relaxed) + 1;
                Err(EnqueueError::Full { consecutive })
            }
            Err(TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound frame (or admission).
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Time since admission.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Total payloads dropped on a full queue.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.identity.user_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
