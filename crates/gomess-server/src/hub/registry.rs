//! The hub registry: admission, eviction, and fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use gomess_core::{AuthenticatedIdentity, ConnectionId, RegistryConflict};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::connection::{Connection, EnqueueError};
use super::session;
use super::transport::{CloseCode, FrameSink, FrameSource, Payload};
use super::{EvictReason, HubError};
use crate::config::HubConfig;
use crate::metrics::{
    WS_ADMISSIONS_REJECTED_TOTAL, WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Result of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients whose queue accepted the payload.
    pub delivered: usize,
    /// Recipients that dropped it on a full queue.
    pub dropped: usize,
    /// Recipients evicted because they could not take it.
    pub evicted: usize,
}

/// Registry of all live connections on this process.
pub struct Hub {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    config: HubConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    count: watch::Sender<usize>,
}

impl Hub {
    /// Create a hub that stops admitting once `shutdown` is cancelled and
    /// runs its connection tasks on `tracker`.
    pub fn new(config: HubConfig, shutdown: CancellationToken, tracker: TaskTracker) -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
            config,
            shutdown,
            tracker,
            count: watch::Sender::new(0),
        })
    }

    /// Register a connection and start its read loop and writer.
    ///
    /// Refuses a key that is already registered and any admission after
    /// shutdown began. A refused transport is closed with a policy
    /// violation (or going-away) frame.
    pub fn admit<R, W>(
        self: &Arc<Self>,
        id: ConnectionId,
        identity: AuthenticatedIdentity,
        source: R,
        mut sink: W,
    ) -> Result<Arc<Connection>, HubError>
    where
        R: FrameSource,
        W: FrameSink,
    {
        let (tx, rx) = mpsc::channel(self.config.send_queue_capacity);
        let connection = Arc::new(Connection::new(id.clone(), identity, tx));

        let admitted = {
            let mut connections = self.connections.write();
            if self.shutdown.is_cancelled() {
                Err(HubError::ShuttingDown)
            } else if connections.contains_key(&id) {
                Err(HubError::Conflict(RegistryConflict { id: id.clone() }))
            } else {
                let _ = connections.insert(id.clone(), connection.clone());
                self.count.send_replace(connections.len());
                Ok(())
            }
        };

        if let Err(err) = admitted {
            let (code, label) = match err {
                HubError::ShuttingDown => (CloseCode::GoingAway, "shutting_down"),
                _ => (CloseCode::PolicyViolation, "conflict"),
            };
            warn!(conn_id = %id, error = %err, "admission refused");
            counter!(WS_ADMISSIONS_REJECTED_TOTAL, "reason" => label).increment(1);
            let close_timeout = self.config.close_timeout;
            let _ = self.tracker.spawn(async move {
                let _ = tokio::time::timeout(close_timeout, sink.close(code)).await;
            });
            return Err(err);
        }

        info!(
            conn_id = %id,
            user_id = %connection.identity().user_id,
            "connection admitted"
        );
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

        let _ = self.tracker.spawn(session::run_writer(
            self.clone(),
            connection.clone(),
            rx,
            sink,
            self.shutdown.clone(),
            self.config.clone(),
        ));
        let _ = self.tracker.spawn(session::run_read_loop(
            self.clone(),
            connection.clone(),
            source,
            self.shutdown.clone(),
        ));

        Ok(connection)
    }

    /// Remove a connection and close its transport. Unknown keys are a no-op.
    ///
    /// Returns whether a connection was removed.
    pub fn evict(&self, id: &ConnectionId) -> bool {
        let removed = {
            let mut connections = self.connections.write();
            let removed = connections.remove(id);
            self.count.send_replace(connections.len());
            removed
        };
        match removed {
            Some(connection) => {
                self.finish_eviction(&connection, EvictReason::Requested);
                true
            }
            None => false,
        }
    }

    /// Evict `connection` only if it is still the one registered under its
    /// key. A later admission under the same key is left alone.
    pub(crate) fn evict_connection(&self, connection: &Arc<Connection>, reason: EvictReason) -> bool {
        let removed = {
            let mut connections = self.connections.write();
            let current = connections
                .get(connection.id())
                .is_some_and(|registered| Arc::ptr_eq(registered, connection));
            if current {
                let _ = connections.remove(connection.id());
                self.count.send_replace(connections.len());
            }
            current
        };
        if removed {
            self.finish_eviction(connection, reason);
        } else {
            // stale handle; make sure its tasks still wind down
            let _ = connection.close();
        }
        removed
    }

    fn finish_eviction(&self, connection: &Connection, reason: EvictReason) {
        if connection.close() {
            info!(
                conn_id = %connection.id(),
                reason = reason.as_str(),
                age_ms = connection.age().as_millis() as u64,
                dropped = connection.drop_count(),
                "connection evicted"
            );
            counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
            gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        }
    }

    /// Queue `payload` for one connection.
    ///
    /// A closed recipient, or one whose queue stays full past the drop
    /// budget, is evicted.
    pub fn send(&self, id: &ConnectionId, payload: Payload) -> Result<(), HubError> {
        let connection = self
            .connections
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| HubError::NotFound(id.clone()))?;
        self.deliver(&connection, Arc::new(payload))
    }

    /// Queue `payload` for every registered connection except `sender`.
    ///
    /// Iterates a snapshot taken under the read lock. Connections evicted
    /// after the snapshot are skipped. A failing recipient is evicted and
    /// fan-out continues with the rest.
    pub fn broadcast(&self, sender: &ConnectionId, payload: Payload) -> BroadcastReport {
        let recipients: Vec<Arc<Connection>> = self
            .connections
            .read()
            .values()
            .filter(|connection| connection.id() != sender)
            .cloned()
            .collect();

        let payload = Arc::new(payload);
        let mut report = BroadcastReport::default();
        for connection in &recipients {
            if connection.is_closed() {
                continue;
            }
            match self.deliver(connection, payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(HubError::QueueFull(_)) => report.dropped += 1,
                Err(_) => report.evicted += 1,
            }
        }

        debug!(
            sender = %sender,
            bytes = payload.len(),
            delivered = report.delivered,
            dropped = report.dropped,
            evicted = report.evicted,
            "broadcast"
        );
        report
    }

    fn deliver(&self, connection: &Arc<Connection>, payload: Arc<Payload>) -> Result<(), HubError> {
        match connection.enqueue(payload) {
            Ok(()) => Ok(()),
            Err(EnqueueError::Full { consecutive }) => {
                counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                if consecutive > self.config.max_dropped_messages {
                    warn!(conn_id = %connection.id(), consecutive, "recipient too slow, evicting");
                    let _ = self.evict_connection(connection, EvictReason::SlowConsumer);
                    return Err(HubError::Evicted {
                        id: connection.id().clone(),
                        reason: EvictReason::SlowConsumer,
                    });
                }
                Err(HubError::QueueFull(connection.id().clone()))
            }
            Err(EnqueueError::Closed) => {
                let _ = self.evict_connection(connection, EvictReason::WriteError);
                Err(HubError::Evicted {
                    id: connection.id().clone(),
                    reason: EvictReason::WriteError,
                })
            }
        }
    }

    /// Force-close every registered connection. Returns how many were closed.
    pub fn close_all(&self, reason: EvictReason) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut connections = self.connections.write();
            let drained = connections.drain().map(|(_, connection)| connection).collect();
            self.count.send_replace(0);
            drained
        };
        for connection in &drained {
            self.finish_eviction(connection, reason);
        }
        drained.len()
    }

    /// Resolves once no connection is registered.
    pub async fn wait_empty(&self) {
        let mut count = self.count.subscribe();
        let _ = count.wait_for(|n| *n == 0).await;
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Keys of all registered connections.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.read().keys().cloned().collect()
    }

    /// Handle to a registered connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::testing::{
        TestPeer, admit_peer, hub, hub_with_shutdown, identity, mock_transport, wait_until,
    };
    use assert_matches::assert_matches;
    use std::time::Duration;

    // ── admission ───────────────────────────────────────────────────

    #[tokio::test]
    async fn admit_registers_connection() {
        let hub = hub();
        let _a = admit_peer(&hub, "a");
        assert_eq!(hub.connection_count(), 1);
        assert!(hub.contains(&ConnectionId::from("a")));
        assert_eq!(hub.get(&ConnectionId::from("a")).unwrap().identity().user_id.as_str(), "a");
    }

    #[tokio::test]
    async fn duplicate_admission_is_rejected() {
        let hub = hub();
        let first = admit_peer(&hub, "a");

        let (source, sink, mut second) = mock_transport();
        let result = hub.admit(ConnectionId::from("a"), identity("a"), source, sink);
        assert_matches!(result, Err(HubError::Conflict(RegistryConflict { id })) if id.as_str() == "a");

        // refused transport gets a policy-violation close, the original stays
        assert_eq!(second.next_close().await, Some(CloseCode::PolicyViolation));
        assert_eq!(hub.connection_count(), 1);
        assert!(!first.connection.is_closed());
    }

    #[tokio::test]
    async fn admission_after_shutdown_is_refused() {
        let (hub, shutdown) = hub_with_shutdown();
        shutdown.cancel();
        let (source, sink, mut peer) = mock_transport();
        let result = hub.admit(ConnectionId::from("late"), identity("late"), source, sink);
        assert_matches!(result, Err(HubError::ShuttingDown));
        assert_eq!(peer.next_close().await, Some(CloseCode::GoingAway));
        assert_eq!(hub.connection_count(), 0);
    }

    // ── eviction ────────────────────────────────────────────────────

    #[tokio::test]
    async fn evict_is_idempotent() {
        let hub = hub();
        let mut a = admit_peer(&hub, "a");
        let id = ConnectionId::from("a");

        assert!(hub.evict(&id));
        assert!(!hub.evict(&id));
        assert!(!hub.evict(&ConnectionId::from("never-admitted")));
        assert_eq!(hub.connection_count(), 0);
        assert!(a.connection.is_closed());
        assert_eq!(a.next_close().await, Some(CloseCode::Normal));
    }

    #[tokio::test]
    async fn stale_eviction_leaves_new_connection_alone() {
        let hub = hub();
        let old = admit_peer(&hub, "a");
        assert!(hub.evict(&ConnectionId::from("a")));

        let new = admit_peer(&hub, "a");
        assert!(!hub.evict_connection(&old.connection, EvictReason::ReadError));
        assert!(hub.contains(&ConnectionId::from("a")));
        assert!(!new.connection.is_closed());
    }

    // ── broadcast ───────────────────────────────────────────────────

    #[tokio::test]
    async fn broadcast_excludes_sender() {
        let hub = hub();
        let mut a = admit_peer(&hub, "a");
        let mut b = admit_peer(&hub, "b");
        let mut c = admit_peer(&hub, "c");

        let report = hub.broadcast(&ConnectionId::from("a"), Payload::from("hello"));
        assert_eq!(report.delivered, 2);

        assert_eq!(b.next_message().await, Some(Payload::from("hello")));
        assert_eq!(c.next_message().await, Some(Payload::from("hello")));
        assert!(a.no_message_within(Duration::from_millis(50)).await);
        assert!(b.no_message_within(Duration::from_millis(50)).await);
        assert!(c.no_message_within(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn inbound_message_fans_out_to_peers() {
        let hub = hub();
        let a = admit_peer(&hub, "a");
        let mut b = admit_peer(&hub, "b");
        let mut c = admit_peer(&hub, "c");

        a.push_message("hello");

        assert_eq!(b.next_message().await, Some(Payload::from("hello")));
        assert_eq!(c.next_message().await, Some(Payload::from("hello")));
    }

    #[tokio::test]
    async fn write_failure_evicts_only_that_recipient() {
        let hub = hub();
        let mut peers: Vec<TestPeer> = (0..5).map(|i| admit_peer(&hub, &format!("p{i}"))).collect();
        let sender = admit_peer(&hub, "sender");
        peers[2].fail_writes();

        let _ = hub.broadcast(sender.connection.id(), Payload::from("first"));
        wait_until(|| !hub.contains(&ConnectionId::from("p2"))).await;
        assert_eq!(hub.connection_count(), 5);

        let _ = hub.broadcast(sender.connection.id(), Payload::from("second"));
        for (i, peer) in peers.iter_mut().enumerate() {
            if i == 2 {
                continue;
            }
            assert_eq!(peer.next_message().await, Some(Payload::from("first")));
            assert_eq!(peer.next_message().await, Some(Payload::from("second")));
        }
    }

    #[tokio::test]
    async fn per_sender_order_is_preserved() {
        let hub = hub();
        let a = admit_peer(&hub, "a");
        let mut b = admit_peer(&hub, "b");
        let mut c = admit_peer(&hub, "c");

        for i in 0..50 {
            a.push_message(&format!("m{i}"));
        }
        for peer in [&mut b, &mut c] {
            for i in 0..50 {
                assert_eq!(peer.next_message().await, Some(Payload::from(format!("m{i}").as_str())));
            }
        }
    }

    #[tokio::test]
    async fn send_to_unknown_is_not_found() {
        let hub = hub();
        assert_matches!(
            hub.send(&ConnectionId::from("ghost"), Payload::from("x")),
            Err(HubError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn send_reaches_one_connection() {
        let hub = hub();
        let mut a = admit_peer(&hub, "a");
        let mut b = admit_peer(&hub, "b");
        hub.send(&ConnectionId::from("a"), Payload::from("direct")).unwrap();
        assert_eq!(a.next_message().await, Some(Payload::from("direct")));
        assert!(b.no_message_within(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted() {
        let config = HubConfig {
            send_queue_capacity: 1,
            max_dropped_messages: 2,
            ..HubConfig::default()
        };
        let hub = Hub::new(config, CancellationToken::new(), TaskTracker::new());
        let slow = admit_peer(&hub, "slow");
        slow.stall_writes();

        let mut evicted = false;
        for i in 0..10 {
            let _ = hub.send(slow.connection.id(), Payload::from(format!("{i}").as_str()));
            if !hub.contains(slow.connection.id()) {
                evicted = true;
                break;
            }
        }
        assert!(evicted);
        assert!(slow.connection.drop_count() >= 3);
    }

    // ── close_all / wait_empty ──────────────────────────────────────

    #[tokio::test]
    async fn close_all_empties_registry() {
        let hub = hub();
        let a = admit_peer(&hub, "a");
        let b = admit_peer(&hub, "b");
        assert_eq!(hub.close_all(EvictReason::Shutdown), 2);
        assert_eq!(hub.connection_count(), 0);
        assert!(a.connection.is_closed());
        assert!(b.connection.is_closed());
        tokio::time::timeout(Duration::from_secs(1), hub.wait_empty())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn peer_close_evicts_and_empties() {
        let hub = hub();
        let a = admit_peer(&hub, "a");
        let mut ids = hub.connection_ids();
        ids.sort();
        assert_eq!(ids, vec![ConnectionId::from("a")]);

        a.push_close();
        tokio::time::timeout(Duration::from_secs(1), hub.wait_empty())
            .await
            .unwrap();
        assert!(a.connection.is_closed());
    }
}
