//! Graceful shutdown coordination via `CancellationToken`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::hub::{EvictReason, Hub};

/// Default drain budget before transports are force-closed.
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// How a graceful shutdown ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Everything drained within the grace period.
    Drained {
        /// Time from the trigger to the last task finishing.
        elapsed: Duration,
    },
    /// The grace period ran out and remaining connections were force-closed.
    GraceElapsed {
        /// Connections still registered when the grace period ran out.
        forced_connections: usize,
        /// Time from the trigger to the force-close.
        elapsed: Duration,
    },
}

/// Coordinates graceful shutdown across the listener, guarded requests and
/// the hub.
///
/// Owns the process-wide cancellation token and the tracker every connection
/// and guarded handler task is spawned on. Tasks are never aborted; after the
/// grace period only transports are closed.
#[derive(Clone, Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
    grace: Duration,
}

impl ShutdownCoordinator {
    /// Create a coordinator with the given grace period.
    pub fn new(grace: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            grace,
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker for connection and handler tasks.
    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// Drain budget.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Shut down and wait for the drain.
    ///
    /// 1. Cancel the token: the listener stops accepting, the hub refuses
    ///    admissions and sends going-away frames, guarded requests finish
    /// 2. Wait up to the grace period for `handles`, an empty hub, and every
    ///    tracked task
    /// 3. If the grace period runs out, force-close the remaining transports
    pub async fn graceful_shutdown(&self, hub: &Arc<Hub>, handles: Vec<JoinHandle<()>>) -> ShutdownOutcome {
        let start = Instant::now();
        self.shutdown();
        let _ = self.tracker.close();
        info!(
            task_count = handles.len(),
            connections = hub.connection_count(),
            grace_ms = self.grace.as_millis() as u64,
            "shutdown started, draining"
        );

        let drain = async {
            let _ = futures::future::join_all(handles).await;
            hub.wait_empty().await;
            self.tracker.wait().await;
        };

        if tokio::time::timeout(self.grace, drain).await.is_ok() {
            let elapsed = start.elapsed();
            info!(elapsed_ms = elapsed.as_millis() as u64, "shutdown drained");
            return ShutdownOutcome::Drained { elapsed };
        }

        let forced_connections = hub.close_all(EvictReason::Shutdown);
        let elapsed = start.elapsed();
        warn!(
            forced_connections,
            in_flight_tasks = self.tracker.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "grace period elapsed, transports force-closed"
        );
        ShutdownOutcome::GraceElapsed {
            forced_connections,
            elapsed,
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}
