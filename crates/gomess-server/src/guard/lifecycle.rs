//! Deadline-bounded execution of one request handler.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures::FutureExt;
use metrics::counter;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::capture::{BufferedResponse, ResponseCapture};
use super::recover::panic_message;
use crate::metrics::{HTTP_HANDLER_PANICS_TOTAL, HTTP_LATE_OUTPUTS_DISCARDED_TOTAL};

/// How a guarded request ended. Exactly one is produced per request.
#[derive(Debug)]
pub enum LifecycleOutcome {
    /// Handler finished first; its sealed output.
    Completed(BufferedResponse),
    /// Handler panicked before the deadline.
    Panicked(String),
    /// Deadline fired before the handler finished.
    DeadlineExceeded,
}

/// What the handler gets: somewhere to write and a signal to stop.
#[derive(Clone)]
pub struct RequestScope {
    capture: ResponseCapture,
    cancel: CancellationToken,
}

impl RequestScope {
    /// The capture standing in for the real response.
    pub fn capture(&self) -> &ResponseCapture {
        &self.capture
    }

    /// Cancelled when the deadline fires or shutdown begins.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

const OPEN: u8 = 0;
const HANDLER: u8 = 1;
const DEADLINE: u8 = 2;

/// One-shot latch deciding which side commits the response.
#[derive(Debug, Default)]
struct CommitLatch(AtomicU8);

impl CommitLatch {
    fn try_claim(&self, side: u8) -> bool {
        self.0
            .compare_exchange(OPEN, side, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Runs handlers against a deadline.
///
/// The handler runs as its own task on the tracker and is never aborted.
/// If the deadline wins, the handler's cancellation token fires and whatever
/// it produces later is dropped. If shutdown is observed first, the guard
/// waits for the handler and commits its output.
#[derive(Clone, Debug)]
pub struct LifecycleGuard {
    deadline: Duration,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl LifecycleGuard {
    /// Guard with the given per-request deadline.
    pub fn new(deadline: Duration, shutdown: CancellationToken, tracker: TaskTracker) -> Self {
        Self {
            deadline,
            shutdown,
            tracker,
        }
    }

    /// Per-request deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run `handler` and race it against the deadline.
    pub async fn run<F, Fut>(&self, handler: F) -> LifecycleOutcome
    where
        F: FnOnce(RequestScope) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let latch = Arc::new(CommitLatch::default());
        let cancel = self.shutdown.child_token();
        let scope = RequestScope {
            capture: ResponseCapture::new(),
            cancel: cancel.clone(),
        };
        let (tx, mut rx) = oneshot::channel();

        let task_latch = latch.clone();
        let _ = self.tracker.spawn(async move {
            let capture = scope.capture.clone();
            let result = AssertUnwindSafe(async move { handler(scope).await })
                .catch_unwind()
                .await;
            let claimed = task_latch.try_claim(HANDLER);
            match (result, claimed) {
                (Ok(()), true) => {
                    let outcome = match capture.seal() {
                        Some(buffered) => LifecycleOutcome::Completed(buffered),
                        None => LifecycleOutcome::Panicked("response flushed twice".into()),
                    };
                    let _ = tx.send(outcome);
                }
                (Err(payload), true) => {
                    let _ = tx.send(LifecycleOutcome::Panicked(panic_message(&*payload)));
                }
                (Ok(()), false) => {
                    debug!("late handler output discarded");
                    counter!(HTTP_LATE_OUTPUTS_DISCARDED_TOTAL).increment(1);
                }
                (Err(payload), false) => {
                    warn!(panic = %panic_message(&*payload), "absorbed handler panic after deadline");
                    counter!(HTTP_HANDLER_PANICS_TOTAL, "phase" => "late").increment(1);
                }
            }
        });

        tokio::select! {
            biased;
            outcome = &mut rx => received(outcome),
            () = tokio::time::sleep(self.deadline) => {
                if latch.try_claim(DEADLINE) {
                    cancel.cancel();
                    return LifecycleOutcome::DeadlineExceeded;
                }
                // handler claimed first; its outcome is on the way
                received(rx.await)
            }
            () = self.shutdown.cancelled() => {
                debug!("shutdown during request, waiting for handler");
                received(rx.await)
            }
        }
    }
}

fn received(result: Result<LifecycleOutcome, oneshot::error::RecvError>) -> LifecycleOutcome {
    result.unwrap_or_else(|_| LifecycleOutcome::Panicked("handler task ended without reporting".into()))
}
