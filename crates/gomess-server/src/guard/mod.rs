//! Request Lifecycle Guard.
//!
//! Every guarded request runs its handler as a separate task that writes into
//! a [`ResponseCapture`]. The guard races that task against the request
//! deadline and the shutdown signal; a [`LifecycleOutcome`] says who won and
//! a one-shot latch makes sure only the winner's response is committed.

mod capture;
mod layer;
mod lifecycle;
mod recover;

pub use capture::{BufferedResponse, ResponseCapture};
pub use layer::{RequestCancellation, RequestGuard, guard_request};
pub use lifecycle::{LifecycleGuard, LifecycleOutcome, RequestScope};
pub use recover::{handle_panic, panic_message, recovered_panic};
