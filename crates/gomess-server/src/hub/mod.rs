//! Connection hub: the registry of live connections on this process.
//!
//! Each admitted connection gets two tasks:
//! - a read loop that owns the [`FrameSource`] and hands every inbound
//!   message to [`Hub::broadcast`]
//! - a writer that owns the [`FrameSink`] and drains the connection's
//!   bounded outbound queue, sending pings in between
//!
//! All cross-connection writes go through [`Hub::send`]/[`Hub::broadcast`],
//! which only enqueue. The writer task is the single writer of its socket.

mod connection;
mod registry;
mod session;
pub mod transport;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;

use gomess_core::{ConnectionId, RegistryConflict};
use thiserror::Error;

pub use connection::Connection;
pub use registry::{BroadcastReport, Hub};
pub use transport::{CloseCode, FrameSink, FrameSource, Inbound, Payload};

/// Why a connection left the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvictReason {
    /// Peer sent a close frame or the stream ended.
    PeerClosed,
    /// Reading from the transport failed.
    ReadError,
    /// Writing to the transport failed or its queue was gone.
    WriteError,
    /// Outbound queue stayed full for too long.
    SlowConsumer,
    /// No frame from the peer within the heartbeat timeout.
    HeartbeatTimeout,
    /// Forced close at the end of the shutdown grace period.
    Shutdown,
    /// Explicit [`Hub::evict`] call.
    Requested,
}

impl EvictReason {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadError => "read_error",
            Self::WriteError => "write_error",
            Self::SlowConsumer => "slow_consumer",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Shutdown => "shutdown",
            Self::Requested => "requested",
        }
    }
}

impl std::fmt::Display for EvictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hub operation failures.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HubError {
    /// The key is held by a live connection.
    #[error(transparent)]
    Conflict(#[from] RegistryConflict),
    /// Shutdown has begun; no new connections are admitted.
    #[error("hub is shutting down")]
    ShuttingDown,
    /// No connection is registered under the key.
    #[error("connection {0} is not registered")]
    NotFound(ConnectionId),
    /// The recipient could not take the message and was evicted.
    #[error("connection {id} was evicted: {reason}")]
    Evicted {
        /// Recipient key.
        id: ConnectionId,
        /// Why it was evicted.
        reason: EvictReason,
    },
    /// The recipient's queue is full; the message was dropped.
    #[error("outbound queue of {0} is full")]
    QueueFull(ConnectionId),
}
