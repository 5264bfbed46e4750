//! Transport seam between the hub and a concrete socket.
//!
//! A transport is split in two halves: the [`FrameSource`] is owned by the
//! connection's read loop, the [`FrameSink`] by its writer task. Nothing
//! else touches either half.

use async_trait::async_trait;
use bytes::Bytes;
use gomess_core::TransportError;

/// Opaque message payload, forwarded to peers unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

impl Payload {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

/// One inbound frame as seen by the read loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Application message to fan out.
    Message(Payload),
    /// Ping or pong; proves the peer is alive.
    Heartbeat,
    /// Peer started the close handshake.
    Close,
}

/// Close frame status sent to the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000: the connection was evicted.
    Normal,
    /// 1001: the server is shutting down.
    GoingAway,
    /// 1008: admission was refused.
    PolicyViolation,
}

impl CloseCode {
    /// RFC 6455 status code.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::PolicyViolation => 1008,
        }
    }

    /// Short reason text sent with the frame.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Normal => "closed",
            Self::GoingAway => "server shutting down",
            Self::PolicyViolation => "connection refused",
        }
    }
}

/// Read half of a transport.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Wait for the next inbound frame. `None` means the stream ended.
    async fn next_frame(&mut self) -> Option<Result<Inbound, TransportError>>;
}

/// Write half of a transport.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write one message frame.
    async fn send(&mut self, payload: &Payload) -> Result<(), TransportError>;

    /// Write a ping frame.
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Send a close frame and release the write half.
    async fn close(&mut self, code: CloseCode) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_len() {
        assert_eq!(Payload::from("hello").len(), 5);
        assert!(Payload::Binary(Bytes::new()).is_empty());
    }

    #[test]
    fn close_codes() {
        assert_eq!(CloseCode::Normal.as_u16(), 1000);
        assert_eq!(CloseCode::GoingAway.as_u16(), 1001);
        assert_eq!(CloseCode::PolicyViolation.as_u16(), 1008);
        assert_eq!(CloseCode::GoingAway.reason(), "server shutting down");
    }
}
