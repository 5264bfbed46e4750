//! [`FrameSource`]/[`FrameSink`] over an axum [`WebSocket`].

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use gomess_core::TransportError;

use super::transport::{CloseCode, FrameSink, FrameSource, Inbound, Payload};

/// Read half of an upgraded socket.
pub struct WsSource(SplitStream<WebSocket>);

/// Write half of an upgraded socket.
pub struct WsSink(SplitSink<WebSocket, Message>);

/// Split an upgraded socket into hub transport halves.
pub fn split(socket: WebSocket) -> (WsSource, WsSink) {
    let (sink, stream) = socket.split();
    (WsSource(stream), WsSink(sink))
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<Inbound, TransportError>> {
        let message = match self.0.next().await? {
            Ok(message) => message,
            Err(e) => return Some(Err(TransportError::Read(e.to_string()))),
        };
        let inbound = match message {
            Message::Text(text) => Inbound::Message(Payload::Text(text.as_str().to_owned())),
            Message::Binary(data) => Inbound::Message(Payload::Binary(data)),
            Message::Ping(_) | Message::Pong(_) => Inbound::Heartbeat,
            Message::Close(_) => Inbound::Close,
        };
        Some(Ok(inbound))
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, payload: &Payload) -> Result<(), TransportError> {
        let message = match payload {
            Payload::Text(text) => Message::Text(text.as_str().into()),
            Payload::Binary(data) => Message::Binary(data.clone()),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.0
            .send(Message::Ping(bytes::Bytes::new()))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&mut self, code: CloseCode) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: code.as_u16(),
            reason: code.reason().into(),
        };
        self.0
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))?;
        self.0
            .close()
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}
