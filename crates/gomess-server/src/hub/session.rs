//! Per-connection tasks: the read loop and the writer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::connection::Connection;
use super::registry::Hub;
use super::transport::{CloseCode, FrameSink, FrameSource, Inbound, Payload};
use super::EvictReason;
use crate::config::HubConfig;

/// Read inbound frames until the peer leaves or the connection is closed.
///
/// Messages are fanned out in arrival order, so one sender's messages reach
/// each recipient queue in the order they were read. After shutdown begins
/// messages are no longer forwarded but the loop keeps reading so the peer's
/// close handshake is observed.
pub(crate) async fn run_read_loop<R: FrameSource>(
    hub: Arc<Hub>,
    conn: Arc<Connection>,
    mut source: R,
    shutdown: CancellationToken,
) {
    let reason = loop {
        let frame = tokio::select! {
            biased;
            () = conn.closed() => return,
            frame = source.next_frame() => frame,
        };
        match frame {
            Some(Ok(Inbound::Message(payload))) => {
                conn.mark_alive();
                if shutdown.is_cancelled() {
                    debug!(conn_id = %conn.id(), "dropping inbound message during shutdown");
                    continue;
                }
                let _ = hub.broadcast(conn.id(), payload);
            }
            Some(Ok(Inbound::Heartbeat)) => conn.mark_alive(),
            Some(Ok(Inbound::Close)) | None => break EvictReason::PeerClosed,
            Some(Err(e)) => {
                debug!(conn_id = %conn.id(), error = %e, "read failed");
                break EvictReason::ReadError;
            }
        }
    };
    let _ = hub.evict_connection(&conn, reason);
}

/// Drain the outbound queue into the sink. The only task that writes to it.
///
/// On shutdown a going-away close frame is sent and the writer then waits for
/// the peer to leave or for the connection to be force-closed.
pub(crate) async fn run_writer<W: FrameSink>(
    hub: Arc<Hub>,
    conn: Arc<Connection>,
    mut rx: mpsc::Receiver<Arc<Payload>>,
    mut sink: W,
    shutdown: CancellationToken,
    config: HubConfig,
) {
    let mut ping = tokio::time::interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut draining = false;

    loop {
        tokio::select! {
            biased;
            () = conn.closed() => {
                if !draining {
                    let _ = tokio::time::timeout(config.close_timeout, sink.close(CloseCode::Normal)).await;
                }
                break;
            }
            () = shutdown.cancelled(), if !draining => {
                draining = true;
                match tokio::time::timeout(config.close_timeout, sink.close(CloseCode::GoingAway)).await {
                    Ok(Ok(())) => debug!(conn_id = %conn.id(), "sent going-away close"),
                    Ok(Err(e)) => debug!(conn_id = %conn.id(), error = %e, "going-away close failed"),
                    Err(_) => debug!(conn_id = %conn.id(), "going-away close timed out"),
                }
            }
            payload = rx.recv(), if !draining => {
                let Some(payload) = payload else { break };
                if conn.is_closed() {
                    continue;
                }
                let written = tokio::select! {
                    biased;
                    () = conn.closed() => continue,
                    written = sink.send(&payload) => written,
                };
                if let Err(e) = written {
                    warn!(conn_id = %conn.id(), error = %e, "write failed");
                    let _ = hub.evict_connection(&conn, EvictReason::WriteError);
                }
            }
            _ = ping.tick() => {
                let idle = conn.idle_for();
                if idle > config.heartbeat_timeout {
                    warn!(conn_id = %conn.id(), idle_ms = idle.as_millis() as u64, "heartbeat timed out");
                    let _ = hub.evict_connection(&conn, EvictReason::HeartbeatTimeout);
                } else if !draining {
                    let pinged = tokio::select! {
                        biased;
                        () = conn.closed() => continue,
                        pinged = sink.ping() => pinged,
                    };
                    if let Err(e) = pinged {
                        debug!(conn_id = %conn.id(), error = %e, "ping failed");
                        let _ = hub.evict_connection(&conn, EvictReason::WriteError);
                    }
                }
            }
        }
    }
}
