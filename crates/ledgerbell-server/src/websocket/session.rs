//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use ledgerbell_core::ConnectionId;
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handshake::{Handshake, InboundOutcome};
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::registry::SessionRegistry;

/// Everything a session needs from the server.
#[derive(Clone)]
pub struct SessionContext {
    /// Shared session directory.
    pub registry: Arc<SessionRegistry>,
    /// Open sockets, registered or not.
    pub live_connections: Arc<AtomicUsize>,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Silence allowed before the connection is closed.
    pub heartbeat_timeout: Duration,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
}

/// Run a WebSocket session for a connected client.
///
/// 1. Spawns a writer task that drains the connection's queue and pings
/// 2. Spawns a heartbeat that closes the session after prolonged silence
/// 3. Feeds inbound frames to the registration handshake
/// 4. Removes the registry entry on disconnect
#[instrument(skip_all, fields(conn_id))]
pub async fn run_ws_session(ws: WebSocket, ctx: SessionContext) {
    let conn_id = ConnectionId::new();
    let _ = tracing::Span::current().record("conn_id", conn_id.as_str());
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<str>>(ctx.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(conn_id, send_tx));
    let cancel = ctx.shutdown.child_token();

    let live = ctx.live_connections.fetch_add(1, Ordering::Relaxed) + 1;
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(live, "client connected");

    // Outbound: queued frames plus periodic pings. Dropping `send_rx` on exit
    // is what makes the dispatcher see this connection as closed.
    let writer_cancel = cancel.clone();
    let ping_every = ctx.heartbeat_interval;
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_every);
        let _ = ping.tick().await;
        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        writer_cancel.cancel();
    });

    let heartbeat_cancel = cancel.clone();
    let heartbeat = tokio::spawn(run_heartbeat(
        connection.clone(),
        ctx.heartbeat_interval,
        ctx.heartbeat_timeout,
        cancel.clone(),
    ));
    let heartbeat = tokio::spawn(async move {
        if let Ok(HeartbeatResult::TimedOut) = heartbeat.await {
            warn!("client unresponsive, closing");
            heartbeat_cancel.cancel();
        }
    });

    let mut handshake = Handshake::new();
    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = cancel.cancelled() => break,
        };
        let outcome = match msg {
            Some(Ok(Message::Text(text))) => {
                connection.mark_alive();
                handshake.on_text(text.as_str())
            }
            Some(Ok(Message::Binary(data))) => {
                connection.mark_alive();
                handshake.on_binary(&data)
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                connection.mark_alive();
                continue;
            }
            Some(Ok(Message::Close(_))) => {
                debug!("client sent close frame");
                break;
            }
            Some(Err(e)) => {
                debug!(error = %e, "websocket read error");
                break;
            }
            None => break,
        };

        match outcome {
            InboundOutcome::Register(key) => {
                match ctx.registry.register(key, connection.clone()) {
                    Some(old) => info!(%key, superseded = %old.id, "session registered"),
                    None => info!(%key, "session registered"),
                }
            }
            InboundOutcome::Rejected(e) => warn!(error = %e, "ignoring client frame"),
            InboundOutcome::Ignored => debug!("ignoring frame after registration"),
        }
    }

    let key = handshake.close();
    let removed = ctx.registry.remove(&connection.id);
    cancel.cancel();
    let _ = writer.await;
    let _ = heartbeat.await;

    let live = ctx.live_connections.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    info!(
        key = ?key,
        was_current = removed.is_some(),
        dropped = connection.drop_count(),
        live,
        "client disconnected"
    );
}
