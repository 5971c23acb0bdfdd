//! Async connection loop over tokio-tungstenite.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use ledgerbell_core::ProtocolError;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::consumer::{ConnectionStatus, EventConsumer};
use crate::machine::{ConnectionMachine, Identity};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a connection ended.
#[derive(Debug, PartialEq, Eq)]
enum Ended {
    /// Closed by the server or the network.
    Closed,
    /// Torn down locally.
    Cancelled,
}

/// Running consumer. Dropping the handle tears the connection down.
pub struct ClientHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ClientHandle {
    /// Tear down and wait for the connection loop to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start consuming events for `identity` in a background task.
pub fn spawn(config: ClientConfig, identity: Identity, consumer: Arc<EventConsumer>) -> ClientHandle {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(config, identity, consumer, cancel.clone()));
    ClientHandle {
        cancel,
        task: Some(task),
    }
}

/// Connect, register, consume; reconnect after the configured delay on
/// every close until `cancel` fires.
#[instrument(skip_all, fields(endpoint = %config.endpoint, user_id = %identity.user_id, role = %identity.role))]
pub async fn run(
    config: ClientConfig,
    identity: Identity,
    consumer: Arc<EventConsumer>,
    cancel: CancellationToken,
) {
    let mut machine = ConnectionMachine::new(config.reconnect_delay);
    machine.login(identity);

    while machine.connect() {
        consumer.set_status(ConnectionStatus::Connecting);
        let connected = tokio::select! {
            r = connect_async(config.endpoint.as_str()) => r,
            () = cancel.cancelled() => break,
        };
        match connected {
            Ok((ws, _)) => {
                info!("connected");
                if consume(ws, &mut machine, &consumer, &cancel).await == Ended::Cancelled {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
                machine.on_error();
            }
        }

        consumer.set_status(ConnectionStatus::Disconnected);
        let Some(deadline) = machine.on_close(Instant::now()) else {
            break;
        };
        info!(delay_ms = config.reconnect_delay.as_millis(), "disconnected, reconnect scheduled");
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => {
                let _ = machine.take_due(Instant::now());
            }
            () = cancel.cancelled() => break,
        }
    }

    let _ = machine.teardown();
    consumer.set_status(ConnectionStatus::Disconnected);
    debug!("event consumer stopped");
}

async fn consume(
    ws: WsStream,
    machine: &mut ConnectionMachine,
    consumer: &EventConsumer,
    cancel: &CancellationToken,
) -> Ended {
    let (mut tx, mut rx) = ws.split();

    if let Some(register) = machine.on_open() {
        let sent = match register.to_json() {
            Ok(json) => tx.send(Message::text(json)).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = sent {
            warn!(error = %e, "failed to send registration");
            machine.on_error();
            return Ended::Closed;
        }
    }
    consumer.set_status(ConnectionStatus::Connected);

    loop {
        let frame = tokio::select! {
            f = rx.next() => f,
            () = cancel.cancelled() => {
                let _ = tx.send(Message::Close(None)).await;
                return Ended::Cancelled;
            }
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                let _ = consumer.handle_text(text.as_str());
            }
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    let _ = consumer.handle_text(text);
                }
                Err(_) => {
                    let e = ProtocolError::NotUtf8 { len: data.len() };
                    warn!(error = %e, "discarding frame");
                }
            },
            Some(Ok(Message::Close(_))) | None => {
                debug!("server closed connection");
                return Ended::Closed;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "transport error");
                machine.on_error();
                return Ended::Closed;
            }
        }
    }
}
