//! Server-side handle for one live socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ledgerbell_core::{ConnectionId, SessionKey};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Result of queueing a frame for a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for the writer task.
    Sent,
    /// The connection's buffer is full; this frame was dropped.
    Full,
    /// The writer task is gone; the socket is closed.
    Closed,
}

/// A connected client. Cloned as `Arc` into the registry; writes go through
/// a bounded channel to the connection's writer task and never block.
pub struct ClientConnection {
    /// Unique connection id.
    pub id: ConnectionId,
    /// Key this connection registered under, once the handshake completes.
    key: Mutex<Option<SessionKey>>,
    /// Send channel to the writer task.
    tx: mpsc::Sender<Arc<str>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat check.
    pub is_alive: AtomicBool,
    /// When the last pong (or any inbound frame) arrived.
    last_seen: Mutex<Instant>,
    /// Frames dropped because the buffer was full.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection handle.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<str>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            key: Mutex::new(None),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Record the key this connection registered under.
    pub fn bind_key(&self, key: SessionKey) {
        *self.key.lock() = Some(key);
    }

    /// Registered key, if the handshake has completed.
    pub fn key(&self) -> Option<SessionKey> {
        *self.key.lock()
    }

    /// Queue a text frame without waiting.
    pub fn send(&self, frame: Arc<str>) -> SendOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => SendOutcome::Sent,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Full
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Whether the writer task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or other inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound activity.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Check and reset the alive flag for the heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("key", &self.key())
            .finish_non_exhaustive()
    }
}
