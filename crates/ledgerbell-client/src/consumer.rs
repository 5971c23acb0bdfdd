//! Applies inbound events to client state.

use std::sync::Arc;

use ledgerbell_core::EventMessage;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::alert::Alerter;
use crate::bus::LocalEventBus;
use crate::routing::{CacheKey, Effect, PENDING_REFRESH_EVENT, TOAST_EVENT, route};

/// Connection indicator shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No transport.
    Disconnected,
    /// Opening.
    Connecting,
    /// Open and registered.
    Connected,
}

/// Marks cached data stale so the next read refetches it.
pub trait CacheInvalidator: Send + Sync {
    /// Invalidate `key`.
    fn invalidate(&self, key: CacheKey);
}

/// Logs invalidations; for consumers without a cache.
#[derive(Debug, Default)]
pub struct LogInvalidator;

impl CacheInvalidator for LogInvalidator {
    fn invalidate(&self, key: CacheKey) {
        debug!(?key, "cache invalidated");
    }
}

/// Badge counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    /// Notifications not yet seen.
    pub unread: u32,
    /// Transactions awaiting an operator.
    pub pending: u32,
}

/// Turns decoded events into counter updates, cache invalidations, alerts
/// and local events. Shared by `Arc` between the driver and the UI.
pub struct EventConsumer {
    counters: Mutex<Counters>,
    status: watch::Sender<ConnectionStatus>,
    invalidator: Arc<dyn CacheInvalidator>,
    alerter: Alerter,
    bus: LocalEventBus,
}

impl EventConsumer {
    /// Create a consumer.
    pub fn new(invalidator: Arc<dyn CacheInvalidator>, alerter: Alerter, bus: LocalEventBus) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            counters: Mutex::new(Counters::default()),
            status,
            invalidator,
            alerter,
            bus,
        }
    }

    /// Decode and apply a text frame. Frames that fail to decode are logged
    /// and dropped.
    pub fn handle_text(&self, text: &str) -> Vec<Effect> {
        match EventMessage::parse(text) {
            Ok(msg) => self.handle(&msg),
            Err(e) => {
                warn!(error = %e, "discarding undecodable event");
                Vec::new()
            }
        }
    }

    /// Apply a decoded event. Returns the effects applied.
    pub fn handle(&self, msg: &EventMessage) -> Vec<Effect> {
        let effects = route(msg);
        if effects.is_empty() {
            debug!(event_type = %msg.kind, "ignoring event");
        }
        for effect in &effects {
            self.apply(effect);
        }
        effects
    }

    fn apply(&self, effect: &Effect) {
        match effect {
            Effect::IncrementUnread => {
                let mut c = self.counters.lock();
                c.unread = c.unread.saturating_add(1);
            }
            Effect::IncrementPending => {
                let mut c = self.counters.lock();
                c.pending = c.pending.saturating_add(1);
            }
            Effect::Alert(message) => {
                let outcome = self.alerter.trigger(message);
                info!(text = %message, sound = outcome.sound, "alert");
            }
            Effect::Invalidate(key) => self.invalidator.invalidate(*key),
            Effect::RefreshPending => {
                self.invalidator.invalidate(CacheKey::PendingCount);
                let _ = self.bus.emit(PENDING_REFRESH_EVENT, json!({}));
            }
            Effect::Toast(message) => {
                info!(text = %message, "toast");
                let _ = self.bus.emit(TOAST_EVENT, json!({ "message": message }));
            }
            Effect::EmitLocal { name, payload } => {
                let _ = self.bus.emit(name.clone(), payload.clone());
            }
        }
    }

    /// Current counters.
    pub fn counters(&self) -> Counters {
        *self.counters.lock()
    }

    /// Reset unread to zero.
    pub fn mark_all_read(&self) {
        self.counters.lock().unread = 0;
    }

    /// Apply a refetched pending count.
    pub fn set_pending(&self, pending: u32) {
        self.counters.lock().pending = pending;
    }

    /// Update the connection indicator.
    pub fn set_status(&self, status: ConnectionStatus) {
        let _ = self.status.send_replace(status);
    }

    /// Watch the connection indicator.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// The local event bus.
    pub fn bus(&self) -> &LocalEventBus {
        &self.bus
    }

    /// The alerter.
    pub fn alerter(&self) -> &Alerter {
        &self.alerter
    }
}
