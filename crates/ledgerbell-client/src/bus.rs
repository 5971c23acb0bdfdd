//! In-process event bus for UI components.

use serde_json::Value;
use tokio::sync::broadcast;

/// A named event re-emitted from an inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalEvent {
    /// Event name listeners match on.
    pub name: String,
    /// The inbound event's payload.
    pub payload: Value,
}

/// Fan-out of [`LocalEvent`]s to any number of listeners.
#[derive(Clone, Debug)]
pub struct LocalEventBus {
    tx: broadcast::Sender<LocalEvent>,
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl LocalEventBus {
    /// A bus buffering `capacity` events per slow listener.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Listen for events.
    pub fn subscribe(&self) -> broadcast::Receiver<LocalEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Returns how many listeners received it.
    pub fn emit(&self, name: impl Into<String>, payload: Value) -> usize {
        self.tx
            .send(LocalEvent {
                name: name.into(),
                payload,
            })
            .unwrap_or(0)
    }
}
