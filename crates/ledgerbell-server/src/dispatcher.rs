//! Event fan-out to registered sessions.

use std::sync::Arc;

use ledgerbell_core::Event;
use metrics::counter;
use tracing::{debug, warn};

use crate::metrics::{
    EVENTS_DELIVERED_TOTAL, EVENTS_DROPPED_TOTAL, EVENTS_PUBLISHED_TOTAL, REGISTRY_PRUNED_TOTAL,
};
use crate::registry::SessionRegistry;
use crate::websocket::connection::SendOutcome;

/// Counts from one [`Dispatcher::publish`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Registry entries matching the target.
    pub matched: usize,
    /// Frames queued for a live connection.
    pub delivered: usize,
    /// Frames dropped because a connection's buffer was full.
    pub dropped: usize,
    /// Entries removed because their connection had closed.
    pub pruned: usize,
}

/// Resolves an event's target against the registry and writes to each match.
///
/// Delivery is best-effort and at-most-once: no retries, no queueing for
/// sessions that are not connected right now.
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `event` to every live session its target selects.
    ///
    /// Never waits on client I/O: frames are handed to each connection's
    /// bounded queue. A connection whose writer has gone away is pruned from
    /// the registry. No match is not an error.
    pub fn publish(&self, event: &Event) -> DeliveryReport {
        counter!(EVENTS_PUBLISHED_TOTAL).increment(1);

        let frame: Arc<str> = match event.to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(event_type = %event.kind, error = %e, "failed to serialize event");
                return DeliveryReport::default();
            }
        };

        // lock is held only inside lookup
        let recipients = self
            .registry
            .lookup(event.target.role, event.target.user_id);

        let mut report = DeliveryReport {
            matched: recipients.len(),
            ..DeliveryReport::default()
        };

        for conn in &recipients {
            match conn.send(frame.clone()) {
                SendOutcome::Sent => report.delivered += 1,
                SendOutcome::Full => {
                    report.dropped += 1;
                    warn!(conn_id = %conn.id, event_type = %event.kind, "client queue full, dropping event");
                }
                SendOutcome::Closed => {
                    if self.registry.remove(&conn.id).is_some() {
                        report.pruned += 1;
                    }
                    debug!(conn_id = %conn.id, "pruned closed connection");
                }
            }
        }

        counter!(EVENTS_DELIVERED_TOTAL).increment(report.delivered as u64);
        counter!(EVENTS_DROPPED_TOTAL).increment(report.dropped as u64);
        counter!(REGISTRY_PRUNED_TOTAL).increment(report.pruned as u64);
        debug!(
            event_type = %event.kind,
            target = %event.target,
            matched = report.matched,
            delivered = report.delivered,
            "published event"
        );
        report
    }
}
