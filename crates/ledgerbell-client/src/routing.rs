//! Event type to client effect table.

use ledgerbell_core::{EventKind, EventMessage};
use serde_json::Value;

/// Local event emitted when a balance change should update the UI.
pub const BALANCE_EVENT: &str = "balance-updated";
/// Local event emitted when the pending count should be refetched.
pub const PENDING_REFRESH_EVENT: &str = "pending-count-refresh";
/// Local event carrying a toast message.
pub const TOAST_EVENT: &str = "toast";

/// Cached data sets an event can make stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Transaction lists and details.
    Transactions,
    /// Dashboard statistics.
    Stats,
    /// Operating balance.
    Balance,
    /// Operator settings.
    Settings,
    /// The current user's profile (fees included).
    Profile,
    /// Number of transactions awaiting an operator.
    PendingCount,
}

/// One thing the consumer does in response to an event.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Unread counter +1.
    IncrementUnread,
    /// Pending counter +1.
    IncrementPending,
    /// Sound + banner.
    Alert(String),
    /// Mark a cache stale.
    Invalidate(CacheKey),
    /// Refetch the pending count.
    RefreshPending,
    /// Short notice for the user.
    Toast(String),
    /// Re-emit on the local event bus.
    EmitLocal {
        /// Local event name.
        name: String,
        /// Original payload.
        payload: Value,
    },
}

/// Effects for one inbound event. Unknown types produce none.
pub fn route(msg: &EventMessage) -> Vec<Effect> {
    match &msg.kind {
        kind if kind.is_high_priority() => vec![
            Effect::IncrementUnread,
            Effect::IncrementPending,
            Effect::Alert(msg.message.clone()),
            Effect::Invalidate(CacheKey::Transactions),
        ],
        EventKind::ProofSubmitted => vec![Effect::Invalidate(CacheKey::Transactions)],
        EventKind::TransactionValidated
        | EventKind::TransactionCancelled
        | EventKind::TransactionDeleted => vec![
            Effect::Invalidate(CacheKey::Transactions),
            Effect::Invalidate(CacheKey::Stats),
            Effect::RefreshPending,
        ],
        EventKind::BalanceUpdated => vec![
            Effect::Invalidate(CacheKey::Balance),
            Effect::Invalidate(CacheKey::Settings),
            Effect::EmitLocal {
                name: BALANCE_EVENT.to_owned(),
                payload: msg.payload_value(),
            },
        ],
        EventKind::PersonalFeeUpdated => vec![
            Effect::Invalidate(CacheKey::Profile),
            Effect::Toast(msg.message.clone()),
        ],
        EventKind::ForceRefresh | EventKind::Refresh(_) => vec![Effect::EmitLocal {
            name: msg.local_event_name().to_owned(),
            payload: msg.payload_value(),
        }],
        _ => Vec::new(),
    }
}
