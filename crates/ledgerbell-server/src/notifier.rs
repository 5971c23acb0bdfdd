//! Trigger points for domain code.
//!
//! Handlers that mutate transactions, balances or fees call a [`Notifier`]
//! method after the change is committed. The call pushes a [`DomainChange`]
//! onto a broadcast channel and returns immediately; the
//! [`EventBridge`](crate::websocket::event_bridge::EventBridge) turns it into
//! events and hands them to the dispatcher.

use ledgerbell_core::{RefreshName, Target, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered changes before a slow bridge starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Final state of a transaction that an operator has acted on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Approved.
    Validated,
    /// Rejected.
    Cancelled,
}

/// A committed state change that live sessions should hear about.
///
/// This is also the body accepted by `POST /events`:
///
/// ```text
/// {"change":"transactionCreated","transactionId":17,"ownerId":42}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DomainChange {
    /// A transaction was created.
    TransactionCreated {
        /// Transaction id.
        transaction_id: i64,
        /// Owning user.
        owner_id: UserId,
        /// Created by an operator on the user's behalf.
        #[serde(default)]
        by_operator: bool,
        /// Extra payload fields.
        #[serde(default)]
        details: Map<String, Value>,
    },
    /// An operator validated or cancelled a transaction.
    TransactionStatusChanged {
        /// Transaction id.
        transaction_id: i64,
        /// Owning user.
        owner_id: UserId,
        /// New status.
        status: TransactionStatus,
        /// Extra payload fields.
        #[serde(default)]
        details: Map<String, Value>,
    },
    /// A transaction was deleted.
    TransactionDeleted {
        /// Transaction id.
        transaction_id: i64,
        /// Owning user.
        owner_id: UserId,
        /// Extra payload fields.
        #[serde(default)]
        details: Map<String, Value>,
    },
    /// A proof of payment was attached.
    ProofSubmitted {
        /// Transaction id.
        transaction_id: i64,
        /// Owning user.
        owner_id: UserId,
        /// Extra payload fields.
        #[serde(default)]
        details: Map<String, Value>,
    },
    /// The operating balance changed.
    BalanceUpdated {
        /// Extra payload fields, typically the new balance.
        #[serde(default)]
        details: Map<String, Value>,
    },
    /// A user's personal fee changed.
    PersonalFeeUpdated {
        /// User whose fee changed.
        user_id: UserId,
        /// Extra payload fields, typically the new fee.
        #[serde(default)]
        details: Map<String, Value>,
    },
    /// Ask the targeted clients to refetch one data set.
    Refresh {
        /// Refresh name; bodies may omit the `REFRESH_` prefix but not
        /// the name itself.
        name: RefreshName,
        /// Who should refresh.
        target: Target,
        /// Local event the client should re-emit.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
        /// Extra payload fields.
        #[serde(default)]
        details: Map<String, Value>,
    },
    /// Ask the targeted clients to refetch everything.
    ForceRefresh {
        /// Who should refresh.
        target: Target,
        /// Local event the client should re-emit.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
        /// Extra payload fields.
        #[serde(default)]
        details: Map<String, Value>,
    },
}

impl DomainChange {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TransactionCreated { .. } => "transactionCreated",
            Self::TransactionStatusChanged { .. } => "transactionStatusChanged",
            Self::TransactionDeleted { .. } => "transactionDeleted",
            Self::ProofSubmitted { .. } => "proofSubmitted",
            Self::BalanceUpdated { .. } => "balanceUpdated",
            Self::PersonalFeeUpdated { .. } => "personalFeeUpdated",
            Self::Refresh { .. } => "refresh",
            Self::ForceRefresh { .. } => "forceRefresh",
        }
    }
}

/// Cheap, cloneable handle for emitting [`DomainChange`]s.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: broadcast::Sender<DomainChange>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl Notifier {
    /// Create a notifier whose channel buffers `capacity` changes.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to changes (one receiver per bridge).
    pub fn subscribe(&self) -> broadcast::Receiver<DomainChange> {
        self.tx.subscribe()
    }

    /// Emit a change. Returns whether any subscriber was listening; with
    /// none the change is dropped.
    pub fn notify(&self, change: DomainChange) -> bool {
        let name = change.name();
        match self.tx.send(change) {
            Ok(receivers) => {
                debug!(change = name, receivers, "domain change emitted");
                true
            }
            Err(_) => {
                debug!(change = name, "no subscribers, domain change dropped");
                false
            }
        }
    }

    /// A transaction was created by its owner or by an operator.
    pub fn transaction_created(&self, transaction_id: i64, owner_id: UserId, by_operator: bool) {
        let _ = self.notify(DomainChange::TransactionCreated {
            transaction_id,
            owner_id,
            by_operator,
            details: Map::new(),
        });
    }

    /// A transaction was validated or cancelled.
    pub fn transaction_status_changed(
        &self,
        transaction_id: i64,
        owner_id: UserId,
        status: TransactionStatus,
    ) {
        let _ = self.notify(DomainChange::TransactionStatusChanged {
            transaction_id,
            owner_id,
            status,
            details: Map::new(),
        });
    }

    /// A transaction was deleted.
    pub fn transaction_deleted(&self, transaction_id: i64, owner_id: UserId) {
        let _ = self.notify(DomainChange::TransactionDeleted {
            transaction_id,
            owner_id,
            details: Map::new(),
        });
    }

    /// A proof of payment was attached to a transaction.
    pub fn proof_submitted(&self, transaction_id: i64, owner_id: UserId) {
        let _ = self.notify(DomainChange::ProofSubmitted {
            transaction_id,
            owner_id,
            details: Map::new(),
        });
    }

    /// The operating balance changed.
    pub fn balance_updated(&self, details: Map<String, Value>) {
        let _ = self.notify(DomainChange::BalanceUpdated { details });
    }

    /// A user's personal fee changed.
    pub fn personal_fee_updated(&self, user_id: UserId, details: Map<String, Value>) {
        let _ = self.notify(DomainChange::PersonalFeeUpdated { user_id, details });
    }

    /// Ask `target` to refetch the data set `name`.
    pub fn refresh(&self, name: RefreshName, target: Target, event: Option<String>) {
        let _ = self.notify(DomainChange::Refresh {
            name,
            target,
            event,
            details: Map::new(),
        });
    }

    /// Ask `target` to refetch everything.
    pub fn force_refresh(&self, target: Target) {
        let _ = self.notify(DomainChange::ForceRefresh {
            target,
            event: None,
            details: Map::new(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn notify_without_subscribers_is_dropped() {
        let n = Notifier::default();
        assert!(!n.notify(DomainChange::BalanceUpdated {
            details: Map::new()
        }));
    }

    #[tokio::test]
    async fn trigger_methods_reach_subscriber() {
        let n = Notifier::new(8);
        let mut rx = n.subscribe();
        n.transaction_created(17, UserId(42), false);
        n.transaction_status_changed(17, UserId(42), TransactionStatus::Validated);
        n.force_refresh(Target::admins());

        assert_matches!(
            rx.recv().await.unwrap(),
            DomainChange::TransactionCreated { transaction_id: 17, owner_id: UserId(42), by_operator: false, .. }
        );
        assert_matches!(
            rx.recv().await.unwrap(),
            DomainChange::TransactionStatusChanged { status: TransactionStatus::Validated, .. }
        );
        assert_matches!(rx.recv().await.unwrap(), DomainChange::ForceRefresh { .. });
    }

    #[test]
    fn wire_shape_is_tagged_camel_case() {
        let change = DomainChange::ProofSubmitted {
            transaction_id: 3,
            owner_id: UserId(9),
            details: Map::new(),
        };
        let v = serde_json::to_value(&change).unwrap();
        assert_eq!(v["change"], "proofSubmitted");
        assert_eq!(v["transactionId"], 3);
        assert_eq!(v["ownerId"], 9);
    }

    #[test]
    fn parse_minimal_body() {
        let change: DomainChange = serde_json::from_str(
            r#"{"change":"refresh","name":"clients","target":{"role":"admin"}}"#,
        )
        .unwrap();
        assert_matches!(
            change,
            DomainChange::Refresh { ref name, target, event: None, .. }
                if name.as_str() == "REFRESH_CLIENTS" && target == Target::admins()
        );
    }

    #[test]
    fn parse_rejects_empty_refresh_name() {
        for name in ["", "REFRESH_"] {
            let body = format!(
                r#"{{"change":"refresh","name":"{name}","target":{{"role":"admin"}}}}"#
            );
            assert!(serde_json::from_str::<DomainChange>(&body).is_err(), "{name:?}");
        }
    }

    #[test]
    fn parse_rejects_unknown_change() {
        assert!(serde_json::from_str::<DomainChange>(r#"{"change":"explode"}"#).is_err());
    }
}
