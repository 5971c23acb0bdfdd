//! Event bridge: turns [`DomainChange`]s from the notifier channel into
//! addressed [`Event`]s and publishes them through the [`Dispatcher`].

use std::sync::Arc;

use ledgerbell_core::events::LOCAL_EVENT_FIELD;
use ledgerbell_core::{Event, EventKind, Target, UserId};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::notifier::{DomainChange, TransactionStatus};

/// Bridges domain changes to connected clients.
pub struct EventBridge {
    rx: broadcast::Receiver<DomainChange>,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
}

impl EventBridge {
    /// Create a new event bridge.
    pub fn new(
        rx: broadcast::Receiver<DomainChange>,
        dispatcher: Arc<Dispatcher>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            dispatcher,
            cancel,
        }
    }

    /// Run the bridge loop. Exits on cancellation or when every notifier
    /// handle has been dropped.
    #[tracing::instrument(skip_all, name = "event_bridge")]
    pub async fn run(mut self) {
        loop {
            let received = tokio::select! {
                r = self.rx.recv() => r,
                () = self.cancel.cancelled() => {
                    tracing::debug!("event bridge cancelled");
                    break;
                }
            };
            match received {
                Ok(change) => {
                    for event in events_for(&change) {
                        let report = self.dispatcher.publish(&event);
                        tracing::debug!(
                            change = change.name(),
                            event_type = %event.kind,
                            target = %event.target,
                            recipients = report.delivered,
                            "bridged domain change"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event bridge lagged, changes skipped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("notifier closed, event bridge exiting");
                    break;
                }
            }
        }
    }
}

fn transaction_payload(
    transaction_id: i64,
    owner_id: UserId,
    details: &Map<String, Value>,
) -> Map<String, Value> {
    let mut payload = details.clone();
    let _ = payload.insert("transactionId".into(), transaction_id.into());
    let _ = payload.insert("userId".into(), owner_id.get().into());
    payload
}

fn refresh_payload(event: Option<&String>, details: &Map<String, Value>) -> Map<String, Value> {
    let mut payload = details.clone();
    if let Some(name) = event {
        let _ = payload.insert(LOCAL_EVENT_FIELD.into(), name.clone().into());
    }
    payload
}

/// Map a change to the events it produces, each with its target.
///
/// Status changes and deletions notify both the admin dashboards and the
/// owning user, so they produce two events.
pub fn events_for(change: &DomainChange) -> Vec<Event> {
    match change {
        DomainChange::TransactionCreated {
            transaction_id,
            owner_id,
            by_operator,
            details,
        } => {
            let kind = if *by_operator {
                EventKind::TransactionCreated
            } else {
                EventKind::NewTransaction
            };
            vec![Event::new(
                kind,
                format!("New transaction #{transaction_id}"),
                transaction_payload(*transaction_id, *owner_id, details),
                Target::admins(),
            )]
        }
        DomainChange::TransactionStatusChanged {
            transaction_id,
            owner_id,
            status,
            details,
        } => {
            let (kind, verb) = match status {
                TransactionStatus::Validated => (EventKind::TransactionValidated, "validated"),
                TransactionStatus::Cancelled => (EventKind::TransactionCancelled, "cancelled"),
            };
            let event = Event::new(
                kind,
                format!("Transaction #{transaction_id} {verb}"),
                transaction_payload(*transaction_id, *owner_id, details),
                Target::admins(),
            );
            let owner = event.retarget(Target::user(*owner_id));
            vec![event, owner]
        }
        DomainChange::TransactionDeleted {
            transaction_id,
            owner_id,
            details,
        } => {
            let event = Event::new(
                EventKind::TransactionDeleted,
                format!("Transaction #{transaction_id} deleted"),
                transaction_payload(*transaction_id, *owner_id, details),
                Target::admins(),
            );
            let owner = event.retarget(Target::user(*owner_id));
            vec![event, owner]
        }
        DomainChange::ProofSubmitted {
            transaction_id,
            owner_id,
            details,
        } => vec![Event::new(
            EventKind::ProofSubmitted,
            format!("Proof received for transaction #{transaction_id}"),
            transaction_payload(*transaction_id, *owner_id, details),
            Target::user(*owner_id),
        )],
        DomainChange::BalanceUpdated { details } => vec![Event::new(
            EventKind::BalanceUpdated,
            "Balance updated",
            details.clone(),
            Target::admins(),
        )],
        DomainChange::PersonalFeeUpdated { user_id, details } => {
            let mut payload = details.clone();
            let _ = payload.insert("userId".into(), user_id.get().into());
            vec![Event::new(
                EventKind::PersonalFeeUpdated,
                "Your personal fee has been updated",
                payload,
                Target::user(*user_id),
            )]
        }
        DomainChange::Refresh {
            name,
            target,
            event,
            details,
        } => vec![Event::new(
            EventKind::refresh(name),
            "",
            refresh_payload(event.as_ref(), details),
            *target,
        )],
        DomainChange::ForceRefresh {
            target,
            event,
            details,
        } => vec![Event::new(
            EventKind::ForceRefresh,
            "",
            refresh_payload(event.as_ref(), details),
            *target,
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::Notifier;
    use crate::registry::SessionRegistry;
    use crate::websocket::connection::ClientConnection;
    use ledgerbell_core::{RefreshName, SessionKey};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn details(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn user_created_transaction_is_new_transaction_for_admins() {
        let events = events_for(&DomainChange::TransactionCreated {
            transaction_id: 17,
            owner_id: UserId(42),
            by_operator: false,
            details: details(json!({"amount": 250})),
        });
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::NewTransaction);
        assert_eq!(events[0].target, Target::admins());
        assert_eq!(events[0].payload["transactionId"], 17);
        assert_eq!(events[0].payload["userId"], 42);
        assert_eq!(events[0].payload["amount"], 250);
    }

    #[test]
    fn operator_created_transaction_is_transaction_created() {
        let events = events_for(&DomainChange::TransactionCreated {
            transaction_id: 1,
            owner_id: UserId(2),
            by_operator: true,
            details: Map::new(),
        });
        assert_eq!(events[0].kind, EventKind::TransactionCreated);
    }

    #[test]
    fn status_change_targets_admins_and_owner() {
        let events = events_for(&DomainChange::TransactionStatusChanged {
            transaction_id: 5,
            owner_id: UserId(42),
            status: TransactionStatus::Cancelled,
            details: Map::new(),
        });
        let targets: Vec<Target> = events.iter().map(|e| e.target).collect();
        assert_eq!(targets, vec![Target::admins(), Target::user(UserId(42))]);
        assert!(events.iter().all(|e| e.kind == EventKind::TransactionCancelled));
    }

    #[test]
    fn deletion_targets_admins_and_owner() {
        let events = events_for(&DomainChange::TransactionDeleted {
            transaction_id: 5,
            owner_id: UserId(3),
            details: Map::new(),
        });
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].target, Target::user(UserId(3)));
    }

    #[test]
    fn proof_goes_to_owner() {
        let events = events_for(&DomainChange::ProofSubmitted {
            transaction_id: 5,
            owner_id: UserId(3),
            details: Map::new(),
        });
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, Target::user(UserId(3)));
    }

    #[test]
    fn fee_update_goes_to_that_user() {
        let events = events_for(&DomainChange::PersonalFeeUpdated {
            user_id: UserId(8),
            details: details(json!({"fee": 1.5})),
        });
        assert_eq!(events[0].kind, EventKind::PersonalFeeUpdated);
        assert_eq!(events[0].target, Target::user(UserId(8)));
        assert_eq!(events[0].payload["fee"], 1.5);
    }

    #[test]
    fn refresh_uses_trigger_target_and_event_name() {
        let events = events_for(&DomainChange::Refresh {
            name: RefreshName::new("clients").unwrap(),
            target: Target::admins(),
            event: Some("clients-changed".into()),
            details: Map::new(),
        });
        assert_eq!(events[0].kind.as_str(), "REFRESH_CLIENTS");
        assert_eq!(events[0].payload["event"], "clients-changed");
        assert_eq!(events[0].target, Target::admins());
    }

    #[tokio::test]
    async fn bridge_publishes_until_cancelled() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _ = registry.register(
            SessionKey::admin(None),
            Arc::new(ClientConnection::new("a".into(), tx)),
        );
        let dispatcher = Arc::new(Dispatcher::new(registry));
        let notifier = Notifier::new(8);
        let cancel = CancellationToken::new();
        let bridge = EventBridge::new(notifier.subscribe(), dispatcher, cancel.clone());
        let handle = tokio::spawn(bridge.run());

        notifier.balance_updated(details(json!({"balance": 10})));
        let frame = rx.recv().await.unwrap();
        let v: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["type"], "BALANCE_UPDATED");
        assert_eq!(v["balance"], 10);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn bridge_exits_when_notifier_dropped() {
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(SessionRegistry::new())));
        let notifier = Notifier::new(8);
        let bridge = EventBridge::new(notifier.subscribe(), dispatcher, CancellationToken::new());
        let handle = tokio::spawn(bridge.run());
        drop(notifier);
        handle.await.unwrap();
    }
}
