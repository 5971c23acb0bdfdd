//! Event taxonomy and the server-to-client wire message.
//!
//! Every event carries a `type` discriminant from a closed set
//! ([`EventKind`]), a human-readable `message`, an open payload object and,
//! server-side only, a [`Target`] selector. On the wire the payload fields are
//! flattened next to `type` and `message`:
//!
//! ```text
//! {"type":"PROOF_SUBMITTED","message":"Proof received","transactionId":17}
//! ```
//!
//! Type strings the receiver does not know decode to
//! [`EventKind::Unknown`] rather than failing, so older clients keep working
//! when the server grows new event types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ProtocolError, Result};
use crate::identity::{Role, UserId};

/// Prefix shared by all named refresh events (`REFRESH_CLIENTS`, ...).
pub const REFRESH_PREFIX: &str = "REFRESH_";

/// Payload field naming the local event a refresh should re-emit.
pub const LOCAL_EVENT_FIELD: &str = "event";

/// Event type discriminant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// A client created a transaction (legacy name).
    NewTransaction,
    /// A client created a transaction.
    TransactionCreated,
    /// A proof of payment was attached to a transaction.
    ProofSubmitted,
    /// An operator validated a transaction.
    TransactionValidated,
    /// An operator cancelled a transaction.
    TransactionCancelled,
    /// A transaction was deleted.
    TransactionDeleted,
    /// The operating balance changed.
    BalanceUpdated,
    /// A user's personal fee was changed.
    PersonalFeeUpdated,
    /// Ask every targeted client to refetch everything.
    ForceRefresh,
    /// A named refresh; holds the full type string, e.g. `REFRESH_CLIENTS`.
    Refresh(String),
    /// Any type string this build does not recognise.
    Unknown(String),
}

impl EventKind {
    /// Wire string for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NewTransaction => "NEW_TRANSACTION",
            Self::TransactionCreated => "TRANSACTION_CREATED",
            Self::ProofSubmitted => "PROOF_SUBMITTED",
            Self::TransactionValidated => "TRANSACTION_VALIDATED",
            Self::TransactionCancelled => "TRANSACTION_CANCELLED",
            Self::TransactionDeleted => "TRANSACTION_DELETED",
            Self::BalanceUpdated => "BALANCE_UPDATED",
            Self::PersonalFeeUpdated => "PERSONAL_FEE_UPDATED",
            Self::ForceRefresh => "FORCE_REFRESH",
            Self::Refresh(s) | Self::Unknown(s) => s,
        }
    }

    /// The named refresh kind for `name`.
    #[must_use]
    pub fn refresh(name: &RefreshName) -> Self {
        Self::Refresh(name.as_str().to_owned())
    }

    /// High-priority kinds trigger the sound + banner alert on operator
    /// dashboards.
    #[must_use]
    pub fn is_high_priority(&self) -> bool {
        matches!(self, Self::NewTransaction | Self::TransactionCreated)
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "NEW_TRANSACTION" => Self::NewTransaction,
            "TRANSACTION_CREATED" => Self::TransactionCreated,
            "PROOF_SUBMITTED" => Self::ProofSubmitted,
            "TRANSACTION_VALIDATED" => Self::TransactionValidated,
            "TRANSACTION_CANCELLED" => Self::TransactionCancelled,
            "TRANSACTION_DELETED" => Self::TransactionDeleted,
            "BALANCE_UPDATED" => Self::BalanceUpdated,
            "PERSONAL_FEE_UPDATED" => Self::PersonalFeeUpdated,
            "FORCE_REFRESH" => Self::ForceRefresh,
            _ if s.len() > REFRESH_PREFIX.len() && s.starts_with(REFRESH_PREFIX) => {
                Self::Refresh(s)
            }
            _ => Self::Unknown(s),
        }
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Refresh(s) | EventKind::Unknown(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

/// A refresh name, normalised to its full type string (`REFRESH_CLIENTS`).
///
/// Accepts the name with or without the `REFRESH_` prefix, in any case. A
/// name with nothing after the prefix is rejected: receivers decode a bare
/// `REFRESH_` as an unknown type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefreshName(String);

impl RefreshName {
    /// Validate and normalise `name`.
    pub fn new(name: &str) -> Result<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix(REFRESH_PREFIX).unwrap_or(&upper);
        if bare.is_empty() {
            return Err(ProtocolError::EmptyRefreshName);
        }
        Ok(Self(format!("{REFRESH_PREFIX}{bare}")))
    }

    /// Full type string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefreshName {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}

impl From<RefreshName> for String {
    fn from(name: RefreshName) -> Self {
        name.0
    }
}

impl fmt::Display for RefreshName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery selector: every session of a role, or one user's session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Role to deliver to.
    pub role: Role,
    /// Restrict delivery to this user's session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl Target {
    /// Every live admin session.
    #[must_use]
    pub fn admins() -> Self {
        Self {
            role: Role::Admin,
            user_id: None,
        }
    }

    /// The live session of one regular user.
    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self {
            role: Role::User,
            user_id: Some(user_id),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.user_id {
            Some(id) => write!(f, "{}({id})", self.role),
            None => write!(f, "{}(*)", self.role),
        }
    }
}

/// An event addressed to live sessions. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Type discriminant.
    pub kind: EventKind,
    /// Human-readable message for banners and toasts.
    pub message: String,
    /// Type-specific fields.
    pub payload: Map<String, Value>,
    /// Who should receive it.
    pub target: Target,
}

impl Event {
    /// Build an event. `type` and `message` keys are stripped from the
    /// payload so they cannot shadow the envelope fields on the wire.
    pub fn new(
        kind: EventKind,
        message: impl Into<String>,
        mut payload: Map<String, Value>,
        target: Target,
    ) -> Self {
        let _ = payload.remove("type");
        let _ = payload.remove("message");
        Self {
            kind,
            message: message.into(),
            payload,
            target,
        }
    }

    /// Same event, different target.
    #[must_use]
    pub fn retarget(&self, target: Target) -> Self {
        Self {
            target,
            ..self.clone()
        }
    }

    /// Wire form (target is not transmitted).
    #[must_use]
    pub fn to_message(&self) -> EventMessage {
        EventMessage {
            kind: self.kind.clone(),
            message: self.message.clone(),
            payload: self.payload.clone(),
        }
    }

    /// Serialize the wire form to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_message())?)
    }
}

/// Server-to-client event frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Type discriminant.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Human-readable message. Missing on the wire decodes as empty.
    #[serde(default)]
    pub message: String,
    /// Every other field.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl EventMessage {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// String field from the payload, if present and a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }

    /// Name of the local event a refresh should re-emit: the payload's
    /// `event` field, falling back to the type string.
    pub fn local_event_name(&self) -> &str {
        self.str_field(LOCAL_EVENT_FIELD)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.kind.as_str())
    }

    /// The payload as a JSON object value.
    #[must_use]
    pub fn payload_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}
