//! # ledgerbell-core
//!
//! Shared vocabulary for the ledgerbell server and client crates.
//!
//! - **Identities**: [`Role`], [`UserId`], [`SessionKey`], [`ConnectionId`]
//! - **Events**: [`EventKind`] taxonomy, [`Event`] with its [`Target`]
//!   selector, and the [`EventMessage`] wire form
//! - **Protocol**: [`ClientMessage`] (the registration handshake)
//! - **Errors**: [`ProtocolError`] for inbound decode failures
//! - **Logging**: [`logging::init_subscriber`]

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod identity;
pub mod logging;
pub mod protocol;

pub use errors::ProtocolError;
pub use events::{Event, EventKind, EventMessage, RefreshName, Target};
pub use identity::{ConnectionId, Role, SessionKey, UserId};
pub use protocol::ClientMessage;
