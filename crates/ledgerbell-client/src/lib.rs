//! # ledgerbell-client
//!
//! Event consumer for dashboards and terminals.
//!
//! - **Lifecycle**: [`machine::ConnectionMachine`] with an owned reconnect
//!   timer, driven by [`driver::spawn`]
//! - **Routing**: [`routing::route`] maps each event type to effects
//! - **Effects**: [`consumer::EventConsumer`] applies them to counters,
//!   caches, alerts and the [`bus::LocalEventBus`]

#![deny(unsafe_code)]

pub mod alert;
pub mod bus;
pub mod config;
pub mod consumer;
pub mod driver;
pub mod errors;
pub mod machine;
pub mod routing;

pub use config::ClientConfig;
pub use consumer::{CacheInvalidator, ConnectionStatus, Counters, EventConsumer};
pub use driver::{ClientHandle, spawn};
pub use errors::ClientError;
pub use machine::Identity;
pub use routing::{CacheKey, Effect};
