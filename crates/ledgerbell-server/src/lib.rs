//! # ledgerbell-server
//!
//! Role- and user-partitioned WebSocket notifications.
//!
//! - **Registry**: [`registry::SessionRegistry`], one live connection per
//!   `(role, userId)`, last registration wins
//! - **Dispatcher**: [`dispatcher::Dispatcher`] resolves a target and writes
//!   to each match without waiting on client I/O
//! - **Sessions**: registration handshake, heartbeat and cleanup per socket
//! - **Triggers**: [`notifier::Notifier`] handles for domain code, bridged to
//!   the dispatcher; also reachable over `POST /events`
//! - **HTTP**: `/health`, `/metrics`, graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod notifier;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use dispatcher::{DeliveryReport, Dispatcher};
pub use errors::ServerError;
pub use notifier::{DomainChange, Notifier, TransactionStatus};
pub use registry::SessionRegistry;
pub use server::NotifyServer;
pub use shutdown::ShutdownCoordinator;
