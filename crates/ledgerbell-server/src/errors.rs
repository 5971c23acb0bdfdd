//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors that stop the server from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Other I/O failure on the listener.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The configured host/port does not form a socket address.
    #[error("invalid listen address: {0}")]
    InvalidAddress(String),
    /// The metrics recorder could not be installed.
    #[error("metrics recorder: {0}")]
    Metrics(String),
}

impl ServerError {
    /// Wrap a bind failure for `addr`.
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.to_string(),
            source,
        }
    }
}
