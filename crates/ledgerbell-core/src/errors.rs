//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding a frame from the other end of the socket.
///
/// None of these are fatal to a connection: the receiver logs and discards
/// the frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON, or did not match the expected shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A binary frame that is not UTF-8 text.
    #[error("binary frame is not valid UTF-8 ({len} bytes)")]
    NotUtf8 {
        /// Frame length in bytes.
        len: usize,
    },
    /// A registration that names the `user` role without a user id.
    #[error("registration for role `user` requires a userId")]
    MissingUserId,
    /// A refresh trigger whose name is empty once the `REFRESH_` prefix is
    /// removed.
    #[error("refresh name must not be empty")]
    EmptyRefreshName,
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
