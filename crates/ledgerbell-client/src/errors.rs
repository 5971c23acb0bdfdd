//! Client error types.

use thiserror::Error;

/// Errors from the event consumer.
///
/// Neither ends a running consumer: an invalid origin stops it from
/// starting, and an audio failure falls back to the banner.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured origin cannot be turned into a WebSocket endpoint.
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),
    /// No audio device accepted the alert tone.
    #[error("audio unavailable: {0}")]
    AudioUnavailable(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
