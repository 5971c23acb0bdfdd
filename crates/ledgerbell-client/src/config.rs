//! Client configuration.

use std::time::Duration;

use ledgerbell_settings::ClientSettings;

use crate::alert::Tone;
use crate::errors::{ClientError, Result};

/// Runtime configuration for the event consumer.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `wss://dash.example.com/ws`.
    pub endpoint: String,
    /// Fixed delay before reconnecting after a close.
    pub reconnect_delay: Duration,
    /// How long the alert banner stays up.
    pub banner_duration: Duration,
    /// Alert tone.
    pub tone: Tone,
}

impl ClientConfig {
    /// Build from settings, deriving the endpoint from the page origin.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint_from_origin(&settings.origin, &settings.ws_path)?,
            reconnect_delay: Duration::from_millis(settings.reconnect_delay_ms),
            banner_duration: Duration::from_millis(settings.banner_duration_ms),
            tone: Tone {
                frequency_hz: settings.tone_frequency_hz,
                duration: Duration::from_millis(settings.tone_duration_ms),
                ..Tone::default()
            },
        })
    }
}

/// WebSocket endpoint for a page origin: `http` maps to `ws` and `https` to
/// `wss`, keeping host and port.
pub fn endpoint_from_origin(origin: &str, path: &str) -> Result<String> {
    let (scheme, rest) = if let Some(rest) = origin.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = origin.strip_prefix("http://") {
        ("ws", rest)
    } else {
        return Err(ClientError::InvalidOrigin(origin.to_owned()));
    };
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(ClientError::InvalidOrigin(origin.to_owned()));
    }
    let path = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    };
    Ok(format!("{scheme}://{host}{path}"))
}
