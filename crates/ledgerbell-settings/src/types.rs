//! Settings structures. All fields have defaults; a settings file only needs
//! to name what it changes.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Accepted `client.reconnectDelayMs`, from settings files and the environment.
pub const RECONNECT_DELAY_MS_RANGE: RangeInclusive<u64> = 100..=600_000;
/// Accepted `client.bannerDurationMs`.
pub const BANNER_DURATION_MS_RANGE: RangeInclusive<u64> = 500..=60_000;
/// Accepted `client.toneDurationMs`.
pub const TONE_DURATION_MS_RANGE: RangeInclusive<u64> = 10..=5_000;
/// Accepted `client.toneFrequencyHz`.
pub const TONE_FREQUENCY_HZ_RANGE: RangeInclusive<f32> = 20.0..=20_000.0;

fn check_range<T: PartialOrd + std::fmt::Display>(
    name: &str,
    value: T,
    range: &RangeInclusive<T>,
) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue(format!(
            "{name} must be within {}..={}: {value}",
            range.start(),
            range.end()
        )))
    }
}

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerbellSettings {
    /// Notification server.
    pub server: ServerSettings,
    /// Event consumer (`watch` mode).
    pub client: ClientSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl LedgerbellSettings {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.wsPath must start with '/': {}",
                self.server.ws_path
            )));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        // a ping and its pong straddle one check, so at least two intervals
        if self.server.heartbeat_interval_secs == 0
            || self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs.saturating_mul(2)
        {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutSecs must be >= 2 * heartbeatIntervalSecs > 0".into(),
            ));
        }
        if !self.client.origin.starts_with("http://") && !self.client.origin.starts_with("https://")
        {
            return Err(SettingsError::InvalidValue(format!(
                "client.origin must be an http(s) origin: {}",
                self.client.origin
            )));
        }
        check_range(
            "client.reconnectDelayMs",
            self.client.reconnect_delay_ms,
            &RECONNECT_DELAY_MS_RANGE,
        )?;
        check_range(
            "client.bannerDurationMs",
            self.client.banner_duration_ms,
            &BANNER_DURATION_MS_RANGE,
        )?;
        check_range(
            "client.toneDurationMs",
            self.client.tone_duration_ms,
            &TONE_DURATION_MS_RANGE,
        )?;
        check_range(
            "client.toneFrequencyHz",
            self.client.tone_frequency_hz,
            &TONE_FREQUENCY_HZ_RANGE,
        )?;
        Ok(())
    }
}

/// Notification server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Upgrade endpoint path.
    pub ws_path: String,
    /// Outbound frames buffered per connection before drops start.
    pub send_queue_capacity: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence after which a connection is closed.
    pub heartbeat_timeout_secs: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ws_path: "/ws".to_string(),
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
        }
    }
}

/// Event consumer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Origin of the dashboard page; its scheme picks `ws` or `wss`.
    pub origin: String,
    /// Upgrade endpoint path on that origin.
    pub ws_path: String,
    /// Fixed delay before reconnecting after a close.
    pub reconnect_delay_ms: u64,
    /// How long the alert banner stays up.
    pub banner_duration_ms: u64,
    /// Alert tone pitch.
    pub tone_frequency_hz: f32,
    /// Alert tone length.
    pub tone_duration_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8080".to_string(),
            ws_path: "/ws".to_string(),
            reconnect_delay_ms: 3000,
            banner_duration_ms: 4000,
            tone_frequency_hz: 880.0,
            tone_duration_ms: 250,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
