//! # ledgerbell-settings
//!
//! Configuration for the ledgerbell server and client, loaded from three
//! layers (in priority order):
//!
//! 1. **Compiled defaults**: [`LedgerbellSettings::default()`]
//! 2. **Settings file**: `~/.ledgerbell/settings.json` or an explicit path,
//!    deep-merged over the defaults
//! 3. **Environment variables**: `LEDGERBELL_*` overrides
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{ClientSettings, LedgerbellSettings, LoggingSettings, ServerSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = LedgerbellSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = LedgerbellSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.client.reconnect_delay_ms, 3000);
        assert_eq!(settings.logging.level, "info");
    }
}
