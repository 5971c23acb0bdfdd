//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{LedgerbellSettings, RECONNECT_DELAY_MS_RANGE};

/// Resolve the default settings file (`~/.ledgerbell/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".ledgerbell").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LedgerbellSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides, then validate.
///
/// A missing file yields the defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LedgerbellSettings> {
    let defaults = serde_json::to_value(LedgerbellSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: LedgerbellSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `LEDGERBELL_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut LedgerbellSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply `LEDGERBELL_*` overrides read through `lookup`.
///
/// Empty values are treated as unset. Values that fail to parse or fall
/// outside their range are ignored with a warning.
pub fn apply_overrides_from<F>(settings: &mut LedgerbellSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = get("LEDGERBELL_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = get("LEDGERBELL_PORT") {
        match parse_u16_range(&v, 0, 65535) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "LEDGERBELL_PORT", value = %v, "invalid port, ignoring"),
        }
    }
    if let Some(v) = get("LEDGERBELL_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = get("LEDGERBELL_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => warn!(key = "LEDGERBELL_LOG_JSON", value = %v, "invalid boolean, ignoring"),
        }
    }
    if let Some(v) = get("LEDGERBELL_ORIGIN") {
        settings.client.origin = v;
    }
    if let Some(v) = get("LEDGERBELL_RECONNECT_DELAY_MS") {
        match parse_u64_range(
            &v,
            *RECONNECT_DELAY_MS_RANGE.start(),
            *RECONNECT_DELAY_MS_RANGE.end(),
        ) {
            Some(ms) => settings.client.reconnect_delay_ms = ms,
            None => warn!(
                key = "LEDGERBELL_RECONNECT_DELAY_MS",
                value = %v,
                "invalid delay, ignoring"
            ),
        }
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.ws_path, "/ws");
        assert_eq!(settings.client.reconnect_delay_ms, 3000);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"sendQueueCapacity": 16}, "client": {"bannerDurationMs": 1500}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.send_queue_capacity, 16);
        assert_eq!(settings.client.banner_duration_ms, 1500);
        assert_eq!(settings.server.heartbeat_interval_secs, 30);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_invalid_value_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"wsPath": "nope"}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    #[test]
    fn load_rejects_out_of_range_client_timing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"client": {"reconnectDelayMs": 0, "toneDurationMs": 100000000}}"#,
        )
        .unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    // ── apply_overrides_from ────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut s = LedgerbellSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                ("LEDGERBELL_HOST", "127.0.0.1"),
                ("LEDGERBELL_PORT", "9100"),
                ("LEDGERBELL_LOG_JSON", "yes"),
                ("LEDGERBELL_ORIGIN", "https://dash.example.com"),
                ("LEDGERBELL_RECONNECT_DELAY_MS", "5000"),
            ]),
        );
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 9100);
        assert!(s.logging.json);
        assert_eq!(s.client.origin, "https://dash.example.com");
        assert_eq!(s.client.reconnect_delay_ms, 5000);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut s = LedgerbellSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                ("LEDGERBELL_PORT", "99999"),
                ("LEDGERBELL_LOG_JSON", "maybe"),
                ("LEDGERBELL_RECONNECT_DELAY_MS", "5"),
            ]),
        );
        assert_eq!(s.server.port, 8080);
        assert!(!s.logging.json);
        assert_eq!(s.client.reconnect_delay_ms, 3000);
    }

    #[test]
    fn empty_overrides_are_unset() {
        let mut s = LedgerbellSettings::default();
        apply_overrides_from(&mut s, env(&[("LEDGERBELL_HOST", "")]));
        assert_eq!(s.server.host, "0.0.0.0");
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE", "On"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "No"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("0", 0, 65535), Some(0));
        assert_eq!(parse_u16_range("65535", 1, 65535), Some(65535));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("x", 1, 65535), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("3000", 100, 600_000), Some(3000));
        assert_eq!(parse_u64_range("99", 100, 600_000), None);
        assert_eq!(parse_u64_range("700000", 100, 600_000), None);
    }
}
