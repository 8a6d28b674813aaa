//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ClientSettings::default()`]
//! 2. If `~/.scxml/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::ClientSettings;

/// Resolve the path to the settings file (`~/.scxml/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".scxml").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<ClientSettings> {
    let defaults = serde_json::to_value(ClientSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SCXML_*` overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value stays.
pub fn apply_env_overrides<F>(settings: &mut ClientSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = string("SCXML_HOST") {
        settings.api.host = v;
    }
    if let Some(v) = string("SCXML_BASE_PATH") {
        settings.api.base_path = v;
    }
    if let Some(v) = string("SCXML_RECONNECT") {
        match parse_bool(&v) {
            Some(b) => settings.stream.reconnect = b,
            None => tracing::warn!(key = "SCXML_RECONNECT", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = string("SCXML_RETRY_MS") {
        match parse_u64_range(&v, 0, 600_000) {
            Some(ms) => settings.stream.retry_ms = ms,
            None => tracing::warn!(key = "SCXML_RETRY_MS", value = %v, "invalid u64 env var, ignoring"),
        }
    }
    if let Some(v) = string("SCXML_LOG_LEVEL") {
        settings.logging.level = v;
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

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn deep_merge_objects_recursively() {
        let merged = deep_merge(
            json!({"api": {"host": "a", "basePath": "/api/v1"}}),
            json!({"api": {"host": "b"}}),
        );
        assert_eq!(merged, json!({"api": {"host": "b", "basePath": "/api/v1"}}));
    }

    #[test]
    fn deep_merge_skips_nulls() {
        let merged = deep_merge(json!({"level": "warn"}), json!({"level": null}));
        assert_eq!(merged, json!({"level": "warn"}));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_layered(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"api":{"host":"http://remote:9000"},"stream":{"reconnect":false}}"#)
            .unwrap();

        let settings = read_layered(&path).unwrap();
        assert_eq!(settings.api_url(), "http://remote:9000/api/v1");
        assert!(!settings.stream.reconnect);
        assert_eq!(settings.stream.retry_ms, 3000);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_layered(&path), Err(crate::SettingsError::Json(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = ClientSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("SCXML_HOST", "http://other:1234"),
                ("SCXML_BASE_PATH", "/v2"),
                ("SCXML_RECONNECT", "off"),
                ("SCXML_RETRY_MS", "250"),
                ("SCXML_LOG_LEVEL", "debug"),
            ]),
        );
        assert_eq!(settings.api_url(), "http://other:1234/v2");
        assert!(!settings.stream.reconnect);
        assert_eq!(settings.stream.retry_ms, 250);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = ClientSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[("SCXML_RECONNECT", "maybe"), ("SCXML_RETRY_MS", "-5"), ("SCXML_HOST", "")]),
        );
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nope"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("600000", 0, 600_000), Some(600_000));
        assert_eq!(parse_u64_range("600001", 0, 600_000), None);
        assert_eq!(parse_u64_range("abc", 0, 10), None);
    }
}
