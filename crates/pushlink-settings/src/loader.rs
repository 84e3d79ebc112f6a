//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PushlinkSettings::default()`]
//! 2. If `~/.pushlink/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `PUSHLINK_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{LogFormat, PushlinkSettings};

/// Resolve the path to the settings file (`~/.pushlink/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pushlink").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PushlinkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<PushlinkSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<PushlinkSettings> {
    let defaults = serde_json::to_value(PushlinkSettings::default())?;

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

/// Apply `PUSHLINK_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut PushlinkSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Each variable has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning (fall back to file/default)
pub fn apply_overrides_from(
    settings: &mut PushlinkSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let env = EnvReader { lookup };

    // ── Account ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PUSHLINK_APP_ID") {
        settings.account.app_id = v;
    }
    if let Some(v) = env.string("PUSHLINK_APP_SECRET") {
        settings.account.app_secret = v;
    }
    if let Some(v) = env.string("PUSHLINK_DOMAIN") {
        settings.account.domain = v.trim_end_matches('/').to_string();
    }

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = env.u64("PUSHLINK_FETCH_TIMEOUT_MS", 100, 600_000) {
        settings.connection.fetch_timeout_ms = v;
    }
    if let Some(v) = env.u64("PUSHLINK_FETCH_RETRY_DELAY_MS", 100, 600_000) {
        settings.connection.fetch_retry_delay_ms = v;
    }
    if let Some(v) = env.u64("PUSHLINK_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.connection.connect_timeout_ms = v;
    }
    if let Some(v) = env.u64("PUSHLINK_CHUNK_TTL_MS", 0, 3_600_000) {
        settings.connection.chunk_ttl_ms = v;
    }
    if let Some(v) = env.usize("PUSHLINK_MAX_INFLIGHT_DISPATCHES", 1, 100_000) {
        settings.connection.max_inflight_dispatches = Some(v);
    }
    if let Some(v) = env.bool("PUSHLINK_VERBOSE") {
        settings.connection.verbose = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PUSHLINK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("PUSHLINK_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => {
                tracing::warn!(
                    key = "PUSHLINK_LOG_FORMAT",
                    value = %v,
                    "invalid log format, ignoring"
                );
            }
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

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

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log format name.
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

// ── Env readers (thin wrappers) ─────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "connection": {"fetchTimeoutMs": 15000, "verbose": false}
        });
        let source = serde_json::json!({
            "connection": {"verbose": true}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["connection"]["verbose"], true);
        assert_eq!(merged["connection"]["fetchTimeoutMs"], 15000);
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
    fn merge_new_keys_added() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = load_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.account.domain, "https://open.feishu.cn");
        assert_eq!(settings.connection.chunk_ttl_ms, 10_000);
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"account": {"appId": "cli_a"}, "connection": {"maxInflightDispatches": 8}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.account.app_id, "cli_a");
        assert_eq!(settings.connection.max_inflight_dispatches, Some(8));
        assert_eq!(settings.connection.fetch_retry_delay_ms, 5_000);
    }

    #[test]
    fn invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_file_layer(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply_over_file_values() {
        let mut settings = PushlinkSettings::default();
        apply_overrides_from(
            &mut settings,
            lookup(&[
                ("PUSHLINK_APP_ID", "cli_env"),
                ("PUSHLINK_APP_SECRET", "s3cret"),
                ("PUSHLINK_DOMAIN", "https://open.larksuite.com/"),
                ("PUSHLINK_VERBOSE", "yes"),
                ("PUSHLINK_CHUNK_TTL_MS", "0"),
                ("PUSHLINK_MAX_INFLIGHT_DISPATCHES", "16"),
                ("PUSHLINK_LOG_FORMAT", "JSON"),
            ]),
        );
        assert_eq!(settings.account.app_id, "cli_env");
        assert_eq!(settings.account.app_secret, "s3cret");
        assert_eq!(settings.account.domain, "https://open.larksuite.com");
        assert!(settings.connection.verbose);
        assert_eq!(settings.connection.chunk_ttl_ms, 0);
        assert_eq!(settings.connection.max_inflight_dispatches, Some(16));
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut settings = PushlinkSettings::default();
        apply_overrides_from(
            &mut settings,
            lookup(&[
                ("PUSHLINK_FETCH_TIMEOUT_MS", "5"),
                ("PUSHLINK_VERBOSE", "maybe"),
                ("PUSHLINK_MAX_INFLIGHT_DISPATCHES", "0"),
                ("PUSHLINK_LOG_FORMAT", "xml"),
                ("PUSHLINK_APP_ID", ""),
            ]),
        );
        let defaults = PushlinkSettings::default();
        assert_eq!(
            settings.connection.fetch_timeout_ms,
            defaults.connection.fetch_timeout_ms
        );
        assert!(!settings.connection.verbose);
        assert!(settings.connection.max_inflight_dispatches.is_none());
        assert_eq!(settings.logging.format, LogFormat::Compact);
        assert!(settings.account.app_id.is_empty());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("nah"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u64_range("1000", 100, 2000), Some(1000));
        assert_eq!(parse_u64_range("99", 100, 2000), None);
        assert_eq!(parse_u64_range("-1", 0, 2000), None);
        assert_eq!(parse_usize_range("8", 1, 16), Some(8));
        assert_eq!(parse_usize_range("17", 1, 16), None);
    }
}
