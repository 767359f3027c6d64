//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ClientSettings::default()`]
//! 2. If `~/.tether/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TETHER_*` environment variables (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{ClientSettings, Protocol};

/// Resolve the path to the settings file (`~/.tether/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tether").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings> {
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

    let mut settings: ClientSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
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

/// Apply `TETHER_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut ClientSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Parsing rules per variable:
/// - Integers must be valid and within the given range
/// - Booleans accept `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are silently ignored (fall back to file/default)
pub fn apply_overrides_from(
    settings: &mut ClientSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = read_string(&lookup, "TETHER_ADDRESS") {
        settings.connection.address = v;
    }
    if let Some(v) = lookup("TETHER_PROTOCOL").as_deref().and_then(Protocol::parse) {
        settings.connection.protocol = v;
    }
    if let Some(v) = read_bool(&lookup, "TETHER_AUTO_CONNECT") {
        settings.connection.auto_connect = v;
    }
    if let Some(v) = read_bool(&lookup, "TETHER_RECONNECT_ENABLED") {
        settings.connection.reconnect_enabled = v;
    }
    if let Some(v) = read_u64(&lookup, "TETHER_RECONNECT_DELAY_MS", 10, 600_000) {
        settings.connection.reconnect_delay_ms = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = read_string(&lookup, "TETHER_USER_NAME") {
        settings.auth.user_name = v;
    }
    if let Some(v) = read_string(&lookup, "TETHER_PASSWORD") {
        settings.auth.password = Some(v);
    }
    if let Some(v) = read_string(&lookup, "TETHER_API_TOKEN") {
        settings.auth.api_token = Some(v);
    }
    if let Some(v) = read_bool(&lookup, "TETHER_ALLOW_ANONYMOUS") {
        settings.auth.allow_anonymous = v;
    }

    // ── RPC ─────────────────────────────────────────────────────────
    if let Some(v) = read_u64(&lookup, "TETHER_SWEEP_INTERVAL_MS", 10, 10_000) {
        settings.rpc.sweep_interval_ms = v;
    }
    if let Some(v) = read_u64(&lookup, "TETHER_DEFAULT_TIMEOUT_MS", 10, 3_600_000) {
        settings.rpc.default_timeout_ms = Some(v);
    }
}

fn read_string(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.is_empty())
}

fn read_bool(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<bool> {
    match lookup(name)?.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    min: u64,
    max: u64,
) -> Option<u64> {
    lookup(name)?
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}
