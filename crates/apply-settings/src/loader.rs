//! Settings loading with deep merge and environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If `~/.apply/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `APPLY_*` environment overrides (highest priority)
//!
//! Deep merge rules: objects merge recursively (source wins per key),
//! arrays and primitives are replaced, nulls in the source are skipped.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::Settings;

/// Resolve the path to the settings file (`~/.apply/settings.json`).
#[must_use]
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
    PathBuf::from(home).join(".apply").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<Settings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; an unparseable file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
#[must_use]
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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are silently ignored, falling back to file/default.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Some(v) = read_env_string("APPLY_LLM_BASE_URL") {
        settings.llm.base_url = v;
    }
    if let Some(v) = read_env_string("APPLY_LLM_API_KEY") {
        settings.llm.api_key = v;
    }
    if let Some(v) = read_env_string("APPLY_LLM_MODEL") {
        settings.llm.model = v;
    }
    if let Some(v) = read_env_string("APPLY_BOT_TOKEN") {
        settings.telegram.bot_token = v;
    }
    if let Some(v) = read_env_i64("APPLY_CHAT_ID") {
        settings.telegram.chat_id = v;
    }
    if let Some(v) = read_env_u32("APPLY_MAX_STEPS", 1, 10_000) {
        settings.agent.max_steps = v;
    }
    if let Some(v) = read_env_u64("APPLY_QUESTION_TIMEOUT_SECS", 1, 86_400) {
        settings.agent.question_timeout_secs = v;
    }
    if let Some(v) = read_env_bool("APPLY_DEBUG") {
        settings.agent.debug = v;
    }
    if let Some(v) = read_env_string("APPLY_ARTIFACTS_DIR") {
        settings.agent.artifacts_dir = v;
    }
    if let Some(v) = read_env_string("APPLY_DB_PATH") {
        settings.storage.db_path = v;
    }
}

fn read_env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn read_env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok()?.parse().ok()
}

fn read_env_u32(key: &str, min: u32, max: u32) -> Option<u32> {
    let v: u32 = std::env::var(key).ok()?.parse().ok()?;
    (min..=max).contains(&v).then_some(v)
}

fn read_env_u64(key: &str, min: u64, max: u64) -> Option<u64> {
    let v: u64 = std::env::var(key).ok()?.parse().ok()?;
    (min..=max).contains(&v).then_some(v)
}

fn read_env_bool(key: &str) -> Option<bool> {
    match std::env::var(key).ok()?.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
