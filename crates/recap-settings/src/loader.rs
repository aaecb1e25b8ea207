//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RecapSettings::default()`]
//! 2. If `~/.recap/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `RECAP_*` environment variable overrides (highest priority)
//! 4. Validate cross-field constraints

use std::path::{Path, PathBuf};

use recap_core::ModelRef;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RecapSettings;

/// Resolve the path to the settings file (`~/.recap/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".recap").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RecapSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a validation failure is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<RecapSettings> {
    load_with(path, |name| std::env::var(name).ok())
}

/// Same as [`load_settings_from_path`] with an injectable env lookup.
pub fn load_with<F>(path: &Path, env: F) -> Result<RecapSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(RecapSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RecapSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
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

/// Apply `RECAP_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut RecapSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from any name → value lookup.
///
/// Invalid values are ignored with a warning and the file/default value
/// stays in effect.
pub fn apply_overrides<F>(settings: &mut RecapSettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let reader = EnvReader { env };

    // ── Model selection ─────────────────────────────────────────────
    if let Some(v) = reader.string("RECAP_DEFAULT_MODEL") {
        match ModelRef::parse(&v) {
            Ok(r) => settings.default_model = Some(r),
            Err(e) => warn!(key = "RECAP_DEFAULT_MODEL", value = %v, error = %e, "ignoring"),
        }
    }
    if let Some(v) = reader.string("RECAP_DEFAULT_STYLE") {
        settings.default_style = v;
    }

    // ── Dispatch ────────────────────────────────────────────────────
    if let Some(v) = reader.u64("RECAP_TIMEOUT_SECS", 1, 3600) {
        settings.dispatch.timeout_secs = v;
    }
    if let Some(v) = reader.u64("RECAP_MAX_RETRIES", 0, 20) {
        settings.dispatch.max_retries = v as u32;
    }
    if let Some(v) = reader.u64("RECAP_RETRY_DELAY_SECS", 0, 600) {
        settings.dispatch.retry_delay_secs = v;
    }

    // ── Governor / cache ────────────────────────────────────────────
    if let Some(v) = reader.u64("RECAP_MAX_CONCURRENT_TASKS", 1, 1024) {
        settings.governor.max_concurrent_tasks = v as usize;
    }
    if let Some(v) = reader.u64("RECAP_COOLDOWN_SECS", 0, 86_400) {
        settings.governor.cooldown_secs = v;
    }
    if let Some(v) = reader.u64("RECAP_CACHE_TTL_SECS", 0, 86_400) {
        settings.cache.ttl_secs = v;
    }

    // ── Summary ─────────────────────────────────────────────────────
    if let Some(v) = reader.u64("RECAP_SUMMARY_MIN_LENGTH", 1, 100_000) {
        settings.summary.min_length = v as u32;
    }
    if let Some(v) = reader.u64("RECAP_SUMMARY_MAX_LENGTH", 1, 100_000) {
        settings.summary.max_length = v as u32;
    }
    if let Some(v) = reader.enum_value("RECAP_OUTPUT_MODE") {
        settings.summary.output_mode = v;
    }
    if let Some(v) = reader.bool("RECAP_FALLBACK_ENABLED") {
        settings.summary.fallback_enabled = v;
    }
    if let Some(v) = reader.enum_value("RECAP_THEME") {
        settings.summary.theme = v;
    }

    // ── Scheduler / logging ─────────────────────────────────────────
    if let Some(v) = reader.string("RECAP_TIMEZONE") {
        settings.scheduler.timezone = v;
    }
    if let Some(v) = reader.string("RECAP_DB_PATH") {
        settings.scheduler.db_path = v;
    }
    if let Some(v) = reader.string("RECAP_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    env: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }

    fn enum_value<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        let val = self.string(name)?;
        let result = serde_json::from_value(Value::String(val.to_lowercase())).ok();
        if result.is_none() {
            warn!(key = name, value = %val, "unknown variant in env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
