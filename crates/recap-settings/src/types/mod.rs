//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file only needs the fields it changes.

mod providers;
mod summary;

pub use providers::*;
pub use summary::*;

use std::collections::HashSet;
use std::str::FromStr;

use chrono_tz::Tz;
use recap_core::{ModelRef, RetryConfig};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "defaultModel": "OpenAI/gpt-4o",
///   "providers": [{ "name": "OpenAI", "apiKeys": ["sk-..."], "models": [{ "name": "gpt-4o" }] }],
///   "governor": { "maxConcurrentTasks": 4 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecapSettings {
    /// Settings schema version.
    pub version: String,
    /// Model used when a conversation has no override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<ModelRef>,
    /// Summary style used when a conversation has no override.
    pub default_style: String,
    /// Declared providers.
    pub providers: Vec<ProviderSettings>,
    /// Timeout and retry policy for generation calls.
    pub dispatch: RetryConfig,
    /// Window bounds and output policy.
    pub summary: SummarySettings,
    /// Concurrency and cooldown.
    pub governor: GovernorSettings,
    /// History cache.
    pub cache: CacheSettings,
    /// Credential health policy.
    pub credentials: CredentialSettings,
    /// Scheduler and persistence.
    pub scheduler: SchedulerSettings,
    /// Logging output.
    pub logging: LoggingSettings,
}

impl Default for RecapSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            default_model: None,
            default_style: "concise".to_string(),
            providers: Vec::new(),
            dispatch: RetryConfig::default(),
            summary: SummarySettings::default(),
            governor: GovernorSettings::default(),
            cache: CacheSettings::default(),
            credentials: CredentialSettings::default(),
            scheduler: SchedulerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl RecapSettings {
    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SettingsError::InvalidValue(msg));

        if self.summary.min_length == 0 {
            return invalid("summary.minLength must be at least 1".into());
        }
        if self.summary.min_length > self.summary.max_length {
            return invalid(format!(
                "summary.minLength ({}) exceeds summary.maxLength ({})",
                self.summary.min_length, self.summary.max_length
            ));
        }
        if self.governor.max_concurrent_tasks == 0 {
            return invalid("governor.maxConcurrentTasks must be at least 1".into());
        }
        if self.dispatch.timeout_secs == 0 {
            return invalid("dispatch.timeoutSecs must be at least 1".into());
        }
        if self.scheduler.tick_secs == 0 {
            return invalid("scheduler.tickSecs must be at least 1".into());
        }
        let _ = self.timezone()?;

        let mut seen = HashSet::new();
        for p in &self.providers {
            let fail = |reason: String| Err(SettingsError::provider(&p.name, reason));
            if p.name.trim().is_empty() {
                return fail("empty name".into());
            }
            if !seen.insert(p.name.as_str()) {
                return fail("duplicate provider".into());
            }
            if p.api_keys.iter().all(|k| k.trim().is_empty()) {
                return fail("no credentials".into());
            }
            if p.models.is_empty() {
                return fail("no models".into());
            }
            let mut models = HashSet::new();
            for m in &p.models {
                if !models.insert(m.name.as_str()) {
                    return fail(format!("duplicate model '{}'", m.name));
                }
            }
        }
        Ok(())
    }

    /// Parsed scheduler timezone.
    pub fn timezone(&self) -> Result<Tz> {
        Tz::from_str(&self.scheduler.timezone)
            .map_err(|_| SettingsError::UnknownTimezone(self.scheduler.timezone.clone()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
