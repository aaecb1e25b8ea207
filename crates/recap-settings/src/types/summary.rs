//! Summary output, concurrency, cache, credential, and scheduler knobs.

use serde::{Deserialize, Serialize};

/// Rendered artifact kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Rendered image (default).
    #[default]
    Image,
    /// Plain text.
    Text,
}

/// Visual theme handed to the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    /// Light.
    Light,
    /// Dark.
    Dark,
    /// VS Code dark (default).
    #[default]
    VscodeDark,
    /// VS Code light.
    VscodeLight,
}

/// Window bounds and output policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarySettings {
    /// Smallest accepted window and minimum fetched message count.
    pub min_length: u32,
    /// Largest accepted window.
    pub max_length: u32,
    /// Preferred artifact kind.
    pub output_mode: OutputMode,
    /// Degrade image output to text instead of failing.
    pub fallback_enabled: bool,
    /// Renderer theme.
    pub theme: Theme,
    /// Callers that bypass the cooldown.
    pub admins: Vec<String>,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            min_length: 1,
            max_length: 1000,
            output_mode: OutputMode::Image,
            fallback_enabled: false,
            theme: Theme::VscodeDark,
            admins: Vec::new(),
        }
    }
}

/// Concurrency governor settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GovernorSettings {
    /// Slots available to summarization tasks.
    pub max_concurrent_tasks: usize,
    /// Per (caller, conversation) cooldown after a successful manual run.
    pub cooldown_secs: u64,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 2,
            cooldown_secs: 60,
        }
    }
}

/// History cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Entry lifetime. Zero disables caching.
    pub ttl_secs: u64,
    /// Optional entry cap; oldest-used entries are evicted past it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            capacity: Some(256),
        }
    }
}

/// Credential health policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialSettings {
    /// Consecutive failures that mark a credential unhealthy.
    pub unhealthy_threshold: u32,
    /// Failures older than this no longer count toward the streak.
    pub failure_window_secs: u64,
    /// Default quarantine for an unhealthy credential.
    pub cooldown_secs: u64,
    /// All credentials unhealthy for this long raises an alert.
    pub alert_after_secs: u64,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            unhealthy_threshold: 3,
            failure_window_secs: 600,
            cooldown_secs: 300,
            alert_after_secs: 600,
        }
    }
}

/// Scheduler and persistence settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerSettings {
    /// IANA zone that trigger times are interpreted in.
    pub timezone: String,
    /// Timing loop period.
    pub tick_secs: u64,
    /// `SQLite` file holding jobs and conversation overrides.
    pub db_path: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            timezone: "Asia/Shanghai".to_string(),
            tick_secs: 60,
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    format!("{home}/.recap/recap.db")
}

/// Logging output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
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
