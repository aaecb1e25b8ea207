//! Why settings failed to load.

use thiserror::Error;

/// Loading or validation failure.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON, or does not match the settings shape.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),

    /// A bound or count is out of range, or two bounds contradict.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),

    /// `scheduler.timezone` is not an IANA zone name.
    #[error("unknown scheduler timezone '{0}'")]
    UnknownTimezone(String),

    /// A provider entry is unusable.
    #[error("provider '{provider}': {reason}")]
    Provider {
        /// Provider name as written (may be empty).
        provider: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn provider(provider: &str, reason: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Settings result.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
