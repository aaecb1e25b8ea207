//! # recap-settings
//!
//! Configuration with layered sources:
//! 1. **Compiled defaults**: [`RecapSettings::default()`]
//! 2. **User file**: `~/.recap/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RECAP_*` overrides (highest priority)
//!
//! The loaded value is validated before it is handed out. The per-run subset
//! lives in [`GlobalConfig`], shared through [`SharedGlobalConfig`].

#![deny(unsafe_code)]

pub mod errors;
pub mod global;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use global::{GlobalConfig, SharedGlobalConfig};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

use tracing::warn;

static SETTINGS: OnceLock<RecapSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// Loaded on first call; a load failure is logged and compiled defaults
/// are used instead.
pub fn get_settings() -> &'static RecapSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            warn!(error = %e, "failed to load settings, using defaults");
            RecapSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the value back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: RecapSettings) -> std::result::Result<(), RecapSettings> {
    SETTINGS.set(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_re_exported() {
        let merged = deep_merge(serde_json::json!({"x": 1}), serde_json::json!({"y": 2}));
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }

    #[test]
    fn settings_path_under_home() {
        assert!(settings_path().ends_with(".recap/settings.json"));
    }
}
