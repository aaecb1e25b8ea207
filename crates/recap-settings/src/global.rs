//! Process-wide defaults, read-mostly and replaced atomically.

use std::sync::Arc;

use parking_lot::RwLock;
use recap_core::{CallerId, ModelRef};

use crate::types::{OutputMode, RecapSettings, Theme};

/// The slice of settings consulted on every summarization run.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalConfig {
    /// Model used when a conversation has no override.
    pub default_model: Option<ModelRef>,
    /// Style used when a conversation has no override.
    pub default_style: String,
    /// Manual-trigger cooldown per (caller, conversation). A governor built
    /// from the shared config picks up changes on the next check.
    pub cooldown_secs: u64,
    /// Governor slot count. Read once when the governor is built; later
    /// updates need a new governor.
    pub max_concurrent_tasks: usize,
    /// History cache lifetime; zero disables the cache.
    pub cache_ttl_secs: u64,
    /// Smallest accepted window.
    pub min_length: u32,
    /// Largest accepted window.
    pub max_length: u32,
    /// Preferred artifact kind.
    pub output_mode: OutputMode,
    /// Degrade to text rather than fail.
    pub fallback_enabled: bool,
    /// Renderer theme.
    pub theme: Theme,
    /// Callers exempt from the cooldown.
    pub admins: Vec<CallerId>,
}

impl GlobalConfig {
    /// Whether `caller` bypasses the cooldown.
    pub fn is_privileged(&self, caller: &CallerId) -> bool {
        self.admins.contains(caller)
    }
}

impl From<&RecapSettings> for GlobalConfig {
    fn from(s: &RecapSettings) -> Self {
        Self {
            default_model: s.default_model.clone(),
            default_style: s.default_style.clone(),
            cooldown_secs: s.governor.cooldown_secs,
            max_concurrent_tasks: s.governor.max_concurrent_tasks,
            cache_ttl_secs: s.cache.ttl_secs,
            min_length: s.summary.min_length,
            max_length: s.summary.max_length,
            output_mode: s.summary.output_mode,
            fallback_enabled: s.summary.fallback_enabled,
            theme: s.summary.theme,
            admins: s.summary.admins.iter().map(|a| CallerId::from(a.as_str())).collect(),
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self::from(&RecapSettings::default())
    }
}

/// Shared handle to the current [`GlobalConfig`].
///
/// Readers get an `Arc` snapshot and never observe a half-applied update.
/// Writers build a new value and swap the pointer.
#[derive(Debug, Default)]
pub struct SharedGlobalConfig {
    current: RwLock<Arc<GlobalConfig>>,
}

impl SharedGlobalConfig {
    /// Wrap an initial value.
    pub fn new(config: GlobalConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<GlobalConfig> {
        Arc::clone(&self.current.read())
    }

    /// Replace wholesale.
    pub fn replace(&self, config: GlobalConfig) {
        *self.current.write() = Arc::new(config);
    }

    /// Copy-modify-swap. The closure runs under the write lock so concurrent
    /// updates are serialized.
    pub fn update<F: FnOnce(&mut GlobalConfig)>(&self, f: F) {
        let mut guard = self.current.write();
        let mut next = GlobalConfig::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_survives_update() {
        let shared = SharedGlobalConfig::new(GlobalConfig::default());
        let before = shared.load();
        shared.update(|c| c.default_style = "bullet".into());
        assert_eq!(before.default_style, "concise");
        assert_eq!(shared.load().default_style, "bullet");
    }

    #[test]
    fn admins_are_privileged() {
        let mut settings = RecapSettings::default();
        settings.summary.admins = vec!["owner".into()];
        let g = GlobalConfig::from(&settings);
        assert!(g.is_privileged(&CallerId::from("owner")));
        assert!(!g.is_privileged(&CallerId::from("guest")));
    }
}
