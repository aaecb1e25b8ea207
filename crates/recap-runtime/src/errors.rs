//! Error types for summarization runs, schedules, and overrides.

use recap_core::{ConfigError, FetchError};
use recap_llm::DispatchError;
use recap_store::StoreError;
use thiserror::Error;

/// Why a summarization run did not produce a result.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Requested window outside the configured bounds (manual triggers).
    #[error("window size {requested} is outside [{min}, {max}]")]
    OutOfRange {
        /// What was asked for.
        requested: u32,
        /// Configured lower bound.
        min: u32,
        /// Configured upper bound.
        max: u32,
    },

    /// Fewer messages were fetched than the configured minimum.
    #[error("only {found} message(s) available, at least {required} needed")]
    InsufficientMessages {
        /// Messages fetched.
        found: usize,
        /// Configured minimum.
        required: u32,
    },

    /// Every slot is taken and the trigger does not queue.
    #[error("too many summaries in progress, try again shortly")]
    Busy,

    /// The caller triggered this conversation too recently.
    #[error("cooldown active, try again in {remaining_secs}s")]
    CooldownActive {
        /// Whole seconds until the caller may trigger again.
        remaining_secs: u64,
    },

    /// Model or provider could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transcript collaborator failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Generation failed terminally.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Renderer failed and text fallback is disabled.
    #[error("rendering failed: {source}")]
    Render {
        /// Renderer error.
        #[source]
        source: anyhow::Error,
    },

    /// The governor was shut down while waiting for a slot.
    #[error("governor closed")]
    Closed,
}

impl OrchestratorError {
    /// Short label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::OutOfRange { .. } => "out_of_range",
            Self::InsufficientMessages { .. } => "insufficient_messages",
            Self::Busy => "busy",
            Self::CooldownActive { .. } => "cooldown",
            Self::Config(_) => "config",
            Self::Fetch(_) => "fetch",
            Self::Dispatch(_) => "dispatch",
            Self::Render { .. } => "render",
            Self::Closed => "closed",
        }
    }

    /// Input validation or rate limiting rather than a failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange { .. }
                | Self::InsufficientMessages { .. }
                | Self::Busy
                | Self::CooldownActive { .. }
        )
    }
}

/// Scheduler failures.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A change is live in memory but could not be written durably.
    #[error("schedule change is active but was not persisted: {0}")]
    Persistence(#[source] StoreError),

    /// Jobs could not be read back from the store.
    #[error("failed to load schedules: {0}")]
    Load(#[source] StoreError),

    /// Rejected job parameters.
    #[error("invalid schedule: {0}")]
    Invalid(String),
}

/// Failures updating per-conversation overrides.
#[derive(Debug, Error)]
pub enum OverrideError {
    /// The model reference does not resolve.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The override could not be persisted; nothing was changed.
    #[error("failed to persist override: {0}")]
    Store(#[from] StoreError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_are_user_facing() {
        assert!(OrchestratorError::Busy.is_user_facing());
        assert!(OrchestratorError::CooldownActive { remaining_secs: 3 }.is_user_facing());
        assert!(!OrchestratorError::Closed.is_user_facing());
        assert!(!OrchestratorError::Config(ConfigError::NoDefaultConfigured).is_user_facing());
    }

    #[test]
    fn out_of_range_message() {
        let err = OrchestratorError::OutOfRange {
            requested: 5000,
            min: 1,
            max: 1000,
        };
        assert_eq!(err.to_string(), "window size 5000 is outside [1, 1000]");
        assert_eq!(err.category(), "out_of_range");
    }

    #[test]
    fn persistence_wraps_store_error() {
        let err = SchedulerError::Persistence(StoreError::Unavailable("disk".into()));
        assert!(err.to_string().contains("not persisted"));
    }
}
