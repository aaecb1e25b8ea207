//! Error types shared across crates.
//!
//! - [`ConfigError`]: a provider, model, or schedule reference that cannot be
//!   resolved. Fatal to the operation that hit it, never to the process.
//! - [`FetchError`]: the transcript collaborator could not supply messages.
//!   Surfaced to the caller as-is; this core never retries fetches.

use thiserror::Error;

/// Missing or invalid configuration reference.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A `"Provider/Model"` string that is not well-formed.
    #[error("invalid model reference '{0}': expected \"Provider/Model\"")]
    InvalidModelRef(String),

    /// No provider registered under this name.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// The provider exists but has no model with this name.
    #[error("model '{model}' not found under provider '{provider}'")]
    ModelNotFound {
        /// Provider that was searched.
        provider: String,
        /// Model that was missing.
        model: String,
    },

    /// Neither a conversation override nor a global default is set.
    #[error("no model configured for this conversation and no global default")]
    NoDefaultConfigured,

    /// A time-of-day string that is not `HH:MM`.
    #[error("invalid time of day '{0}': expected HH:MM")]
    InvalidTime(String),

    /// A provider definition that cannot be registered.
    #[error("invalid provider definition: {0}")]
    InvalidProvider(String),
}

/// Broad cause of a transcript fetch failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Network or platform transport failure.
    Transport,
    /// The bot may not read this conversation.
    Permission,
    /// The conversation does not exist.
    NotFound,
}

/// Failure reported by the transcript collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("fetch failed ({kind:?}): {message}")]
pub struct FetchError {
    /// Broad cause.
    pub kind: FetchErrorKind,
    /// Collaborator-supplied description.
    pub message: String,
}

impl FetchError {
    /// Transport-level failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transport,
            message: message.into(),
        }
    }

    /// Permission denied.
    pub fn permission(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Permission,
            message: message.into(),
        }
    }

    /// Unknown conversation.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::NotFound,
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
