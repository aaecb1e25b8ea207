//! The generation backend seen through one narrow trait.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::credentials::Credential;
use crate::registry::EffectiveModelConfig;

/// Classified failure of a generation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The attempt exceeded its deadline.
    Timeout,
    /// Could not reach the endpoint.
    Connection,
    /// The backend asked us to slow down.
    RateLimited,
    /// The credential was rejected.
    Auth,
    /// The request itself is wrong; resending will not help.
    InvalidRequest,
    /// The backend failed on its side (5xx or unclassified).
    Upstream,
    /// Abandoned by the caller.
    Cancelled,
}

impl FailureKind {
    /// Worth another attempt.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection | Self::RateLimited | Self::Upstream
        )
    }

    /// Short label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::RateLimited => "rate_limited",
            Self::Auth => "auth",
            Self::InvalidRequest => "invalid_request",
            Self::Upstream => "upstream",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What a backend returns when an attempt fails.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{}: {message}", .kind.as_str())]
pub struct CompletionError {
    /// Classification.
    pub kind: FailureKind,
    /// HTTP-like status, when there was one.
    pub status: Option<u16>,
    /// Backend-supplied description.
    pub message: String,
}

impl CompletionError {
    /// Build with an explicit kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Classify an HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => FailureKind::Auth,
            429 => FailureKind::RateLimited,
            408 => FailureKind::Timeout,
            400..=499 => FailureKind::InvalidRequest,
            _ => FailureKind::Upstream,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Connection-level failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Connection, message)
    }

    /// Deadline exceeded.
    pub fn timeout(after: Duration) -> Self {
        Self::new(FailureKind::Timeout, format!("no response within {}s", after.as_secs()))
    }
}

/// The opaque generation capability.
///
/// Implementations perform exactly one call; timeout, retry, and credential
/// choice are the dispatcher's job.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Generate text for `prompt`.
    async fn generate(
        &self,
        endpoint: &str,
        credential: &Credential,
        model: &EffectiveModelConfig,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(CompletionError::from_status(401, "").kind, FailureKind::Auth);
        assert_eq!(CompletionError::from_status(429, "").kind, FailureKind::RateLimited);
        assert_eq!(CompletionError::from_status(400, "").kind, FailureKind::InvalidRequest);
        assert_eq!(CompletionError::from_status(503, "").kind, FailureKind::Upstream);
        assert!(CompletionError::from_status(502, "").kind.is_transient());
        assert!(!CompletionError::from_status(401, "").kind.is_transient());
        assert!(!FailureKind::Cancelled.is_transient());
    }

    #[test]
    fn display_includes_kind() {
        let e = CompletionError::from_status(429, "slow down");
        assert_eq!(e.to_string(), "rate_limited: slow down");
    }
}
