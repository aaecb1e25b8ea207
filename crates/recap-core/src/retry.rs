//! Retry configuration and linear backoff.
//!
//! Dispatch attempts are retried with a delay of `retry_delay * attempt`
//! (linear, not exponential), so the third retry waits three times as long
//! as the first. The async loop that applies this lives in `recap-llm`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-attempt timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base retry delay in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Timeout and retry parameters for a generation call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Hard timeout for each attempt, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Additional attempts after the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay before retry number `n` is `retry_delay_secs * n`.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

impl RetryConfig {
    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        Duration::from_secs(self.retry_delay_secs.saturating_mul(u64::from(retry)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = RetryConfig::default();
        assert_eq!(c.timeout(), Duration::from_secs(120));
        assert_eq!(c.max_attempts(), 4);
    }

    #[test]
    fn backoff_is_linear() {
        let c = RetryConfig {
            retry_delay_secs: 2,
            ..RetryConfig::default()
        };
        assert_eq!(c.delay_for_retry(1), Duration::from_secs(2));
        assert_eq!(c.delay_for_retry(2), Duration::from_secs(4));
        assert_eq!(c.delay_for_retry(3), Duration::from_secs(6));
    }

    #[test]
    fn partial_json_gets_defaults() {
        let c: RetryConfig = serde_json::from_str(r#"{"maxRetries": 1}"#).unwrap();
        assert_eq!(c.max_retries, 1);
        assert_eq!(c.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(c.retry_delay_secs, DEFAULT_RETRY_DELAY_SECS);
    }
}
