//! Fault-tolerant generation calls.
//!
//! Each attempt runs under a hard timeout with a freshly drawn credential.
//! Transient failures (timeout, connection, rate limit, upstream 5xx) are
//! retried up to `max_retries` times, waiting `retry_delay * n` before retry
//! `n`. Anything else fails on the spot. Every attempt's outcome is
//! reported to the [`CredentialRotator`].

use std::sync::Arc;

use recap_core::RetryConfig;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::completion::{Completion, CompletionError, FailureKind};
use crate::credentials::CredentialRotator;
use crate::registry::EffectiveModelConfig;

/// Terminal failure after the retry budget is spent or a non-retryable
/// error was hit.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("generation failed after {attempts} attempt(s) [{}]: {last_message}", .kind.as_str())]
pub struct DispatchError {
    /// Classification of the last failure.
    pub kind: FailureKind,
    /// Status of the last failure, if any.
    pub status: Option<u16>,
    /// Message of the last failure.
    pub last_message: String,
    /// Attempts made.
    pub attempts: u32,
}

impl DispatchError {
    fn from_last(last: CompletionError, attempts: u32) -> Self {
        Self {
            kind: last.kind,
            status: last.status,
            last_message: last.message,
            attempts,
        }
    }

    /// Whether the underlying failure class was transient (the budget ran
    /// out) rather than terminal.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Short label for logs and metrics.
    pub fn category(&self) -> &'static str {
        self.kind.as_str()
    }
}

/// Runs generation calls with timeout, retry, and credential rotation.
pub struct Dispatcher {
    backend: Arc<dyn Completion>,
    rotator: Arc<CredentialRotator>,
    retry: RetryConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher over `backend`.
    pub fn new(backend: Arc<dyn Completion>, rotator: Arc<CredentialRotator>, retry: RetryConfig) -> Self {
        Self {
            backend,
            rotator,
            retry,
        }
    }

    /// The rotator consulted for credentials.
    pub fn rotator(&self) -> &Arc<CredentialRotator> {
        &self.rotator
    }

    /// Retry policy in effect.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Generate text, retrying transient failures.
    pub async fn dispatch(&self, model: &EffectiveModelConfig, prompt: &str) -> Result<String, DispatchError> {
        self.dispatch_with_cancel(model, prompt, &CancellationToken::new()).await
    }

    /// As [`dispatch`](Self::dispatch), abandoning between attempts once
    /// `cancel` fires. An attempt already in flight is allowed to finish.
    #[instrument(skip_all, fields(model = %model.model_ref))]
    pub async fn dispatch_with_cancel(
        &self,
        model: &EffectiveModelConfig,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, DispatchError> {
        let provider = model.provider();
        let max_attempts = self.retry.max_attempts();
        let timeout = self.retry.timeout();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if attempt > 1 {
                let delay = self.retry.delay_for_retry(attempt - 1);
                debug!(attempt, delay_secs = delay.as_secs(), "backing off before retry");
                tokio::select! {
                    () = cancel.cancelled() => {
                        return Err(cancelled(attempt - 1));
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                return Err(cancelled(attempt - 1));
            }

            let Some(credential) = self.rotator.select(provider) else {
                return Err(DispatchError::from_last(
                    CompletionError::new(FailureKind::InvalidRequest, "provider has no credentials"),
                    attempt - 1,
                ));
            };

            let outcome = tokio::time::timeout(
                timeout,
                self.backend.generate(&model.base_endpoint, &credential, model, prompt, timeout),
            )
            .await
            .unwrap_or_else(|_| Err(CompletionError::timeout(timeout)));

            let err = match outcome {
                Ok(text) => {
                    self.rotator.record_success(&credential);
                    metrics::counter!(
                        "recap_dispatch_attempts_total",
                        "provider" => provider.name().to_string(),
                        "outcome" => "success"
                    )
                    .increment(1);
                    debug!(attempt, key = credential.masked(), "generation succeeded");
                    return Ok(text);
                }
                Err(e) => e,
            };

            self.rotator.record_failure(&credential, err.status);
            metrics::counter!(
                "recap_dispatch_attempts_total",
                "provider" => provider.name().to_string(),
                "outcome" => err.kind.as_str()
            )
            .increment(1);

            if !err.kind.is_transient() {
                warn!(attempt, key = credential.masked(), error = %err, "non-retryable generation failure");
                return Err(DispatchError::from_last(err, attempt));
            }
            if attempt >= max_attempts {
                warn!(attempt, key = credential.masked(), error = %err, "retries exhausted");
                return Err(DispatchError::from_last(err, attempt));
            }
            warn!(
                attempt,
                max_attempts,
                key = credential.masked(),
                error = %err,
                "transient generation failure, will retry"
            );
        }
    }
}

fn cancelled(attempts: u32) -> DispatchError {
    DispatchError::from_last(CompletionError::new(FailureKind::Cancelled, "dispatch cancelled"), attempts)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCompletion, MockReply};
    use crate::registry::{Model, Provider, ProviderRegistry};
    use assert_matches::assert_matches;
    use recap_core::ModelRef;
    use recap_settings::SharedGlobalConfig;
    use std::time::Duration;

    fn model_config(keys: &[&str]) -> EffectiveModelConfig {
        let provider = Provider::builder("OpenAI", "https://api.openai.com/v1")
            .credentials(keys.iter().copied())
            .model(Model::new("gpt-4o"))
            .build()
            .unwrap();
        let registry =
            ProviderRegistry::with_providers(Arc::new(SharedGlobalConfig::default()), vec![provider]).unwrap();
        registry.resolve(&ModelRef::parse("OpenAI/gpt-4o").unwrap()).unwrap()
    }

    fn retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            timeout_secs: 10,
            max_retries,
            retry_delay_secs: 2,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_with_linear_backoff() {
        let backend = Arc::new(MockCompletion::new(vec![
            MockReply::status(503, "overloaded"),
            MockReply::Error(CompletionError::connection("reset")),
            MockReply::text("summary"),
        ]));
        let dispatcher = Dispatcher::new(backend.clone(), Arc::default(), retry(2));
        let cfg = model_config(&["key-aaaaaaaaaaaa", "key-bbbbbbbbbbbb"]);

        let start = tokio::time::Instant::now();
        let text = dispatcher.dispatch(&cfg, "prompt").await.unwrap();
        assert_eq!(text, "summary");
        assert_eq!(backend.call_count(), 3);

        let calls = backend.call_times();
        let gap1 = calls[1].duration_since(calls[0]);
        let gap2 = calls[2].duration_since(calls[1]);
        assert_eq!(gap1, Duration::from_secs(2));
        assert_eq!(gap2, Duration::from_secs(4));
        assert!(gap2 > gap1);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries() {
        let backend = Arc::new(MockCompletion::new(vec![
            MockReply::status(500, "boom"),
            MockReply::status(500, "boom"),
            MockReply::status(502, "bad gateway"),
        ]));
        let dispatcher = Dispatcher::new(backend.clone(), Arc::default(), retry(2));
        let err = dispatcher
            .dispatch(&model_config(&["key-aaaaaaaaaaaa"]), "p")
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.status, Some(502));
        assert_eq!(err.last_message, "bad gateway");
        assert!(err.is_transient());
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_is_not_retried() {
        let backend = Arc::new(MockCompletion::new(vec![
            MockReply::status(401, "bad key"),
            MockReply::text("never"),
        ]));
        let dispatcher = Dispatcher::new(backend.clone(), Arc::default(), retry(3));
        let err = dispatcher
            .dispatch(&model_config(&["key-aaaaaaaaaaaa"]), "p")
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Auth);
        assert_eq!(err.attempts, 1);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_transient() {
        let backend = Arc::new(MockCompletion::new(vec![
            MockReply::delayed(Duration::from_secs(60), MockReply::text("late")),
            MockReply::text("on time"),
        ]));
        let dispatcher = Dispatcher::new(backend.clone(), Arc::default(), retry(1));
        let text = dispatcher
            .dispatch(&model_config(&["key-aaaaaaaaaaaa"]), "p")
            .await
            .unwrap();
        assert_eq!(text, "on time");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_reported_to_rotator() {
        let backend = Arc::new(MockCompletion::new(vec![
            MockReply::status(500, "a"),
            MockReply::status(500, "b"),
            MockReply::status(500, "c"),
        ]));
        let rotator = Arc::new(CredentialRotator::default());
        let dispatcher = Dispatcher::new(backend, rotator.clone(), retry(2));
        let cfg = model_config(&["key-aaaaaaaaaaaa"]);
        let _ = dispatcher.dispatch(&cfg, "p").await.unwrap_err();
        let only = &cfg.provider().credentials()[0];
        assert!(!rotator.is_healthy(only));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff() {
        let backend = Arc::new(MockCompletion::new(vec![
            MockReply::status(503, "x"),
            MockReply::text("never"),
        ]));
        let dispatcher = Dispatcher::new(backend.clone(), Arc::default(), retry(3));
        let cancel = CancellationToken::new();
        let cfg = model_config(&["key-aaaaaaaaaaaa"]);

        let trigger = cancel.clone();
        let _ = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let err = dispatcher.dispatch_with_cancel(&cfg, "p", &cancel).await.unwrap_err();
        assert_matches!(err.kind, FailureKind::Cancelled);
        assert_eq!(err.attempts, 1);
        assert_eq!(backend.call_count(), 1);
    }
}
