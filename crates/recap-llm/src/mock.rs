//! Scripted [`Completion`] backend for deterministic tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::completion::{Completion, CompletionError};
use crate::credentials::Credential;
use crate::registry::EffectiveModelConfig;

/// One pre-programmed reply.
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Succeed with this text.
    Text(String),
    /// Fail with this error.
    Error(CompletionError),
    /// Wait, then behave like the inner reply.
    Delay(Duration, Box<MockReply>),
}

impl MockReply {
    /// Successful text.
    pub fn text(s: &str) -> Self {
        Self::Text(s.to_owned())
    }

    /// Failure with an HTTP-like status.
    pub fn status(status: u16, message: &str) -> Self {
        Self::Error(CompletionError::from_status(status, message))
    }

    /// Wrap any reply with a delay.
    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Plays replies in order; once they run out, repeats the fallback reply.
#[derive(Debug)]
pub struct MockCompletion {
    replies: Vec<MockReply>,
    fallback: MockReply,
    call_count: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
}

#[derive(Clone, Debug)]
struct RecordedCall {
    at: Instant,
    key: String,
    prompt: String,
}

impl MockCompletion {
    /// Scripted replies, falling back to `"ok"` text.
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies,
            fallback: MockReply::text("ok"),
            call_count: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always reply with `reply`.
    pub fn always(reply: MockReply) -> Self {
        Self {
            fallback: reply,
            ..Self::new(Vec::new())
        }
    }

    /// Calls started so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Start time of each call.
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|c| c.at).collect()
    }

    /// Masked credential used by each call.
    pub fn keys_used(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.key.clone()).collect()
    }

    /// Prompt of the most recent call.
    pub fn last_prompt(&self) -> Option<String> {
        self.calls.lock().last().map(|c| c.prompt.clone())
    }
}

#[async_trait]
impl Completion for MockCompletion {
    async fn generate(
        &self,
        _endpoint: &str,
        credential: &Credential,
        _model: &EffectiveModelConfig,
        prompt: &str,
        _timeout: Duration,
    ) -> Result<String, CompletionError> {
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(RecordedCall {
            at: Instant::now(),
            key: credential.masked().to_owned(),
            prompt: prompt.to_owned(),
        });
        let mut reply = self.replies.get(idx).unwrap_or(&self.fallback).clone();
        loop {
            match reply {
                MockReply::Text(t) => return Ok(t),
                MockReply::Error(e) => return Err(e),
                MockReply::Delay(d, inner) => {
                    tokio::time::sleep(d).await;
                    reply = *inner;
                }
            }
        }
    }
}
