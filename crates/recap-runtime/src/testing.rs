//! In-memory collaborators for tests and local wiring.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use recap_core::{ConversationId, FetchError, Message, MessageFilter, ModelRef, RetryConfig};
use recap_llm::mock::{MockCompletion, MockReply};
use recap_llm::{Completion, CredentialRotator, Dispatcher, HealthPolicy, Model, Provider, ProviderRegistry};
use recap_settings::{GlobalConfig, OutputMode, SharedGlobalConfig, Theme};

use crate::cache::HistoryCache;
use crate::collaborators::{Artifact, Renderer, SummarySink, TranscriptSource};
use crate::governor::ConcurrencyGovernor;
use crate::orchestrator::{Orchestrator, OrchestratorDeps};

/// Transcript source backed by a map, counting fetches.
#[derive(Debug, Default)]
pub struct StaticTranscript {
    logs: Mutex<HashMap<ConversationId, Vec<Message>>>,
    fetches: AtomicUsize,
    failing: AtomicBool,
}

impl StaticTranscript {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a conversation's log.
    pub fn set_messages(&self, conversation: &ConversationId, messages: Vec<Message>) {
        let _ = self.logs.lock().insert(conversation.clone(), messages);
    }

    /// Fill a conversation with `n` generated messages from two senders.
    pub fn fill(&self, conversation: &ConversationId, n: usize) {
        let messages = (0..n)
            .map(|i| {
                let (id, name) = if i % 2 == 0 { ("u1", "Alice") } else { ("u2", "Bob") };
                Message::new(id, name, format!("message {i}"))
            })
            .collect();
        self.set_messages(conversation, messages);
    }

    /// Make `fetch` and `message_count` fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls to `fetch` so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), FetchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::transport("transcript source offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl TranscriptSource for StaticTranscript {
    async fn fetch(
        &self,
        conversation: &ConversationId,
        window: u32,
        filter: &MessageFilter,
    ) -> Result<Vec<Message>, FetchError> {
        let _ = self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let logs = self.logs.lock();
        let log = logs
            .get(conversation)
            .ok_or_else(|| FetchError::not_found(format!("unknown conversation {conversation}")))?;
        let start = log.len().saturating_sub(window as usize);
        Ok(log[start..].iter().filter(|m| filter.matches(m)).cloned().collect())
    }

    async fn message_count(&self, conversation: &ConversationId) -> Result<u64, FetchError> {
        self.check()?;
        Ok(self.logs.lock().get(conversation).map_or(0, |l| l.len() as u64))
    }
}

/// Renderer that wraps the text unchanged, or fails on request.
#[derive(Debug, Default)]
pub struct EchoRenderer {
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl EchoRenderer {
    /// Renderer that succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer whose every call fails.
    pub fn failing() -> Self {
        let r = Self::default();
        r.failing.store(true, Ordering::SeqCst);
        r
    }

    /// Calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for EchoRenderer {
    async fn render(&self, text: &str, mode: OutputMode, _theme: Theme) -> anyhow::Result<Artifact> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("renderer unavailable");
        }
        Ok(match mode {
            OutputMode::Image => Artifact::Image(text.as_bytes().to_vec()),
            OutputMode::Text => Artifact::Text(text.to_owned()),
        })
    }
}

/// Sink that records deliveries.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(ConversationId, Artifact)>>,
    failing: AtomicBool,
}

impl RecordingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deliveries fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything delivered so far, in order.
    pub fn deliveries(&self) -> Vec<(ConversationId, Artifact)> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl SummarySink for RecordingSink {
    async fn deliver(&self, conversation: &ConversationId, artifact: &Artifact) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("chat platform rejected the message");
        }
        self.delivered.lock().push((conversation.clone(), artifact.clone()));
        Ok(())
    }
}

/// A fully wired [`Orchestrator`] over in-memory collaborators.
///
/// One provider `OpenAI` with models `gpt-4o` (the default) and
/// `gpt-4o-mini`; conversations `g1`, `g2`, `g3` hold 50 messages each.
/// Dispatch uses a 5 s timeout, one retry, and a 1 s retry delay.
pub struct TestRig {
    /// Transcript behind the cache.
    pub source: Arc<StaticTranscript>,
    /// Scripted generation backend.
    pub backend: Arc<MockCompletion>,
    /// Collects scheduled deliveries.
    pub sink: Arc<RecordingSink>,
    /// The orchestrator under test.
    pub orchestrator: Arc<Orchestrator>,
}

impl TestRig {
    /// Defaults tuned for tests: window bounds `[5, 100]`, 60 s cooldown,
    /// two slots, admin `root`.
    pub fn global() -> GlobalConfig {
        GlobalConfig {
            default_model: ModelRef::new("OpenAI", "gpt-4o").ok(),
            min_length: 5,
            max_length: 100,
            cooldown_secs: 60,
            max_concurrent_tasks: 2,
            admins: vec!["root".into()],
            ..GlobalConfig::default()
        }
    }

    /// Rig with [`TestRig::global`] and an [`EchoRenderer`].
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self::with(Self::global(), replies, Arc::new(EchoRenderer::new()))
    }

    /// Rig with explicit config and renderer.
    ///
    /// # Panics
    ///
    /// If the built-in provider definition is rejected.
    pub fn with(global: GlobalConfig, replies: Vec<MockReply>, renderer: Arc<dyn Renderer>) -> Self {
        let source = Arc::new(StaticTranscript::new());
        for c in ["g1", "g2", "g3"] {
            source.fill(&ConversationId::from(c), 50);
        }

        let registry = Arc::new(ProviderRegistry::new(Arc::new(SharedGlobalConfig::new(global.clone()))));
        let provider = Provider::builder("OpenAI", "https://api.openai.com/v1")
            .credential("sk-test-aaaaaaaaaaaa")
            .model(Model::new("gpt-4o"))
            .model(Model::new("gpt-4o-mini"))
            .build();
        match provider.and_then(|p| registry.replace_all(vec![p])) {
            Ok(()) => {}
            Err(e) => panic!("test provider rejected: {e}"),
        }

        let backend = Arc::new(MockCompletion::new(replies));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&backend) as Arc<dyn Completion>,
            Arc::new(CredentialRotator::new(HealthPolicy::default())),
            RetryConfig {
                timeout_secs: 5,
                max_retries: 1,
                retry_delay_secs: 1,
            },
        ));
        let cache = Arc::new(HistoryCache::new(
            Arc::clone(&source) as Arc<dyn TranscriptSource>,
            Duration::from_secs(global.cache_ttl_secs),
            None,
        ));
        let governor = Arc::new(ConcurrencyGovernor::from_global(Arc::clone(registry.global_handle())));
        let orchestrator = Arc::new(Orchestrator::new(OrchestratorDeps {
            registry,
            dispatcher,
            cache,
            governor,
            renderer,
            prompts: None,
            alert_after: Duration::from_secs(600),
        }));

        Self {
            source,
            backend,
            sink: Arc::new(RecordingSink::new()),
            orchestrator,
        }
    }
}
