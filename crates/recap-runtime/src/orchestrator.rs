//! One summarization run, from trigger to artifact.
//!
//! Order of operations:
//! 1. Validate the window (reject for manual triggers, clamp for scheduled)
//! 2. Pass the governor (cooldown, then a slot held for the whole run)
//! 3. Fetch the transcript through the history cache
//! 4. Enforce the minimum message count
//! 5. Resolve model and style for the conversation
//! 6. Build the prompt and dispatch it
//! 7. Render, degrading to text when allowed

use std::sync::Arc;
use std::time::Duration;

use recap_core::{ConfigError, ConversationId, MessageFilter, ModelRef, RunId, Trigger};
use recap_llm::{
    Completion, CredentialRotator, DispatchError, Dispatcher, EffectiveModelConfig, HealthPolicy, ProviderRegistry,
};
use recap_settings::{GlobalConfig, OutputMode, RecapSettings, SharedGlobalConfig};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::HistoryCache;
use crate::collaborators::{Artifact, DefaultPromptBuilder, PromptBuilder, Renderer, TranscriptSource};
use crate::errors::OrchestratorError;
use crate::fallback;
use crate::governor::ConcurrencyGovernor;

/// Input to [`Orchestrator::run`].
#[derive(Clone, Debug)]
pub struct SummaryRequest {
    /// Who or what started the run.
    pub trigger: Trigger,
    /// Conversation to summarize.
    pub conversation: ConversationId,
    /// How many recent messages to read.
    pub window: u32,
    /// Participant/keyword narrowing.
    pub filter: MessageFilter,
    /// Style for this run only.
    pub style: Option<String>,
}

impl SummaryRequest {
    /// Request on behalf of a caller.
    pub fn manual(caller: impl Into<recap_core::CallerId>, conversation: ConversationId, window: u32) -> Self {
        Self {
            trigger: Trigger::manual(caller),
            conversation,
            window,
            filter: MessageFilter::default(),
            style: None,
        }
    }

    /// Request from the scheduler.
    pub fn scheduled(conversation: ConversationId, window: u32) -> Self {
        Self {
            trigger: Trigger::Scheduled,
            conversation,
            window,
            filter: MessageFilter::default(),
            style: None,
        }
    }

    /// Narrow the transcript.
    #[must_use]
    pub fn with_filter(mut self, filter: MessageFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Override the style for this run.
    #[must_use]
    pub fn with_style(mut self, style: Option<String>) -> Self {
        self.style = style.filter(|s| !s.trim().is_empty());
        self
    }
}

/// A produced summary.
#[derive(Clone, Debug)]
pub struct SummaryResult {
    /// Correlates log lines for this run.
    pub run_id: RunId,
    /// Conversation summarized.
    pub conversation_id: ConversationId,
    /// What to send.
    pub artifact: Artifact,
    /// Model that generated the text.
    pub model: ModelRef,
    /// Style used.
    pub style: String,
    /// Messages summarized.
    pub message_count: usize,
    /// Output was downgraded (text instead of image, or a failure notice).
    pub degraded: bool,
    /// Wall time of the run.
    pub elapsed: Duration,
}

/// Everything an [`Orchestrator`] needs.
pub struct OrchestratorDeps {
    /// Providers, defaults, overrides.
    pub registry: Arc<ProviderRegistry>,
    /// Generation calls.
    pub dispatcher: Arc<Dispatcher>,
    /// Transcript access.
    pub cache: Arc<HistoryCache>,
    /// Slots and cooldowns.
    pub governor: Arc<ConcurrencyGovernor>,
    /// Artifact production.
    pub renderer: Arc<dyn Renderer>,
    /// Prompt text; [`DefaultPromptBuilder`] when `None`.
    pub prompts: Option<Arc<dyn PromptBuilder>>,
    /// How long every credential of a provider may stay unhealthy before
    /// an outage is reported.
    pub alert_after: Duration,
}

impl OrchestratorDeps {
    /// Wire every component from `settings` around the platform-facing
    /// collaborators.
    ///
    /// The governor follows the shared global config for its cooldown.
    /// Fails if a declared provider is rejected.
    pub fn from_settings(
        settings: &RecapSettings,
        backend: Arc<dyn Completion>,
        source: Arc<dyn TranscriptSource>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self, ConfigError> {
        let global = Arc::new(SharedGlobalConfig::new(GlobalConfig::from(settings)));
        let registry = Arc::new(ProviderRegistry::new(Arc::clone(&global)));
        registry.replace_from_settings(&settings.providers)?;
        let rotator = Arc::new(CredentialRotator::new(HealthPolicy::from(&settings.credentials)));

        Ok(Self {
            registry,
            dispatcher: Arc::new(Dispatcher::new(backend, rotator, settings.dispatch.clone())),
            cache: Arc::new(HistoryCache::from_settings(source, &settings.cache)),
            governor: Arc::new(ConcurrencyGovernor::from_global(global)),
            renderer,
            prompts: None,
            alert_after: Duration::from_secs(settings.credentials.alert_after_secs),
        })
    }
}

/// Ties the registry, cache, governor, dispatcher, and renderer together.
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    dispatcher: Arc<Dispatcher>,
    cache: Arc<HistoryCache>,
    governor: Arc<ConcurrencyGovernor>,
    renderer: Arc<dyn Renderer>,
    prompts: Arc<dyn PromptBuilder>,
    alert_after: Duration,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cache", &self.cache)
            .field("governor", &self.governor)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Assemble from parts.
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            registry: deps.registry,
            dispatcher: deps.dispatcher,
            cache: deps.cache,
            governor: deps.governor,
            renderer: deps.renderer,
            prompts: deps.prompts.unwrap_or_else(|| Arc::new(DefaultPromptBuilder)),
            alert_after: deps.alert_after,
        }
    }

    /// Provider registry.
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// History cache.
    pub fn cache(&self) -> &Arc<HistoryCache> {
        &self.cache
    }

    /// Concurrency governor.
    pub fn governor(&self) -> &Arc<ConcurrencyGovernor> {
        &self.governor
    }

    /// Generation dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Unhealthy time after which a provider outage is reported.
    pub fn alert_after(&self) -> Duration {
        self.alert_after
    }

    /// Run to completion.
    pub async fn run(&self, request: SummaryRequest) -> Result<SummaryResult, OrchestratorError> {
        self.run_with_cancel(request, &CancellationToken::new()).await
    }

    /// As [`run`](Self::run); `cancel` stops dispatch retries.
    #[instrument(skip_all, fields(
        conversation_id = %request.conversation,
        trigger = request.trigger.label(),
        run_id = tracing::field::Empty,
    ))]
    pub async fn run_with_cancel(
        &self,
        request: SummaryRequest,
        cancel: &CancellationToken,
    ) -> Result<SummaryResult, OrchestratorError> {
        let run_id = RunId::new();
        let _ = tracing::Span::current().record("run_id", tracing::field::display(&run_id));
        let started = Instant::now();
        let global = self.registry.global();

        let window = check_window(&request, &global)?;

        let privileged = request.trigger.caller().is_some_and(|c| global.is_privileged(c));
        let _permit = self
            .governor
            .admit(&request.trigger, &request.conversation, privileged)
            .await?;

        let messages = self
            .cache
            .get(&request.conversation, window, &request.filter)
            .await?;
        if messages.len() < global.min_length as usize {
            debug!(found = messages.len(), required = global.min_length, "not enough messages");
            return Err(OrchestratorError::InsufficientMessages {
                found: messages.len(),
                required: global.min_length,
            });
        }

        let model = self.registry.resolve_for_conversation(&request.conversation)?;
        let style = request
            .style
            .clone()
            .unwrap_or_else(|| self.registry.resolve_style_for_conversation(&request.conversation));
        let prompt = self.prompts.build(&messages, &style, &request.filter);
        debug!(model = %model.model_ref, %style, messages = messages.len(), "dispatching");

        let (artifact, degraded) = match self.dispatcher.dispatch_with_cancel(&model, &prompt, cancel).await {
            Ok(text) => self.render(&text, &global).await?,
            Err(err) => {
                self.check_outage(&model);
                if global.fallback_enabled && !request.trigger.is_scheduled() {
                    warn!(error = %err, "generation failed, returning failure notice");
                    (Artifact::Text(fallback::dispatch_failure_text(&err)), true)
                } else {
                    return Err(dispatch_failed(err));
                }
            }
        };

        if let Some(caller) = request.trigger.caller() {
            self.governor.mark_success(caller, &request.conversation);
        }

        let elapsed = started.elapsed();
        info!(
            model = %model.model_ref,
            messages = messages.len(),
            degraded,
            elapsed_ms = elapsed.as_millis() as u64,
            "summary produced"
        );
        Ok(SummaryResult {
            run_id,
            conversation_id: request.conversation,
            artifact,
            model: model.model_ref,
            style,
            message_count: messages.len(),
            degraded,
            elapsed,
        })
    }

    async fn render(&self, text: &str, global: &GlobalConfig) -> Result<(Artifact, bool), OrchestratorError> {
        match self.renderer.render(text, global.output_mode, global.theme).await {
            Ok(artifact) => Ok((artifact, false)),
            Err(source) if global.fallback_enabled => {
                warn!(error = %source, "rendering failed, falling back to text");
                let image_requested = global.output_mode == OutputMode::Image;
                Ok((Artifact::Text(fallback::text_fallback(text, image_requested)), true))
            }
            Err(source) => {
                error!(error = %source, "rendering failed and text fallback is disabled");
                Err(OrchestratorError::Render { source })
            }
        }
    }

    fn check_outage(&self, model: &EffectiveModelConfig) {
        let provider = model.provider();
        if let Some(down_for) = self.dispatcher.rotator().all_unhealthy_for(provider)
            && down_for >= self.alert_after
        {
            error!(
                provider = provider.name(),
                down_secs = down_for.as_secs(),
                "all credentials unhealthy for a sustained period"
            );
        }
    }
}

fn check_window(request: &SummaryRequest, global: &GlobalConfig) -> Result<u32, OrchestratorError> {
    let (min, max) = (global.min_length, global.max_length);
    if (min..=max).contains(&request.window) {
        return Ok(request.window);
    }
    if request.trigger.is_scheduled() {
        let clamped = request.window.clamp(min, max.max(min));
        debug!(requested = request.window, clamped, "window clamped");
        return Ok(clamped);
    }
    Err(OrchestratorError::OutOfRange {
        requested: request.window,
        min,
        max,
    })
}

fn dispatch_failed(err: DispatchError) -> OrchestratorError {
    warn!(kind = err.category(), attempts = err.attempts, "generation failed");
    OrchestratorError::Dispatch(err)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockRenderer;
    use crate::testing::{EchoRenderer, StaticTranscript, TestRig};
    use assert_matches::assert_matches;
    use recap_llm::FailureKind;
    use recap_llm::mock::{MockCompletion, MockReply};
    use recap_settings::{ModelSettings, ProviderSettings, Theme};

    fn g1() -> ConversationId {
        ConversationId::from("g1")
    }

    #[tokio::test(start_paused = true)]
    async fn manual_run_produces_artifact() {
        let h = TestRig::new(vec![MockReply::text("the summary")]);
        let result = h
            .orchestrator
            .run(SummaryRequest::manual("alice", g1(), 20))
            .await
            .unwrap();

        assert_eq!(result.artifact, Artifact::Image(b"the summary".to_vec()));
        assert_eq!(result.model.to_string(), "OpenAI/gpt-4o");
        assert_eq!(result.style, "concise");
        assert_eq!(result.message_count, 20);
        assert!(!result.degraded);
        assert_eq!(h.orchestrator.governor().available_slots(), 2);
        let prompt = h.backend.last_prompt().unwrap();
        assert!(prompt.contains("Alice: message 30"));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_out_of_range_is_rejected() {
        let h = TestRig::new(vec![]);
        let err = h
            .orchestrator
            .run(SummaryRequest::manual("alice", g1(), 101))
            .await
            .unwrap_err();
        assert_matches!(err, OrchestratorError::OutOfRange { requested: 101, min: 5, max: 100 });
        assert_eq!(h.source.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_window_is_clamped() {
        let h = TestRig::new(vec![]);
        let result = h
            .orchestrator
            .run(SummaryRequest::scheduled(g1(), 1000))
            .await
            .unwrap();
        assert_eq!(result.message_count, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn too_few_messages() {
        let h = TestRig::new(vec![]);
        h.source.fill(&g1(), 3);
        let err = h
            .orchestrator
            .run(SummaryRequest::manual("alice", g1(), 10))
            .await
            .unwrap_err();
        assert_matches!(err, OrchestratorError::InsufficientMessages { found: 3, required: 5 });
        assert_eq!(h.backend.call_count(), 0);
        assert_eq!(h.orchestrator.governor().available_slots(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_after_success_only() {
        let h = TestRig::new(vec![MockReply::status(400, "bad prompt")]);
        let req = || SummaryRequest::manual("alice", g1(), 10);

        assert_matches!(h.orchestrator.run(req()).await, Err(OrchestratorError::Dispatch(_)));
        assert!(h.orchestrator.run(req()).await.is_ok());
        assert_matches!(
            h.orchestrator.run(req()).await,
            Err(OrchestratorError::CooldownActive { remaining_secs: 60 })
        );
        // admins are exempt
        assert!(h.orchestrator.run(SummaryRequest::manual("root", g1(), 10)).await.is_ok());
        assert!(h.orchestrator.run(SummaryRequest::manual("root", g1(), 10)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn conversation_override_and_style() {
        let h = TestRig::new(vec![]);
        h.orchestrator.registry().set_conversation_config(
            g1(),
            recap_core::ConversationConfig {
                model_override: Some(ModelRef::parse("OpenAI/gpt-4o-mini").unwrap()),
                style_override: Some("haiku".into()),
            },
        );
        let result = h
            .orchestrator
            .run(SummaryRequest::manual("alice", g1(), 10))
            .await
            .unwrap();
        assert_eq!(result.model.model(), "gpt-4o-mini");
        assert_eq!(result.style, "haiku");

        let result = h
            .orchestrator
            .run(SummaryRequest::scheduled(g1(), 10).with_style(Some("formal".into())))
            .await
            .unwrap();
        assert_eq!(result.style, "formal");
    }

    #[tokio::test(start_paused = true)]
    async fn no_default_model() {
        let h = TestRig::with(
            GlobalConfig {
                default_model: None,
                ..TestRig::global()
            },
            vec![],
            Arc::new(EchoRenderer::new()),
        );
        let err = h
            .orchestrator
            .run(SummaryRequest::manual("alice", g1(), 10))
            .await
            .unwrap_err();
        assert_matches!(err, OrchestratorError::Config(ConfigError::NoDefaultConfigured));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_failure_degrades_manual_runs_when_enabled() {
        let h = TestRig::with(
            GlobalConfig {
                fallback_enabled: true,
                ..TestRig::global()
            },
            vec![MockReply::status(401, "bad key")],
            Arc::new(EchoRenderer::new()),
        );
        let result = h
            .orchestrator
            .run(SummaryRequest::manual("alice", g1(), 10))
            .await
            .unwrap();
        assert!(result.degraded);
        assert!(result.artifact.as_text().unwrap().contains("auth"));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_failure_fails_scheduled_runs() {
        let h = TestRig::with(
            GlobalConfig {
                fallback_enabled: true,
                ..TestRig::global()
            },
            vec![MockReply::status(500, "down"), MockReply::status(502, "down")],
            Arc::new(EchoRenderer::new()),
        );
        let err = h
            .orchestrator
            .run(SummaryRequest::scheduled(g1(), 10))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            OrchestratorError::Dispatch(DispatchError { kind: FailureKind::Upstream, attempts: 2, .. })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn render_failure_falls_back_to_text() {
        let mut renderer = MockRenderer::new();
        let _ = renderer
            .expect_render()
            .withf(|_, mode, theme| *mode == OutputMode::Image && *theme == Theme::VscodeDark)
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("browser crashed")));
        let h = TestRig::with(
            GlobalConfig {
                fallback_enabled: true,
                ..TestRig::global()
            },
            vec![MockReply::text("<h1>Today</h1> all good")],
            Arc::new(renderer),
        );

        let result = h
            .orchestrator
            .run(SummaryRequest::manual("alice", g1(), 10))
            .await
            .unwrap();
        assert!(result.degraded);
        assert_eq!(
            result.artifact.as_text().unwrap(),
            format!("{}Today all good", fallback::DEGRADED_NOTICE)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn render_failure_without_fallback_is_an_error() {
        let h = TestRig::with(TestRig::global(), vec![], Arc::new(EchoRenderer::failing()));
        let err = h
            .orchestrator
            .run(SummaryRequest::manual("alice", g1(), 10))
            .await
            .unwrap_err();
        assert_matches!(err, OrchestratorError::Render { .. });
        assert_eq!(h.orchestrator.governor().available_slots(), 2);
    }

    fn settings_with(provider: &str) -> RecapSettings {
        let mut settings = RecapSettings::default();
        settings.default_model = ModelRef::new("OpenAI", "gpt-4o").ok();
        settings.providers = vec![ProviderSettings {
            name: provider.into(),
            api_keys: vec!["sk-live-bbbbbbbbbbbb".into()],
            base_url: "https://api.openai.com/v1".into(),
            models: vec![ModelSettings {
                name: "gpt-4o".into(),
                ..ModelSettings::default()
            }],
            ..ProviderSettings::default()
        }];
        settings.governor.max_concurrent_tasks = 4;
        settings.governor.cooldown_secs = 30;
        settings.cache.ttl_secs = 120;
        settings.credentials.alert_after_secs = 900;
        settings.dispatch.max_retries = 2;
        settings
    }

    fn from_settings(settings: &RecapSettings) -> Result<Orchestrator, ConfigError> {
        let source = Arc::new(StaticTranscript::new());
        source.fill(&g1(), 30);
        let deps = OrchestratorDeps::from_settings(
            settings,
            Arc::new(MockCompletion::new(vec![])),
            source,
            Arc::new(EchoRenderer::new()),
        )?;
        Ok(Orchestrator::new(deps))
    }

    #[tokio::test(start_paused = true)]
    async fn deps_built_from_settings() {
        let orch = from_settings(&settings_with("OpenAI")).unwrap();
        assert_eq!(orch.governor().capacity(), 4);
        assert_eq!(orch.governor().cooldown(), Duration::from_secs(30));
        assert_eq!(orch.cache().ttl(), Duration::from_secs(120));
        assert_eq!(orch.alert_after(), Duration::from_secs(900));
        assert_eq!(orch.dispatcher().retry_config().max_retries, 2);
        assert!(orch.registry().provider("OpenAI").is_some());

        let result = orch.run(SummaryRequest::manual("alice", g1(), 20)).await.unwrap();
        assert_eq!(result.model.to_string(), "OpenAI/gpt-4o");
        assert_matches!(
            orch.run(SummaryRequest::manual("alice", g1(), 20)).await,
            Err(OrchestratorError::CooldownActive { .. })
        );

        // cooldown changes reach the governor without a rebuild
        orch.registry().global_handle().update(|g| g.cooldown_secs = 0);
        assert!(orch.run(SummaryRequest::manual("alice", g1(), 20)).await.is_ok());
    }

    #[test]
    fn rejected_provider_fails_wiring() {
        assert_matches!(from_settings(&settings_with("bad/name")), Err(ConfigError::InvalidProvider(_)));
    }
}
