//! Provider and model definitions with three-level parameter resolution.
//!
//! Resolution precedence for temperature and max tokens is fixed:
//! model override, then provider default, then the built-in default.
//! The provider set and the global defaults are each held behind an
//! `Arc` that is swapped whole on update, so a reader either sees the old
//! set or the new one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use recap_core::{ApiKind, ConfigError, ConversationConfig, ConversationId, ModelRef};
use recap_settings::{GlobalConfig, ProviderSettings, SharedGlobalConfig};
use tracing::{debug, info};

use crate::credentials::Credential;
use crate::inference::effective_api_kind;

/// Temperature when neither model nor provider sets one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Output token cap when neither model nor provider sets one.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// ─────────────────────────────────────────────────────────────────────────────
// Definitions
// ─────────────────────────────────────────────────────────────────────────────

/// A generation target under a provider.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    /// Unique within its provider.
    pub name: String,
    /// Overrides the provider default.
    pub temperature: Option<f32>,
    /// Overrides the provider default.
    pub max_tokens: Option<u32>,
}

impl Model {
    /// A model with no overrides.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set a temperature override.
    #[must_use]
    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Set a token cap override.
    #[must_use]
    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }
}

/// A named upstream backend. Immutable once built; updates replace it.
#[derive(Clone, Debug)]
pub struct Provider {
    name: String,
    credentials: Vec<Credential>,
    base_endpoint: String,
    api_kind: Option<ApiKind>,
    openai_compat: bool,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
    models: Vec<Model>,
}

impl Provider {
    /// Start building a provider.
    pub fn builder(name: impl Into<String>, base_endpoint: impl Into<String>) -> ProviderBuilder {
        ProviderBuilder {
            name: name.into(),
            base_endpoint: base_endpoint.into(),
            raw_credentials: Vec::new(),
            api_kind: None,
            openai_compat: false,
            temperature: None,
            max_tokens: None,
            models: Vec::new(),
        }
    }

    /// Build from a settings declaration.
    pub fn from_settings(s: &ProviderSettings) -> Result<Self, ConfigError> {
        let mut b = Self::builder(s.name.clone(), s.base_url.clone())
            .credentials(s.api_keys.iter())
            .openai_compat(s.openai_compat);
        b.api_kind = s.api_kind;
        b.temperature = s.temperature;
        b.max_tokens = s.max_tokens;
        for m in &s.models {
            b = b.model(Model {
                name: m.name.clone(),
                temperature: m.temperature,
                max_tokens: m.max_tokens,
            });
        }
        b.build()
    }

    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Endpoint base URL.
    pub fn base_endpoint(&self) -> &str {
        &self.base_endpoint
    }

    /// Credentials in declaration order.
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// Models in declaration order.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Look up a model by name.
    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Wire dialect for one of this provider's models.
    pub fn api_kind_for(&self, model: &str) -> ApiKind {
        effective_api_kind(self.api_kind, self.openai_compat, model)
    }
}

/// Builder for [`Provider`]. Holds raw keys, so no `Debug`.
pub struct ProviderBuilder {
    name: String,
    base_endpoint: String,
    raw_credentials: Vec<String>,
    api_kind: Option<ApiKind>,
    openai_compat: bool,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    models: Vec<Model>,
}

impl ProviderBuilder {
    /// Add one credential.
    #[must_use]
    pub fn credential(mut self, raw: impl Into<String>) -> Self {
        self.raw_credentials.push(raw.into());
        self
    }

    /// Add several credentials.
    #[must_use]
    pub fn credentials<I, S>(mut self, raws: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.raw_credentials
            .extend(raws.into_iter().map(|s| s.as_ref().to_owned()));
        self
    }

    /// Fix the wire dialect instead of inferring it.
    #[must_use]
    pub fn api_kind(mut self, kind: ApiKind) -> Self {
        self.api_kind = Some(kind);
        self
    }

    /// Route Gemini models through the OpenAI-compatible surface.
    #[must_use]
    pub fn openai_compat(mut self, on: bool) -> Self {
        self.openai_compat = on;
        self
    }

    /// Provider-wide default temperature.
    #[must_use]
    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Provider-wide default token cap.
    #[must_use]
    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Add a model.
    #[must_use]
    pub fn model(mut self, model: Model) -> Self {
        self.models.push(model);
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<Provider, ConfigError> {
        let invalid = |why: &str| ConfigError::InvalidProvider(format!("{}: {why}", self.name));

        let name = self.name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(invalid("name must be non-empty and contain no '/'"));
        }

        let mut seen = HashSet::new();
        let credentials: Vec<Credential> = self
            .raw_credentials
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty() && seen.insert(k.to_string()))
            .map(|k| Credential::new(name, k))
            .collect();
        if credentials.is_empty() {
            return Err(invalid("at least one credential is required"));
        }

        if self.models.is_empty() {
            return Err(invalid("at least one model is required"));
        }
        let mut names = HashSet::new();
        for m in &self.models {
            if m.name.trim().is_empty() {
                return Err(invalid("model with empty name"));
            }
            if !names.insert(m.name.as_str()) {
                return Err(invalid(&format!("duplicate model '{}'", m.name)));
            }
        }

        Ok(Provider {
            name: name.to_owned(),
            credentials,
            base_endpoint: self.base_endpoint,
            api_kind: self.api_kind,
            openai_compat: self.openai_compat,
            default_temperature: self.temperature,
            default_max_tokens: self.max_tokens,
            models: self.models,
        })
    }
}

/// Fully resolved parameters for one generation call.
#[derive(Clone, Debug)]
pub struct EffectiveModelConfig {
    /// The resolved address.
    pub model_ref: ModelRef,
    /// Endpoint base URL.
    pub base_endpoint: String,
    /// Wire dialect.
    pub api_kind: ApiKind,
    /// Effective temperature.
    pub temperature: f32,
    /// Effective output token cap.
    pub max_tokens: u32,
    provider: Arc<Provider>,
}

impl EffectiveModelConfig {
    /// The provider snapshot this config was resolved from.
    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ProviderSet {
    ordered: Vec<Arc<Provider>>,
    by_name: HashMap<String, usize>,
}

impl ProviderSet {
    fn build(providers: Vec<Provider>) -> Result<Self, ConfigError> {
        let mut set = Self::default();
        for p in providers {
            if set.by_name.contains_key(p.name()) {
                return Err(ConfigError::InvalidProvider(format!(
                    "duplicate provider '{}'",
                    p.name()
                )));
            }
            let _ = set.by_name.insert(p.name().to_owned(), set.ordered.len());
            set.ordered.push(Arc::new(p));
        }
        Ok(set)
    }

    fn get(&self, name: &str) -> Option<&Arc<Provider>> {
        self.by_name.get(name).map(|&i| &self.ordered[i])
    }
}

/// Holds providers, global defaults, and per-conversation overrides.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: RwLock<Arc<ProviderSet>>,
    global: Arc<SharedGlobalConfig>,
    conversations: DashMap<ConversationId, ConversationConfig>,
}

impl ProviderRegistry {
    /// Empty registry sharing `global`.
    pub fn new(global: Arc<SharedGlobalConfig>) -> Self {
        Self {
            providers: RwLock::new(Arc::new(ProviderSet::default())),
            global,
            conversations: DashMap::new(),
        }
    }

    /// Registry populated from declared providers.
    pub fn with_providers(
        global: Arc<SharedGlobalConfig>,
        providers: Vec<Provider>,
    ) -> Result<Self, ConfigError> {
        let registry = Self::new(global);
        registry.replace_all(providers)?;
        Ok(registry)
    }

    /// Atomically replace the whole provider set.
    ///
    /// On error nothing changes.
    pub fn replace_all(&self, providers: Vec<Provider>) -> Result<(), ConfigError> {
        let set = ProviderSet::build(providers)?;
        let count = set.ordered.len();
        *self.providers.write() = Arc::new(set);
        info!(providers = count, "provider set replaced");
        Ok(())
    }

    /// Build providers from settings and swap them in.
    pub fn replace_from_settings(&self, settings: &[ProviderSettings]) -> Result<(), ConfigError> {
        let providers = settings
            .iter()
            .map(Provider::from_settings)
            .collect::<Result<Vec<_>, _>>()?;
        self.replace_all(providers)
    }

    /// Look up a provider.
    pub fn provider(&self, name: &str) -> Option<Arc<Provider>> {
        self.snapshot().get(name).cloned()
    }

    /// Every (provider, model) pair in declaration order.
    pub fn list_all(&self) -> Vec<(Arc<Provider>, Model)> {
        let set = self.snapshot();
        set.ordered
            .iter()
            .flat_map(|p| p.models().iter().map(|m| (Arc::clone(p), m.clone())))
            .collect()
    }

    /// Resolve a reference to effective parameters.
    pub fn resolve(&self, model_ref: &ModelRef) -> Result<EffectiveModelConfig, ConfigError> {
        let set = self.snapshot();
        let provider = set
            .get(model_ref.provider())
            .ok_or_else(|| ConfigError::ProviderNotFound(model_ref.provider().to_owned()))?;
        let model = provider
            .model(model_ref.model())
            .ok_or_else(|| ConfigError::ModelNotFound {
                provider: model_ref.provider().to_owned(),
                model: model_ref.model().to_owned(),
            })?;

        Ok(EffectiveModelConfig {
            model_ref: model_ref.clone(),
            base_endpoint: provider.base_endpoint.clone(),
            api_kind: provider.api_kind_for(&model.name),
            temperature: model
                .temperature
                .or(provider.default_temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: model
                .max_tokens
                .or(provider.default_max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            provider: Arc::clone(provider),
        })
    }

    // ── Global defaults ─────────────────────────────────────────────

    /// Current global defaults.
    pub fn global(&self) -> Arc<GlobalConfig> {
        self.global.load()
    }

    /// Shared handle, for components that read other global fields.
    pub fn global_handle(&self) -> &Arc<SharedGlobalConfig> {
        &self.global
    }

    /// Set the global default model. The reference must resolve now.
    pub fn set_default(&self, model_ref: ModelRef) -> Result<(), ConfigError> {
        let _ = self.resolve(&model_ref)?;
        info!(model = %model_ref, "global default model set");
        self.global.update(|g| g.default_model = Some(model_ref));
        Ok(())
    }

    /// Remove the global default model.
    pub fn clear_default(&self) {
        self.global.update(|g| g.default_model = None);
    }

    /// Set the global default style.
    pub fn set_style(&self, style: impl Into<String>) {
        let style = style.into();
        self.global.update(|g| g.default_style = style);
    }

    /// Current global default style.
    pub fn default_style(&self) -> String {
        self.global.load().default_style.clone()
    }

    // ── Per-conversation overrides ──────────────────────────────────

    /// Overrides for a conversation; empty when none are set.
    pub fn conversation_config(&self, conversation: &ConversationId) -> ConversationConfig {
        self.conversations
            .get(conversation)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Replace a conversation's overrides. An empty config removes the entry.
    pub fn set_conversation_config(&self, conversation: ConversationId, config: ConversationConfig) {
        if config.is_empty() {
            let _ = self.conversations.remove(&conversation);
        } else {
            debug!(%conversation, "conversation overrides updated");
            let _ = self.conversations.insert(conversation, config);
        }
    }

    /// Bulk-load overrides, typically from the store at startup.
    pub fn load_conversation_configs<I>(&self, configs: I)
    where
        I: IntoIterator<Item = (ConversationId, ConversationConfig)>,
    {
        for (conversation, config) in configs {
            self.set_conversation_config(conversation, config);
        }
    }

    /// The model reference a conversation would use, without resolving it.
    pub fn model_ref_for_conversation(&self, conversation: &ConversationId) -> Result<ModelRef, ConfigError> {
        if let Some(r) = self
            .conversations
            .get(conversation)
            .and_then(|c| c.model_override.clone())
        {
            return Ok(r);
        }
        self.global
            .load()
            .default_model
            .clone()
            .ok_or(ConfigError::NoDefaultConfigured)
    }

    /// Conversation override, then global default, else `NoDefaultConfigured`.
    pub fn resolve_for_conversation(
        &self,
        conversation: &ConversationId,
    ) -> Result<EffectiveModelConfig, ConfigError> {
        let model_ref = self.model_ref_for_conversation(conversation)?;
        self.resolve(&model_ref)
    }

    /// Conversation style override, then global default style.
    pub fn resolve_style_for_conversation(&self, conversation: &ConversationId) -> String {
        self.conversations
            .get(conversation)
            .and_then(|c| c.style_override.clone())
            .unwrap_or_else(|| self.default_style())
    }

    fn snapshot(&self) -> Arc<ProviderSet> {
        Arc::clone(&self.providers.read())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
