//! Per-conversation model and style overrides, persisted then applied.

use std::sync::Arc;

use recap_core::{ConversationConfig, ConversationId, ModelRef};
use recap_llm::ProviderRegistry;
use recap_store::ConversationStore;
use tracing::info;

use crate::errors::OverrideError;

/// Admin-facing edits to [`ConversationConfig`].
///
/// Each change is written to the store first; the registry only sees it
/// once the write succeeded.
pub struct ConversationOverrides {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn ConversationStore>,
}

impl std::fmt::Debug for ConversationOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationOverrides").finish_non_exhaustive()
    }
}

impl ConversationOverrides {
    /// Overrides backed by `store`, applied to `registry`.
    pub fn new(registry: Arc<ProviderRegistry>, store: Arc<dyn ConversationStore>) -> Self {
        Self { registry, store }
    }

    /// Push every stored override into the registry. Returns the count.
    pub async fn load(&self) -> Result<usize, OverrideError> {
        let configs = self.store.load_configs().await?;
        let n = configs.len();
        self.registry.load_conversation_configs(configs);
        info!(count = n, "conversation overrides loaded");
        Ok(n)
    }

    /// Set or clear the model override. A model must resolve to be set.
    pub async fn set_model(
        &self,
        conversation: &ConversationId,
        model: Option<ModelRef>,
    ) -> Result<ConversationConfig, OverrideError> {
        if let Some(r) = &model {
            let _ = self.registry.resolve(r)?;
        }
        let mut config = self.registry.conversation_config(conversation);
        config.model_override = model;
        self.apply(conversation, config).await
    }

    /// Set or clear the style override.
    pub async fn set_style(
        &self,
        conversation: &ConversationId,
        style: Option<String>,
    ) -> Result<ConversationConfig, OverrideError> {
        let mut config = self.registry.conversation_config(conversation);
        config.style_override = style.filter(|s| !s.trim().is_empty());
        self.apply(conversation, config).await
    }

    /// Drop every override for a conversation.
    pub async fn clear(&self, conversation: &ConversationId) -> Result<(), OverrideError> {
        let _ = self.apply(conversation, ConversationConfig::default()).await?;
        Ok(())
    }

    async fn apply(
        &self,
        conversation: &ConversationId,
        config: ConversationConfig,
    ) -> Result<ConversationConfig, OverrideError> {
        self.store.save_config(conversation, &config).await?;
        self.registry.set_conversation_config(conversation.clone(), config.clone());
        info!(%conversation, cleared = config.is_empty(), "conversation overrides saved");
        Ok(config)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
