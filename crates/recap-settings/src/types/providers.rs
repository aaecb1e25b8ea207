//! Provider and model declarations.

use std::fmt;

use recap_core::ApiKind;
use serde::{Deserialize, Serialize};

/// One upstream backend as declared in the settings file.
///
/// `Debug` prints the number of keys, never the keys themselves.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    /// Unique provider name, the left half of a `ModelRef`.
    pub name: String,
    /// Credentials to rotate across.
    pub api_keys: Vec<String>,
    /// Endpoint base URL.
    pub base_url: String,
    /// Wire dialect; inferred from model names when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_kind: Option<ApiKind>,
    /// Route Gemini models through the OpenAI-compatible surface.
    pub openai_compat: bool,
    /// Provider-wide default temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Provider-wide default output token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Models served by this provider.
    pub models: Vec<ModelSettings>,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("name", &self.name)
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .field("base_url", &self.base_url)
            .field("api_kind", &self.api_kind)
            .field("openai_compat", &self.openai_compat)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("models", &self.models)
            .finish()
    }
}

/// A model under a provider, with optional parameter overrides.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Model name, unique within its provider.
    pub name: String,
    /// Overrides the provider temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Overrides the provider token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_keys() {
        let p = ProviderSettings {
            name: "OpenAI".into(),
            api_keys: vec!["sk-very-secret-1".into(), "sk-very-secret-2".into()],
            ..ProviderSettings::default()
        };
        let dbg = format!("{p:?}");
        assert!(!dbg.contains("sk-very-secret"));
        assert!(dbg.contains("[2 redacted]"));
    }

    #[test]
    fn deserializes_partial_provider() {
        let json = r#"{
            "name": "DeepSeek",
            "apiKeys": ["k1"],
            "baseUrl": "https://api.deepseek.com",
            "models": [{"name": "deepseek-chat", "temperature": 0.3}]
        }"#;
        let p: ProviderSettings = serde_json::from_str(json).unwrap();
        assert_eq!(p.name, "DeepSeek");
        assert!(p.api_kind.is_none());
        assert!(!p.openai_compat);
        assert_eq!(p.models[0].temperature, Some(0.3));
        assert_eq!(p.models[0].max_tokens, None);
    }

    #[test]
    fn explicit_api_kind() {
        let p: ProviderSettings =
            serde_json::from_str(r#"{"name":"x","apiKind":"gemini_openai"}"#).unwrap();
        assert_eq!(p.api_kind, Some(ApiKind::GeminiOpenai));
    }
}
