//! Wire dialect spoken by a provider endpoint.

use serde::{Deserialize, Serialize};

/// Which request/response dialect a provider's endpoint expects.
///
/// `General` is any OpenAI-compatible endpoint and is the fallback for
/// model names nothing else recognizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    /// Native Google Gemini API.
    Gemini,
    /// Gemini through its OpenAI-compatible surface.
    GeminiOpenai,
    /// `OpenAI` chat completions.
    Openai,
    /// Anthropic messages API.
    Claude,
    /// `DeepSeek`.
    Deepseek,
    /// Mistral.
    Mistral,
    /// Alibaba Qwen.
    Qwen,
    /// Baidu ERNIE.
    Baidu,
    /// iFlytek Spark.
    Xunfei,
    /// Zhipu GLM.
    Zhipu,
    /// Any other OpenAI-compatible endpoint.
    General,
}

impl ApiKind {
    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::GeminiOpenai => "gemini_openai",
            Self::Openai => "openai",
            Self::Claude => "claude",
            Self::Deepseek => "deepseek",
            Self::Mistral => "mistral",
            Self::Qwen => "qwen",
            Self::Baidu => "baidu",
            Self::Xunfei => "xunfei",
            Self::Zhipu => "zhipu",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for ApiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
