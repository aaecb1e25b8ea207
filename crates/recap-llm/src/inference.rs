//! API-kind inference from model names.
//!
//! A small ordered table; the first row with a matching needle wins. Names
//! nothing matches get [`ApiKind::General`] (OpenAI-compatible).

use recap_core::ApiKind;

enum Needle {
    Contains(&'static str),
    Prefix(&'static str),
}

use Needle::{Contains, Prefix};

const TABLE: &[(&[Needle], ApiKind)] = &[
    (&[Contains("gemini"), Contains("palm")], ApiKind::Gemini),
    (
        &[Contains("gpt"), Contains("text-davinci"), Prefix("o1-"), Prefix("o3-")],
        ApiKind::Openai,
    ),
    (&[Contains("claude")], ApiKind::Claude),
    (&[Contains("deepseek")], ApiKind::Deepseek),
    (&[Contains("mistral"), Contains("mixtral")], ApiKind::Mistral),
    (&[Contains("llama")], ApiKind::Openai),
    (&[Contains("qwen")], ApiKind::Qwen),
    (&[Contains("ernie"), Contains("wenxin")], ApiKind::Baidu),
    (&[Contains("spark")], ApiKind::Xunfei),
    (&[Contains("glm")], ApiKind::Zhipu),
];

/// Infer the wire dialect from a model name (case-insensitive).
pub fn infer_api_kind(model_name: &str) -> ApiKind {
    let name = model_name.to_lowercase();
    TABLE
        .iter()
        .find(|(needles, _)| {
            needles.iter().any(|n| match n {
                Contains(s) => name.contains(s),
                Prefix(s) => name.starts_with(s),
            })
        })
        .map_or(ApiKind::General, |(_, kind)| *kind)
}

/// Explicit kind if configured, else inferred; `openai_compat` reroutes
/// Gemini through its OpenAI-compatible surface.
pub fn effective_api_kind(explicit: Option<ApiKind>, openai_compat: bool, model_name: &str) -> ApiKind {
    let kind = explicit.unwrap_or_else(|| infer_api_kind(model_name));
    if openai_compat && kind == ApiKind::Gemini {
        ApiKind::GeminiOpenai
    } else {
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows() {
        let cases = [
            ("gemini-2.0-flash", ApiKind::Gemini),
            ("models/palm-2", ApiKind::Gemini),
            ("gpt-4o-mini", ApiKind::Openai),
            ("text-davinci-003", ApiKind::Openai),
            ("o1-preview", ApiKind::Openai),
            ("Claude-3-5-Sonnet", ApiKind::Claude),
            ("deepseek-chat", ApiKind::Deepseek),
            ("open-mistral-7b", ApiKind::Mistral),
            ("mixtral-8x7b", ApiKind::Mistral),
            ("llama-3.1-70b", ApiKind::Openai),
            ("qwen-max", ApiKind::Qwen),
            ("ernie-bot-4", ApiKind::Baidu),
            ("spark-v3.5", ApiKind::Xunfei),
            ("chatglm-turbo", ApiKind::Zhipu),
            ("glm-4", ApiKind::Zhipu),
        ];
        for (name, kind) in cases {
            assert_eq!(infer_api_kind(name), kind, "{name}");
        }
    }

    #[test]
    fn unmatched_is_general() {
        assert_eq!(infer_api_kind("yi-large"), ApiKind::General);
        assert_eq!(infer_api_kind(""), ApiKind::General);
        // "o1" only counts as a prefix.
        assert_eq!(infer_api_kind("solo1-base"), ApiKind::General);
    }

    #[test]
    fn earlier_rows_win() {
        // Contains both "gemini" and "gpt"; the gemini row comes first.
        assert_eq!(infer_api_kind("gemini-gpt-bridge"), ApiKind::Gemini);
    }

    #[test]
    fn explicit_and_compat() {
        assert_eq!(
            effective_api_kind(Some(ApiKind::Claude), false, "gpt-4o"),
            ApiKind::Claude
        );
        assert_eq!(
            effective_api_kind(None, true, "gemini-1.5-pro"),
            ApiKind::GeminiOpenai
        );
        assert_eq!(effective_api_kind(None, true, "gpt-4o"), ApiKind::Openai);
    }
}
