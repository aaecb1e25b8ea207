//! `"Provider/Model"` addressing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ConfigError;

/// Address of one model under one provider.
///
/// Serialized as `"Provider/Model"`. Parsing splits on the first `/`, so
/// model names may themselves contain slashes (`"OpenRouter/meta/llama-3"`).
/// Whether the pair actually exists is only checked at resolution time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelRef {
    provider: String,
    model: String,
}

impl ModelRef {
    /// Build from parts. Both must be non-empty after trimming.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Result<Self, ConfigError> {
        let provider = provider.into().trim().to_owned();
        let model = model.into().trim().to_owned();
        if provider.is_empty() || model.is_empty() {
            return Err(ConfigError::InvalidModelRef(format!("{provider}/{model}")));
        }
        Ok(Self { provider, model })
    }

    /// Parse `"Provider/Model"`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let (provider, model) = s
            .split_once('/')
            .ok_or_else(|| ConfigError::InvalidModelRef(s.to_owned()))?;
        Self::new(provider, model).map_err(|_| ConfigError::InvalidModelRef(s.to_owned()))
    }

    /// Provider half.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Model half.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

impl FromStr for ModelRef {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ModelRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn parse_simple() {
        let r = ModelRef::parse("OpenAI/gpt-4o").unwrap();
        assert_eq!(r.provider(), "OpenAI");
        assert_eq!(r.model(), "gpt-4o");
    }

    #[test]
    fn parse_splits_on_first_slash() {
        let r = ModelRef::parse("OpenRouter/meta/llama-3").unwrap();
        assert_eq!(r.provider(), "OpenRouter");
        assert_eq!(r.model(), "meta/llama-3");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_matches!(ModelRef::parse("gpt-4o"), Err(ConfigError::InvalidModelRef(_)));
        assert_matches!(ModelRef::parse("/gpt-4o"), Err(ConfigError::InvalidModelRef(_)));
        assert_matches!(ModelRef::parse("OpenAI/"), Err(ConfigError::InvalidModelRef(_)));
        assert_matches!(ModelRef::parse(" / "), Err(ConfigError::InvalidModelRef(_)));
    }

    #[test]
    fn serde_as_string() {
        let r = ModelRef::new("Claude", "claude-sonnet").unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"Claude/claude-sonnet\"");
        let back: ModelRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
        assert!(serde_json::from_str::<ModelRef>("\"nope\"").is_err());
    }

    proptest! {
        #[test]
        fn display_parses_back(provider in "[A-Za-z][A-Za-z0-9_-]{0,12}", model in "[a-z0-9][a-z0-9./-]{0,20}") {
            let r = ModelRef::new(provider.clone(), model.clone()).unwrap();
            let parsed = ModelRef::parse(&r.to_string()).unwrap();
            prop_assert_eq!(parsed.provider(), provider.as_str());
            prop_assert_eq!(parsed.model(), model.trim());
        }
    }
}
