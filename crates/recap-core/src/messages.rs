//! Transcript messages and fetch filters.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One chat message as supplied by the transcript collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Platform user id of the sender.
    pub sender_id: String,
    /// Display name of the sender, already resolved by the adapter.
    pub sender_name: String,
    /// Plain-text content.
    pub content: String,
    /// When the message was sent.
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Convenience constructor stamped with the current time.
    pub fn new(
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            content: content.into(),
            sent_at: Utc::now(),
        }
    }
}

/// Narrows a transcript fetch to some participants and/or a keyword.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFilter {
    /// Only messages from these sender ids. Empty means everyone.
    #[serde(default)]
    pub participants: BTreeSet<String>,
    /// Only messages containing this keyword (case-insensitive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

impl MessageFilter {
    /// Filter on a set of participants.
    pub fn participants<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            participants: ids.into_iter().map(Into::into).collect(),
            keyword: None,
        }
    }

    /// Add a keyword constraint.
    #[must_use]
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// True when the filter constrains nothing.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty() && self.keyword.as_deref().is_none_or(|k| k.trim().is_empty())
    }

    /// Whether a message passes this filter.
    pub fn matches(&self, message: &Message) -> bool {
        if !self.participants.is_empty() && !self.participants.contains(&message.sender_id) {
            return false;
        }
        match self.keyword.as_deref().map(str::trim) {
            Some(k) if !k.is_empty() => message
                .content
                .to_lowercase()
                .contains(&k.to_lowercase()),
            _ => true,
        }
    }

    /// Stable hex digest identifying this filter for cache keys.
    ///
    /// Participants are already sorted and de-duplicated by the `BTreeSet`;
    /// the keyword is trimmed and lowercased. Equivalent filters therefore
    /// share a fingerprint and different ones never do (barring collisions).
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for p in &self.participants {
            hasher.update(b"p:");
            hasher.update(p.as_bytes());
            hasher.update([0u8]);
        }
        if let Some(k) = self.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            hasher.update(b"k:");
            hasher.update(k.to_lowercase().as_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
