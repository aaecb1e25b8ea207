//! Per-conversation configuration and scheduled jobs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::TimeOfDay;
use crate::ids::{ConversationId, JobId};
use crate::model_ref::ModelRef;

/// Owner/admin overrides for one conversation. Absent fields inherit the
/// global defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationConfig {
    /// Model to use instead of the global default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<ModelRef>,
    /// Style to use instead of the global default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_override: Option<String>,
}

impl ConversationConfig {
    /// Nothing overridden.
    pub fn is_empty(&self) -> bool {
        self.model_override.is_none() && self.style_override.is_none()
    }
}

/// A persistent daily trigger for one conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    /// Derived from the conversation id.
    pub id: JobId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Local time of day (scheduler timezone) to fire at.
    pub trigger_time: TimeOfDay,
    /// Fires with fewer messages than this are skipped.
    pub min_messages: u32,
    /// Style for this job; falls back to the conversation/global style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// First persisted.
    pub created_at: DateTime<Utc>,
    /// Last modified.
    pub updated_at: DateTime<Utc>,
    /// Local date of the most recent fire, used to avoid double-firing
    /// across restarts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fired_on: Option<NaiveDate>,
}

impl ScheduledJob {
    /// A fresh job that has never fired.
    pub fn new(
        conversation_id: ConversationId,
        trigger_time: TimeOfDay,
        min_messages: u32,
        style: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::for_conversation(&conversation_id),
            conversation_id,
            trigger_time,
            min_messages,
            style,
            created_at: now,
            updated_at: now,
            last_fired_on: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_has_derived_id() {
        let now = Utc::now();
        let job = ScheduledJob::new(
            ConversationId::from("g1"),
            TimeOfDay::new(22, 0).unwrap(),
            100,
            None,
            now,
        );
        assert_eq!(job.id.as_str(), "summary_job_g1");
        assert_eq!(job.created_at, job.updated_at);
        assert!(job.last_fired_on.is_none());
    }

    #[test]
    fn empty_config() {
        assert!(ConversationConfig::default().is_empty());
        let c = ConversationConfig {
            style_override: Some("bullet".into()),
            ..ConversationConfig::default()
        };
        assert!(!c.is_empty());
    }

    #[test]
    fn job_serde_uses_time_strings() {
        let job = ScheduledJob::new(
            ConversationId::from("g1"),
            TimeOfDay::new(8, 5).unwrap(),
            10,
            Some("brief".into()),
            Utc::now(),
        );
        let v = serde_json::to_value(&job).unwrap();
        assert_eq!(v["triggerTime"], "08:05");
        assert_eq!(v["conversationId"], "g1");
        let back: ScheduledJob = serde_json::from_value(v).unwrap();
        assert_eq!(back, job);
    }
}
