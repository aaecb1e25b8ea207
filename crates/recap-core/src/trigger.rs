//! What started a summarization run.

use serde::{Deserialize, Serialize};

use crate::ids::CallerId;

/// Origin of a summarization request.
///
/// Manual triggers are interactive: they get immediate rejections (`Busy`,
/// `CooldownActive`, `OutOfRange`). Scheduled triggers wait for a slot, clamp
/// their window, and skip silently on recoverable conditions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Trigger {
    /// Issued by a chat participant.
    Manual {
        /// Who asked.
        caller: CallerId,
    },
    /// Fired by the daily scheduler.
    Scheduled,
}

impl Trigger {
    /// Shorthand for a manual trigger.
    pub fn manual(caller: impl Into<CallerId>) -> Self {
        Self::Manual {
            caller: caller.into(),
        }
    }

    /// Whether this is a scheduled fire.
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled)
    }

    /// The caller for manual triggers.
    pub fn caller(&self) -> Option<&CallerId> {
        match self {
            Self::Manual { caller } => Some(caller),
            Self::Scheduled => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Manual { .. } => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}
