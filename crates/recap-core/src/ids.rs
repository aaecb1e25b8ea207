//! Branded ID newtypes.
//!
//! Conversation and caller identifiers are opaque tokens handed to us by the
//! chat-platform adapter, so they wrap whatever string the adapter supplies.
//! [`RunId`] is the only identifier minted here (UUID v7, time-ordered).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Addressable chat context a summary is produced for (a "group").
    ConversationId
}

branded_id! {
    /// Opaque identity of whoever issued a manual trigger.
    CallerId
}

branded_id! {
    /// Identifier of a persisted scheduled job.
    JobId
}

branded_id! {
    /// Identifier of one summarization run, used to correlate log lines.
    RunId
}

impl JobId {
    /// Each conversation owns at most one job, so the id is derived from it.
    #[must_use]
    pub fn for_conversation(conversation: &ConversationId) -> Self {
        Self(format!("summary_job_{conversation}"))
    }
}

impl RunId {
    /// Mint a fresh run id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_derives_from_conversation() {
        let conv = ConversationId::from("12345");
        assert_eq!(JobId::for_conversation(&conv).as_str(), "summary_job_12345");
    }

    #[test]
    fn run_ids_are_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn serde_is_transparent() {
        let id = CallerId::from("user-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"user-1\"");
        let back: CallerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn deref_to_str() {
        let id = ConversationId::from("abc");
        assert_eq!(id.len(), 3);
        assert_eq!(&*id, "abc");
    }
}
