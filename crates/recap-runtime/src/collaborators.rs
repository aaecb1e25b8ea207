//! Narrow interfaces to the systems around the orchestration core.
//!
//! The chat-platform adapter implements [`TranscriptSource`] and
//! [`SummarySink`]; an HTML-to-image service implements [`Renderer`].
//! [`PromptBuilder`] has a default implementation that callers may replace.

use std::fmt::Write as _;

use async_trait::async_trait;
use recap_core::{ConversationId, FetchError, Message, MessageFilter};
use recap_settings::{OutputMode, Theme};

/// Supplies transcript pages for a conversation.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// The most recent `window` messages narrowed by `filter`, oldest first.
    async fn fetch(
        &self,
        conversation: &ConversationId,
        window: u32,
        filter: &MessageFilter,
    ) -> Result<Vec<Message>, FetchError>;

    /// Messages currently available for a conversation.
    async fn message_count(&self, conversation: &ConversationId) -> Result<u64, FetchError>;
}

/// A finished summary, ready to send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Artifact {
    /// Encoded image bytes.
    Image(Vec<u8>),
    /// Plain text.
    Text(String),
}

impl Artifact {
    /// Whether this is a text artifact.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// The text, if this is a text artifact.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Image(_) => None,
        }
    }
}

/// Turns generated text into an [`Artifact`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `text` in the requested mode and theme.
    async fn render(&self, text: &str, mode: OutputMode, theme: Theme) -> anyhow::Result<Artifact>;
}

/// Receives the output of scheduled fires.
#[async_trait]
pub trait SummarySink: Send + Sync {
    /// Post `artifact` to `conversation`.
    async fn deliver(&self, conversation: &ConversationId, artifact: &Artifact) -> anyhow::Result<()>;
}

/// Builds the generation prompt from a transcript page.
pub trait PromptBuilder: Send + Sync {
    /// Prompt text for `messages` in the given style.
    fn build(&self, messages: &[Message], style: &str, filter: &MessageFilter) -> String;
}

/// Style directive, task line, formatting requirements, then the transcript
/// as `name: content` lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultPromptBuilder;

impl PromptBuilder for DefaultPromptBuilder {
    fn build(&self, messages: &[Message], style: &str, filter: &MessageFilter) -> String {
        let mut out = String::new();
        let style = style.trim();
        if !style.is_empty() {
            let _ = writeln!(out, "Important: write the summary strictly in a '{style}' style.\n");
        }

        let keyword = filter.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty());
        let mut names: Vec<&str> = Vec::new();
        if !filter.participants.is_empty() {
            for m in messages {
                if filter.participants.contains(&m.sender_id) && !names.contains(&m.sender_name.as_str()) {
                    names.push(&m.sender_name);
                }
            }
        }

        match (names.is_empty(), keyword) {
            (false, Some(k)) => {
                let _ = writeln!(
                    out,
                    "Task: summarize what [{}] said about '{k}' in the chat log below.",
                    names.join(", ")
                );
            }
            (false, None) => {
                let _ = writeln!(
                    out,
                    "Task: summarize everything [{}] said and their main points in the chat log below.",
                    names.join(", ")
                );
            }
            (true, Some(k)) => {
                let _ = writeln!(out, "Task: summarize only the parts of the chat log below related to '{k}'.");
            }
            (true, None) => {
                let _ = writeln!(out, "Task: summarize the main topics and flow of the chat log below.");
            }
        }
        if names.len() > 1 {
            let _ = writeln!(out, "There are {} people here; summarize each of them separately.", names.len());
        }
        out.push_str(
            "Requirements: use a clear heading hierarchy, say who said what, and use rich markdown \
             (tables, lists, emphasis) where it fits.\n\n",
        );

        for m in messages {
            let _ = writeln!(out, "{}: {}", m.sender_name, m.content);
        }
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> Vec<Message> {
        vec![
            Message::new("u1", "Alice", "shall we ship on friday?"),
            Message::new("u2", "Bob", "friday works"),
        ]
    }

    #[test]
    fn prompt_contains_style_and_transcript() {
        let p = DefaultPromptBuilder.build(&log(), "bullet points", &MessageFilter::default());
        assert!(p.contains("'bullet points' style"));
        assert!(p.contains("main topics"));
        assert!(p.ends_with("Alice: shall we ship on friday?\nBob: friday works\n"));
    }

    #[test]
    fn prompt_names_filtered_participants() {
        let filter = MessageFilter::participants(["u1", "u2"]).with_keyword("friday");
        let p = DefaultPromptBuilder.build(&log(), "", &filter);
        assert!(p.contains("[Alice, Bob] said about 'friday'"));
        assert!(p.contains("2 people"));
        assert!(!p.contains("style."));
    }

    #[test]
    fn artifact_accessors() {
        assert_eq!(Artifact::Text("x".into()).as_text(), Some("x"));
        assert!(!Artifact::Image(vec![1]).is_text());
    }
}
