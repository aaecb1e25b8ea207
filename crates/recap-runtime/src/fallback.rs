//! Plain-text degradation when an image cannot be produced.

use std::sync::LazyLock;

use recap_llm::DispatchError;
use regex::Regex;

static TAG_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]+>").ok());

/// Longest text artifact sent, before the truncation suffix.
pub const MAX_TEXT_CHARS: usize = 4500;

/// Appended when the text was cut.
pub const TRUNCATION_SUFFIX: &str = "...(truncated, content too long)";

/// Prefixed when an image was requested but text is sent instead.
pub const DEGRADED_NOTICE: &str = "⚠️ Image rendering failed, falling back to text:\n\n";

/// Remove anything that looks like an HTML tag.
pub fn strip_html(text: &str) -> String {
    match TAG_PATTERN.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_owned(),
    }
}

/// Cut to at most `max` characters, appending [`TRUNCATION_SUFFIX`] if cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => format!("{}{TRUNCATION_SUFFIX}", &text[..byte]),
        None => text.to_owned(),
    }
}

/// Text artifact body for a summary whose rendering failed.
///
/// `image_requested` adds [`DEGRADED_NOTICE`]; the limit applies to notice
/// and body together.
pub fn text_fallback(summary: &str, image_requested: bool) -> String {
    let body = strip_html(summary.trim());
    let full = if image_requested {
        format!("{DEGRADED_NOTICE}{body}")
    } else {
        body
    };
    truncate_chars(&full, MAX_TEXT_CHARS)
}

/// Text artifact body for a manual run whose generation call failed.
pub fn dispatch_failure_text(err: &DispatchError) -> String {
    format!(
        "⚠️ The summary could not be generated ({}) after {} attempt(s). Please try again later.",
        err.category(),
        err.attempts
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
