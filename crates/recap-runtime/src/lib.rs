//! # recap-runtime
//!
//! The moving parts of a summary run:
//!
//! - [`HistoryCache`]: TTL read-through cache over a [`TranscriptSource`]
//! - [`ConcurrencyGovernor`]: global task slots and per-caller cooldowns
//! - [`Orchestrator`]: window check, admission, fetch, prompt, dispatch,
//!   render, and degraded text fallback
//! - [`Scheduler`]: persisted daily jobs in a fixed time zone, with
//!   catch-up after restart and overlap suppression
//! - [`ConversationOverrides`]: persisted per-conversation model and style
//!
//! Chat-platform concerns stay behind the traits in [`collaborators`].

#![deny(unsafe_code)]

pub mod cache;
pub mod collaborators;
pub mod errors;
pub mod fallback;
pub mod governor;
pub mod orchestrator;
pub mod overrides;
pub mod scheduler;
pub mod testing;

pub use cache::{CacheStats, HistoryCache};
pub use collaborators::{Artifact, DefaultPromptBuilder, PromptBuilder, Renderer, SummarySink, TranscriptSource};
pub use errors::{OrchestratorError, OverrideError, SchedulerError};
pub use governor::{ConcurrencyGovernor, GovernorError, Permit};
pub use orchestrator::{Orchestrator, OrchestratorDeps, SummaryRequest, SummaryResult};
pub use overrides::ConversationOverrides;
pub use scheduler::{Acknowledged, FireOutcome, ScheduleHealth, Scheduler, SchedulerDeps};
