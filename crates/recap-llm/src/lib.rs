//! # recap-llm
//!
//! Everything between "summarize with this model" and the generation backend:
//!
//! - [`ProviderRegistry`]: providers, models, global defaults, and
//!   per-conversation overrides, resolved to an [`EffectiveModelConfig`]
//! - [`infer_api_kind`]: ordered model-name table for the wire dialect
//! - [`CredentialRotator`]: random selection among healthy credentials
//! - [`Dispatcher`]: timeout, linear-backoff retry, and outcome reporting
//! - [`Completion`]: the backend trait, plus [`mock::MockCompletion`]

#![deny(unsafe_code)]

pub mod completion;
pub mod credentials;
pub mod dispatcher;
pub mod inference;
pub mod mock;
pub mod registry;

pub use completion::{Completion, CompletionError, FailureKind};
pub use credentials::{Credential, CredentialRotator, CredentialStatusSummary, HealthPolicy};
pub use dispatcher::{DispatchError, Dispatcher};
pub use inference::{effective_api_kind, infer_api_kind};
pub use registry::{EffectiveModelConfig, Model, Provider, ProviderRegistry};
