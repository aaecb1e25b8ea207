//! # recap-core
//!
//! Foundation types shared by every recap crate:
//!
//! - **Identifiers**: `ConversationId`, `CallerId`, `JobId`, `RunId` as newtypes
//! - **Messages**: [`Message`] and [`MessageFilter`] with a stable fingerprint
//! - **Model references**: [`ModelRef`], the `"Provider/Model"` address, and [`ApiKind`]
//! - **Conversations**: [`ConversationConfig`] overrides and [`ScheduledJob`]
//! - **Time**: [`TimeOfDay`] and the [`Clock`] abstraction used by the scheduler
//! - **Errors**: [`ConfigError`] and [`FetchError`]
//! - **Retry**: [`RetryConfig`] with linear backoff
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod api_kind;
pub mod clock;
pub mod conversation;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod model_ref;
pub mod retry;
pub mod trigger;

pub use api_kind::ApiKind;
pub use clock::{Clock, ManualClock, SystemClock, TimeOfDay};
pub use conversation::{ConversationConfig, ScheduledJob};
pub use errors::{ConfigError, FetchError, FetchErrorKind};
pub use ids::{CallerId, ConversationId, JobId, RunId};
pub use messages::{Message, MessageFilter};
pub use model_ref::ModelRef;
pub use retry::RetryConfig;
pub use trigger::Trigger;
