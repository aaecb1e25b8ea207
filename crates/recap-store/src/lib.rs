//! # recap-store
//!
//! Durable state that must survive a restart: scheduled jobs and
//! per-conversation overrides.
//!
//! - [`JobStore`] / [`ConversationStore`]: async persistence traits
//! - [`SqliteStore`]: `r2d2`-pooled `SQLite` with embedded migrations
//! - [`MemoryStore`]: volatile implementation with failure injection
//! - [`JobRepo`] / [`ConversationConfigRepo`]: stateless SQL repositories

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::ConnectionConfig;
pub use errors::{Result, StoreError};
pub use repositories::{ConversationConfigRepo, JobRepo};
pub use store::{ConversationStore, JobStore, MemoryStore, SqliteStore};
