//! Durable store traits and their `SQLite` and in-memory implementations.
//!
//! Every write returns only after the row is committed, so an `Ok` from
//! [`JobStore::save`] means the job survives a crash.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use recap_core::{ConversationConfig, ConversationId, JobId, ScheduledJob};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::connection::{self, ConnectionConfig, ConnectionPool};
use crate::errors::{Result, StoreError};
use crate::migrations::run_migrations;
use crate::repositories::{ConversationConfigRepo, JobRepo};

/// Persistence for scheduled jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Every persisted job.
    async fn load(&self) -> Result<Vec<ScheduledJob>>;
    /// Insert or replace a job.
    async fn save(&self, job: &ScheduledJob) -> Result<()>;
    /// Remove a job; removing a missing job is not an error.
    async fn delete(&self, id: &JobId) -> Result<()>;
    /// Set `last_fired_on` on a stored job, leaving every other field as
    /// stored. Returns `false` if the job no longer exists.
    async fn mark_fired(&self, id: &JobId, fired_on: NaiveDate) -> Result<bool>;
}

/// Persistence for per-conversation overrides.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Every stored override.
    async fn load_configs(&self) -> Result<Vec<(ConversationId, ConversationConfig)>>;
    /// Store overrides; an empty config removes them.
    async fn save_config(&self, conversation: &ConversationId, config: &ConversationConfig) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

/// `SQLite`-backed store. Cheap to clone; clones share the pool.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Open (creating if needed) a database file and migrate it.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        let store = Self::from_pool(pool)?;
        info!(path, "job store opened");
        Ok(store)
    }

    /// Private in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::from_pool(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    fn from_pool(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let applied = run_migrations(&conn)?;
        debug!(applied, "migrations checked");
        drop(conn);
        Ok(Self { pool })
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("store task failed: {e}")))?
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn load(&self) -> Result<Vec<ScheduledJob>> {
        self.blocking(JobRepo::list).await
    }

    async fn save(&self, job: &ScheduledJob) -> Result<()> {
        let job = job.clone();
        self.blocking(move |conn| JobRepo::upsert(conn, &job)).await
    }

    async fn delete(&self, id: &JobId) -> Result<()> {
        let id = id.clone();
        self.blocking(move |conn| JobRepo::delete(conn, &id).map(|_| ())).await
    }

    async fn mark_fired(&self, id: &JobId, fired_on: NaiveDate) -> Result<bool> {
        let id = id.clone();
        self.blocking(move |conn| JobRepo::mark_fired(conn, &id, fired_on)).await
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn load_configs(&self) -> Result<Vec<(ConversationId, ConversationConfig)>> {
        self.blocking(ConversationConfigRepo::list).await
    }

    async fn save_config(&self, conversation: &ConversationId, config: &ConversationConfig) -> Result<()> {
        let conversation = conversation.clone();
        let config = config.clone();
        self.blocking(move |conn| ConversationConfigRepo::upsert(conn, &conversation, &config))
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Volatile store with switchable write failures, for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: Mutex<BTreeMap<JobId, ScheduledJob>>,
    configs: Mutex<BTreeMap<ConversationId, ConversationConfig>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Synchronous peek at a stored job.
    pub fn job(&self, id: &JobId) -> Option<ScheduledJob> {
        self.jobs.lock().get(id).cloned()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        let _ = self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn load(&self) -> Result<Vec<ScheduledJob>> {
        Ok(self.jobs.lock().values().cloned().collect())
    }

    async fn save(&self, job: &ScheduledJob) -> Result<()> {
        self.check_writable()?;
        let _ = self.jobs.lock().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn delete(&self, id: &JobId) -> Result<()> {
        self.check_writable()?;
        let _ = self.jobs.lock().remove(id);
        Ok(())
    }

    async fn mark_fired(&self, id: &JobId, fired_on: NaiveDate) -> Result<bool> {
        self.check_writable()?;
        match self.jobs.lock().get_mut(id) {
            Some(job) => {
                job.last_fired_on = Some(fired_on);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn load_configs(&self) -> Result<Vec<(ConversationId, ConversationConfig)>> {
        Ok(self
            .configs
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn save_config(&self, conversation: &ConversationId, config: &ConversationConfig) -> Result<()> {
        self.check_writable()?;
        let mut configs = self.configs.lock();
        if config.is_empty() {
            let _ = configs.remove(conversation);
        } else {
            let _ = configs.insert(conversation.clone(), config.clone());
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
