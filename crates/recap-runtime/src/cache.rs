//! Time-bounded cache of transcript pages.
//!
//! Keyed on `(conversation, window, filter fingerprint)`, so differently
//! filtered requests over the same window never share an entry. Expiry is
//! checked on read; a TTL of zero turns the cache off. An optional capacity
//! evicts the least recently used entry when full.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use recap_core::{ConversationId, FetchError, Message, MessageFilter};
use recap_settings::CacheSettings;
use tokio::time::Instant;
use tracing::debug;

use crate::collaborators::TranscriptSource;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    conversation: ConversationId,
    window: u32,
    fingerprint: String,
}

#[derive(Debug)]
struct CacheEntry {
    messages: Arc<[Message]>,
    inserted: Instant,
    last_used: Instant,
}

/// Hit/miss counters and current size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from the cache.
    pub hits: u64,
    /// Reads that went to the transcript source.
    pub misses: u64,
    /// Entries currently held, expired or not.
    pub len: usize,
}

/// Read-through cache in front of a [`TranscriptSource`].
pub struct HistoryCache {
    source: Arc<dyn TranscriptSource>,
    ttl: Duration,
    capacity: Option<usize>,
    entries: DashMap<CacheKey, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for HistoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl HistoryCache {
    /// Cache over `source`. `capacity` of `None` means unbounded.
    pub fn new(source: Arc<dyn TranscriptSource>, ttl: Duration, capacity: Option<usize>) -> Self {
        Self {
            source,
            ttl,
            capacity: capacity.filter(|&c| c > 0),
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache configured from settings.
    pub fn from_settings(source: Arc<dyn TranscriptSource>, settings: &CacheSettings) -> Self {
        Self::new(source, Duration::from_secs(settings.ttl_secs), settings.capacity)
    }

    /// The underlying source, for calls that bypass the cache.
    pub fn source(&self) -> &Arc<dyn TranscriptSource> {
        &self.source
    }

    /// Configured lifetime of an entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Messages for the key, from cache when fresh, else from the source.
    ///
    /// Fetch errors are returned as-is and never cached.
    pub async fn get(
        &self,
        conversation: &ConversationId,
        window: u32,
        filter: &MessageFilter,
    ) -> Result<Arc<[Message]>, FetchError> {
        if self.ttl.is_zero() {
            self.record_miss();
            return self.source.fetch(conversation, window, filter).await.map(Arc::from);
        }

        let key = CacheKey {
            conversation: conversation.clone(),
            window,
            fingerprint: filter.fingerprint(),
        };

        if let Some(messages) = self.lookup(&key) {
            let _ = self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("recap_cache_hits_total").increment(1);
            debug!(%conversation, window, "history cache hit");
            return Ok(messages);
        }

        self.record_miss();
        let messages: Arc<[Message]> = self.source.fetch(conversation, window, filter).await?.into();
        let now = Instant::now();
        let _ = self.entries.insert(
            key,
            CacheEntry {
                messages: Arc::clone(&messages),
                inserted: now,
                last_used: now,
            },
        );
        self.enforce_capacity();
        Ok(messages)
    }

    /// Drop every entry for a conversation. Returns how many were dropped.
    pub fn invalidate(&self, conversation: &ConversationId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| &k.conversation != conversation);
        before.saturating_sub(self.entries.len())
    }

    /// Drop expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, e| e.inserted.elapsed() < ttl);
        before.saturating_sub(self.entries.len())
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: self.entries.len(),
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<Arc<[Message]>> {
        let mut entry = self.entries.get_mut(key)?;
        if entry.inserted.elapsed() >= self.ttl {
            drop(entry);
            let _ = self.entries.remove(key);
            return None;
        }
        entry.last_used = Instant::now();
        Some(Arc::clone(&entry.messages))
    }

    fn record_miss(&self) {
        let _ = self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("recap_cache_misses_total").increment(1);
    }

    fn enforce_capacity(&self) {
        let Some(cap) = self.capacity else { return };
        while self.entries.len() > cap {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.last_used)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    let _ = self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
