//! Global task slots and per-caller cooldowns.
//!
//! Manual triggers never queue: no free slot means [`GovernorError::Busy`].
//! Scheduled triggers wait for a slot and skip the cooldown. A [`Permit`]
//! returns its slot when dropped, whatever path the task exits by.
//!
//! A governor built with [`ConcurrencyGovernor::from_global`] reads the
//! cooldown from the shared config on every check, so updates apply to the
//! next trigger. The slot count is fixed at construction.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use recap_core::{CallerId, ConversationId, Trigger};
use recap_settings::SharedGlobalConfig;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;
use tracing::debug;

use crate::errors::OrchestratorError;

/// Admission refusals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum GovernorError {
    /// No free slot.
    #[error("no free task slot")]
    Busy,
    /// Same caller and conversation triggered too recently.
    #[error("cooldown active for another {remaining_secs}s")]
    CooldownActive {
        /// Whole seconds remaining, rounded up.
        remaining_secs: u64,
    },
    /// Semaphore closed.
    #[error("governor closed")]
    Closed,
}

impl From<GovernorError> for OrchestratorError {
    fn from(e: GovernorError) -> Self {
        match e {
            GovernorError::Busy => Self::Busy,
            GovernorError::CooldownActive { remaining_secs } => Self::CooldownActive { remaining_secs },
            GovernorError::Closed => Self::Closed,
        }
    }
}

/// One held task slot.
#[derive(Debug)]
pub struct Permit {
    _slot: OwnedSemaphorePermit,
}

#[derive(Debug)]
enum CooldownSource {
    Fixed(Duration),
    Live(Arc<SharedGlobalConfig>),
}

impl CooldownSource {
    fn current(&self) -> Duration {
        match self {
            Self::Fixed(d) => *d,
            Self::Live(global) => Duration::from_secs(global.load().cooldown_secs),
        }
    }
}

/// Counting semaphore plus cooldown table.
#[derive(Debug)]
pub struct ConcurrencyGovernor {
    slots: Arc<Semaphore>,
    capacity: usize,
    cooldown: CooldownSource,
    last_success: DashMap<(CallerId, ConversationId), Instant>,
}

impl ConcurrencyGovernor {
    /// Governor with `max_concurrent` slots (at least one) and a fixed cooldown.
    pub fn new(max_concurrent: usize, cooldown: Duration) -> Self {
        Self::build(max_concurrent, CooldownSource::Fixed(cooldown))
    }

    /// Governor sized from the current snapshot of `global`, following its
    /// `cooldown_secs` as it changes.
    pub fn from_global(global: Arc<SharedGlobalConfig>) -> Self {
        let max_concurrent = global.load().max_concurrent_tasks;
        Self::build(max_concurrent, CooldownSource::Live(global))
    }

    fn build(max_concurrent: usize, cooldown: CooldownSource) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            cooldown,
            last_success: DashMap::new(),
        }
    }

    /// Cooldown in force right now.
    pub fn cooldown(&self) -> Duration {
        self.cooldown.current()
    }

    /// Admit a task for `trigger`.
    ///
    /// `privileged` callers skip the cooldown check.
    pub async fn admit(
        &self,
        trigger: &Trigger,
        conversation: &ConversationId,
        privileged: bool,
    ) -> Result<Permit, GovernorError> {
        match trigger {
            Trigger::Scheduled => self.acquire().await,
            Trigger::Manual { caller } => {
                if !privileged {
                    self.check_cooldown(caller, conversation)?;
                }
                self.try_acquire()
            }
        }
    }

    /// Take a slot without waiting.
    pub fn try_acquire(&self) -> Result<Permit, GovernorError> {
        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(slot) => Ok(Permit { _slot: slot }),
            Err(TryAcquireError::NoPermits) => {
                metrics::counter!("recap_governor_busy_total").increment(1);
                debug!(capacity = self.capacity, "all task slots busy");
                Err(GovernorError::Busy)
            }
            Err(TryAcquireError::Closed) => Err(GovernorError::Closed),
        }
    }

    /// Wait for a slot.
    pub async fn acquire(&self) -> Result<Permit, GovernorError> {
        Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map(|slot| Permit { _slot: slot })
            .map_err(|_| GovernorError::Closed)
    }

    /// Reject if `caller` succeeded on `conversation` within the cooldown.
    pub fn check_cooldown(&self, caller: &CallerId, conversation: &ConversationId) -> Result<(), GovernorError> {
        let key = (caller.clone(), conversation.clone());
        let Some(last) = self.last_success.get(&key).map(|t| *t) else {
            return Ok(());
        };
        let cooldown = self.cooldown();
        let elapsed = last.elapsed();
        if elapsed >= cooldown {
            return Ok(());
        }
        let remaining = cooldown - elapsed;
        let remaining_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        metrics::counter!("recap_governor_cooldown_total").increment(1);
        debug!(%caller, %conversation, remaining_secs, "cooldown active");
        Err(GovernorError::CooldownActive { remaining_secs })
    }

    /// Start the cooldown window after a successful manual run.
    pub fn mark_success(&self, caller: &CallerId, conversation: &ConversationId) {
        if self.cooldown().is_zero() {
            return;
        }
        let _ = self
            .last_success
            .insert((caller.clone(), conversation.clone()), Instant::now());
    }

    /// Free slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available_slots())
    }

    /// Total slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop cooldown records that no longer block anyone.
    pub fn purge_expired_cooldowns(&self) -> usize {
        let cooldown = self.cooldown();
        let before = self.last_success.len();
        self.last_success.retain(|_, t| t.elapsed() < cooldown);
        before.saturating_sub(self.last_success.len())
    }

    /// Refuse all further acquisitions; waiters get [`GovernorError::Closed`].
    pub fn close(&self) {
        self.slots.close();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use recap_settings::GlobalConfig;

    fn conv() -> ConversationId {
        ConversationId::from("g1")
    }

    #[tokio::test]
    async fn one_over_capacity_is_busy() {
        let gov = ConcurrencyGovernor::new(2, Duration::ZERO);
        let mut held = Vec::new();
        let mut busy = 0;
        for i in 0..3 {
            match gov.admit(&Trigger::manual(format!("u{i}")), &conv(), false).await {
                Ok(p) => held.push(p),
                Err(GovernorError::Busy) => busy += 1,
                Err(e) => panic!("unexpected {e}"),
            }
        }
        assert_eq!(busy, 1);
        assert_eq!(gov.in_flight(), 2);
        drop(held);
        assert_eq!(gov.available_slots(), 2);
    }

    #[tokio::test]
    async fn scheduled_waits_for_a_slot() {
        let gov = Arc::new(ConcurrencyGovernor::new(1, Duration::ZERO));
        let first = gov.try_acquire().unwrap();

        let g = Arc::clone(&gov);
        let waiter = tokio::spawn(async move { g.admit(&Trigger::Scheduled, &conv(), false).await.map(|_| ()) });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(first);
        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(gov.available_slots(), 1);
    }

    #[tokio::test]
    async fn slot_released_when_task_panics() {
        let gov = Arc::new(ConcurrencyGovernor::new(1, Duration::ZERO));
        let g = Arc::clone(&gov);
        let task = tokio::spawn(async move {
            let _permit = g.try_acquire().unwrap();
            panic!("task blew up");
        });
        assert!(task.await.is_err());
        assert_eq!(gov.available_slots(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_blocks_then_expires() {
        let gov = ConcurrencyGovernor::new(2, Duration::from_secs(60));
        let caller = CallerId::from("alice");
        let trigger = Trigger::manual("alice");

        drop(gov.admit(&trigger, &conv(), false).await.unwrap());
        gov.mark_success(&caller, &conv());

        tokio::time::advance(Duration::from_millis(20_500)).await;
        assert_matches!(
            gov.admit(&trigger, &conv(), false).await,
            Err(GovernorError::CooldownActive { remaining_secs: 40 })
        );

        // other conversations and other callers are unaffected
        assert!(gov.check_cooldown(&caller, &ConversationId::from("g2")).is_ok());
        assert!(gov.check_cooldown(&CallerId::from("bob"), &conv()).is_ok());

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(gov.admit(&trigger, &conv(), false).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn privileged_and_scheduled_skip_cooldown() {
        let gov = ConcurrencyGovernor::new(2, Duration::from_secs(60));
        let caller = CallerId::from("admin");
        gov.mark_success(&caller, &conv());
        assert!(gov.admit(&Trigger::manual("admin"), &conv(), true).await.is_ok());
        assert!(gov.admit(&Trigger::Scheduled, &conv(), false).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_runs_leave_no_cooldown() {
        let gov = ConcurrencyGovernor::new(1, Duration::from_secs(60));
        drop(gov.admit(&Trigger::manual("alice"), &conv(), false).await.unwrap());
        // no mark_success: the run failed
        assert!(gov.admit(&Trigger::manual("alice"), &conv(), false).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_stale_records() {
        let gov = ConcurrencyGovernor::new(1, Duration::from_secs(10));
        gov.mark_success(&CallerId::from("a"), &conv());
        tokio::time::advance(Duration::from_secs(5)).await;
        gov.mark_success(&CallerId::from("b"), &conv());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(gov.purge_expired_cooldowns(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_config_cooldown_applies_live() {
        let global = Arc::new(SharedGlobalConfig::new(GlobalConfig {
            cooldown_secs: 60,
            max_concurrent_tasks: 3,
            ..GlobalConfig::default()
        }));
        let gov = ConcurrencyGovernor::from_global(Arc::clone(&global));
        assert_eq!(gov.capacity(), 3);
        let caller = CallerId::from("alice");
        gov.mark_success(&caller, &conv());

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_matches!(
            gov.check_cooldown(&caller, &conv()),
            Err(GovernorError::CooldownActive { remaining_secs: 45 })
        );

        global.update(|c| c.cooldown_secs = 10);
        assert_eq!(gov.cooldown(), Duration::from_secs(10));
        assert!(gov.check_cooldown(&caller, &conv()).is_ok());
        assert_eq!(gov.purge_expired_cooldowns(), 1);

        // slot count stays as built
        global.update(|c| c.max_concurrent_tasks = 1);
        assert_eq!(gov.capacity(), 3);
    }

    #[tokio::test]
    async fn closed_governor_refuses() {
        let gov = ConcurrencyGovernor::new(1, Duration::ZERO);
        gov.close();
        assert_matches!(gov.acquire().await, Err(GovernorError::Closed));
    }
}
