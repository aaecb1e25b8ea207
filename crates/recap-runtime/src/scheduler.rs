//! Persistent daily summary jobs, one per conversation.
//!
//! Each job is `Armed` until its next due instant, `Firing` while a
//! summarization runs, and back to `Armed` for the following day.
//! Cancelling removes it. A single timing loop calls [`Scheduler::tick`]
//! every `tick_every`; due jobs are handed to spawned tasks so a slow
//! backend never stalls the loop.
//!
//! Every create, update, and cancel is written to the [`JobStore`] before
//! it is acknowledged. On start, [`Scheduler::load_and_arm`] re-arms all
//! stored jobs; a job whose time already passed today, after it was last
//! written and without having fired today, fires once straight away. A
//! fire only records its date on the stored row, so it never revives a
//! cancelled job or rolls back a concurrent update.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use recap_core::{Clock, ConversationId, JobId, ScheduledJob, TimeOfDay};
use recap_settings::{RecapSettings, SettingsError};
use recap_store::JobStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::collaborators::SummarySink;
use crate::errors::{OrchestratorError, SchedulerError};
use crate::orchestrator::{Orchestrator, SummaryRequest, SummaryResult};

/// How one fire ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FireOutcome {
    /// Summary produced and handed to the sink.
    Delivered,
    /// Nothing to do this time (too few messages, generation failed).
    Skipped(String),
    /// Something broke; the job stays armed.
    Failed(String),
    /// The job was cancelled while the fire was running.
    Discarded,
}

impl FireOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
            Self::Discarded => "discarded",
        }
    }
}

/// A change that is live in memory, with a warning if it is not durable.
#[derive(Debug)]
pub struct Acknowledged<T> {
    /// Result of the change.
    pub value: T,
    /// Set when the store write failed.
    pub warning: Option<SchedulerError>,
}

impl<T> Acknowledged<T> {
    /// Whether the change reached the store.
    pub fn is_durable(&self) -> bool {
        self.warning.is_none()
    }
}

/// Differences between armed jobs and stored jobs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScheduleHealth {
    /// Jobs armed in memory.
    pub armed: usize,
    /// Jobs in the store.
    pub stored: usize,
    /// Armed but absent from the store (lost on restart).
    pub missing_in_store: Vec<ConversationId>,
    /// Stored but not armed (never fire).
    pub orphaned: Vec<ConversationId>,
}

impl ScheduleHealth {
    /// Memory and store agree.
    pub fn is_consistent(&self) -> bool {
        self.missing_in_store.is_empty() && self.orphaned.is_empty()
    }
}

#[derive(Debug)]
struct JobSlot {
    job: ScheduledJob,
    epoch: u64,
    next_due: DateTime<Utc>,
}

/// Collaborators for a [`Scheduler`].
pub struct SchedulerDeps {
    /// Durable job storage.
    pub store: Arc<dyn JobStore>,
    /// Runs the summaries.
    pub orchestrator: Arc<Orchestrator>,
    /// Receives scheduled output.
    pub sink: Arc<dyn SummarySink>,
    /// Wall clock.
    pub clock: Arc<dyn Clock>,
}

/// Owns every scheduled job and the timing loop.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    orchestrator: Arc<Orchestrator>,
    sink: Arc<dyn SummarySink>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    tick_every: Duration,
    slots: DashMap<ConversationId, JobSlot>,
    // conversation -> epoch of the fire still running for it; outlives the
    // slot so a cancel and re-create cannot start a second concurrent fire
    active: DashMap<ConversationId, u64>,
    epochs: AtomicU64,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tz", &self.tz)
            .field("tick_every", &self.tick_every)
            .field("armed", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Scheduler evaluating trigger times in `tz`, ticking every
    /// `tick_every` (at least one second).
    pub fn new(deps: SchedulerDeps, tz: Tz, tick_every: Duration) -> Self {
        Self {
            store: deps.store,
            orchestrator: deps.orchestrator,
            sink: deps.sink,
            clock: deps.clock,
            tz,
            tick_every: tick_every.max(Duration::from_secs(1)),
            slots: DashMap::new(),
            active: DashMap::new(),
            epochs: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Scheduler using the time zone and tick interval from `settings`.
    pub fn from_settings(deps: SchedulerDeps, settings: &RecapSettings) -> Result<Self, SettingsError> {
        let tz = settings.timezone()?;
        Ok(Self::new(deps, tz, Duration::from_secs(settings.scheduler.tick_secs)))
    }

    /// Zone trigger times are evaluated in.
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Interval between due-job checks.
    pub fn tick_every(&self) -> Duration {
        self.tick_every
    }

    /// Create a job, or update the existing one for this conversation.
    ///
    /// `min_messages` defaults to the configured maximum window. The job is
    /// armed for its next occurrence even if the store write fails; the
    /// returned acknowledgement then carries the warning.
    pub async fn create_or_update(
        &self,
        conversation: ConversationId,
        trigger_time: TimeOfDay,
        min_messages: Option<u32>,
        style: Option<String>,
    ) -> Result<Acknowledged<ScheduledJob>, SchedulerError> {
        let min_messages =
            min_messages.unwrap_or_else(|| self.orchestrator.registry().global().max_length);
        if min_messages == 0 {
            return Err(SchedulerError::Invalid("minimum message count must be at least 1".into()));
        }
        let style = style.filter(|s| !s.trim().is_empty());
        let now = self.clock.now();

        let existing = self.slots.get(&conversation).map(|s| s.job.clone());
        let job = match existing {
            Some(mut job) => {
                job.trigger_time = trigger_time;
                job.min_messages = min_messages;
                job.style = style;
                job.updated_at = now;
                job
            }
            None => ScheduledJob::new(conversation.clone(), trigger_time, min_messages, style, now),
        };

        let warning = self.store.save(&job).await.err().map(|e| {
            warn!(%conversation, error = %e, "schedule saved in memory only");
            SchedulerError::Persistence(e)
        });

        let next_due = next_occurrence(trigger_time, now, self.tz);
        let _ = self
            .slots
            .entry(conversation.clone())
            .and_modify(|slot| {
                slot.job = job.clone();
                slot.next_due = next_due;
            })
            .or_insert_with(|| JobSlot {
                job: job.clone(),
                epoch: self.next_epoch(),
                next_due,
            });

        info!(
            %conversation,
            trigger_time = %trigger_time,
            min_messages,
            next_due = %next_due,
            "schedule armed"
        );
        Ok(Acknowledged { value: job, warning })
    }

    /// Remove a conversation's job. The value is whether one was armed.
    ///
    /// A fire already running finishes, but its result is discarded.
    pub async fn cancel(&self, conversation: &ConversationId) -> Acknowledged<bool> {
        let warning = self
            .store
            .delete(&JobId::for_conversation(conversation))
            .await
            .err()
            .map(|e| {
                warn!(%conversation, error = %e, "cancellation not persisted; job returns on restart");
                SchedulerError::Persistence(e)
            });
        let removed = self.slots.remove(conversation).is_some();
        if removed {
            info!(%conversation, "schedule cancelled");
        }
        Acknowledged {
            value: removed,
            warning,
        }
    }

    /// The armed job for a conversation.
    pub fn get(&self, conversation: &ConversationId) -> Option<ScheduledJob> {
        self.slots.get(conversation).map(|s| s.job.clone())
    }

    /// All armed jobs, by trigger time then conversation.
    pub fn list(&self) -> Vec<ScheduledJob> {
        let mut jobs: Vec<ScheduledJob> = self.slots.iter().map(|s| s.job.clone()).collect();
        jobs.sort_by(|a, b| {
            a.trigger_time
                .cmp(&b.trigger_time)
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        jobs
    }

    /// When a conversation's job next fires.
    pub fn next_fire(&self, conversation: &ConversationId) -> Option<DateTime<Utc>> {
        self.slots.get(conversation).map(|s| s.next_due)
    }

    /// Whether a conversation's job is mid-fire.
    pub fn is_firing(&self, conversation: &ConversationId) -> bool {
        self.active.contains_key(conversation)
    }

    /// Load every stored job and arm it, scheduling catch-up fires.
    /// Returns how many jobs were newly armed.
    pub async fn load_and_arm(&self) -> Result<usize, SchedulerError> {
        let jobs = self.store.load().await.map_err(SchedulerError::Load)?;
        let now = self.clock.now();
        let mut armed = 0;
        for job in jobs {
            if self.arm_loaded(job, now) {
                armed += 1;
            }
        }
        info!(armed, "schedules loaded");
        Ok(armed)
    }

    /// Fire every due job as of `now`. Returns handles to the spawned fires.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> Vec<JoinHandle<FireOutcome>> {
        let today = now.with_timezone(&self.tz).date_naive();
        let mut due = Vec::new();

        for mut slot in self.slots.iter_mut() {
            if now < slot.next_due {
                continue;
            }
            slot.next_due = next_occurrence(slot.job.trigger_time, now, self.tz);
            if self.active.contains_key(slot.key()) {
                warn!(conversation_id = %slot.key(), "previous fire still running, skipping this one");
                metrics::counter!("recap_scheduler_fires_total", "outcome" => "overlap").increment(1);
                continue;
            }
            let _ = self.active.insert(slot.key().clone(), slot.epoch);
            slot.job.last_fired_on = Some(today);
            slot.job.updated_at = now;
            due.push((slot.job.clone(), slot.epoch));
        }

        due.into_iter()
            .map(|(job, epoch)| {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.fire(job, epoch).await })
            })
            .collect()
    }

    /// Run the timing loop until `cancel` fires. Fires in flight at that
    /// point stop retrying.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.tick_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(tick_secs = this.tick_every.as_secs(), tz = %this.tz, "scheduler started");
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = this.tick(this.clock.now());
                    }
                }
            }
            this.shutdown.cancel();
            info!("scheduler stopped");
        })
    }

    /// Compare armed jobs against the store.
    pub async fn health_check(&self) -> Result<ScheduleHealth, SchedulerError> {
        let stored: BTreeSet<ConversationId> = self
            .store
            .load()
            .await
            .map_err(SchedulerError::Load)?
            .into_iter()
            .map(|j| j.conversation_id)
            .collect();
        let armed: BTreeSet<ConversationId> = self.slots.iter().map(|s| s.key().clone()).collect();

        let health = ScheduleHealth {
            armed: armed.len(),
            stored: stored.len(),
            missing_in_store: armed.difference(&stored).cloned().collect(),
            orphaned: stored.difference(&armed).cloned().collect(),
        };
        if !health.is_consistent() {
            warn!(
                missing = health.missing_in_store.len(),
                orphaned = health.orphaned.len(),
                "schedules out of sync with store"
            );
        }
        Ok(health)
    }

    /// Arm orphaned stored jobs and re-save armed jobs missing from the
    /// store, then report what remains.
    pub async fn reconcile(&self) -> Result<ScheduleHealth, SchedulerError> {
        let stored = self.store.load().await.map_err(SchedulerError::Load)?;
        let now = self.clock.now();
        let stored_ids: BTreeSet<ConversationId> = stored.iter().map(|j| j.conversation_id.clone()).collect();
        for job in stored {
            if self.arm_loaded(job, now) {
                debug!("re-armed orphaned schedule");
            }
        }

        let missing: Vec<ScheduledJob> = self
            .slots
            .iter()
            .filter(|s| !stored_ids.contains(s.key()))
            .map(|s| s.job.clone())
            .collect();
        for job in missing {
            if let Err(e) = self.store.save(&job).await {
                warn!(conversation_id = %job.conversation_id, error = %e, "schedule still not persisted");
            }
        }
        self.health_check().await
    }

    #[instrument(skip_all, fields(job_id = %job.id, conversation_id = %job.conversation_id))]
    async fn fire(self: Arc<Self>, job: ScheduledJob, epoch: u64) -> FireOutcome {
        let outcome = self.fire_inner(&job, epoch).await;
        let _ = self.active.remove_if(&job.conversation_id, |_, running| *running == epoch);

        metrics::counter!("recap_scheduler_fires_total", "outcome" => outcome.label()).increment(1);
        match &outcome {
            FireOutcome::Delivered => info!("scheduled summary delivered"),
            FireOutcome::Skipped(reason) => info!(%reason, "scheduled summary skipped"),
            FireOutcome::Failed(reason) => warn!(%reason, "scheduled summary failed"),
            FireOutcome::Discarded => info!("job cancelled mid-fire, result discarded"),
        }
        outcome
    }

    async fn fire_inner(&self, job: &ScheduledJob, epoch: u64) -> FireOutcome {
        if !self.is_current(&job.conversation_id, epoch) {
            info!("job cancelled before the fire started");
            return FireOutcome::Discarded;
        }
        if let Some(fired_on) = job.last_fired_on {
            match self.store.mark_fired(&job.id, fired_on).await {
                Ok(true) => {}
                Ok(false) => debug!("job no longer stored, fire date not recorded"),
                Err(e) => warn!(error = %e, "fire date not persisted; a restart today may fire again"),
            }
        }

        match self.execute(job).await {
            Err(outcome) => outcome,
            Ok(_) if !self.is_current(&job.conversation_id, epoch) => FireOutcome::Discarded,
            Ok(summary) => match self.sink.deliver(&job.conversation_id, &summary.artifact).await {
                Ok(()) => FireOutcome::Delivered,
                Err(e) => FireOutcome::Failed(format!("delivery failed: {e}")),
            },
        }
    }

    async fn execute(&self, job: &ScheduledJob) -> Result<SummaryResult, FireOutcome> {
        let count = self
            .orchestrator
            .cache()
            .source()
            .message_count(&job.conversation_id)
            .await
            .map_err(|e| FireOutcome::Failed(format!("message count unavailable: {e}")))?;
        if count < u64::from(job.min_messages) {
            return Err(FireOutcome::Skipped(format!(
                "{count} message(s), {} required",
                job.min_messages
            )));
        }

        let request = SummaryRequest::scheduled(job.conversation_id.clone(), job.min_messages)
            .with_style(job.style.clone());
        self.orchestrator
            .run_with_cancel(request, &self.shutdown)
            .await
            .map_err(|e| match e {
                OrchestratorError::InsufficientMessages { .. } | OrchestratorError::Dispatch(_) => {
                    FireOutcome::Skipped(e.to_string())
                }
                other => FireOutcome::Failed(other.to_string()),
            })
    }

    fn arm_loaded(&self, job: ScheduledJob, now: DateTime<Utc>) -> bool {
        if self.slots.contains_key(&job.conversation_id) {
            return false;
        }
        let catch_up = needs_catch_up(&job, now, self.tz);
        let next_due = if catch_up {
            now
        } else {
            next_occurrence(job.trigger_time, now, self.tz)
        };
        if catch_up {
            info!(conversation_id = %job.conversation_id, "missed today's fire, catching up");
        }
        let _ = self.slots.insert(
            job.conversation_id.clone(),
            JobSlot {
                job,
                epoch: self.next_epoch(),
                next_due,
            },
        );
        true
    }

    fn is_current(&self, conversation: &ConversationId, epoch: u64) -> bool {
        self.slots.get(conversation).is_some_and(|s| s.epoch == epoch)
    }

    fn next_epoch(&self) -> u64 {
        self.epochs.fetch_add(1, Ordering::Relaxed)
    }
}

/// The trigger instant on a given local date.
fn occurrence_on(date: NaiveDate, time: TimeOfDay, tz: Tz) -> Option<DateTime<Utc>> {
    let local = date.and_time(time.to_naive());
    tz.from_local_datetime(&local)
        .earliest()
        // inside a DST gap: the same wall time an hour later
        .or_else(|| tz.from_local_datetime(&(local + chrono::Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
}

/// First trigger instant strictly after `after`.
fn next_occurrence(time: TimeOfDay, after: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let mut day = Some(after.with_timezone(&tz).date_naive());
    for _ in 0..3 {
        let Some(d) = day else { break };
        if let Some(at) = occurrence_on(d, time, tz)
            && at > after
        {
            return at;
        }
        day = d.succ_opt();
    }
    after + chrono::Duration::days(1)
}

fn needs_catch_up(job: &ScheduledJob, now: DateTime<Utc>, tz: Tz) -> bool {
    let today = now.with_timezone(&tz).date_naive();
    if job.last_fired_on == Some(today) {
        return false;
    }
    occurrence_on(today, job.trigger_time, tz).is_some_and(|at| at <= now && at > job.updated_at)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
