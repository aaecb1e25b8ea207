//! `scheduled_jobs` table.

use chrono::NaiveDate;
use recap_core::{ConversationId, JobId, ScheduledJob, TimeOfDay};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{parse_date, parse_timestamp};
use crate::errors::{Result, StoreError};

const TABLE: &str = "scheduled_jobs";
const COLUMNS: &str =
    "id, conversation_id, trigger_time, min_messages, style, created_at, updated_at, last_fired_on";

struct JobRow {
    id: String,
    conversation_id: String,
    trigger_time: String,
    min_messages: i64,
    style: Option<String>,
    created_at: String,
    updated_at: String,
    last_fired_on: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            trigger_time: row.get(2)?,
            min_messages: row.get(3)?,
            style: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            last_fired_on: row.get(7)?,
        })
    }

    fn into_job(self) -> Result<ScheduledJob> {
        let trigger_time = TimeOfDay::parse(&self.trigger_time).map_err(|e| StoreError::CorruptRow {
            table: TABLE,
            column: "trigger_time",
            detail: e.to_string(),
        })?;
        let min_messages = u32::try_from(self.min_messages).map_err(|_| StoreError::CorruptRow {
            table: TABLE,
            column: "min_messages",
            detail: self.min_messages.to_string(),
        })?;
        Ok(ScheduledJob {
            id: JobId::from(self.id),
            conversation_id: ConversationId::from(self.conversation_id),
            trigger_time,
            min_messages,
            style: self.style,
            created_at: parse_timestamp(&self.created_at, TABLE, "created_at")?,
            updated_at: parse_timestamp(&self.updated_at, TABLE, "updated_at")?,
            last_fired_on: self
                .last_fired_on
                .as_deref()
                .map(|d| parse_date(d, TABLE, "last_fired_on"))
                .transpose()?,
        })
    }
}

/// Scheduled job repository.
pub struct JobRepo;

impl JobRepo {
    /// Insert or replace. The job id is derived from the conversation, so
    /// this keeps one row per conversation.
    pub fn upsert(conn: &Connection, job: &ScheduledJob) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO scheduled_jobs (id, conversation_id, trigger_time, min_messages, style,
                 created_at, updated_at, last_fired_on)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 trigger_time = excluded.trigger_time,
                 min_messages = excluded.min_messages,
                 style = excluded.style,
                 updated_at = excluded.updated_at,
                 last_fired_on = excluded.last_fired_on",
            params![
                job.id.as_str(),
                job.conversation_id.as_str(),
                job.trigger_time.to_string(),
                i64::from(job.min_messages),
                job.style,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
                job.last_fired_on.map(|d| d.format("%Y-%m-%d").to_string()),
            ],
        )?;
        Ok(())
    }

    /// Delete by job id. Returns whether a row was removed.
    pub fn delete(conn: &Connection, id: &JobId) -> Result<bool> {
        let changed = conn.execute("DELETE FROM scheduled_jobs WHERE id = ?1", params![id.as_str()])?;
        Ok(changed > 0)
    }

    /// Record a fire date on an existing row. Returns `false` when the row
    /// is gone; a deleted job is never recreated here.
    pub fn mark_fired(conn: &Connection, id: &JobId, fired_on: NaiveDate) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE scheduled_jobs SET last_fired_on = ?2 WHERE id = ?1",
            params![id.as_str(), fired_on.format("%Y-%m-%d").to_string()],
        )?;
        Ok(changed > 0)
    }

    #[cfg(test)]
    fn get_by_conversation(conn: &Connection, conversation: &ConversationId) -> Result<Option<ScheduledJob>> {
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM scheduled_jobs WHERE conversation_id = ?1"),
            params![conversation.as_str()],
            JobRow::from_row,
        )
        .optional()?
        .map(JobRow::into_job)
        .transpose()
    }

    /// All jobs ordered by trigger time then conversation.
    pub fn list(conn: &Connection) -> Result<Vec<ScheduledJob>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM scheduled_jobs ORDER BY trigger_time, conversation_id"
        ))?;
        let rows = stmt
            .query_map([], JobRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(JobRow::into_job).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
