//! Stateless repositories; every method takes `&Connection`.

mod conversations;
mod jobs;

pub use conversations::ConversationConfigRepo;
pub use jobs::JobRepo;

use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::StoreError;

fn parse_timestamp(raw: &str, table: &'static str, column: &'static str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            column,
            detail: format!("{raw}: {e}"),
        })
}

fn parse_date(raw: &str, table: &'static str, column: &'static str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("{raw}: {e}"),
    })
}
