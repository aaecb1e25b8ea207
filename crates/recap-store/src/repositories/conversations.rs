//! `conversation_configs` table.

use chrono::Utc;
use recap_core::{ConversationConfig, ConversationId, ModelRef};
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::{Result, StoreError};

/// Per-conversation override repository.
pub struct ConversationConfigRepo;

impl ConversationConfigRepo {
    /// Store overrides; an empty config deletes the row.
    pub fn upsert(conn: &Connection, conversation: &ConversationId, config: &ConversationConfig) -> Result<()> {
        if config.is_empty() {
            let _ = Self::delete(conn, conversation)?;
            return Ok(());
        }
        let _ = conn.execute(
            "INSERT INTO conversation_configs (conversation_id, model_override, style_override, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(conversation_id) DO UPDATE SET
                 model_override = excluded.model_override,
                 style_override = excluded.style_override,
                 updated_at = excluded.updated_at",
            params![
                conversation.as_str(),
                config.model_override.as_ref().map(ToString::to_string),
                config.style_override,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Remove overrides. Returns whether a row existed.
    pub fn delete(conn: &Connection, conversation: &ConversationId) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM conversation_configs WHERE conversation_id = ?1",
            params![conversation.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Overrides for one conversation.
    pub fn get(conn: &Connection, conversation: &ConversationId) -> Result<Option<ConversationConfig>> {
        conn.query_row(
            "SELECT model_override, style_override FROM conversation_configs WHERE conversation_id = ?1",
            params![conversation.as_str()],
            |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?)),
        )
        .optional()?
        .map(|(model, style)| decode(model, style))
        .transpose()
    }

    /// Every stored override.
    pub fn list(conn: &Connection) -> Result<Vec<(ConversationId, ConversationConfig)>> {
        let mut stmt = conn.prepare(
            "SELECT conversation_id, model_override, style_override
             FROM conversation_configs ORDER BY conversation_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, model, style)| Ok((ConversationId::from(id), decode(model, style)?)))
            .collect()
    }
}

fn decode(model: Option<String>, style: Option<String>) -> Result<ConversationConfig> {
    let model_override = model
        .as_deref()
        .map(ModelRef::parse)
        .transpose()
        .map_err(|e| StoreError::CorruptRow {
            table: "conversation_configs",
            column: "model_override",
            detail: e.to_string(),
        })?;
    Ok(ConversationConfig {
        model_override,
        style_override: style,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn upsert_get_list() {
        let conn = conn();
        let g1 = ConversationId::from("g1");
        let cfg = ConversationConfig {
            model_override: Some(ModelRef::parse("OpenAI/gpt-4o").unwrap()),
            style_override: Some("bullet".into()),
        };
        ConversationConfigRepo::upsert(&conn, &g1, &cfg).unwrap();
        assert_eq!(ConversationConfigRepo::get(&conn, &g1).unwrap(), Some(cfg.clone()));

        let only_style = ConversationConfig {
            model_override: None,
            style_override: Some("formal".into()),
        };
        ConversationConfigRepo::upsert(&conn, &g1, &only_style).unwrap();
        let all = ConversationConfigRepo::list(&conn).unwrap();
        assert_eq!(all, vec![(g1.clone(), only_style)]);
    }

    #[test]
    fn empty_config_deletes() {
        let conn = conn();
        let g1 = ConversationId::from("g1");
        ConversationConfigRepo::upsert(
            &conn,
            &g1,
            &ConversationConfig {
                model_override: None,
                style_override: Some("x".into()),
            },
        )
        .unwrap();
        ConversationConfigRepo::upsert(&conn, &g1, &ConversationConfig::default()).unwrap();
        assert!(ConversationConfigRepo::get(&conn, &g1).unwrap().is_none());
    }
}
