// Session records: one client encounter per row in `sessions`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pathways_common::types::Session;
use rusqlite::{params, Connection, OptionalExtension};

use super::{opt_ts_to_sql, parse_opt_ts, parse_ts, ts_to_sql};

const SELECT_COLUMNS: &str =
    "SELECT id, person_id, started_at, ended_at, reason, notes, created_at, updated_at FROM sessions";

/// Stateless operations on the `sessions` table.
pub struct SessionStore;

impl SessionStore {
    /// Insert or replace a session, keeping its row position.
    pub fn put(conn: &Connection, session: &Session) -> Result<()> {
        conn.execute(
            "INSERT INTO sessions \
             (id, person_id, started_at, ended_at, reason, notes, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(id) DO UPDATE SET \
             person_id = excluded.person_id, started_at = excluded.started_at, \
             ended_at = excluded.ended_at, reason = excluded.reason, notes = excluded.notes, \
             created_at = excluded.created_at, updated_at = excluded.updated_at",
            params![
                session.id,
                session.person_id,
                ts_to_sql(session.started_at),
                opt_ts_to_sql(session.ended_at),
                session.reason,
                session.notes,
                ts_to_sql(session.created_at),
                ts_to_sql(session.updated_at),
            ],
        )
        .context("failed to upsert session")?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<Session>> {
        conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], row_to_session)
            .optional()
            .context("failed to query session")
    }

    /// Sessions newest first, optionally limited to one person.
    pub fn list(conn: &Connection, person_id: Option<&str>) -> Result<Vec<Session>> {
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_COLUMNS} WHERE (?1 IS NULL OR person_id = ?1) \
                 ORDER BY started_at DESC, rowid DESC"
            ))
            .context("failed to prepare sessions query")?;

        let rows = stmt
            .query_map(params![person_id], row_to_session)
            .context("failed to query sessions")?;

        rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect sessions")
    }

    /// Every session in insertion order, for backups.
    pub fn list_all(conn: &Connection) -> Result<Vec<Session>> {
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid"))
            .context("failed to prepare session export query")?;
        let rows = stmt.query_map([], row_to_session).context("failed to query sessions")?;
        rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect sessions")
    }

    /// Set `ended_at` unless it is already set. Returns whether the row exists.
    pub fn mark_ended(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE sessions SET ended_at = COALESCE(ended_at, ?1), updated_at = ?1 WHERE id = ?2",
                params![ts_to_sql(now), id],
            )
            .context("failed to mark session ended")?;
        Ok(changed > 0)
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let started_raw: String = row.get(2)?;
    let created_raw: String = row.get(6)?;
    let updated_raw: String = row.get(7)?;

    Ok(Session {
        id: row.get(0)?,
        person_id: row.get(1)?,
        started_at: parse_ts(2, &started_raw)?,
        ended_at: parse_opt_ts(3, row.get(3)?)?,
        reason: row.get(4)?,
        notes: row.get(5)?,
        created_at: parse_ts(6, &created_raw)?,
        updated_at: parse_ts(7, &updated_raw)?,
    })
}
