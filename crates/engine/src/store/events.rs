// Append-only audit trail in `rp_events`.

use anyhow::{Context, Result};
use pathways_common::types::RpEvent;
use rusqlite::{params, Connection};

use super::{parse_json, parse_tag, parse_ts, ts_to_sql};

const SELECT_COLUMNS: &str =
    "SELECT id, session_id, collection_id, root_id, state, action, payload, created_at FROM rp_events";

/// Stateless operations on the `rp_events` table.
pub struct EventStore;

impl EventStore {
    pub fn append(conn: &Connection, event: &RpEvent) -> Result<()> {
        let payload = event
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to encode event payload")?;

        conn.execute(
            "INSERT INTO rp_events \
             (id, session_id, collection_id, root_id, state, action, payload, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(id) DO NOTHING",
            params![
                event.id,
                event.session_id,
                event.collection_id,
                event.root_id,
                event.state.as_str(),
                event.action,
                payload,
                ts_to_sql(event.created_at),
            ],
        )
        .context("failed to append event")?;
        Ok(())
    }

    /// Events of a session in the order they were written.
    pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<RpEvent>> {
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE session_id = ?1 ORDER BY created_at, rowid"))
            .context("failed to prepare session events query")?;
        let rows = stmt
            .query_map(params![session_id], row_to_event)
            .context("failed to query session events")?;
        rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect session events")
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<RpEvent>> {
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid"))
            .context("failed to prepare event export query")?;
        let rows = stmt.query_map([], row_to_event).context("failed to query events")?;
        rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect events")
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<RpEvent> {
    let state_raw: String = row.get(4)?;
    let payload_raw: Option<String> = row.get(6)?;
    let created_raw: String = row.get(7)?;

    Ok(RpEvent {
        id: row.get(0)?,
        session_id: row.get(1)?,
        collection_id: row.get(2)?,
        root_id: row.get(3)?,
        state: parse_tag(4, &state_raw)?,
        action: row.get(5)?,
        payload: payload_raw.map(|raw| parse_json(6, &raw)).transpose()?,
        created_at: parse_ts(7, &created_raw)?,
    })
}
