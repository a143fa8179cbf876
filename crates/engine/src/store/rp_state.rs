// Machine checkpoints: one `rp_sessions` row per session.

use anyhow::{Context, Result};
use pathways_common::types::RpSessionState;
use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_tag, parse_ts, ts_to_sql};

const SELECT_COLUMNS: &str = "SELECT session_id, phase, current_state, current_collection_id, \
     current_root_id, stop_requested, practitioner_notes, created_at, updated_at FROM rp_sessions";

const INSERT_COLUMNS: &str = "INSERT INTO rp_sessions \
     (session_id, phase, current_state, current_collection_id, current_root_id, \
     stop_requested, practitioner_notes, created_at, updated_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

/// Stateless operations on the `rp_sessions` table.
pub struct RpStateStore;

impl RpStateStore {
    pub fn get(conn: &Connection, session_id: &str) -> Result<Option<RpSessionState>> {
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE session_id = ?1"),
            params![session_id],
            row_to_state,
        )
        .optional()
        .context("failed to query session state")
    }

    /// Insert `state` only if the session has no checkpoint yet.
    pub fn insert_if_absent(conn: &Connection, state: &RpSessionState) -> Result<bool> {
        let sql = INSERT_COLUMNS.replacen("INSERT INTO", "INSERT OR IGNORE INTO", 1);
        let inserted =
            execute_with_state(conn, &sql, state).context("failed to insert session state")?;
        Ok(inserted > 0)
    }

    /// Write the whole checkpoint.
    pub fn put(conn: &Connection, state: &RpSessionState) -> Result<()> {
        let sql = format!(
            "{INSERT_COLUMNS} ON CONFLICT(session_id) DO UPDATE SET \
             phase = excluded.phase, current_state = excluded.current_state, \
             current_collection_id = excluded.current_collection_id, \
             current_root_id = excluded.current_root_id, \
             stop_requested = excluded.stop_requested, \
             practitioner_notes = excluded.practitioner_notes, \
             created_at = excluded.created_at, updated_at = excluded.updated_at"
        );
        execute_with_state(conn, &sql, state).context("failed to upsert session state")?;
        Ok(())
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<RpSessionState>> {
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid"))
            .context("failed to prepare session state export query")?;
        let rows = stmt.query_map([], row_to_state).context("failed to query session states")?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to collect session states")
    }
}

fn execute_with_state(
    conn: &Connection,
    sql: &str,
    state: &RpSessionState,
) -> rusqlite::Result<usize> {
    conn.execute(
        sql,
        params![
            state.session_id,
            state.phase.as_str(),
            state.current_state.as_str(),
            state.current_collection_id,
            state.current_root_id,
            state.stop_requested,
            state.practitioner_notes,
            ts_to_sql(state.created_at),
            ts_to_sql(state.updated_at),
        ],
    )
}

fn row_to_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<RpSessionState> {
    let phase_raw: String = row.get(1)?;
    let state_raw: String = row.get(2)?;
    let created_raw: String = row.get(7)?;
    let updated_raw: String = row.get(8)?;

    Ok(RpSessionState {
        session_id: row.get(0)?,
        phase: parse_tag(1, &phase_raw)?,
        current_state: parse_tag(2, &state_raw)?,
        current_collection_id: row.get(3)?,
        current_root_id: row.get(4)?,
        stop_requested: row.get(5)?,
        practitioner_notes: row.get(6)?,
        created_at: parse_ts(7, &created_raw)?,
        updated_at: parse_ts(8, &updated_raw)?,
    })
}

#[cfg(test)]
mod tests {
    use pathways_common::types::{RpState, SessionPhase};

    use super::*;
    use crate::store::testing::{cleanup, setup, ts};

    #[test]
    fn insert_if_absent_never_overwrites() {
        let (db, path) = setup("rp-state-insert");
        let first = RpSessionState::initial("s1", ts(0));
        assert!(RpStateStore::insert_if_absent(db.connection(), &first).unwrap());

        let mut other = RpSessionState::initial("s1", ts(50));
        other.current_state = RpState::SessionClose;
        assert!(!RpStateStore::insert_if_absent(db.connection(), &other).unwrap());

        let loaded = RpStateStore::get(db.connection(), "s1").unwrap().unwrap();
        assert_eq!(loaded, first);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn put_roundtrips_every_field() {
        let (db, path) = setup("rp-state-put");
        let mut state = RpSessionState::initial("s1", ts(0));
        RpStateStore::put(db.connection(), &state).unwrap();

        state.phase = SessionPhase::IdentifiedPathsForCollection;
        state.current_state = RpState::EmbodiedIntegrationGuide;
        state.current_collection_id = Some("c1".into());
        state.current_root_id = Some("r1".into());
        state.stop_requested = true;
        state.practitioner_notes = Some("follow up in a week".into());
        state.updated_at = ts(5);
        RpStateStore::put(db.connection(), &state).unwrap();

        let loaded = RpStateStore::get(db.connection(), "s1").unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(RpStateStore::list_all(db.connection()).unwrap().len(), 1);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn unknown_state_tag_fails_to_decode() {
        let (db, path) = setup("rp-state-bad-tag");
        RpStateStore::put(db.connection(), &RpSessionState::initial("s1", ts(0))).unwrap();
        db.connection()
            .execute("UPDATE rp_sessions SET current_state = 'DANCING'", [])
            .unwrap();

        assert!(RpStateStore::get(db.connection(), "s1").is_err());

        drop(db);
        cleanup(&path);
    }
}
