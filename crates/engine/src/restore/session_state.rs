// Session lifecycle: the per-session checkpoint and the only writer of
// `current_state`.
//
// Every change of `current_state` goes through `transition_in`, which
// persists the checkpoint and appends one audit event in the caller's
// transaction.

use anyhow::Context;
use chrono::{DateTime, Utc};
use pathways_common::types::{RpEvent, RpSessionState, RpState, SessionPhase};
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::RestoreError;
use crate::store::events::EventStore;
use crate::store::meta_db::MetaDb;
use crate::store::rp_state::RpStateStore;

pub const STOP_LABEL: &str = "Stop Session";

/// Return the session's checkpoint, creating the default one if absent.
pub fn ensure_session(
    db: &mut MetaDb,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<RpSessionState, RestoreError> {
    let tx = db.write_transaction()?;
    let state = ensure_in(&tx, session_id, now)?;
    tx.commit().context("failed to commit session state")?;
    Ok(state)
}

pub fn get_state(db: &MetaDb, session_id: &str) -> Result<Option<RpSessionState>, RestoreError> {
    Ok(RpStateStore::get(db.connection(), session_id)?)
}

/// Move the machine to `next` and log it. Pointers are left untouched.
pub fn transition(
    db: &mut MetaDb,
    session_id: &str,
    next: RpState,
    action: Option<&str>,
    now: DateTime<Utc>,
) -> Result<RpSessionState, RestoreError> {
    let tx = db.write_transaction()?;
    let mut state = ensure_in(&tx, session_id, now)?;
    let from = state.current_state;
    transition_in(&tx, &mut state, next, action, Some(serde_json::json!({ "from": from })), now)?;
    tx.commit().context("failed to commit transition")?;
    info!(session_id, %from, to = %next, action = ?action, "state changed");
    Ok(state)
}

/// Force the session to `SESSION_CLOSE` from any state.
pub fn request_stop(
    db: &mut MetaDb,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<RpSessionState, RestoreError> {
    let tx = db.write_transaction()?;
    let mut state = ensure_in(&tx, session_id, now)?;
    let from = state.current_state;
    mark_stopped(&mut state);
    transition_in(
        &tx,
        &mut state,
        RpState::SessionClose,
        Some(STOP_LABEL),
        Some(serde_json::json!({ "from": from })),
        now,
    )?;
    tx.commit().context("failed to commit stop request")?;
    info!(session_id, %from, "stop requested");
    Ok(state)
}

/// Store the practitioner's next-steps text; blank clears it.
pub fn save_practitioner_notes(
    db: &mut MetaDb,
    session_id: &str,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<RpSessionState, RestoreError> {
    let tx = db.write_transaction()?;
    let mut state = ensure_in(&tx, session_id, now)?;
    state.practitioner_notes =
        notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    state.updated_at = now;
    RpStateStore::put(&tx, &state)?;
    tx.commit().context("failed to commit practitioner notes")?;
    Ok(state)
}

pub(crate) fn ensure_in(
    conn: &Connection,
    session_id: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<RpSessionState> {
    if let Some(existing) = RpStateStore::get(conn, session_id)? {
        return Ok(existing);
    }

    let fresh = RpSessionState::initial(session_id, now);
    if RpStateStore::insert_if_absent(conn, &fresh)? {
        debug!(session_id, "session state created");
        return Ok(fresh);
    }
    RpStateStore::get(conn, session_id)?
        .with_context(|| format!("session state `{session_id}` vanished after insert"))
}

pub(crate) fn mark_stopped(state: &mut RpSessionState) {
    state.stop_requested = true;
    state.phase = SessionPhase::Closure;
}

/// Set `current_state`, persist the checkpoint and append the audit event.
pub(crate) fn transition_in(
    conn: &Connection,
    state: &mut RpSessionState,
    next: RpState,
    action: Option<&str>,
    payload: Option<Value>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    state.current_state = next;
    state.updated_at = now;
    RpStateStore::put(conn, state)?;

    let event = RpEvent {
        id: Uuid::new_v4().to_string(),
        session_id: state.session_id.clone(),
        collection_id: state.current_collection_id.clone(),
        root_id: state.current_root_id.clone(),
        state: next,
        action: action.map(str::to_string),
        payload,
        created_at: now,
    };
    EventStore::append(conn, &event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{cleanup, setup, ts};

    #[test]
    fn ensure_creates_defaults_once() {
        let (mut db, path) = setup("state-ensure");
        let first = ensure_session(&mut db, "s1", ts(0)).unwrap();
        assert_eq!(first.phase, SessionPhase::Discovery);
        assert_eq!(first.current_state, RpState::RestoreInit);
        assert!(!first.stop_requested);

        transition(&mut db, "s1", RpState::AssociatedPathwayCheck, None, ts(5)).unwrap();
        let again = ensure_session(&mut db, "s1", ts(10)).unwrap();
        assert_eq!(again.current_state, RpState::AssociatedPathwayCheck);
        assert_eq!(again.created_at, ts(0));

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn transition_logs_event_with_pointers() {
        let (mut db, path) = setup("state-transition");
        let mut state = ensure_session(&mut db, "s1", ts(0)).unwrap();
        state.current_collection_id = Some("c1".into());
        state.current_root_id = Some("r1".into());
        RpStateStore::put(db.connection(), &state).unwrap();

        transition(&mut db, "s1", RpState::Acknowledgment, Some("Start root"), ts(1)).unwrap();

        let events = EventStore::list_for_session(db.connection(), "s1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, RpState::Acknowledgment);
        assert_eq!(events[0].action.as_deref(), Some("Start root"));
        assert_eq!(events[0].collection_id.as_deref(), Some("c1"));
        assert_eq!(events[0].root_id.as_deref(), Some("r1"));
        assert_eq!(events[0].payload, Some(serde_json::json!({"from": "RESTORE_INIT"})));

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn stop_forces_close_from_anywhere() {
        let (mut db, path) = setup("state-stop");
        transition(&mut db, "s1", RpState::AuthorityTransfer, None, ts(0)).unwrap();

        let stopped = request_stop(&mut db, "s1", ts(1)).unwrap();
        assert_eq!(stopped.current_state, RpState::SessionClose);
        assert_eq!(stopped.phase, SessionPhase::Closure);
        assert!(stopped.stop_requested);

        let events = EventStore::list_for_session(db.connection(), "s1").unwrap();
        assert_eq!(events.last().and_then(|e| e.action.as_deref()), Some(STOP_LABEL));

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn practitioner_notes_trim_and_clear() {
        let (mut db, path) = setup("state-notes");
        let saved = save_practitioner_notes(&mut db, "s1", Some("  drink water "), ts(0)).unwrap();
        assert_eq!(saved.practitioner_notes.as_deref(), Some("drink water"));

        let cleared = save_practitioner_notes(&mut db, "s1", Some("   "), ts(1)).unwrap();
        assert_eq!(cleared.practitioner_notes, None);

        drop(db);
        cleanup(&path);
    }
}
