// Session records: creation, lookup, end stamp, appended notes and counts.

use anyhow::Context;
use chrono::{DateTime, Utc};
use pathways_common::types::{CollectionStatus, RootStatus, Session};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::RestoreError;
use crate::store::collections::CollectionStore;
use crate::store::meta_db::MetaDb;
use crate::store::roots::RootStore;
use crate::store::sessions::SessionStore;

/// Tallies shown when a session closes.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounts {
    pub restored_roots: usize,
    pub deferred_roots: usize,
    pub identified_roots: usize,
    pub collections_completed: usize,
}

pub fn create_session(
    db: &mut MetaDb,
    person_id: &str,
    reason: Option<&str>,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Session, RestoreError> {
    let session = Session {
        id: Uuid::new_v4().to_string(),
        person_id: person_id.to_string(),
        started_at: now,
        ended_at: None,
        reason: trimmed(reason),
        notes: trimmed(notes),
        created_at: now,
        updated_at: now,
    };
    SessionStore::put(db.connection(), &session)?;
    info!(session_id = %session.id, person_id, "session created");
    Ok(session)
}

pub fn get_session(db: &MetaDb, session_id: &str) -> Result<Session, RestoreError> {
    SessionStore::get(db.connection(), session_id)?
        .ok_or_else(|| RestoreError::not_found("session", session_id))
}

pub fn list_sessions(db: &MetaDb, person_id: Option<&str>) -> Result<Vec<Session>, RestoreError> {
    Ok(SessionStore::list(db.connection(), person_id)?)
}

/// Stamp `ended_at`. A second call leaves the first value in place.
pub fn end_session(
    db: &mut MetaDb,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<Session, RestoreError> {
    let tx = db.write_transaction()?;
    if !SessionStore::mark_ended(&tx, session_id, now)? {
        return Err(RestoreError::not_found("session", session_id));
    }
    let session = SessionStore::get(&tx, session_id)?
        .ok_or_else(|| RestoreError::not_found("session", session_id))?;
    tx.commit().context("failed to commit session end")?;
    info!(session_id, ended_at = ?session.ended_at, "session ended");
    Ok(session)
}

/// Append a titled block to the session notes, separated by a rule.
pub fn append_session_notes(
    db: &mut MetaDb,
    session_id: &str,
    title: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<Session, RestoreError> {
    let tx = db.write_transaction()?;
    let mut session = SessionStore::get(&tx, session_id)?
        .ok_or_else(|| RestoreError::not_found("session", session_id))?;

    let header = format!("{} ({})", title.trim(), now.format("%Y-%m-%d %H:%M UTC"));
    let block = [header.as_str(), body.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let notes = match session.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(existing) => format!("{existing}\n\n---\n\n{block}"),
        None => block,
    };

    session.notes = Some(notes);
    session.updated_at = now;
    SessionStore::put(&tx, &session)?;
    tx.commit().context("failed to commit session notes")?;
    Ok(session)
}

pub fn session_counts(db: &MetaDb, session_id: &str) -> Result<SessionCounts, RestoreError> {
    let conn = db.connection();
    Ok(SessionCounts {
        restored_roots: RootStore::count_with_status(conn, session_id, RootStatus::Restored)?,
        deferred_roots: RootStore::count_with_status(conn, session_id, RootStatus::Deferred)?,
        identified_roots: RootStore::count_with_status(conn, session_id, RootStatus::Identified)?,
        collections_completed: CollectionStore::count_with_status(
            conn,
            session_id,
            CollectionStatus::Complete,
        )?,
    })
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
