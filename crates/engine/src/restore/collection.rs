// Collection lifecycle: at most one `building` collection per session.
//
// The invariant is kept procedurally. Every path that could create a
// collection first consults the session pointer, then scans the session's
// collections, and only creates when both come up empty. Creation and the
// pointer update commit together.

use anyhow::Context;
use chrono::{DateTime, Utc};
use pathways_common::types::{CollectionStatus, RpCollection, RpSessionState, SessionPhase};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use super::session_state;
use crate::error::RestoreError;
use crate::store::collections::CollectionStore;
use crate::store::meta_db::MetaDb;
use crate::store::rp_state::RpStateStore;

/// The building collection together with the checkpoint pointing at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCollection {
    pub state: RpSessionState,
    pub collection: RpCollection,
}

/// Get or create the session's single building collection.
pub fn ensure_building_collection(
    db: &mut MetaDb,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<ActiveCollection, RestoreError> {
    let tx = db.write_transaction()?;
    let mut state = session_state::ensure_in(&tx, session_id, now)?;
    let collection = ensure_building_in(&tx, &mut state, now)?;
    tx.commit().context("failed to commit building collection")?;
    Ok(ActiveCollection { state, collection })
}

/// Move a collection to `complete`. Completing twice is a no-op.
pub fn complete_collection(
    db: &mut MetaDb,
    collection_id: &str,
    now: DateTime<Utc>,
) -> Result<RpCollection, RestoreError> {
    let tx = db.write_transaction()?;
    let changed = CollectionStore::mark_complete(&tx, collection_id, now)?;
    let collection = CollectionStore::get(&tx, collection_id)?
        .ok_or_else(|| RestoreError::not_found("collection", collection_id))?;
    tx.commit().context("failed to commit collection completion")?;
    if changed {
        info!(collection_id, session_id = %collection.session_id, "collection completed");
    }
    Ok(collection)
}

pub fn list_collections(db: &MetaDb, session_id: &str) -> Result<Vec<RpCollection>, RestoreError> {
    Ok(CollectionStore::list_for_session(db.connection(), session_id)?)
}

/// The active collection without creating one: the pointer when it still
/// names a building collection of this session, else any building one.
pub(crate) fn resolve_active_in(
    conn: &Connection,
    state: &RpSessionState,
) -> anyhow::Result<Option<RpCollection>> {
    if let Some(pointed) = pointed_building(conn, state)? {
        return Ok(Some(pointed));
    }
    CollectionStore::find_building(conn, &state.session_id)
}

pub(crate) fn ensure_building_in(
    conn: &Connection,
    state: &mut RpSessionState,
    now: DateTime<Utc>,
) -> anyhow::Result<RpCollection> {
    if let Some(pointed) = pointed_building(conn, state)? {
        return Ok(pointed);
    }

    let collection = match CollectionStore::find_building(conn, &state.session_id)? {
        Some(found) => {
            debug!(
                session_id = %state.session_id,
                stale = ?state.current_collection_id,
                collection_id = %found.id,
                "re-pointed session at building collection"
            );
            found
        }
        None => {
            let created = create_in(conn, &state.session_id, now)?;
            info!(session_id = %state.session_id, collection_id = %created.id, "collection created");
            created
        }
    };

    state.current_collection_id = Some(collection.id.clone());
    state.updated_at = now;
    RpStateStore::put(conn, state)?;
    Ok(collection)
}

/// Complete the active collection and open a fresh one for another
/// discovery pass. The caller persists `state`.
pub(crate) fn roll_in(
    conn: &Connection,
    state: &mut RpSessionState,
    now: DateTime<Utc>,
) -> anyhow::Result<RpCollection> {
    let previous = resolve_active_in(conn, state)?;
    if let Some(previous) = &previous {
        CollectionStore::mark_complete(conn, &previous.id, now)?;
    }

    let next = create_in(conn, &state.session_id, now)?;
    state.current_collection_id = Some(next.id.clone());
    state.current_root_id = None;
    state.phase = SessionPhase::NewCollection;
    state.updated_at = now;

    info!(
        session_id = %state.session_id,
        completed = ?previous.as_ref().map(|c| c.id.as_str()),
        collection_id = %next.id,
        "collection rolled over"
    );
    Ok(next)
}

fn pointed_building(
    conn: &Connection,
    state: &RpSessionState,
) -> anyhow::Result<Option<RpCollection>> {
    let Some(id) = state.current_collection_id.as_deref() else {
        return Ok(None);
    };
    let found = CollectionStore::get(conn, id)?.filter(|c| {
        c.status == CollectionStatus::Building && c.session_id == state.session_id
    });
    Ok(found)
}

fn create_in(conn: &Connection, session_id: &str, now: DateTime<Utc>) -> anyhow::Result<RpCollection> {
    let collection = RpCollection {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        status: CollectionStatus::Building,
        created_at: now,
        updated_at: now,
    };
    CollectionStore::put(conn, &collection)?;
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{cleanup, setup, ts};

    fn building_count(db: &MetaDb, session_id: &str) -> usize {
        CollectionStore::count_with_status(db.connection(), session_id, CollectionStatus::Building)
            .unwrap()
    }

    #[test]
    fn ensure_is_idempotent() {
        let (mut db, path) = setup("collection-ensure");
        let first = ensure_building_collection(&mut db, "s1", ts(0)).unwrap();
        let second = ensure_building_collection(&mut db, "s1", ts(1)).unwrap();

        assert_eq!(first.collection.id, second.collection.id);
        assert_eq!(second.state.current_collection_id.as_deref(), Some(first.collection.id.as_str()));
        assert_eq!(building_count(&db, "s1"), 1);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn stale_pointer_to_complete_collection_is_not_returned() {
        let (mut db, path) = setup("collection-stale");
        let first = ensure_building_collection(&mut db, "s1", ts(0)).unwrap();
        complete_collection(&mut db, &first.collection.id, ts(1)).unwrap();

        let next = ensure_building_collection(&mut db, "s1", ts(2)).unwrap();
        assert_ne!(next.collection.id, first.collection.id);
        assert_eq!(next.collection.status, CollectionStatus::Building);
        assert_eq!(next.state.current_collection_id.as_deref(), Some(next.collection.id.as_str()));

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn missing_pointer_heals_to_existing_building_collection() {
        let (mut db, path) = setup("collection-heal");
        let first = ensure_building_collection(&mut db, "s1", ts(0)).unwrap();

        let mut state = first.state.clone();
        state.current_collection_id = Some("gone".into());
        RpStateStore::put(db.connection(), &state).unwrap();

        let healed = ensure_building_collection(&mut db, "s1", ts(1)).unwrap();
        assert_eq!(healed.collection.id, first.collection.id);
        let stored = RpStateStore::get(db.connection(), "s1").unwrap().unwrap();
        assert_eq!(stored.current_collection_id, Some(first.collection.id));
        assert_eq!(building_count(&db, "s1"), 1);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn complete_twice_is_idempotent() {
        let (mut db, path) = setup("collection-complete");
        let active = ensure_building_collection(&mut db, "s1", ts(0)).unwrap();
        let once = complete_collection(&mut db, &active.collection.id, ts(1)).unwrap();
        let twice = complete_collection(&mut db, &active.collection.id, ts(2)).unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.status, CollectionStatus::Complete);

        let missing = complete_collection(&mut db, "nope", ts(3)).unwrap_err();
        assert_eq!(missing.code(), "NOT_FOUND");

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn roll_completes_previous_and_points_at_new() {
        let (mut db, path) = setup("collection-roll");
        let active = ensure_building_collection(&mut db, "s1", ts(0)).unwrap();
        let mut state = active.state.clone();
        state.current_root_id = Some("r1".into());

        let next = roll_in(db.connection(), &mut state, ts(1)).unwrap();
        assert_ne!(next.id, active.collection.id);
        assert_eq!(state.current_collection_id.as_deref(), Some(next.id.as_str()));
        assert_eq!(state.current_root_id, None);
        assert_eq!(state.phase, SessionPhase::NewCollection);

        let previous = CollectionStore::get(db.connection(), &active.collection.id).unwrap().unwrap();
        assert_eq!(previous.status, CollectionStatus::Complete);
        assert_eq!(building_count(&db, "s1"), 1);

        drop(db);
        cleanup(&path);
    }
}
