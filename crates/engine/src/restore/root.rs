// Root manager: creation from catalog nodes, status changes, and next-root
// selection over the active collection.

use anyhow::Context;
use chrono::{DateTime, Utc};
use pathways_common::catalog::{CatalogError, CatalogLookup};
use pathways_common::machine::select_next_root;
use pathways_common::types::{
    IntegrationCheck, Restoration, RootSource, RootStatus, RpRoot,
};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use super::{collection, session_state};
use crate::error::RestoreError;
use crate::store::meta_db::MetaDb;
use crate::store::roots::RootStore;

/// Log a catalog node as a new `identified` root in the building collection.
///
/// Domain and path are copied from the catalog now; later relabels do not
/// reach stored roots.
pub fn add_root(
    db: &mut MetaDb,
    catalog: &dyn CatalogLookup,
    session_id: &str,
    node_id: &str,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<RpRoot, RestoreError> {
    let node = catalog
        .node(node_id)
        .ok_or_else(|| CatalogError::NotFound(node_id.to_string()))?;
    if !node.is_loggable() {
        return Err(RestoreError::NotLoggable(node_id.to_string()));
    }
    let snapshot = catalog.snapshot(node_id)?;

    let tx = db.write_transaction()?;
    let mut state = session_state::ensure_in(&tx, session_id, now)?;
    let collection = collection::ensure_building_in(&tx, &mut state, now)?;

    let root = RpRoot {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        collection_id: collection.id,
        pathway_node_id: node_id.to_string(),
        domain: snapshot.domain,
        path: snapshot.path,
        source: Some(RootSource::discovery_tree()),
        notes: notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
        status: RootStatus::Identified,
        restoration: Restoration::default(),
        created_at: now,
        updated_at: now,
    };
    RootStore::put(&tx, &root)?;
    tx.commit().context("failed to commit new root")?;

    info!(session_id, root_id = %root.id, node_id, collection_id = %root.collection_id, "root added");
    Ok(root)
}

pub fn get_root(db: &MetaDb, root_id: &str) -> Result<RpRoot, RestoreError> {
    RootStore::get(db.connection(), root_id)?.ok_or_else(|| RestoreError::not_found("root", root_id))
}

pub fn list_roots(db: &MetaDb, session_id: &str) -> Result<Vec<RpRoot>, RestoreError> {
    Ok(RootStore::list_for_session(db.connection(), session_id)?)
}

/// Pause a root. Re-deferring only refreshes the stamp and reason.
pub fn defer_root(
    db: &mut MetaDb,
    root_id: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<RpRoot, RestoreError> {
    update_root(db, root_id, |root| defer(root, reason, now))
}

/// Mark a root restored with the given integration check.
pub fn restore_root(
    db: &mut MetaDb,
    root_id: &str,
    check: IntegrationCheck,
    now: DateTime<Utc>,
) -> Result<RpRoot, RestoreError> {
    update_root(db, root_id, |root| {
        restore(root, check, now);
        Ok(())
    })
}

/// The root `advance` would pick in `collection_id`, without pinning it.
pub fn peek_next_root(db: &MetaDb, collection_id: &str) -> Result<Option<RpRoot>, RestoreError> {
    Ok(pick_next_in(db.connection(), collection_id)?)
}

pub(crate) fn defer(
    root: &mut RpRoot,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), RestoreError> {
    if root.status == RootStatus::Restored {
        return Err(RestoreError::RootRestored(root.id.clone()));
    }
    root.status = RootStatus::Deferred;
    root.restoration.deferred_at = Some(now);
    if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
        root.restoration.deferred_reason = Some(reason.to_string());
    }
    root.updated_at = now;
    Ok(())
}

pub(crate) fn restore(root: &mut RpRoot, check: IntegrationCheck, now: DateTime<Utc>) {
    root.status = RootStatus::Restored;
    root.restoration.integration_check = Some(check);
    root.restoration.restored_at = Some(now);
    root.updated_at = now;
}

/// Re-run selection from scratch over the collection's current roots.
pub(crate) fn pick_next_in(conn: &Connection, collection_id: &str) -> anyhow::Result<Option<RpRoot>> {
    let roots = RootStore::list_for_collection(conn, collection_id)?;
    let picked = select_next_root(&roots).cloned();
    debug!(
        collection_id,
        candidates = roots.len(),
        picked = ?picked.as_ref().map(|r| r.id.as_str()),
        "next root selected"
    );
    Ok(picked)
}

fn update_root(
    db: &mut MetaDb,
    root_id: &str,
    change: impl FnOnce(&mut RpRoot) -> Result<(), RestoreError>,
) -> Result<RpRoot, RestoreError> {
    let tx = db.write_transaction()?;
    let mut root =
        RootStore::get(&tx, root_id)?.ok_or_else(|| RestoreError::not_found("root", root_id))?;
    change(&mut root)?;
    RootStore::put(&tx, &root)?;
    tx.commit().context("failed to commit root update")?;
    Ok(root)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pathways_common::catalog::{CatalogIndex, CatalogNode};

    use super::*;
    use crate::store::testing::{cleanup, setup, ts};

    fn catalog() -> CatalogIndex {
        let mut nodes = BTreeMap::new();
        let mut node = |id: &str, label: &str, level: u32, children: &[&str], selectable: bool| {
            nodes.insert(
                id.to_string(),
                CatalogNode {
                    label: label.into(),
                    level,
                    domain: "Body".into(),
                    children: children.iter().map(|c| c.to_string()).collect(),
                    selectable,
                },
            );
        };
        node("body", "Body", 1, &["head"], false);
        node("head", "Head", 2, &["jaw"], false);
        node("jaw", "Jaw tension", 3, &[], true);
        CatalogIndex::from_nodes("test", nodes)
    }

    #[test]
    fn add_root_snapshots_path_into_building_collection() {
        let (mut db, path) = setup("root-add");
        let root = add_root(&mut db, &catalog(), "s1", "jaw", Some(" grinding "), ts(0)).unwrap();

        assert_eq!(root.status, RootStatus::Identified);
        assert_eq!(root.domain, "Body");
        assert_eq!(root.path, vec!["Body", "Head", "Jaw tension"]);
        assert_eq!(root.notes.as_deref(), Some("grinding"));
        assert_eq!(root.source, Some(RootSource::discovery_tree()));
        assert_eq!(get_root(&db, &root.id).unwrap(), root);

        let second = add_root(&mut db, &catalog(), "s1", "jaw", None, ts(1)).unwrap();
        assert_eq!(second.collection_id, root.collection_id);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn add_root_rejects_unknown_and_unselectable_nodes() {
        let (mut db, path) = setup("root-reject");
        let unknown = add_root(&mut db, &catalog(), "s1", "knee", None, ts(0)).unwrap_err();
        assert_eq!(unknown.code(), "NOT_FOUND");

        let group = add_root(&mut db, &catalog(), "s1", "head", None, ts(0)).unwrap_err();
        assert_eq!(group.code(), "NOT_LOGGABLE");

        assert!(list_roots(&db, "s1").unwrap().is_empty());

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn defer_keeps_previous_reason_when_none_given() {
        let (mut db, path) = setup("root-defer");
        let root = add_root(&mut db, &catalog(), "s1", "jaw", None, ts(0)).unwrap();

        let first = defer_root(&mut db, &root.id, Some("needs safety"), ts(1)).unwrap();
        assert_eq!(first.status, RootStatus::Deferred);
        assert_eq!(first.restoration.deferred_at, Some(ts(1)));

        let again = defer_root(&mut db, &root.id, None, ts(2)).unwrap();
        assert_eq!(again.restoration.deferred_reason.as_deref(), Some("needs safety"));
        assert_eq!(again.restoration.deferred_at, Some(ts(2)));

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn restored_root_cannot_be_deferred() {
        let (mut db, path) = setup("root-restored");
        let root = add_root(&mut db, &catalog(), "s1", "jaw", None, ts(0)).unwrap();
        let restored = restore_root(&mut db, &root.id, IntegrationCheck::Integrated, ts(1)).unwrap();
        assert_eq!(restored.restoration.restored_at, Some(ts(1)));

        let error = defer_root(&mut db, &root.id, None, ts(2)).unwrap_err();
        assert_eq!(error.code(), "INVALID_ACTION");
        assert_eq!(get_root(&db, &root.id).unwrap().status, RootStatus::Restored);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn peek_prefers_newest_identified() {
        let (mut db, path) = setup("root-peek");
        let older = add_root(&mut db, &catalog(), "s1", "jaw", None, ts(1)).unwrap();
        let newer = add_root(&mut db, &catalog(), "s1", "jaw", None, ts(2)).unwrap();

        let picked = peek_next_root(&db, &older.collection_id).unwrap().unwrap();
        assert_eq!(picked.id, newer.id);

        drop(db);
        cleanup(&path);
    }
}
