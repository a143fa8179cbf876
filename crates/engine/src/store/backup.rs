// Flat JSON backup of every record type.
//
// Import is a bulk upsert keyed by `id` (`sessionId` for checkpoints) inside
// one transaction. Only presence of keys is checked; there is no migration.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use pathways_common::types::{RpCollection, RpEvent, RpRoot, RpSessionState, Session};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::collections::CollectionStore;
use super::events::EventStore;
use super::meta_db::MetaDb;
use super::roots::RootStore;
use super::rp_state::RpStateStore;
use super::sessions::SessionStore;

pub const BACKUP_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupBundle {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub rp_sessions: Vec<RpSessionState>,
    #[serde(default)]
    pub rp_collections: Vec<RpCollection>,
    #[serde(default)]
    pub rp_roots: Vec<RpRoot>,
    #[serde(default)]
    pub rp_events: Vec<RpEvent>,
}

fn default_format_version() -> u32 {
    BACKUP_FORMAT_VERSION
}

/// Row counts written by an import.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub sessions: usize,
    pub rp_sessions: usize,
    pub rp_collections: usize,
    pub rp_roots: usize,
    pub rp_events: usize,
}

/// Snapshot every table.
pub fn export(db: &MetaDb, now: DateTime<Utc>) -> Result<BackupBundle> {
    let conn = db.connection();
    Ok(BackupBundle {
        format_version: BACKUP_FORMAT_VERSION,
        exported_at: now,
        sessions: SessionStore::list_all(conn)?,
        rp_sessions: RpStateStore::list_all(conn)?,
        rp_collections: CollectionStore::list_all(conn)?,
        rp_roots: RootStore::list_all(conn)?,
        rp_events: EventStore::list_all(conn)?,
    })
}

/// Upsert every record of `bundle`; all or nothing.
pub fn import(db: &mut MetaDb, bundle: &BackupBundle) -> Result<ImportReport> {
    check_presence(bundle)?;

    let tx = db.write_transaction()?;
    for session in &bundle.sessions {
        SessionStore::put(&tx, session)?;
    }
    for state in &bundle.rp_sessions {
        RpStateStore::put(&tx, state)?;
    }
    for collection in &bundle.rp_collections {
        CollectionStore::put(&tx, collection)?;
    }
    for root in &bundle.rp_roots {
        RootStore::put(&tx, root)?;
    }
    for event in &bundle.rp_events {
        EventStore::append(&tx, event)?;
    }
    tx.commit().context("failed to commit backup import")?;

    let report = ImportReport {
        sessions: bundle.sessions.len(),
        rp_sessions: bundle.rp_sessions.len(),
        rp_collections: bundle.rp_collections.len(),
        rp_roots: bundle.rp_roots.len(),
        rp_events: bundle.rp_events.len(),
    };
    info!(?report, "backup imported");
    Ok(report)
}

fn check_presence(bundle: &BackupBundle) -> Result<()> {
    let keys = bundle
        .sessions
        .iter()
        .map(|s| ("sessions", s.id.as_str()))
        .chain(bundle.rp_sessions.iter().map(|s| ("rpSessions", s.session_id.as_str())))
        .chain(bundle.rp_collections.iter().map(|c| ("rpCollections", c.id.as_str())))
        .chain(bundle.rp_roots.iter().map(|r| ("rpRoots", r.id.as_str())))
        .chain(bundle.rp_events.iter().map(|e| ("rpEvents", e.id.as_str())));

    for (table, key) in keys {
        if key.trim().is_empty() {
            bail!("backup entry in `{table}` has an empty key");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pathways_common::types::{CollectionStatus, RpState};

    use super::*;
    use crate::store::testing::{cleanup, setup, ts};

    fn seed(db: &MetaDb) {
        let conn = db.connection();
        SessionStore::put(
            conn,
            &Session {
                id: "s1".into(),
                person_id: "p1".into(),
                started_at: ts(0),
                ended_at: None,
                reason: None,
                notes: None,
                created_at: ts(0),
                updated_at: ts(0),
            },
        )
        .unwrap();
        RpStateStore::put(conn, &RpSessionState::initial("s1", ts(0))).unwrap();
        CollectionStore::put(
            conn,
            &RpCollection {
                id: "c1".into(),
                session_id: "s1".into(),
                status: CollectionStatus::Building,
                created_at: ts(1),
                updated_at: ts(1),
            },
        )
        .unwrap();
        EventStore::append(
            conn,
            &RpEvent {
                id: "e1".into(),
                session_id: "s1".into(),
                collection_id: None,
                root_id: None,
                state: RpState::RestoreInit,
                action: None,
                payload: None,
                created_at: ts(2),
            },
        )
        .unwrap();
    }

    #[test]
    fn export_then_import_into_empty_store() {
        let (source, source_path) = setup("backup-source");
        seed(&source);
        let bundle = export(&source, ts(10)).unwrap();
        assert_eq!(bundle.sessions.len(), 1);
        assert_eq!(bundle.rp_events.len(), 1);

        let json = serde_json::to_string(&bundle).unwrap();
        assert!(json.contains("\"rpSessions\""));
        let decoded: BackupBundle = serde_json::from_str(&json).unwrap();

        let (mut target, target_path) = setup("backup-target");
        let report = import(&mut target, &decoded).unwrap();
        assert_eq!(report.rp_collections, 1);
        assert_eq!(export(&target, ts(10)).unwrap(), bundle);

        drop(source);
        drop(target);
        cleanup(&source_path);
        cleanup(&target_path);
    }

    #[test]
    fn import_upserts_existing_records() {
        let (mut db, path) = setup("backup-upsert");
        seed(&db);
        let mut bundle = export(&db, ts(10)).unwrap();
        bundle.rp_collections[0].status = CollectionStatus::Complete;

        import(&mut db, &bundle).unwrap();
        let collection = CollectionStore::get(db.connection(), "c1").unwrap().unwrap();
        assert_eq!(collection.status, CollectionStatus::Complete);
        assert_eq!(CollectionStore::list_all(db.connection()).unwrap().len(), 1);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn import_with_missing_key_writes_nothing() {
        let (mut db, path) = setup("backup-reject");
        let (source, source_path) = setup("backup-reject-source");
        seed(&source);
        let mut bundle = export(&source, ts(10)).unwrap();
        bundle.rp_collections[0].id = " ".into();

        let error = import(&mut db, &bundle).expect_err("empty key should be rejected");
        assert!(error.to_string().contains("rpCollections"));
        assert!(SessionStore::list_all(db.connection()).unwrap().is_empty());

        drop(db);
        drop(source);
        cleanup(&path);
        cleanup(&source_path);
    }

    #[test]
    fn bundle_without_optional_lists_decodes() {
        let bundle: BackupBundle =
            serde_json::from_str(r#"{"exportedAt": "2024-05-01T10:00:00Z"}"#).unwrap();
        assert_eq!(bundle.format_version, BACKUP_FORMAT_VERSION);
        assert!(bundle.sessions.is_empty());
    }
}
