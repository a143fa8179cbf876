// Async facade over the metadata store.
//
// One connection behind a tokio mutex. Each method holds the lock for exactly
// one manager call, so a compound write is never observed half-applied.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use pathways_common::catalog::CatalogIndex;
use pathways_common::machine::Action;
use pathways_common::summary::build_summary;
use pathways_common::types::{
    IntegrationCheck, RpCollection, RpEvent, RpRoot, RpSessionState, RpState, Session,
};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::RestoreError;
use crate::restore::collection::ActiveCollection;
use crate::restore::runner::Step;
use crate::restore::session::SessionCounts;
use crate::restore::{catalog, collection, root, runner, session, session_state};
use crate::store::backup::{self, BackupBundle, ImportReport};
use crate::store::events::EventStore;
use crate::store::meta_db::MetaDb;

#[derive(Clone)]
pub struct PathwaysService {
    db: Arc<Mutex<MetaDb>>,
}

impl PathwaysService {
    pub fn new(db: MetaDb) -> Self {
        Self { db: Arc::new(Mutex::new(db)) }
    }

    /// Open (and migrate) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self::new(MetaDb::open(path)?))
    }

    // ── Sessions ───────────────────────────────────────────────────

    pub async fn create_session(
        &self,
        person_id: &str,
        reason: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Session, RestoreError> {
        let mut db = self.db.lock().await;
        session::create_session(&mut db, person_id, reason, notes, now())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session, RestoreError> {
        session::get_session(&*self.db.lock().await, session_id)
    }

    pub async fn list_sessions(&self, person_id: Option<&str>) -> Result<Vec<Session>, RestoreError> {
        session::list_sessions(&*self.db.lock().await, person_id)
    }

    pub async fn end_session(&self, session_id: &str) -> Result<Session, RestoreError> {
        let mut db = self.db.lock().await;
        session::end_session(&mut db, session_id, now())
    }

    pub async fn append_session_notes(
        &self,
        session_id: &str,
        title: &str,
        body: &str,
    ) -> Result<Session, RestoreError> {
        let mut db = self.db.lock().await;
        session::append_session_notes(&mut db, session_id, title, body, now())
    }

    pub async fn session_counts(&self, session_id: &str) -> Result<SessionCounts, RestoreError> {
        session::session_counts(&*self.db.lock().await, session_id)
    }

    // ── Checkpoint ─────────────────────────────────────────────────

    pub async fn ensure_session(&self, session_id: &str) -> Result<RpSessionState, RestoreError> {
        let mut db = self.db.lock().await;
        session_state::ensure_session(&mut db, session_id, now())
    }

    pub async fn session_state(
        &self,
        session_id: &str,
    ) -> Result<Option<RpSessionState>, RestoreError> {
        session_state::get_state(&*self.db.lock().await, session_id)
    }

    /// Move the machine directly, bypassing the transition table.
    pub async fn transition(
        &self,
        session_id: &str,
        next: RpState,
        action: Option<&str>,
    ) -> Result<RpSessionState, RestoreError> {
        let mut db = self.db.lock().await;
        session_state::transition(&mut db, session_id, next, action, now())
    }

    pub async fn request_stop(&self, session_id: &str) -> Result<RpSessionState, RestoreError> {
        let mut db = self.db.lock().await;
        session_state::request_stop(&mut db, session_id, now())
    }

    pub async fn save_practitioner_notes(
        &self,
        session_id: &str,
        notes: Option<&str>,
    ) -> Result<RpSessionState, RestoreError> {
        let mut db = self.db.lock().await;
        session_state::save_practitioner_notes(&mut db, session_id, notes, now())
    }

    // ── Collections ────────────────────────────────────────────────

    pub async fn ensure_building_collection(
        &self,
        session_id: &str,
    ) -> Result<ActiveCollection, RestoreError> {
        let mut db = self.db.lock().await;
        collection::ensure_building_collection(&mut db, session_id, now())
    }

    pub async fn complete_collection(&self, collection_id: &str) -> Result<RpCollection, RestoreError> {
        let mut db = self.db.lock().await;
        collection::complete_collection(&mut db, collection_id, now())
    }

    pub async fn list_collections(&self, session_id: &str) -> Result<Vec<RpCollection>, RestoreError> {
        collection::list_collections(&*self.db.lock().await, session_id)
    }

    // ── Catalog ────────────────────────────────────────────────────

    pub async fn import_catalog(&self, json: &str) -> Result<CatalogIndex, RestoreError> {
        let mut db = self.db.lock().await;
        catalog::import_catalog(&mut db, json, now())
    }

    /// Import the node index at `path` unless a catalog is already stored.
    /// Returns whether an import happened.
    pub async fn import_catalog_if_missing(&self, path: &Path) -> Result<bool, RestoreError> {
        let mut db = self.db.lock().await;
        if catalog::catalog_version(&db)?.is_some() {
            return Ok(false);
        }
        let json = std::fs::read_to_string(path).map_err(|error| {
            anyhow::Error::new(error).context(format!("failed to read catalog {}", path.display()))
        })?;
        catalog::import_catalog(&mut db, &json, now())?;
        info!(path = %path.display(), "catalog auto-imported");
        Ok(true)
    }

    pub async fn load_catalog(&self) -> Result<CatalogIndex, RestoreError> {
        catalog::load_catalog(&*self.db.lock().await)
    }

    // ── Roots ──────────────────────────────────────────────────────

    /// Log a node from the stored catalog as a root.
    pub async fn add_root(
        &self,
        session_id: &str,
        node_id: &str,
        notes: Option<&str>,
    ) -> Result<RpRoot, RestoreError> {
        let mut db = self.db.lock().await;
        let index = catalog::load_catalog(&db)?;
        root::add_root(&mut db, &index, session_id, node_id, notes, now())
    }

    pub async fn get_root(&self, root_id: &str) -> Result<RpRoot, RestoreError> {
        root::get_root(&*self.db.lock().await, root_id)
    }

    pub async fn list_roots(&self, session_id: &str) -> Result<Vec<RpRoot>, RestoreError> {
        root::list_roots(&*self.db.lock().await, session_id)
    }

    pub async fn defer_root(&self, root_id: &str, reason: Option<&str>) -> Result<RpRoot, RestoreError> {
        let mut db = self.db.lock().await;
        root::defer_root(&mut db, root_id, reason, now())
    }

    pub async fn restore_root(
        &self,
        root_id: &str,
        check: IntegrationCheck,
    ) -> Result<RpRoot, RestoreError> {
        let mut db = self.db.lock().await;
        root::restore_root(&mut db, root_id, check, now())
    }

    pub async fn peek_next_root(&self, collection_id: &str) -> Result<Option<RpRoot>, RestoreError> {
        root::peek_next_root(&*self.db.lock().await, collection_id)
    }

    // ── Runner ─────────────────────────────────────────────────────

    pub async fn apply(&self, session_id: &str, action: &Action) -> Result<Step, RestoreError> {
        let mut db = self.db.lock().await;
        runner::apply(&mut db, session_id, action, now())
    }

    pub async fn status(&self, session_id: &str) -> Result<Step, RestoreError> {
        runner::status(&*self.db.lock().await, session_id)
    }

    /// Render the client summary. Without `extra_notes`, the practitioner's
    /// saved next steps are used.
    pub async fn summary(
        &self,
        session_id: &str,
        client_name: &str,
        extra_notes: Option<&str>,
    ) -> Result<String, RestoreError> {
        let db = self.db.lock().await;
        let record = session::get_session(&db, session_id)?;
        let roots = root::list_roots(&db, session_id)?;
        let saved = session_state::get_state(&db, session_id)?.and_then(|s| s.practitioner_notes);
        let notes = extra_notes.or(saved.as_deref());
        Ok(build_summary(client_name, &record, &roots, notes))
    }

    // ── Backup and history ─────────────────────────────────────────

    pub async fn export_backup(&self) -> Result<BackupBundle, RestoreError> {
        Ok(backup::export(&*self.db.lock().await, now())?)
    }

    pub async fn import_backup(&self, bundle: &BackupBundle) -> Result<ImportReport, RestoreError> {
        let mut db = self.db.lock().await;
        Ok(backup::import(&mut db, bundle)?)
    }

    pub async fn list_events(&self, session_id: &str) -> Result<Vec<RpEvent>, RestoreError> {
        let db = self.db.lock().await;
        Ok(EventStore::list_for_session(db.connection(), session_id)?)
    }
}

/// Current time at the precision the store keeps.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
