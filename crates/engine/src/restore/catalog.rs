// Catalog document persisted in the kv table.

use anyhow::Context;
use chrono::{DateTime, Utc};
use pathways_common::catalog::CatalogIndex;
use tracing::info;

use crate::error::RestoreError;
use crate::store::kv::{KvStore, CATALOG_INDEX_KEY, CATALOG_VERSION_KEY};
use crate::store::meta_db::MetaDb;

/// Validate a node index document and make it the active catalog.
pub fn import_catalog(
    db: &mut MetaDb,
    json: &str,
    now: DateTime<Utc>,
) -> Result<CatalogIndex, RestoreError> {
    let catalog = CatalogIndex::from_json(json)?;
    let stored = catalog.to_json()?;

    let tx = db.write_transaction()?;
    KvStore::put(&tx, CATALOG_INDEX_KEY, &stored, now)?;
    KvStore::put(&tx, CATALOG_VERSION_KEY, catalog.version(), now)?;
    tx.commit().context("failed to commit catalog import")?;

    info!(version = catalog.version(), nodes = catalog.len(), "catalog imported");
    Ok(catalog)
}

/// The active catalog, or `CatalogUnavailable` if none was imported.
pub fn load_catalog(db: &MetaDb) -> Result<CatalogIndex, RestoreError> {
    let raw = KvStore::get(db.connection(), CATALOG_INDEX_KEY)?
        .ok_or(RestoreError::CatalogUnavailable)?;
    Ok(CatalogIndex::from_json(&raw)?)
}

pub fn catalog_version(db: &MetaDb) -> Result<Option<String>, RestoreError> {
    Ok(KvStore::get(db.connection(), CATALOG_VERSION_KEY)?)
}
