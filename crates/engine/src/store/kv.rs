// Small string settings, e.g. the imported catalog document.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::ts_to_sql;

pub const CATALOG_INDEX_KEY: &str = "rp.nodeIndex.json";
pub const CATALOG_VERSION_KEY: &str = "rp.catalog.version";

pub struct KvStore;

impl KvStore {
    pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .with_context(|| format!("failed to read kv `{key}`"))
    }

    pub fn put(conn: &Connection, key: &str, value: &str, now: DateTime<Utc>) -> Result<()> {
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, ts_to_sql(now)],
        )
        .with_context(|| format!("failed to write kv `{key}`"))?;
        Ok(())
    }
}
