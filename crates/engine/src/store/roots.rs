// Root records in `rp_roots`. `path`, `source` and `restoration` are JSON text.

use anyhow::{Context, Result};
use pathways_common::types::{RootStatus, RpRoot};
use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_json, parse_tag, parse_ts, ts_to_sql};

const SELECT_COLUMNS: &str = "SELECT id, session_id, collection_id, pathway_node_id, domain, path, \
     source, notes, status, restoration, created_at, updated_at FROM rp_roots";

/// Stateless operations on the `rp_roots` table.
pub struct RootStore;

impl RootStore {
    /// Write the whole root, keeping its row position on replace.
    pub fn put(conn: &Connection, root: &RpRoot) -> Result<()> {
        let path = serde_json::to_string(&root.path).context("failed to encode root path")?;
        let source = root
            .source
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to encode root source")?;
        let restoration =
            serde_json::to_string(&root.restoration).context("failed to encode restoration")?;

        conn.execute(
            "INSERT INTO rp_roots \
             (id, session_id, collection_id, pathway_node_id, domain, path, source, notes, \
             status, restoration, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
             ON CONFLICT(id) DO UPDATE SET \
             session_id = excluded.session_id, collection_id = excluded.collection_id, \
             pathway_node_id = excluded.pathway_node_id, domain = excluded.domain, \
             path = excluded.path, source = excluded.source, notes = excluded.notes, \
             status = excluded.status, restoration = excluded.restoration, \
             created_at = excluded.created_at, updated_at = excluded.updated_at",
            params![
                root.id,
                root.session_id,
                root.collection_id,
                root.pathway_node_id,
                root.domain,
                path,
                source,
                root.notes,
                root.status.as_str(),
                restoration,
                ts_to_sql(root.created_at),
                ts_to_sql(root.updated_at),
            ],
        )
        .context("failed to upsert root")?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<RpRoot>> {
        conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], row_to_root)
            .optional()
            .context("failed to query root")
    }

    /// Roots of a collection in insertion order (oldest first).
    pub fn list_for_collection(conn: &Connection, collection_id: &str) -> Result<Vec<RpRoot>> {
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_COLUMNS} WHERE collection_id = ?1 ORDER BY created_at, rowid"
            ))
            .context("failed to prepare collection roots query")?;
        let rows = stmt
            .query_map(params![collection_id], row_to_root)
            .context("failed to query collection roots")?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to collect collection roots")
    }

    /// Roots of a session across all collections, oldest first.
    pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<RpRoot>> {
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE session_id = ?1 ORDER BY created_at, rowid"))
            .context("failed to prepare session roots query")?;
        let rows = stmt
            .query_map(params![session_id], row_to_root)
            .context("failed to query session roots")?;
        rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect session roots")
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<RpRoot>> {
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid"))
            .context("failed to prepare root export query")?;
        let rows = stmt.query_map([], row_to_root).context("failed to query roots")?;
        rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect roots")
    }

    pub fn count_with_status(conn: &Connection, session_id: &str, status: RootStatus) -> Result<usize> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM rp_roots WHERE session_id = ?1 AND status = ?2",
                params![session_id, status.as_str()],
                |row| row.get(0),
            )
            .context("failed to count roots")?;
        Ok(count as usize)
    }
}

fn row_to_root(row: &rusqlite::Row<'_>) -> rusqlite::Result<RpRoot> {
    let path_raw: String = row.get(5)?;
    let source_raw: Option<String> = row.get(6)?;
    let status_raw: String = row.get(8)?;
    let restoration_raw: String = row.get(9)?;
    let created_raw: String = row.get(10)?;
    let updated_raw: String = row.get(11)?;

    Ok(RpRoot {
        id: row.get(0)?,
        session_id: row.get(1)?,
        collection_id: row.get(2)?,
        pathway_node_id: row.get(3)?,
        domain: row.get(4)?,
        path: parse_json(5, &path_raw)?,
        source: source_raw.map(|raw| parse_json(6, &raw)).transpose()?,
        notes: row.get(7)?,
        status: parse_tag(8, &status_raw)?,
        restoration: parse_json(9, &restoration_raw)?,
        created_at: parse_ts(10, &created_raw)?,
        updated_at: parse_ts(11, &updated_raw)?,
    })
}

#[cfg(test)]
mod tests {
    use pathways_common::types::{ReadinessResult, Restoration, RootSource};

    use super::*;
    use crate::store::testing::{cleanup, setup, ts};

    fn make_root(id: &str, collection: &str, at: i64, status: RootStatus) -> RpRoot {
        RpRoot {
            id: id.into(),
            session_id: "s1".into(),
            collection_id: collection.into(),
            pathway_node_id: "jaw".into(),
            domain: "Body".into(),
            path: vec!["Body".into(), "Head".into(), "Jaw tension".into()],
            source: Some(RootSource::discovery_tree()),
            notes: None,
            status,
            restoration: Restoration::default(),
            created_at: ts(at),
            updated_at: ts(at),
        }
    }

    #[test]
    fn put_and_get_preserves_json_columns() {
        let (db, path) = setup("roots-get");
        let mut root = make_root("r1", "c1", 1, RootStatus::Identified);
        root.restoration.readiness_result = Some(ReadinessResult::Conditional);
        root.notes = Some("clenches at night".into());

        RootStore::put(db.connection(), &root).unwrap();
        let loaded = RootStore::get(db.connection(), "r1").unwrap().unwrap();
        assert_eq!(loaded, root);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn replacing_a_root_keeps_tie_order() {
        let (db, path) = setup("roots-tie");
        let conn = db.connection();
        RootStore::put(conn, &make_root("first", "c1", 5, RootStatus::Identified)).unwrap();
        RootStore::put(conn, &make_root("second", "c1", 5, RootStatus::Identified)).unwrap();

        let mut first = RootStore::get(conn, "first").unwrap().unwrap();
        first.status = RootStatus::Deferred;
        RootStore::put(conn, &first).unwrap();

        let ids: Vec<_> =
            RootStore::list_for_collection(conn, "c1").unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["first", "second"]);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn lists_scope_by_collection_and_session() {
        let (db, path) = setup("roots-scope");
        let conn = db.connection();
        RootStore::put(conn, &make_root("a", "c1", 1, RootStatus::Restored)).unwrap();
        RootStore::put(conn, &make_root("b", "c2", 2, RootStatus::Identified)).unwrap();

        assert_eq!(RootStore::list_for_collection(conn, "c1").unwrap().len(), 1);
        assert_eq!(RootStore::list_for_session(conn, "s1").unwrap().len(), 2);
        assert_eq!(RootStore::count_with_status(conn, "s1", RootStatus::Restored).unwrap(), 1);
        assert_eq!(RootStore::count_with_status(conn, "s1", RootStatus::Deferred).unwrap(), 0);

        drop(db);
        cleanup(&path);
    }
}
