// Collection records in `rp_collections`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pathways_common::types::{CollectionStatus, RpCollection};
use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_tag, parse_ts, ts_to_sql};

const SELECT_COLUMNS: &str =
    "SELECT id, session_id, status, created_at, updated_at FROM rp_collections";

/// Stateless operations on the `rp_collections` table.
pub struct CollectionStore;

impl CollectionStore {
    pub fn put(conn: &Connection, collection: &RpCollection) -> Result<()> {
        conn.execute(
            "INSERT INTO rp_collections (id, session_id, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(id) DO UPDATE SET \
             session_id = excluded.session_id, status = excluded.status, \
             created_at = excluded.created_at, updated_at = excluded.updated_at",
            params![
                collection.id,
                collection.session_id,
                collection.status.as_str(),
                ts_to_sql(collection.created_at),
                ts_to_sql(collection.updated_at),
            ],
        )
        .context("failed to upsert collection")?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<RpCollection>> {
        conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], row_to_collection)
            .optional()
            .context("failed to query collection")
    }

    /// Newest `building` collection of a session, if any.
    pub fn find_building(conn: &Connection, session_id: &str) -> Result<Option<RpCollection>> {
        conn.query_row(
            &format!(
                "{SELECT_COLUMNS} WHERE session_id = ?1 AND status = 'building' \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            ),
            params![session_id],
            row_to_collection,
        )
        .optional()
        .context("failed to query building collection")
    }

    /// Collections of a session, oldest first.
    pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<RpCollection>> {
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_COLUMNS} WHERE session_id = ?1 ORDER BY created_at, rowid"
            ))
            .context("failed to prepare session collections query")?;
        let rows = stmt
            .query_map(params![session_id], row_to_collection)
            .context("failed to query session collections")?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to collect session collections")
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<RpCollection>> {
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid"))
            .context("failed to prepare collection export query")?;
        let rows = stmt.query_map([], row_to_collection).context("failed to query collections")?;
        rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect collections")
    }

    /// Move a collection to `complete`. Returns `false` if it was missing or
    /// already complete.
    pub fn mark_complete(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE rp_collections SET status = 'complete', updated_at = ?1 \
                 WHERE id = ?2 AND status = 'building'",
                params![ts_to_sql(now), id],
            )
            .context("failed to complete collection")?;
        Ok(changed > 0)
    }

    pub fn count_with_status(
        conn: &Connection,
        session_id: &str,
        status: CollectionStatus,
    ) -> Result<usize> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM rp_collections WHERE session_id = ?1 AND status = ?2",
                params![session_id, status.as_str()],
                |row| row.get(0),
            )
            .context("failed to count collections")?;
        Ok(count as usize)
    }
}

fn row_to_collection(row: &rusqlite::Row<'_>) -> rusqlite::Result<RpCollection> {
    let status_raw: String = row.get(2)?;
    let created_raw: String = row.get(3)?;
    let updated_raw: String = row.get(4)?;

    Ok(RpCollection {
        id: row.get(0)?,
        session_id: row.get(1)?,
        status: parse_tag(2, &status_raw)?,
        created_at: parse_ts(3, &created_raw)?,
        updated_at: parse_ts(4, &updated_raw)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{cleanup, setup, ts};

    fn make_collection(id: &str, session: &str, status: CollectionStatus, at: i64) -> RpCollection {
        RpCollection {
            id: id.into(),
            session_id: session.into(),
            status,
            created_at: ts(at),
            updated_at: ts(at),
        }
    }

    #[test]
    fn find_building_skips_complete_and_other_sessions() {
        let (db, path) = setup("collections-find");
        let conn = db.connection();
        CollectionStore::put(conn, &make_collection("c1", "s1", CollectionStatus::Complete, 1))
            .unwrap();
        CollectionStore::put(conn, &make_collection("c2", "s2", CollectionStatus::Building, 2))
            .unwrap();

        assert!(CollectionStore::find_building(conn, "s1").unwrap().is_none());

        CollectionStore::put(conn, &make_collection("c3", "s1", CollectionStatus::Building, 3))
            .unwrap();
        let found = CollectionStore::find_building(conn, "s1").unwrap().unwrap();
        assert_eq!(found.id, "c3");

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn mark_complete_is_one_way() {
        let (db, path) = setup("collections-complete");
        let conn = db.connection();
        CollectionStore::put(conn, &make_collection("c1", "s1", CollectionStatus::Building, 1))
            .unwrap();

        assert!(CollectionStore::mark_complete(conn, "c1", ts(5)).unwrap());
        assert!(!CollectionStore::mark_complete(conn, "c1", ts(9)).unwrap());

        let loaded = CollectionStore::get(conn, "c1").unwrap().unwrap();
        assert_eq!(loaded.status, CollectionStatus::Complete);
        assert_eq!(loaded.updated_at, ts(5));
        assert_eq!(
            CollectionStore::count_with_status(conn, "s1", CollectionStatus::Complete).unwrap(),
            1
        );

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn list_for_session_is_oldest_first() {
        let (db, path) = setup("collections-list");
        let conn = db.connection();
        CollectionStore::put(conn, &make_collection("late", "s1", CollectionStatus::Building, 9))
            .unwrap();
        CollectionStore::put(conn, &make_collection("early", "s1", CollectionStatus::Complete, 1))
            .unwrap();

        let ids: Vec<_> = CollectionStore::list_for_session(conn, "s1")
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);

        drop(db);
        cleanup(&path);
    }
}
