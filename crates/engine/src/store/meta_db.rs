use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE sessions (
    id              TEXT PRIMARY KEY,
    person_id       TEXT NOT NULL,
    started_at      TEXT NOT NULL,
    ended_at        TEXT NULL,
    reason          TEXT NULL,
    notes           TEXT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX sessions_person_idx
    ON sessions (person_id);

CREATE TABLE rp_sessions (
    session_id              TEXT PRIMARY KEY,
    phase                   TEXT NOT NULL,
    current_state           TEXT NOT NULL,
    current_collection_id   TEXT NULL,
    current_root_id         TEXT NULL,
    stop_requested          INTEGER NOT NULL DEFAULT 0,
    practitioner_notes      TEXT NULL,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);

CREATE TABLE rp_collections (
    id              TEXT PRIMARY KEY,
    session_id      TEXT NOT NULL,
    status          TEXT NOT NULL CHECK (status IN ('building', 'complete')),
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX rp_collections_session_idx
    ON rp_collections (session_id, status);

CREATE TABLE rp_roots (
    id                  TEXT PRIMARY KEY,
    session_id          TEXT NOT NULL,
    collection_id       TEXT NOT NULL,
    pathway_node_id     TEXT NOT NULL,
    domain              TEXT NOT NULL,
    path                TEXT NOT NULL,
    source              TEXT NULL,
    notes               TEXT NULL,
    status              TEXT NOT NULL CHECK (status IN ('identified', 'restored', 'deferred')),
    restoration         TEXT NOT NULL DEFAULT '{}',
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE INDEX rp_roots_session_idx
    ON rp_roots (session_id);

CREATE INDEX rp_roots_collection_idx
    ON rp_roots (collection_id, status);

CREATE TABLE rp_events (
    id              TEXT PRIMARY KEY,
    session_id      TEXT NOT NULL,
    collection_id   TEXT NULL,
    root_id         TEXT NULL,
    state           TEXT NOT NULL,
    action          TEXT NULL,
    payload         TEXT NULL,
    created_at      TEXT NOT NULL
);

CREATE INDEX rp_events_session_idx
    ON rp_events (session_id, created_at);

CREATE TABLE kv (
    key             TEXT PRIMARY KEY,
    value           TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL)];

/// The local document store: one SQLite file holding every record type.
#[derive(Debug)]
pub struct MetaDb {
    conn: Connection,
}

impl MetaDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create meta.db parent directory `{}`", parent.display())
            })?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("failed to open meta.db at `{}`", path.display()))?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .context("failed to configure sqlite pragmas for meta.db")?;

        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start a write transaction that takes the database lock up front.
    ///
    /// Dropping the returned transaction without committing rolls it back.
    pub fn write_transaction(&mut self) -> Result<Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin write transaction")
    }

    pub fn schema_version(&self) -> Result<i64> {
        current_schema_version(&self.conn)
    }
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
        .context("failed to read current schema version")
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    let mut current_version = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply meta.db migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        current_version = *version;
    }

    Ok(())
}
