//! Database schema definitions and migration logic.

use crate::error::{LbError, Result};
use rusqlite::Connection;

/// Schema versions are gated by `PRAGMA user_version`.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the cache database (current version).
pub const SCHEMA_SQL: &str = r"
    -- Cached issues, keyed by the stable public identifier.
    CREATE TABLE IF NOT EXISTS issues (
        identifier TEXT PRIMARY KEY,
        remote_id TEXT,
        title TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL DEFAULT 'open',
        priority INTEGER NOT NULL DEFAULT 2,
        issue_type TEXT,
        assignee TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        closed_at TEXT,
        cached_at TEXT NOT NULL,
        CHECK (priority >= 0 AND priority <= 4)
    );

    CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
    CREATE INDEX IF NOT EXISTS idx_issues_cached_at ON issues(cached_at);

    -- Directed dependency edges; unique on the full triple.
    CREATE TABLE IF NOT EXISTS dependencies (
        issue_id TEXT NOT NULL,
        depends_on_id TEXT NOT NULL,
        type TEXT NOT NULL,
        created_at TEXT NOT NULL,
        created_by TEXT,
        PRIMARY KEY (issue_id, depends_on_id, type)
    );
    CREATE INDEX IF NOT EXISTS idx_dependencies_issue_id ON dependencies(issue_id);
    CREATE INDEX IF NOT EXISTS idx_dependencies_depends_on_id ON dependencies(depends_on_id);

    -- Remote labels (repo scoping and optional type tagging).
    CREATE TABLE IF NOT EXISTS labels (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        team_id TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_labels_name ON labels(name);

    -- Durable FIFO queue of intended Remote mutations.
    CREATE TABLE IF NOT EXISTS outbox (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        operation TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_at TEXT NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        last_error TEXT
    );

    -- Key/value strings: last_sync, last_full_sync, sync_run_count,
    -- next_local_id.
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Apply the schema to the database and run migrations.
///
/// Idempotent: all DDL uses `IF NOT EXISTS`, and migrations are gated by
/// `user_version`. WAL journaling is mandatory because up to three
/// processes share this file.
///
/// # Errors
///
/// Migration failure is fatal; a database from a future version is
/// rejected with `SchemaMismatch`.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > CURRENT_SCHEMA_VERSION {
        return Err(LbError::SchemaMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: version,
        });
    }

    conn.execute_batch(SCHEMA_SQL)?;

    if version < 1 {
        migrate_v0_to_v1(conn)?;
    }

    conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;

    Ok(())
}

/// v0 -> v1: relax `NOT NULL` on `issues.issue_type`.
///
/// v0 databases were created before type labelling became optional. SQLite
/// cannot drop a NOT NULL constraint in place, so the table is rebuilt and
/// rows copied across.
fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    let needs_rebuild: bool = conn
        .prepare("SELECT 1 FROM pragma_table_info('issues') WHERE name = 'issue_type' AND [notnull] = 1")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !needs_rebuild {
        return Ok(());
    }

    conn.execute_batch(
        r"
        BEGIN IMMEDIATE;
        CREATE TABLE issues_v1 (
            identifier TEXT PRIMARY KEY,
            remote_id TEXT,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'open',
            priority INTEGER NOT NULL DEFAULT 2,
            issue_type TEXT,
            assignee TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            closed_at TEXT,
            cached_at TEXT NOT NULL,
            CHECK (priority >= 0 AND priority <= 4)
        );
        INSERT INTO issues_v1
            SELECT identifier, remote_id, title, description, status, priority,
                   issue_type, assignee, created_at, updated_at, closed_at, cached_at
            FROM issues;
        DROP TABLE issues;
        ALTER TABLE issues_v1 RENAME TO issues;
        CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
        CREATE INDEX IF NOT EXISTS idx_issues_cached_at ON issues(cached_at);
        COMMIT;
        ",
    )
    .map_err(|e| LbError::MigrationFailed {
        version: 1,
        reason: e.to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();

        for table in ["issues", "dependencies", "labels", "outbox", "metadata"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_apply_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();
    }

    #[test]
    fn test_future_version_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 99).unwrap();
        let err = apply_schema(&conn).unwrap_err();
        assert!(matches!(
            err,
            crate::error::LbError::SchemaMismatch { expected: 1, found: 99 }
        ));
    }

    #[test]
    fn test_v0_issue_type_relaxed() {
        let conn = Connection::open_in_memory().unwrap();
        // Simulate a v0 database where issue_type was NOT NULL.
        conn.execute_batch(
            r"
            CREATE TABLE issues (
                identifier TEXT PRIMARY KEY,
                remote_id TEXT,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'open',
                priority INTEGER NOT NULL DEFAULT 2,
                issue_type TEXT NOT NULL,
                assignee TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                closed_at TEXT,
                cached_at TEXT NOT NULL
            );
            INSERT INTO issues (identifier, title, issue_type, created_at, updated_at, cached_at)
            VALUES ('TEAM-1', 'old row', 'task', '2024-01-01T00:00:00.000Z',
                    '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z');
            ",
        )
        .unwrap();

        apply_schema(&conn).unwrap();

        // NULL issue_type must now be accepted.
        conn.execute(
            "INSERT INTO issues (identifier, title, created_at, updated_at, cached_at)
             VALUES ('TEAM-2', 'new row', '2024-01-02T00:00:00.000Z',
                     '2024-01-02T00:00:00.000Z', '2024-01-02T00:00:00.000Z')",
            [],
        )
        .unwrap();

        // The old row survived the rebuild.
        let title: String = conn
            .query_row(
                "SELECT title FROM issues WHERE identifier = 'TEAM-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(title, "old row");
    }
}
