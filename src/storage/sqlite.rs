//! `SQLite` cache implementation.
//!
//! The cache file is shared by up to three processes (command, worker,
//! export child); WAL journaling and a busy timeout keep them from
//! tripping over each other. All multi-row writes run inside a single
//! immediate transaction.

use crate::error::{LbError, Result};
use crate::model::{
    Dependency, DependencyType, Issue, IssueType, Label, OutboxItem, OutboxOp, Priority, Status,
};
use crate::storage::schema::apply_schema;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Transitive inheritance down parent-child chains is bounded; deeper
/// nesting than this is treated as a data problem, not a reason to spin.
const MAX_INHERIT_DEPTH: usize = 50;

/// Serialize a timestamp in the fixed-width form stored in the database.
///
/// Millisecond precision with a `Z` suffix keeps lexicographic order equal
/// to chronological order, which the monotonic `cached_at` upsert relies on.
#[must_use]
pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(value: &str, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("bad timestamp in {column}: {e}").into(),
            )
        })
}

/// SQLite-backed cache database.
#[derive(Debug)]
pub struct CacheDb {
    conn: Connection,
}

impl CacheDb {
    /// Open (or create) the cache at the given path.
    ///
    /// # Errors
    ///
    /// I/O failures surface as a retriable storage-unavailable condition;
    /// migration failure is fatal.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LbError::StorageUnavailable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| LbError::StorageUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        conn.busy_timeout(Duration::from_millis(5000))?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    // === Issues ===

    fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
        let status_str: String = row.get("status")?;
        let issue_type_str: Option<String> = row.get("issue_type")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let closed_at: Option<String> = row.get("closed_at")?;
        let cached_at: String = row.get("cached_at")?;

        Ok(Issue {
            identifier: row.get("identifier")?,
            remote_id: row.get("remote_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            status: Status::from_str(&status_str).unwrap_or_default(),
            priority: Priority(row.get("priority")?),
            issue_type: issue_type_str.and_then(|t| IssueType::from_str(&t).ok()),
            assignee: row.get("assignee")?,
            created_at: parse_ts(&created_at, "created_at")?,
            updated_at: parse_ts(&updated_at, "updated_at")?,
            closed_at: closed_at
                .map(|value| parse_ts(&value, "closed_at"))
                .transpose()?,
            cached_at: parse_ts(&cached_at, "cached_at")?,
        })
    }

    /// Insert or update one issue by identifier.
    ///
    /// `cached_at` never moves backwards: an upsert with an older snapshot
    /// keeps the newer stamp.
    ///
    /// # Errors
    ///
    /// Constraint violations propagate with a structured error.
    pub fn upsert_issue(&mut self, issue: &Issue) -> Result<()> {
        Self::upsert_issue_impl(&self.conn, issue)
    }

    fn upsert_issue_impl(conn: &Connection, issue: &Issue) -> Result<()> {
        conn.execute(
            "INSERT INTO issues (
                identifier, remote_id, title, description, status, priority,
                issue_type, assignee, created_at, updated_at, closed_at, cached_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(identifier) DO UPDATE SET
                remote_id = excluded.remote_id,
                title = excluded.title,
                description = excluded.description,
                status = excluded.status,
                priority = excluded.priority,
                issue_type = excluded.issue_type,
                assignee = excluded.assignee,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                closed_at = excluded.closed_at,
                cached_at = MAX(issues.cached_at, excluded.cached_at)",
            rusqlite::params![
                issue.identifier,
                issue.remote_id,
                issue.title,
                issue.description,
                issue.status.as_str(),
                issue.priority.0,
                issue.issue_type.map(IssueType::as_str),
                issue.assignee,
                ts(issue.created_at),
                ts(issue.updated_at),
                issue.closed_at.map(ts),
                ts(issue.cached_at),
            ],
        )?;
        Ok(())
    }

    /// Upsert a batch of issues inside a single transaction.
    ///
    /// # Errors
    ///
    /// Rolls back and returns the first failure.
    pub fn upsert_issues(&mut self, issues: &[Issue]) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        for issue in issues {
            Self::upsert_issue_impl(&tx, issue)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetch one issue by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_issue(&self, identifier: &str) -> Result<Option<Issue>> {
        let issue = self
            .conn
            .query_row(
                "SELECT * FROM issues WHERE identifier = ?1",
                [identifier],
                Self::issue_from_row,
            )
            .optional()?;
        Ok(issue)
    }

    /// All cached issues, ordered by identifier for stable output.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    pub fn list_issues(&self) -> Result<Vec<Issue>> {
        let mut stmt = self.conn.prepare("SELECT * FROM issues ORDER BY identifier")?;
        let issues = stmt
            .query_map([], Self::issue_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(issues)
    }

    /// Remove an issue and every dependency row touching it.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletes fail.
    pub fn delete_issue(&mut self, identifier: &str) -> Result<bool> {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let removed = tx.execute("DELETE FROM issues WHERE identifier = ?1", [identifier])?;
        tx.execute(
            "DELETE FROM dependencies WHERE issue_id = ?1 OR depends_on_id = ?1",
            [identifier],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Full-sync clear-and-refill: replace the cached issue set with the
    /// authoritative pull, preserving placeholder rows and non-parent-child
    /// dependency edges. Parent-child edges are rebuilt from the pull.
    ///
    /// Returns the number of pruned rows (`original − pulled`, floored at 0).
    ///
    /// # Errors
    ///
    /// Rolls back and returns the first failure.
    pub fn replace_all_issues(
        &mut self,
        issues: &[Issue],
        parent_edges: &[(String, String)],
    ) -> Result<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let original: usize = tx.query_row(
            "SELECT COUNT(*) FROM issues WHERE identifier NOT LIKE 'pending%'",
            [],
            |row| row.get(0),
        )?;

        tx.execute("DELETE FROM issues WHERE identifier NOT LIKE 'pending%'", [])?;
        tx.execute("DELETE FROM dependencies WHERE type = 'parent-child'", [])?;

        for issue in issues {
            Self::upsert_issue_impl(&tx, issue)?;
        }
        for (child, parent) in parent_edges {
            Self::insert_parent_edge(&tx, child, parent)?;
        }

        tx.commit()?;
        Ok(original.saturating_sub(issues.len()))
    }

    // === Dependencies ===

    fn dep_from_row(row: &Row<'_>) -> rusqlite::Result<Dependency> {
        let type_str: String = row.get("type")?;
        let created_at: String = row.get("created_at")?;
        Ok(Dependency {
            issue_id: row.get("issue_id")?,
            depends_on_id: row.get("depends_on_id")?,
            dep_type: DependencyType::from_str(&type_str).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    e.to_string().into(),
                )
            })?,
            created_at: parse_ts(&created_at, "created_at")?,
            created_by: row.get("created_by")?,
        })
    }

    /// Insert a dependency edge. A duplicate `(from, to, type)` is
    /// swallowed as idempotent success. A `parent-child` edge replaces any
    /// existing parent edge of the child.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails for any other reason.
    pub fn upsert_dep(&mut self, dep: &Dependency) -> Result<()> {
        if dep.dep_type == DependencyType::ParentChild {
            return self.set_parent_edge(dep);
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO dependencies (issue_id, depends_on_id, type, created_at, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                dep.issue_id,
                dep.depends_on_id,
                dep.dep_type.as_str(),
                ts(dep.created_at),
                dep.created_by,
            ],
        )?;
        Ok(())
    }

    fn set_parent_edge(&mut self, dep: &Dependency) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM dependencies WHERE issue_id = ?1 AND type = 'parent-child'",
            [&dep.issue_id],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO dependencies (issue_id, depends_on_id, type, created_at, created_by)
             VALUES (?1, ?2, 'parent-child', ?3, ?4)",
            rusqlite::params![
                dep.issue_id,
                dep.depends_on_id,
                ts(dep.created_at),
                dep.created_by,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn insert_parent_edge(conn: &Connection, child: &str, parent: &str) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO dependencies (issue_id, depends_on_id, type, created_at, created_by)
             VALUES (?1, ?2, 'parent-child', ?3, 'sync')",
            rusqlite::params![child, parent, ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Delete every edge between a pair of issues, both orientations.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove_dep_pair(&mut self, a: &str, b: &str) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM dependencies
             WHERE (issue_id = ?1 AND depends_on_id = ?2)
                OR (issue_id = ?2 AND depends_on_id = ?1)",
            [a, b],
        )?;
        Ok(removed)
    }

    /// Drop all non-parent-child edges touching one issue, in preparation
    /// for authoritative relation hydration.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear_relation_edges(&mut self, identifier: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM dependencies
             WHERE (issue_id = ?1 OR depends_on_id = ?1) AND type != 'parent-child'",
            [identifier],
        )?;
        Ok(())
    }

    /// Outgoing edges of one issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_deps_out(&self, identifier: &str) -> Result<Vec<Dependency>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM dependencies WHERE issue_id = ?1 ORDER BY depends_on_id, type",
        )?;
        let deps = stmt
            .query_map([identifier], Self::dep_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(deps)
    }

    /// Incoming edges of one issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_deps_in(&self, identifier: &str) -> Result<Vec<Dependency>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM dependencies WHERE depends_on_id = ?1 ORDER BY issue_id, type",
        )?;
        let deps = stmt
            .query_map([identifier], Self::dep_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(deps)
    }

    /// Every dependency row, for export and tree walks.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    pub fn all_deps(&self) -> Result<Vec<Dependency>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM dependencies ORDER BY issue_id, depends_on_id, type")?;
        let deps = stmt
            .query_map([], Self::dep_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(deps)
    }

    // === Reachability ===

    /// Compute the blocked set.
    ///
    /// Direct: `B` is blocked while some non-closed `A` has an edge
    /// `(A, B, blocks)`. Inherited: children of a blocked issue (via
    /// `parent-child` edges pointing at the parent) are blocked too,
    /// iterated to a fixed point. The value is the list of direct open
    /// blockers; inherited entries carry their parent's blocker list.
    ///
    /// # Errors
    ///
    /// Returns an error if the queries fail.
    pub fn blocked_set(&self) -> Result<HashMap<String, Vec<String>>> {
        let mut blocked: HashMap<String, Vec<String>> = HashMap::new();

        let mut stmt = self.conn.prepare(
            "SELECT d.depends_on_id, d.issue_id
             FROM dependencies d
             JOIN issues blocker ON blocker.identifier = d.issue_id
             WHERE d.type = 'blocks' AND blocker.status != 'closed'
             ORDER BY d.issue_id",
        )?;
        let direct = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (target, blocker) in direct {
            blocked.entry(target).or_default().push(blocker);
        }

        // (child, parent) pairs for the inheritance pass.
        let mut stmt = self.conn.prepare(
            "SELECT issue_id, depends_on_id FROM dependencies WHERE type = 'parent-child'",
        )?;
        let parent_edges = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for depth in 0.. {
            if depth >= MAX_INHERIT_DEPTH {
                tracing::warn!(
                    max_depth = MAX_INHERIT_DEPTH,
                    "blocked-set inheritance hit depth limit"
                );
                break;
            }
            let mut grew = false;
            for (child, parent) in &parent_edges {
                if blocked.contains_key(child) {
                    continue;
                }
                if let Some(parent_blockers) = blocked.get(parent).cloned() {
                    blocked.insert(child.clone(), parent_blockers);
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        Ok(blocked)
    }

    /// The ready set: open issues not in the blocked set, optionally
    /// restricted to the viewer's assigned/unassigned items, sorted by
    /// `(priority asc, updated_at desc)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the queries fail.
    pub fn ready_issues(&self, viewer: Option<&str>, show_all: bool) -> Result<Vec<Issue>> {
        let blocked: HashSet<String> = self.blocked_set()?.into_keys().collect();
        let mut ready: Vec<Issue> = self
            .list_issues()?
            .into_iter()
            .filter(|issue| issue.status == Status::Open)
            .filter(|issue| !blocked.contains(&issue.identifier))
            .filter(|issue| {
                show_all
                    || issue.assignee.is_none()
                    || viewer.is_some_and(|me| issue.assignee.as_deref() == Some(me))
            })
            .collect();
        ready.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.updated_at.cmp(&a.updated_at))
        });
        Ok(ready)
    }

    // === Labels ===

    /// Cache a Remote label.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn upsert_label(&mut self, label: &Label) -> Result<()> {
        self.conn.execute(
            "INSERT INTO labels (id, name, team_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, team_id = excluded.team_id",
            rusqlite::params![label.id, label.name, label.team_id],
        )?;
        Ok(())
    }

    /// Look up a cached label by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_label_by_name(&self, name: &str) -> Result<Option<Label>> {
        let label = self
            .conn
            .query_row(
                "SELECT id, name, team_id FROM labels WHERE name = ?1",
                [name],
                |row| {
                    Ok(Label {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        team_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(label)
    }

    // === Outbox ===

    /// Append an intended Remote mutation to the durable queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn enqueue(&mut self, op: OutboxOp, payload: &serde_json::Value) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO outbox (operation, payload, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![op.as_str(), payload.to_string(), ts(Utc::now())],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All queued items in FIFO order (ascending id).
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    pub fn peek_outbox(&self) -> Result<Vec<OutboxItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, operation, payload, created_at, retry_count, last_error
             FROM outbox ORDER BY id ASC",
        )?;
        let items = stmt
            .query_map([], |row| {
                let op_str: String = row.get(1)?;
                let payload_str: String = row.get(2)?;
                let created_at: String = row.get(3)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    op_str,
                    payload_str,
                    created_at,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(items.len());
        for (id, op_str, payload_str, created_at, retry_count, last_error) in items {
            out.push(OutboxItem {
                id,
                op: OutboxOp::from_str(&op_str)?,
                payload: serde_json::from_str(&payload_str)?,
                created_at: parse_ts(&created_at, "created_at")
                    .map_err(LbError::Database)?,
                retry_count,
                last_error,
            });
        }
        Ok(out)
    }

    /// Number of queued items.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    pub fn outbox_len(&self) -> Result<usize> {
        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove a queued item after a successful push.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn ack_outbox(&mut self, id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM outbox WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Record a push failure: bump `retry_count`, remember the error.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn fail_outbox(&mut self, id: i64, err: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE outbox SET retry_count = retry_count + 1, last_error = ?2 WHERE id = ?1",
            rusqlite::params![id, err],
        )?;
        Ok(())
    }

    // === Metadata ===

    /// Read a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Write a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn set_meta(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    fn get_meta_time(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.get_meta(key)?.and_then(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }))
    }

    /// When the last (incremental or full) sync completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_sync(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_meta_time("last_sync")
    }

    /// When the last full sync completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_full_sync(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_meta_time("last_full_sync")
    }

    /// Stamp `last_sync`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn mark_last_sync(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.set_meta("last_sync", &ts(now))
    }

    /// Stamp `last_full_sync` (and `last_sync`, which it implies).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn mark_last_full_sync(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.set_meta("last_sync", &ts(now))?;
        self.set_meta("last_full_sync", &ts(now))
    }

    /// Bump and return the sync run counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or write fails.
    pub fn bump_sync_run_count(&mut self) -> Result<u64> {
        let current: u64 = self
            .get_meta("sync_run_count")?
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);
        let next = current + 1;
        self.set_meta("sync_run_count", &next.to_string())?;
        Ok(next)
    }

    /// Allocate the next `LOCAL-<n>` identifier (local-only mode).
    ///
    /// # Errors
    ///
    /// Returns an error if the counter cannot be read or written.
    pub fn next_local_id(&mut self) -> Result<u64> {
        let current: u64 = self
            .get_meta("next_local_id")?
            .and_then(|value| value.parse().ok())
            .unwrap_or(1);
        self.set_meta("next_local_id", &(current + 1).to_string())?;
        Ok(current)
    }
}
