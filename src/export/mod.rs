//! JSONL exporter: the git-friendly canonical snapshot.
//!
//! `request_export` is the debounced scheduler called after cache
//! mutations; it spawns a single detached export child unless one is
//! believed to be in flight (a 2 s reservation stamp). The child absorbs
//! the debounce window, then writes `issues.jsonl.tmp` and renames it
//! over the destination. Placeholder rows are never emitted; the snapshot
//! only reflects worker-confirmed state.

use crate::config::LbPaths;
use crate::error::Result;
use crate::model::{Dependency, Issue, IssueType, Priority, Status};
use crate::storage::CacheDb;
use crate::util::identifier_sort_key;
use crate::worker::launcher;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Mutations within this window coalesce into one export.
pub const DEBOUNCE: Duration = Duration::from_millis(750);

/// A stamp younger than this means an export child is in flight.
/// Overlapping exports are wasted work, not a correctness problem.
pub const RESERVATION_WINDOW: Duration = Duration::from_secs(2);

/// One line of the canonical snapshot (§ JSONL format): snake_case keys,
/// optional fields omitted rather than null.
#[derive(Debug, Serialize)]
struct SnapshotRecord<'a> {
    id: &'a str,
    title: &'a str,
    status: Status,
    priority: Priority,
    created_at: &'a DateTime<Utc>,
    updated_at: &'a DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issue_type: Option<IssueType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    closed_at: Option<&'a DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dependencies: Option<&'a [Dependency]>,
}

/// Serialize the snapshot lines, sorted ascending by identifier.
///
/// # Errors
///
/// Returns an error when the store cannot be read.
pub fn snapshot_lines(db: &CacheDb) -> Result<Vec<String>> {
    let mut issues: Vec<Issue> = db
        .list_issues()?
        .into_iter()
        .filter(|issue| !issue.is_pending())
        .collect();
    issues.sort_by_key(|issue| identifier_sort_key(&issue.identifier));

    let mut deps_by_issue: HashMap<String, Vec<Dependency>> = HashMap::new();
    for dep in db.all_deps()? {
        deps_by_issue
            .entry(dep.issue_id.clone())
            .or_default()
            .push(dep);
    }

    let mut lines = Vec::with_capacity(issues.len());
    for issue in &issues {
        let deps = deps_by_issue.get(&issue.identifier).map(Vec::as_slice);
        let record = SnapshotRecord {
            id: &issue.identifier,
            title: &issue.title,
            status: issue.status,
            priority: issue.priority,
            created_at: &issue.created_at,
            updated_at: &issue.updated_at,
            issue_type: issue.issue_type,
            description: issue.description.as_deref(),
            closed_at: issue.closed_at.as_ref(),
            dependencies: deps.filter(|d| !d.is_empty()),
        };
        lines.push(serde_json::to_string(&record)?);
    }
    Ok(lines)
}

/// Write the snapshot atomically: tmp file, fsync, rename.
///
/// Returns the number of lines written.
///
/// # Errors
///
/// Returns an error when the store cannot be read or the files cannot be
/// written.
pub fn write_snapshot(db: &CacheDb, paths: &LbPaths) -> Result<usize> {
    paths.ensure_dir()?;
    let lines = snapshot_lines(db)?;

    let tmp_path = paths.jsonl_tmp_path();
    let mut tmp = fs::File::create(&tmp_path)?;
    for line in &lines {
        tmp.write_all(line.as_bytes())?;
        tmp.write_all(b"\n")?;
    }
    tmp.sync_all()?;
    drop(tmp);

    fs::rename(&tmp_path, paths.jsonl_path())?;
    debug!(lines = lines.len(), "snapshot written");
    Ok(lines.len())
}

/// Schedule an export after a cache mutation.
///
/// Never called from the worker or export children (they would spawn
/// forever); the command surface calls it after its mutations. The stamp
/// file both debounces repeat calls and marks an export as in flight.
pub fn request_export(paths: &LbPaths) {
    if let Err(e) = request_export_inner(paths) {
        // Export is an optimisation; a failed schedule is logged, not fatal.
        warn!(error = %e, "export scheduling failed");
    }
}

fn request_export_inner(paths: &LbPaths) -> Result<()> {
    paths.ensure_dir()?;
    let stamp = paths.export_stamp_path();

    if let Ok(meta) = fs::metadata(&stamp) {
        if let Ok(modified) = meta.modified() {
            if SystemTime::now()
                .duration_since(modified)
                .map_or(false, |age| age < RESERVATION_WINDOW)
            {
                debug!("export already reserved; skipping spawn");
                return Ok(());
            }
        }
    }

    fs::write(&stamp, b"")?;
    launcher::spawn_export_worker(paths)
}

/// Entry point for the `--export-worker` re-entry flag.
///
/// Sleeps through the debounce window (absorbing the burst that scheduled
/// it), writes the snapshot, and clears the reservation stamp. Errors are
/// logged (the launcher pointed stderr at `sync.log`) and swallowed.
pub fn run_export_child(paths: &LbPaths) {
    std::thread::sleep(DEBOUNCE);

    let outcome = CacheDb::open(&paths.db_path()).and_then(|db| write_snapshot(&db, paths));
    match outcome {
        Ok(lines) => debug!(lines, "export child finished"),
        Err(e) => warn!(error = %e, "export failed"),
    }

    let _ = fs::remove_file(paths.export_stamp_path());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DependencyType;
    use tempfile::TempDir;

    fn scratch() -> (CacheDb, LbPaths, TempDir) {
        let tmp = TempDir::new().unwrap();
        let paths = LbPaths::new(tmp.path().to_path_buf());
        paths.ensure_dir().unwrap();
        (CacheDb::open_memory().unwrap(), paths, tmp)
    }

    #[test]
    fn test_lines_sorted_by_natural_id_order() {
        let (mut db, _paths, _tmp) = scratch();
        db.upsert_issues(&[
            Issue::new("TEAM-10", "ten"),
            Issue::new("TEAM-2", "two"),
            Issue::new("TEAM-1", "one"),
        ])
        .unwrap();

        let lines = snapshot_lines(&db).unwrap();
        let ids: Vec<String> = lines
            .iter()
            .map(|line| {
                serde_json::from_str::<serde_json::Value>(line).unwrap()["id"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(ids, vec!["TEAM-1", "TEAM-2", "TEAM-10"]);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let (mut db, _paths, _tmp) = scratch();
        db.upsert_issue(&Issue::new("TEAM-1", "bare")).unwrap();

        let lines = snapshot_lines(&db).unwrap();
        let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert!(value.get("description").is_none());
        assert!(value.get("closed_at").is_none());
        assert!(value.get("issue_type").is_none());
        assert!(value.get("dependencies").is_none());
        assert_eq!(value["priority"], 2);
    }

    #[test]
    fn test_pending_rows_excluded() {
        let (mut db, _paths, _tmp) = scratch();
        db.upsert_issue(&Issue::new("pending", "queued create"))
            .unwrap();
        db.upsert_issue(&Issue::new("TEAM-1", "real")).unwrap();

        let lines = snapshot_lines(&db).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("TEAM-1"));
    }

    #[test]
    fn test_dependencies_embedded() {
        let (mut db, _paths, _tmp) = scratch();
        db.upsert_issues(&[Issue::new("TEAM-1", "a"), Issue::new("TEAM-2", "b")])
            .unwrap();
        db.upsert_dep(
            &Dependency::new("TEAM-1", "TEAM-2", DependencyType::Blocks).by("sync"),
        )
        .unwrap();

        let lines = snapshot_lines(&db).unwrap();
        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        let deps = first["dependencies"].as_array().unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0]["issue_id"], "TEAM-1");
        assert_eq!(deps[0]["depends_on_id"], "TEAM-2");
        assert_eq!(deps[0]["type"], "blocks");
        assert_eq!(deps[0]["created_by"], "sync");
        // The second line has no dependency array at all.
        let second: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert!(second.get("dependencies").is_none());
    }

    #[test]
    fn test_write_snapshot_atomic() {
        let tmp = TempDir::new().unwrap();
        let paths = LbPaths::new(tmp.path().to_path_buf());
        let mut db = CacheDb::open(&paths.db_path()).unwrap();
        db.upsert_issue(&Issue::new("TEAM-1", "one")).unwrap();

        let written = write_snapshot(&db, &paths).unwrap();
        assert_eq!(written, 1);
        assert!(paths.jsonl_path().exists());
        // The tmp file never survives a successful write.
        assert!(!paths.jsonl_tmp_path().exists());

        let contents = fs::read_to_string(paths.jsonl_path()).unwrap();
        assert!(contents.ends_with('\n'));
        for line in contents.lines() {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }
}
