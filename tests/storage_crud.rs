//! Store CRUD behavior and schema invariants.

mod common;

use chrono::{Duration, Utc};
use common::{issue, log_start, test_db};
use lb::model::{Dependency, DependencyType, Issue, Status};
use lb::storage::{ts, CacheDb};

#[test]
fn upsert_then_get_round_trips() {
    log_start("upsert_then_get_round_trips");
    let mut db = test_db();

    let mut original = issue("TEAM-1", "first issue", Status::Open, 1);
    original.description = Some("body text".to_string());
    original.assignee = Some("dev@example.com".to_string());
    db.upsert_issue(&original).unwrap();

    let fetched = db.get_issue("TEAM-1").unwrap().expect("issue exists");
    assert_eq!(fetched.title, "first issue");
    assert_eq!(fetched.description.as_deref(), Some("body text"));
    assert_eq!(fetched.assignee.as_deref(), Some("dev@example.com"));
    assert_eq!(fetched.status, Status::Open);
    assert_eq!(fetched.priority.0, 1);
    assert!(fetched.closed_at.is_none());
}

#[test]
fn upsert_by_identifier_replaces_fields() {
    log_start("upsert_by_identifier_replaces_fields");
    let mut db = test_db();

    db.upsert_issue(&issue("TEAM-1", "old title", Status::Open, 2))
        .unwrap();
    db.upsert_issue(&issue("TEAM-1", "new title", Status::InProgress, 0))
        .unwrap();

    let all = db.list_issues().unwrap();
    assert_eq!(all.len(), 1, "upsert keys on identifier");
    assert_eq!(all[0].title, "new title");
    assert_eq!(all[0].status, Status::InProgress);
}

#[test]
fn closed_issue_always_has_closed_at() {
    log_start("closed_issue_always_has_closed_at");
    let mut db = test_db();

    db.upsert_issue(&issue("TEAM-1", "done", Status::Closed, 2))
        .unwrap();

    for cached in db.list_issues().unwrap() {
        if cached.status == Status::Closed {
            assert!(cached.closed_at.is_some(), "{}", cached.identifier);
        }
    }
}

#[test]
fn delete_cascades_dependency_rows() {
    log_start("delete_cascades_dependency_rows");
    let mut db = test_db();

    db.upsert_issues(&[
        issue("TEAM-1", "a", Status::Open, 2),
        issue("TEAM-2", "b", Status::Open, 2),
    ])
    .unwrap();
    db.upsert_dep(&Dependency::new("TEAM-1", "TEAM-2", DependencyType::Blocks))
        .unwrap();
    db.upsert_dep(&Dependency::new("TEAM-2", "TEAM-1", DependencyType::Related))
        .unwrap();

    assert!(db.delete_issue("TEAM-1").unwrap());
    assert!(db.get_issue("TEAM-1").unwrap().is_none());
    assert!(db.list_deps_out("TEAM-1").unwrap().is_empty());
    assert!(db.list_deps_in("TEAM-1").unwrap().is_empty());
    assert!(db.list_deps_out("TEAM-2").unwrap().is_empty());
}

#[test]
fn dependency_rows_unique_on_triple() {
    log_start("dependency_rows_unique_on_triple");
    let mut db = test_db();

    let dep = Dependency::new("TEAM-1", "TEAM-2", DependencyType::Blocks);
    db.upsert_dep(&dep).unwrap();
    db.upsert_dep(&dep).unwrap();
    // Same pair, different type: a distinct row.
    db.upsert_dep(&Dependency::new("TEAM-1", "TEAM-2", DependencyType::Related))
        .unwrap();

    assert_eq!(db.list_deps_out("TEAM-1").unwrap().len(), 2);
}

#[test]
fn child_has_at_most_one_parent_edge() {
    log_start("child_has_at_most_one_parent_edge");
    let mut db = test_db();

    db.upsert_dep(&Dependency::new("TEAM-3", "TEAM-1", DependencyType::ParentChild))
        .unwrap();
    db.upsert_dep(&Dependency::new("TEAM-3", "TEAM-2", DependencyType::ParentChild))
        .unwrap();

    let parents: Vec<_> = db
        .list_deps_out("TEAM-3")
        .unwrap()
        .into_iter()
        .filter(|d| d.dep_type == DependencyType::ParentChild)
        .collect();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].depends_on_id, "TEAM-2");
}

#[test]
fn cached_at_never_regresses() {
    log_start("cached_at_never_regresses");
    let mut db = test_db();

    let mut row = issue("TEAM-1", "x", Status::Open, 2);
    db.upsert_issue(&row).unwrap();
    let first = db.get_issue("TEAM-1").unwrap().unwrap().cached_at;

    row.cached_at = row.cached_at - Duration::days(1);
    db.upsert_issue(&row).unwrap();
    let second = db.get_issue("TEAM-1").unwrap().unwrap().cached_at;
    assert_eq!(ts(second), ts(first));

    row.cached_at = Utc::now() + Duration::seconds(5);
    db.upsert_issue(&row).unwrap();
    let third = db.get_issue("TEAM-1").unwrap().unwrap().cached_at;
    assert!(ts(third) > ts(first));
}

#[test]
fn replace_all_prunes_and_reports() {
    log_start("replace_all_prunes_and_reports");
    let mut db = test_db();

    db.upsert_issues(&[
        issue("TEAM-1", "stays", Status::Open, 2),
        issue("TEAM-2", "pruned", Status::Open, 2),
        issue("TEAM-3", "pruned too", Status::Open, 2),
    ])
    .unwrap();
    // A related edge must survive the refill; the parent edge must not.
    db.upsert_dep(&Dependency::new("TEAM-1", "TEAM-2", DependencyType::Related))
        .unwrap();
    db.upsert_dep(&Dependency::new("TEAM-1", "TEAM-9", DependencyType::ParentChild))
        .unwrap();

    let fresh = vec![issue("TEAM-1", "stays", Status::Open, 2)];
    let pruned = db
        .replace_all_issues(&fresh, &[("TEAM-1".to_string(), "TEAM-4".to_string())])
        .unwrap();
    assert_eq!(pruned, 2);

    let remaining = db.list_issues().unwrap();
    assert_eq!(remaining.len(), 1);

    let edges = db.list_deps_out("TEAM-1").unwrap();
    let types: Vec<_> = edges.iter().map(|d| d.dep_type).collect();
    assert!(types.contains(&DependencyType::Related));
    // The rebuilt parent edge points at the pulled parent.
    let parent: Vec<_> = edges
        .iter()
        .filter(|d| d.dep_type == DependencyType::ParentChild)
        .collect();
    assert_eq!(parent.len(), 1);
    assert_eq!(parent[0].depends_on_id, "TEAM-4");
}

#[test]
fn replace_all_preserves_pending_placeholder() {
    log_start("replace_all_preserves_pending_placeholder");
    let mut db = test_db();

    db.upsert_issue(&Issue::new("pending", "queued create")).unwrap();
    db.upsert_issue(&issue("TEAM-1", "remote row", Status::Open, 2))
        .unwrap();

    let pruned = db.replace_all_issues(&[], &[]).unwrap();
    assert_eq!(pruned, 1, "only the confirmed row counts as pruned");
    let remaining = db.list_issues().unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].is_pending());
}

#[test]
fn open_creates_file_and_survives_reopen() {
    log_start("open_creates_file_and_survives_reopen");
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join(".lb").join("cache.db");

    {
        let mut db = CacheDb::open(&path).unwrap();
        db.upsert_issue(&issue("TEAM-1", "persisted", Status::Open, 2))
            .unwrap();
    }

    let db = CacheDb::open(&path).unwrap();
    assert_eq!(db.list_issues().unwrap().len(), 1);
}

#[test]
fn metadata_counters() {
    log_start("metadata_counters");
    let mut db = test_db();

    assert!(db.last_sync().unwrap().is_none());
    db.mark_last_sync(Utc::now()).unwrap();
    assert!(db.last_sync().unwrap().is_some());
    assert!(db.last_full_sync().unwrap().is_none());

    db.mark_last_full_sync(Utc::now()).unwrap();
    assert!(db.last_full_sync().unwrap().is_some());

    assert_eq!(db.bump_sync_run_count().unwrap(), 1);
    assert_eq!(db.bump_sync_run_count().unwrap(), 2);
}
