//! The background worker: drains the outbox against the Remote,
//! propagates parent status, and triggers the post-drain pull + export.
//!
//! At most one worker runs per repo (PID file election). The drain loop
//! polls the outbox every 500 ms; an empty queue starts a 5 s idle timer
//! that stay-alive touches (mtime advances) reset. Failures are recorded
//! on the row and retried by future iterations, never in a tight loop.

pub mod launcher;
pub mod pidfile;

use crate::config::{Config, LbPaths};
use crate::error::{LbError, Result};
use crate::model::{
    Dependency, DependencyType, Issue, OutboxItem, OutboxOp, Status, PENDING_IDENTIFIER,
};
use crate::outbox::{
    self, ClosePayload, CreatePayload, DeletePayload, RelationPayload, UpdatePayload,
};
use crate::remote::client::{CreateIssueInput, UpdateIssueInput};
use crate::remote::types::{issue_from_remote, priority_to_remote};
use crate::remote::RemoteClient;
use crate::storage::CacheDb;
use crate::sync::{self, ResolvedTeam};
use pidfile::PidFile;
use serde_json::Value;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outbox poll interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The worker exits after this long with no work and no touch.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed item before moving on.
pub const FAILURE_BACKOFF: Duration = Duration::from_secs(1);

/// Entry point for the `--worker` re-entry flag.
///
/// Acquires the PID file (or defers to the live owner), drains the queue,
/// and — if anything was pushed — runs a paginated pull, re-hydrates the
/// relations of the issues it touched, and spawns a JSONL export child.
///
/// # Errors
///
/// Returns an error on storage failure or fatal auth failure; the PID
/// file is released on every exit path.
pub fn run(paths: &LbPaths, config: &Config) -> Result<()> {
    let pidfile = PidFile::new(paths.pid_path());
    let Some(_lock) = pidfile.acquire()? else {
        debug!("another worker owns the queue; exiting");
        return Ok(());
    };

    if config.local_only {
        // Local-only mode never enqueues; nothing to drain.
        return Ok(());
    }

    let mut db = CacheDb::open(&paths.db_path())?;
    let client = RemoteClient::new(config.require_api_key()?)?;

    let mut team: Option<ResolvedTeam> = None;
    let mut idle_since: Option<Instant> = None;
    let mut last_mtime = pidfile.mtime().ok();
    let mut did_work = false;
    let mut touched: HashSet<String> = HashSet::new();

    info!(pid = std::process::id(), "worker started");

    loop {
        let items = db.peek_outbox()?;

        if items.is_empty() {
            let mtime = pidfile.mtime().ok();
            if mtime != last_mtime {
                debug!("stay-alive touch observed; resetting idle timer");
                idle_since = None;
                last_mtime = mtime;
            }
            match idle_since {
                None => idle_since = Some(Instant::now()),
                Some(started) if started.elapsed() >= IDLE_TIMEOUT => {
                    debug!("idle timeout elapsed; exiting");
                    break;
                }
                Some(_) => {}
            }
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }

        idle_since = None;

        if team.is_none() {
            team = Some(sync::resolve_team(&client, config, &mut db)?);
        }
        let Some(resolved) = team.as_ref() else {
            unreachable!("team resolved above");
        };

        for item in items {
            debug!(
                id = item.id,
                summary = %outbox::describe(item.op, &item.payload),
                retry = item.retry_count,
                "executing outbox item"
            );
            match execute_item(&mut db, &client, resolved, config, &item) {
                Ok(executed) => {
                    db.ack_outbox(item.id)?;
                    did_work = true;
                    touched.extend(executed);
                }
                Err(e @ LbError::Auth { .. }) => {
                    // Every subsequent item would fail the same way.
                    db.fail_outbox(item.id, &e.to_string())?;
                    return Err(e);
                }
                Err(e) => {
                    warn!(id = item.id, error = %e, "outbox item failed; will retry later");
                    db.fail_outbox(item.id, &e.to_string())?;
                    std::thread::sleep(FAILURE_BACKOFF);
                }
            }
        }
    }

    if did_work {
        let resolved = match team {
            Some(t) => t,
            None => sync::resolve_team(&client, config, &mut db)?,
        };
        let (pulled, pruned) = sync::full_pull(&mut db, &client, &resolved, config)?;
        info!(pulled, pruned, "post-drain pull complete");

        let hydrate: Vec<String> = touched
            .into_iter()
            .filter(|id| !id.starts_with(PENDING_IDENTIFIER))
            .collect();
        if !hydrate.is_empty() {
            let count = sync::hydrate_relations_batch(&mut db, &client, &hydrate)?;
            debug!(count, "re-hydrated relations for touched issues");
        }

        launcher::spawn_export_worker(paths)?;
    }

    info!("worker exiting");
    Ok(())
}

/// Execute one queued item against the Remote and reconcile the cache.
/// Shared by the worker and the inline `sync`/`--sync` push path.
///
/// Returns the identifiers whose relations are worth re-hydrating.
///
/// # Errors
///
/// Transient and rejection-class errors are the caller's cue to record
/// the failure on the row; auth errors are fatal.
pub fn execute_item(
    db: &mut CacheDb,
    client: &RemoteClient,
    team: &ResolvedTeam,
    config: &Config,
    item: &OutboxItem,
) -> Result<Vec<String>> {
    match item.op {
        OutboxOp::Create => execute_create(db, client, team, config, &item.payload),
        OutboxOp::Update => execute_update(db, client, team, config, &item.payload),
        OutboxOp::Close => execute_close(db, client, team, config, &item.payload),
        OutboxOp::Delete => {
            let payload: DeletePayload = outbox::from_value(&item.payload)?;
            if let Some(remote_id) = &payload.remote_id {
                client.delete_issue(remote_id)?;
            }
            Ok(Vec::new())
        }
        OutboxOp::CreateRelation => {
            let payload: RelationPayload = outbox::from_value(&item.payload)?;
            push_relation(db, client, &payload)?;
            Ok(vec![payload.issue_id])
        }
        OutboxOp::DeleteRelation => {
            let payload: RelationPayload = outbox::from_value(&item.payload)?;
            remove_relation(db, client, &payload)?;
            Ok(vec![payload.issue_id])
        }
    }
}

fn execute_create(
    db: &mut CacheDb,
    client: &RemoteClient,
    team: &ResolvedTeam,
    config: &Config,
    payload: &Value,
) -> Result<Vec<String>> {
    let payload: CreatePayload = outbox::from_value(payload)?;

    let mut label_ids = Vec::new();
    if let Some(label) = &team.repo_label {
        label_ids.push(label.id.clone());
    }
    if config.use_issue_types {
        if let Some(issue_type) = payload.issue_type {
            let label =
                client.find_or_create_label(&team.team.id, issue_type.as_str(), Some("type"))?;
            label_ids.push(label.id);
        }
    }

    let assignee_id = match payload.assignee.as_deref() {
        Some("me") => Some(team.viewer.id.clone()),
        Some(email) if email == team.viewer.email => Some(team.viewer.id.clone()),
        Some(email) => Some(client.user_by_email(email)?.id),
        None => None,
    };

    let parent_id = match payload.parent.as_deref() {
        Some(parent) => Some(resolve_remote_id(db, client, parent)?),
        None => None,
    };

    let input = CreateIssueInput {
        team_id: team.team.id.clone(),
        title: payload.title.clone(),
        description: payload.description.clone(),
        priority: payload.priority.map(priority_to_remote),
        state_id: None,
        assignee_id,
        label_ids,
        parent_id,
        project_id: team.project.as_ref().map(|p| p.id.clone()),
    };

    let remote = client.create_issue(&input)?;
    let (issue, parent) = issue_from_remote(&remote, config.use_issue_types);
    let identifier = issue.identifier.clone();

    // Replace the optimistic placeholder with the real row.
    db.delete_issue(PENDING_IDENTIFIER)?;
    db.upsert_issue(&issue)?;
    if let Some(parent) = parent {
        db.upsert_dep(
            &Dependency::new(identifier.clone(), parent, DependencyType::ParentChild).by("sync"),
        )?;
    }

    // Deferred relations were recorded textually; apply them best-effort
    // now that the issue exists on the Remote.
    for relation in &payload.relations {
        let (from, to) = if relation.inverse {
            (relation.target.clone(), identifier.clone())
        } else {
            (identifier.clone(), relation.target.clone())
        };
        let outcome = push_relation(
            db,
            client,
            &RelationPayload {
                issue_id: from.clone(),
                depends_on_id: to.clone(),
                dep_type: relation.dep_type,
            },
        );
        if let Err(e) = outcome {
            warn!(from = %from, to = %to, error = %e, "deferred relation failed");
        }
    }

    info!(identifier = %identifier, "created remote issue");
    Ok(vec![identifier])
}

fn execute_update(
    db: &mut CacheDb,
    client: &RemoteClient,
    team: &ResolvedTeam,
    config: &Config,
    payload: &Value,
) -> Result<Vec<String>> {
    let payload: UpdatePayload = outbox::from_value(payload)?;
    let remote_id = resolve_remote_id(db, client, &payload.id)?;

    let state_id = match payload.status {
        Some(status) => Some(
            crate::remote::types::select_state(&team.states, status)
                .map(|s| s.id.clone())
                .ok_or_else(|| LbError::RemoteRejection {
                    operation: "issueUpdate".to_string(),
                    reason: format!("no workflow state for status {status}"),
                })?,
        ),
        None => None,
    };

    let assignee_id = match &payload.assignee {
        Some(Some(email)) if email == "me" || email == &team.viewer.email => {
            Some(Value::String(team.viewer.id.clone()))
        }
        Some(Some(email)) => Some(Value::String(client.user_by_email(email)?.id)),
        Some(None) => Some(Value::Null),
        None => None,
    };

    let parent_id = match payload.parent.as_deref() {
        Some(parent) => Some(Value::String(resolve_remote_id(db, client, parent)?)),
        None => None,
    };

    let input = UpdateIssueInput {
        title: payload.title.clone(),
        description: payload.description.clone(),
        priority: payload.priority.map(priority_to_remote),
        state_id,
        assignee_id,
        label_ids: None,
        parent_id,
        project_id: None,
    };

    let remote = client.update_issue(&remote_id, &input)?;
    let (issue, parent) = issue_from_remote(&remote, config.use_issue_types);
    db.upsert_issue(&issue)?;
    if let Some(parent) = parent {
        db.upsert_dep(
            &Dependency::new(issue.identifier.clone(), parent, DependencyType::ParentChild)
                .by("sync"),
        )?;
    }

    if let Some(status) = payload.status {
        propagate_parent_status(db, &payload.id, status);
    }
    Ok(vec![payload.id])
}

fn execute_close(
    db: &mut CacheDb,
    client: &RemoteClient,
    team: &ResolvedTeam,
    config: &Config,
    payload: &Value,
) -> Result<Vec<String>> {
    let payload: ClosePayload = outbox::from_value(payload)?;
    let remote_id = resolve_remote_id(db, client, &payload.id)?;

    let state_id = crate::remote::types::select_state(&team.states, Status::Closed)
        .map(|s| s.id.clone())
        .ok_or_else(|| LbError::RemoteRejection {
            operation: "issueUpdate".to_string(),
            reason: "team has no completed or canceled state".to_string(),
        })?;

    let input = UpdateIssueInput {
        state_id: Some(state_id),
        ..UpdateIssueInput::default()
    };
    let remote = client.update_issue(&remote_id, &input)?;
    let (issue, _) = issue_from_remote(&remote, config.use_issue_types);
    db.upsert_issue(&issue)?;

    // The close reason lands as a comment; losing it is not worth a retry
    // of the whole close.
    if let Some(reason) = &payload.reason {
        if let Err(e) = client.create_comment(&remote_id, &format!("Closed: {reason}")) {
            warn!(identifier = %payload.id, error = %e, "close-reason comment failed");
        }
    }

    propagate_parent_status(db, &payload.id, Status::Closed);
    Ok(vec![payload.id])
}

fn push_relation(db: &mut CacheDb, client: &RemoteClient, payload: &RelationPayload) -> Result<()> {
    let from_remote = resolve_remote_id(db, client, &payload.issue_id)?;
    let to_remote = resolve_remote_id(db, client, &payload.depends_on_id)?;

    if payload.dep_type == DependencyType::ParentChild {
        // (child, parent) — the edge's target is the parent.
        client.set_parent(&from_remote, Some(&to_remote))?;
    } else {
        client.create_relation(&from_remote, &to_remote, payload.dep_type)?;
    }
    Ok(())
}

fn remove_relation(db: &mut CacheDb, client: &RemoteClient, payload: &RelationPayload) -> Result<()> {
    if payload.dep_type == DependencyType::ParentChild {
        let child_remote = resolve_remote_id(db, client, &payload.issue_id)?;
        client.set_parent(&child_remote, None)?;
    } else {
        let (outgoing, incoming) = client.relations_of(&payload.issue_id)?;
        let relation = outgoing
            .iter()
            .chain(incoming.iter())
            .find(|rel| rel.other.identifier == payload.depends_on_id);
        if let Some(relation) = relation {
            client.delete_relation(&relation.id)?;
        } else {
            debug!(
                from = %payload.issue_id,
                to = %payload.depends_on_id,
                "relation already absent on remote"
            );
        }
    }

    // Success on the Remote removes both local orientations.
    db.remove_dep_pair(&payload.issue_id, &payload.depends_on_id)?;
    Ok(())
}

/// Map a public identifier to the Remote's internal id, preferring the
/// cache and falling back to a targeted fetch.
fn resolve_remote_id(db: &mut CacheDb, client: &RemoteClient, identifier: &str) -> Result<String> {
    if let Some(issue) = db.get_issue(identifier)? {
        if let Some(remote_id) = issue.remote_id {
            return Ok(remote_id);
        }
    }
    let (remote, _, _) = client.issue_with_relations(identifier)?;
    let (issue, _) = issue_from_remote(&remote, false);
    let remote_id = remote.id;
    db.upsert_issue(&issue)?;
    Ok(remote_id)
}

/// Parent-status propagation, best-effort and in-band.
///
/// - Child moves to `in_progress` while parent is `open`: enqueue an
///   update setting the parent to `in_progress`.
/// - Child closes while parent is `in_progress` and no sibling is
///   `in_progress`: enqueue an update setting the parent back to `open`.
///
/// Enqueued rows are processed in the same FIFO as user items, so the
/// trigger and its consequence are never reordered. Failures are logged
/// and never block the originating update.
pub fn propagate_parent_status(db: &mut CacheDb, child: &str, new_status: Status) {
    if let Err(e) = propagate_parent_status_inner(db, child, new_status) {
        warn!(child = %child, error = %e, "parent-status propagation failed");
    }
}

fn propagate_parent_status_inner(db: &mut CacheDb, child: &str, new_status: Status) -> Result<()> {
    let parent_edge = db
        .list_deps_out(child)?
        .into_iter()
        .find(|dep| dep.dep_type == DependencyType::ParentChild);
    let Some(parent_edge) = parent_edge else {
        return Ok(());
    };
    let parent_id = parent_edge.depends_on_id;
    let Some(parent) = db.get_issue(&parent_id)? else {
        return Ok(());
    };

    let wanted = match new_status {
        Status::InProgress if parent.status == Status::Open => Status::InProgress,
        Status::Closed if parent.status == Status::InProgress => {
            if any_sibling_in_progress(db, &parent_id, child)? {
                return Ok(());
            }
            Status::Open
        }
        _ => return Ok(()),
    };

    debug!(parent = %parent_id, status = %wanted, "propagating status to parent");
    let payload = UpdatePayload {
        id: parent_id,
        status: Some(wanted),
        ..UpdatePayload::default()
    };
    db.enqueue(OutboxOp::Update, &outbox::to_value(&payload)?)?;
    Ok(())
}

fn any_sibling_in_progress(db: &CacheDb, parent: &str, except: &str) -> Result<bool> {
    for edge in db.list_deps_in(parent)? {
        if edge.dep_type != DependencyType::ParentChild || edge.issue_id == except {
            continue;
        }
        if let Some(sibling) = db.get_issue(&edge.issue_id)? {
            if sibling.status == Status::InProgress {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Apply an optimistic local write for a queued status change, so reads
/// reflect it before the worker confirms.
pub fn apply_status_locally(issue: &mut Issue, status: Status) {
    issue.status = status;
    issue.updated_at = chrono::Utc::now();
    match status {
        Status::Closed => {
            if issue.closed_at.is_none() {
                issue.closed_at = Some(chrono::Utc::now());
            }
        }
        _ => issue.closed_at = None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Issue;

    fn seeded_db() -> CacheDb {
        let mut db = CacheDb::open_memory().unwrap();
        let parent = Issue::new("TEAM-1", "parent");
        let mut child_a = Issue::new("TEAM-2", "child a");
        let child_b = Issue::new("TEAM-3", "child b");
        child_a.status = Status::InProgress;
        db.upsert_issues(&[parent, child_a, child_b]).unwrap();
        db.upsert_dep(&Dependency::new("TEAM-2", "TEAM-1", DependencyType::ParentChild))
            .unwrap();
        db.upsert_dep(&Dependency::new("TEAM-3", "TEAM-1", DependencyType::ParentChild))
            .unwrap();
        db
    }

    #[test]
    fn test_child_start_promotes_open_parent() {
        let mut db = seeded_db();
        propagate_parent_status(&mut db, "TEAM-3", Status::InProgress);
        let queued = db.peek_outbox().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].op, OutboxOp::Update);
        assert_eq!(queued[0].payload["id"], "TEAM-1");
        assert_eq!(queued[0].payload["status"], "in_progress");
    }

    #[test]
    fn test_close_with_active_sibling_leaves_parent() {
        let mut db = seeded_db();
        // Parent is in_progress; TEAM-2 (sibling) is still in_progress.
        let mut parent = db.get_issue("TEAM-1").unwrap().unwrap();
        parent.status = Status::InProgress;
        db.upsert_issue(&parent).unwrap();

        propagate_parent_status(&mut db, "TEAM-3", Status::Closed);
        assert!(db.peek_outbox().unwrap().is_empty());
    }

    #[test]
    fn test_close_of_last_active_child_reopens_parent() {
        let mut db = seeded_db();
        let mut parent = db.get_issue("TEAM-1").unwrap().unwrap();
        parent.status = Status::InProgress;
        db.upsert_issue(&parent).unwrap();

        // TEAM-2 is the in_progress child; closing it leaves no active
        // sibling, so the parent falls back to open.
        propagate_parent_status(&mut db, "TEAM-2", Status::Closed);
        let queued = db.peek_outbox().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].payload["id"], "TEAM-1");
        assert_eq!(queued[0].payload["status"], "open");
    }

    #[test]
    fn test_no_parent_is_a_no_op() {
        let mut db = CacheDb::open_memory().unwrap();
        db.upsert_issue(&Issue::new("TEAM-9", "loner")).unwrap();
        propagate_parent_status(&mut db, "TEAM-9", Status::InProgress);
        assert!(db.peek_outbox().unwrap().is_empty());
    }

    #[test]
    fn test_apply_status_locally_sets_and_clears_closed_at() {
        let mut issue = Issue::new("TEAM-5", "x");
        apply_status_locally(&mut issue, Status::Closed);
        assert!(issue.closed_at.is_some());
        apply_status_locally(&mut issue, Status::Open);
        assert!(issue.closed_at.is_none());
    }
}
