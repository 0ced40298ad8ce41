//! Sync engine: freshness checks, incremental vs. full selection,
//! paginated pull with stale-row pruning, push-before-pull, and on-demand
//! relation hydration.

use crate::config::{Config, LbPaths};
use crate::error::{LbError, Result};
use crate::model::{Dependency, DependencyType, Issue};
use crate::remote::types::{issue_from_remote, RemoteLabel, RemoteProject, RemoteState, RemoteTeam, RemoteUser};
use crate::remote::RemoteClient;
use crate::storage::CacheDb;
use crate::worker::pidfile::PidFile;
use chrono::{Duration, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use std::io::IsTerminal;
use tracing::{debug, info, warn};

/// A full sync is forced when the last one is older than this.
const FULL_SYNC_MAX_AGE_HOURS: i64 = 24;

/// ... or on every Nth smart sync.
const FULL_SYNC_EVERY_N_RUNS: u64 = 3;

/// Concurrent Remote requests per relation-hydration batch.
const HYDRATION_CONCURRENCY: usize = 10;

/// Everything the executor needs to talk to the Remote for this repo:
/// the team, its workflow states, the viewer, and the repo scope objects.
/// Resolved once per drain / sync and cached by the caller.
#[derive(Debug, Clone)]
pub struct ResolvedTeam {
    pub team: RemoteTeam,
    pub viewer: RemoteUser,
    pub states: Vec<RemoteState>,
    pub repo_label: Option<RemoteLabel>,
    pub project: Option<RemoteProject>,
}

/// Push results, reported by `sync` and the worker log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PushStats {
    pub success: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Incremental,
    Full,
}

/// Outcome of one smart sync.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncOutcome {
    pub mode: SyncMode,
    pub pushed: PushStats,
    pub pulled: usize,
    pub pruned: usize,
}

/// Resolve the team and repo-scope objects for this configuration.
///
/// # Errors
///
/// Returns `NoTeam` when no team key/id is configured and the workspace
/// has more than one team.
pub fn resolve_team(client: &RemoteClient, config: &Config, db: &mut CacheDb) -> Result<ResolvedTeam> {
    let teams = client.teams()?;
    let team = if let Some(id) = &config.team_id {
        teams
            .iter()
            .find(|t| &t.id == id)
            .cloned()
            .ok_or_else(|| LbError::TeamNotFound { key: id.clone() })?
    } else if let Some(key) = &config.team_key {
        teams
            .iter()
            .find(|t| t.key.eq_ignore_ascii_case(key))
            .cloned()
            .ok_or_else(|| LbError::TeamNotFound { key: key.clone() })?
    } else if teams.len() == 1 {
        teams[0].clone()
    } else {
        return Err(LbError::NoTeam);
    };

    let viewer = client.viewer()?;
    let states = client.workflow_states(&team.id)?;

    let repo_label = if config.repo_scope.uses_label() {
        let label = client.find_or_create_label(
            &team.id,
            &format!("repo:{}", config.repo_name),
            None,
        )?;
        db.upsert_label(&crate::model::Label {
            id: label.id.clone(),
            name: label.name.clone(),
            team_id: Some(team.id.clone()),
        })?;
        Some(label)
    } else {
        None
    };

    let project = if config.repo_scope.uses_project() {
        Some(client.find_or_create_project(&team.id, &config.repo_name)?)
    } else {
        None
    };

    debug!(team = %team.key, scope = %config.repo_scope, "resolved team");
    Ok(ResolvedTeam {
        team,
        viewer,
        states,
        repo_label,
        project,
    })
}

/// Build the pull filter for the configured repo scope. `both` intersects
/// the label and project conditions.
#[must_use]
pub fn scope_filter(team: &ResolvedTeam) -> Value {
    let mut filter = json!({ "team": { "id": { "eq": team.team.id } } });
    if let Some(label) = &team.repo_label {
        filter["labels"] = json!({ "name": { "eq": label.name } });
    }
    if let Some(project) = &team.project {
        filter["project"] = json!({ "id": { "eq": project.id } });
    }
    filter
}

/// Is the cache older than the configured freshness window?
///
/// # Errors
///
/// Returns an error if metadata cannot be read.
pub fn cache_is_stale(db: &CacheDb, config: &Config) -> Result<bool> {
    let Some(last) = db.last_sync()? else {
        return Ok(true);
    };
    let ttl = Duration::seconds(i64::try_from(config.cache_ttl_seconds).unwrap_or(i64::MAX));
    Ok(Utc::now() - last >= ttl)
}

/// Bring the cache up to date unless it is already fresh.
///
/// Performs no work in local-only mode or inside the freshness window
/// (unless `force`). Network errors propagate; read commands catch them
/// and degrade to cache-only with a staleness notice.
///
/// # Errors
///
/// Propagates storage, network, and auth failures.
pub fn ensure_fresh(
    db: &mut CacheDb,
    config: &Config,
    paths: &LbPaths,
    force: bool,
) -> Result<Option<SyncOutcome>> {
    if config.local_only {
        return Ok(None);
    }
    if !force && !cache_is_stale(db, config)? {
        return Ok(None);
    }
    let client = RemoteClient::new(config.require_api_key()?)?;
    smart_sync(db, &client, config, paths, false).map(Some)
}

/// Should the next sync be a full paginated pull?
///
/// # Errors
///
/// Returns an error if metadata cannot be read.
pub fn needs_full_sync(db: &CacheDb, run_count: u64) -> Result<bool> {
    if run_count % FULL_SYNC_EVERY_N_RUNS == 0 {
        return Ok(true);
    }
    match db.last_full_sync()? {
        Some(last) => Ok(Utc::now() - last > Duration::hours(FULL_SYNC_MAX_AGE_HOURS)),
        None => Ok(true),
    }
}

/// Push the outbox, then pull — incrementally when possible, full
/// paginated otherwise. A full pass that would run while a worker is
/// alive is left to that worker; the foreground still pulls
/// incrementally so its output is fresh.
///
/// # Errors
///
/// Propagates push and pull failures. Auth failures abort immediately.
pub fn smart_sync(
    db: &mut CacheDb,
    client: &RemoteClient,
    config: &Config,
    paths: &LbPaths,
    force_full: bool,
) -> Result<SyncOutcome> {
    let team = resolve_team(client, config, db)?;
    let pushed = push_outbox(db, client, &team, config)?;

    let run_count = db.bump_sync_run_count()?;
    let mut full = force_full || needs_full_sync(db, run_count)?;
    if full && !force_full && PidFile::new(paths.pid_path()).is_alive() {
        debug!("deferring full sync to the running worker");
        full = false;
    }
    // Incremental needs a watermark; without one only a full pull is sound.
    let last_sync = db.last_sync()?;
    if !full && last_sync.is_none() {
        full = true;
    }

    let outcome = if full {
        let (pulled, pruned) = full_pull(db, client, &team, config)?;
        SyncOutcome {
            mode: SyncMode::Full,
            pushed,
            pulled,
            pruned,
        }
    } else {
        let pulled = incremental_pull(db, client, &team, config)?;
        SyncOutcome {
            mode: SyncMode::Incremental,
            pushed,
            pulled,
            pruned: 0,
        }
    };

    info!(
        mode = ?outcome.mode,
        pushed = outcome.pushed.success,
        push_failed = outcome.pushed.failed,
        pulled = outcome.pulled,
        pruned = outcome.pruned,
        "sync complete"
    );
    Ok(outcome)
}

/// Drain the outbox inline with the same executor the worker uses.
///
/// # Errors
///
/// Auth failures abort; other failures are recorded on the row and
/// counted.
pub fn push_outbox(
    db: &mut CacheDb,
    client: &RemoteClient,
    team: &ResolvedTeam,
    config: &Config,
) -> Result<PushStats> {
    let mut stats = PushStats::default();
    let items = db.peek_outbox()?;
    for item in items {
        match crate::worker::execute_item(db, client, team, config, &item) {
            Ok(_) => {
                db.ack_outbox(item.id)?;
                stats.success += 1;
            }
            Err(e @ LbError::Auth { .. }) => {
                db.fail_outbox(item.id, &e.to_string())?;
                return Err(e);
            }
            Err(e) => {
                warn!(item = item.id, error = %e, "outbox push failed");
                db.fail_outbox(item.id, &e.to_string())?;
                stats.failed += 1;
            }
        }
    }
    Ok(stats)
}

/// Incremental pull: only issues with `updated_at > last_sync`.
///
/// # Errors
///
/// Propagates pull failures.
pub fn incremental_pull(
    db: &mut CacheDb,
    client: &RemoteClient,
    team: &ResolvedTeam,
    config: &Config,
) -> Result<usize> {
    let since = db.last_sync()?;
    let filter = scope_filter(team);
    let mut cursor: Option<String> = None;
    let mut pulled = 0;

    loop {
        let page = client.issues_page(&filter, cursor.as_deref(), since)?;
        pulled += page.nodes.len();
        apply_page(db, &page.nodes, config)?;
        if !page.has_next {
            break;
        }
        cursor = page.end_cursor;
    }

    db.mark_last_sync(Utc::now())?;
    debug!(pulled, "incremental pull complete");
    Ok(pulled)
}

/// Full paginated pull: fetch every repo-scoped issue in pages of 100,
/// then clear-and-refill the issues table. Returns `(pulled, pruned)`.
///
/// # Errors
///
/// Propagates pull failures; nothing is cleared until the whole pull
/// succeeded.
pub fn full_pull(
    db: &mut CacheDb,
    client: &RemoteClient,
    team: &ResolvedTeam,
    config: &Config,
) -> Result<(usize, usize)> {
    let filter = scope_filter(team);
    let mut cursor: Option<String> = None;
    let mut issues: Vec<Issue> = Vec::new();
    let mut parent_edges: Vec<(String, String)> = Vec::new();

    let progress = if std::io::stderr().is_terminal() {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Some(bar)
    } else {
        None
    };

    loop {
        let page = client.issues_page(&filter, cursor.as_deref(), None)?;
        for remote in &page.nodes {
            let (issue, parent) = issue_from_remote(remote, config.use_issue_types);
            if let Some(parent) = parent {
                parent_edges.push((issue.identifier.clone(), parent));
            }
            issues.push(issue);
        }
        if let Some(bar) = &progress {
            bar.set_message(format!("pulled {} issues", issues.len()));
            bar.tick();
        }
        if !page.has_next {
            break;
        }
        cursor = page.end_cursor;
    }

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    let pulled = issues.len();
    let pruned = db.replace_all_issues(&issues, &parent_edges)?;
    db.mark_last_full_sync(Utc::now())?;
    info!(pulled, pruned, "full pull complete");
    Ok((pulled, pruned))
}

fn apply_page(db: &mut CacheDb, nodes: &[crate::remote::RemoteIssue], config: &Config) -> Result<()> {
    let mut issues = Vec::with_capacity(nodes.len());
    let mut parents = Vec::new();
    for remote in nodes {
        let (issue, parent) = issue_from_remote(remote, config.use_issue_types);
        if let Some(parent) = parent {
            parents.push((issue.identifier.clone(), parent));
        }
        issues.push(issue);
    }
    db.upsert_issues(&issues)?;
    for (child, parent) in parents {
        db.upsert_dep(&Dependency::new(child, parent, DependencyType::ParentChild).by("sync"))?;
    }
    Ok(())
}

/// Targeted hydration for `show <id> --sync`: fetch one issue with its
/// outgoing and inverse relations and make the local edge set match.
///
/// # Errors
///
/// Propagates fetch failures (callers may treat them as best-effort).
pub fn hydrate_relations(
    db: &mut CacheDb,
    client: &RemoteClient,
    identifier: &str,
    config: &Config,
) -> Result<Issue> {
    let (remote, outgoing, incoming) = client.issue_with_relations(identifier)?;
    let (issue, parent) = issue_from_remote(&remote, config.use_issue_types);
    db.upsert_issue(&issue)?;
    if let Some(parent) = parent {
        db.upsert_dep(
            &Dependency::new(issue.identifier.clone(), parent, DependencyType::ParentChild)
                .by("sync"),
        )?;
    }

    // The fetched view is authoritative for this issue's relations.
    db.clear_relation_edges(&issue.identifier)?;
    for rel in outgoing {
        db.upsert_dep(
            &Dependency::new(issue.identifier.clone(), rel.other.identifier.clone(), rel.dep_type())
                .by("sync"),
        )?;
    }
    for rel in incoming {
        db.upsert_dep(
            &Dependency::new(rel.other.identifier.clone(), issue.identifier.clone(), rel.dep_type())
                .by("sync"),
        )?;
    }
    Ok(issue)
}

/// Batched relation hydration, up to 10 concurrent Remote requests.
/// Individual failures are logged and skipped.
///
/// # Errors
///
/// Returns an error only when applying fetched edges to the store fails.
pub fn hydrate_relations_batch(
    db: &mut CacheDb,
    client: &RemoteClient,
    identifiers: &[String],
) -> Result<usize> {
    let mut hydrated = 0;
    for chunk in identifiers.chunks(HYDRATION_CONCURRENCY) {
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|id| {
                    let client = client.clone();
                    scope.spawn(move || (id.clone(), client.relations_of(id)))
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        for joined in results {
            let Ok((identifier, fetched)) = joined else {
                warn!("relation hydration thread panicked");
                continue;
            };
            let (outgoing, incoming) = match fetched {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(identifier = %identifier, error = %e, "relation hydration failed");
                    continue;
                }
            };
            db.clear_relation_edges(&identifier)?;
            for rel in outgoing {
                db.upsert_dep(
                    &Dependency::new(identifier.clone(), rel.other.identifier.clone(), rel.dep_type())
                        .by("sync"),
                )?;
            }
            for rel in incoming {
                db.upsert_dep(
                    &Dependency::new(rel.other.identifier.clone(), identifier.clone(), rel.dep_type())
                        .by("sync"),
                )?;
            }
            hydrated += 1;
        }
    }
    Ok(hydrated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team_fixture(label: Option<&str>, project: Option<&str>) -> ResolvedTeam {
        ResolvedTeam {
            team: RemoteTeam {
                id: "t1".to_string(),
                key: "TEAM".to_string(),
                name: "Team".to_string(),
            },
            viewer: RemoteUser {
                id: "u1".to_string(),
                name: "Dev".to_string(),
                email: "dev@example.com".to_string(),
            },
            states: Vec::new(),
            repo_label: label.map(|name| RemoteLabel {
                id: "l1".to_string(),
                name: name.to_string(),
                parent: None,
            }),
            project: project.map(|name| RemoteProject {
                id: "p1".to_string(),
                name: name.to_string(),
            }),
        }
    }

    #[test]
    fn test_scope_filter_label_mode() {
        let filter = scope_filter(&team_fixture(Some("repo:widgets"), None));
        assert_eq!(filter["labels"]["name"]["eq"], "repo:widgets");
        assert!(filter.get("project").is_none());
        assert_eq!(filter["team"]["id"]["eq"], "t1");
    }

    #[test]
    fn test_scope_filter_both_intersects() {
        let filter = scope_filter(&team_fixture(Some("repo:widgets"), Some("widgets")));
        assert!(filter.get("labels").is_some());
        assert_eq!(filter["project"]["id"]["eq"], "p1");
    }

    #[test]
    fn test_needs_full_sync_every_third_run() {
        let db = CacheDb::open_memory().unwrap();
        // Counter multiple of 3 forces a full pass regardless of age.
        assert!(needs_full_sync(&db, 3).unwrap());
        assert!(needs_full_sync(&db, 6).unwrap());
    }

    #[test]
    fn test_needs_full_sync_when_never_synced() {
        let db = CacheDb::open_memory().unwrap();
        assert!(needs_full_sync(&db, 1).unwrap());
    }

    #[test]
    fn test_needs_full_sync_false_after_recent_full() {
        let mut db = CacheDb::open_memory().unwrap();
        db.mark_last_full_sync(Utc::now()).unwrap();
        assert!(!needs_full_sync(&db, 1).unwrap());
        assert!(needs_full_sync(&db, 3).unwrap());
    }

    #[test]
    fn test_cache_is_stale() {
        let mut db = CacheDb::open_memory().unwrap();
        let config = Config {
            api_key: None,
            team_key: None,
            team_id: None,
            repo_name: "r".to_string(),
            repo_scope: crate::config::RepoScope::Label,
            use_issue_types: false,
            cache_ttl_seconds: 120,
            local_only: false,
        };
        assert!(cache_is_stale(&db, &config).unwrap());
        db.mark_last_sync(Utc::now()).unwrap();
        assert!(!cache_is_stale(&db, &config).unwrap());
        db.mark_last_sync(Utc::now() - Duration::seconds(300)).unwrap();
        assert!(cache_is_stale(&db, &config).unwrap());
    }
}
