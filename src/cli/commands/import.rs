//! Import command implementation: load a beads JSONL export into this
//! repo, remapping identifiers and recording the mapping in
//! `.lb/import-map.jsonl`.

use crate::cli::ImportArgs;
use crate::cli::commands::{self, CommandCtx};
use crate::error::{LbError, Result};
use crate::model::{
    Dependency, DependencyType, Issue, IssueType, OutboxOp, Priority, Status,
};
use crate::outbox::{self, CreatePayload, RelationPayload, UpdatePayload};
use crate::remote::RemoteClient;
use crate::sync::ResolvedTeam;
use crate::util::time::parse_flexible_date;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, IsTerminal, Write as _};
use std::str::FromStr;
use tracing::{info, warn};

/// One line of a beads export; unknown fields are ignored, absent ones
/// defaulted, so exports from different beads versions all load.
#[derive(Debug, Deserialize)]
struct ImportRecord {
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    issue_type: Option<String>,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    dependencies: Vec<ImportDep>,
}

#[derive(Debug, Deserialize)]
struct ImportDep {
    issue_id: String,
    depends_on_id: String,
    #[serde(rename = "type", default)]
    dep_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct MapEntry<'a> {
    bd_id: &'a str,
    lb_id: &'a str,
}

/// Execute the import command.
///
/// # Errors
///
/// Returns an error on parse failure, a pre-existing import map without
/// `--force`, or storage/Remote failure.
pub fn execute(args: &ImportArgs, json: bool) -> Result<()> {
    let since = args
        .since
        .as_deref()
        .map(|s| parse_flexible_date(s, "since"))
        .transpose()?;

    let mut ctx = commands::open_ctx(None)?;
    ctx.paths.ensure_dir()?;

    let map_path = ctx.paths.import_map_path();
    if map_path.exists() && !args.force && !args.dry_run {
        return Err(LbError::Config(format!(
            "{} exists; this repo was already imported (use --force to repeat)",
            map_path.display()
        )));
    }

    let records = read_records(args)?;
    let mut selected: Vec<&ImportRecord> = Vec::new();
    let mut skipped_closed = 0usize;
    let mut skipped_old = 0usize;
    let mut skipped_deleted = 0usize;

    for record in &records {
        if record.deleted_at.is_some() {
            skipped_deleted += 1;
            continue;
        }
        let status = map_status(record.status.as_deref());
        if status == Status::Closed && !args.include_closed {
            skipped_closed += 1;
            continue;
        }
        if let (Some(since), Some(updated_at)) = (since, record.updated_at) {
            if updated_at < since {
                skipped_old += 1;
                continue;
            }
        }
        selected.push(record);
    }

    if args.dry_run {
        if json {
            return commands::print_json(&serde_json::json!({
                "would_import": selected.len(),
                "skipped_closed": skipped_closed,
                "skipped_older_than_since": skipped_old,
                "skipped_deleted": skipped_deleted,
            }));
        }
        println!(
            "Would import {} issues ({skipped_closed} closed, {skipped_old} stale, \
             {skipped_deleted} deleted skipped)",
            selected.len()
        );
        return Ok(());
    }

    // Resolve the Remote once when we will be creating there.
    let remote = if ctx.config.local_only {
        None
    } else {
        Some(ctx.resolve_team()?)
    };

    let progress = if std::io::stderr().is_terminal() {
        let bar = ProgressBar::new(selected.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Some(bar)
    } else {
        None
    };

    let mut id_map: HashMap<String, String> = HashMap::new();
    for record in &selected {
        let lb_id = import_one(&mut ctx, remote.as_ref(), record)?;
        id_map.insert(record.id.clone(), lb_id);
        if let Some(bar) = &progress {
            bar.inc(1);
        }
    }
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    // Second pass: dependency edges, remapped through the id map. Edges
    // with an endpoint outside the import are dropped.
    let mut edges = 0usize;
    for record in &selected {
        for dep in &record.dependencies {
            let (Some(from), Some(to)) = (id_map.get(&dep.issue_id), id_map.get(&dep.depends_on_id))
            else {
                continue;
            };
            let dep_type = dep
                .dep_type
                .as_deref()
                .and_then(|value| DependencyType::from_str(value).ok())
                .unwrap_or(DependencyType::Blocks);
            ctx.db
                .upsert_dep(&Dependency::new(from.clone(), to.clone(), dep_type).by("import"))?;
            if remote.is_some() {
                let payload = RelationPayload {
                    issue_id: from.clone(),
                    depends_on_id: to.clone(),
                    dep_type,
                };
                ctx.db
                    .enqueue(OutboxOp::CreateRelation, &outbox::to_value(&payload)?)?;
            }
            edges += 1;
        }
    }
    if remote.is_some() && edges > 0 {
        crate::worker::launcher::notify_worker(&ctx.paths)?;
    }

    write_map(&map_path, &id_map)?;
    ctx.request_export();
    info!(imported = id_map.len(), edges, "import complete");

    if json {
        commands::print_json(&serde_json::json!({
            "imported": id_map.len(),
            "edges": edges,
            "map": map_path,
        }))?;
    } else {
        println!(
            "Imported {} issues and {edges} dependency edges (map: {})",
            id_map.len(),
            map_path.display()
        );
    }
    Ok(())
}

fn read_records(args: &ImportArgs) -> Result<Vec<ImportRecord>> {
    let file = fs::File::open(&args.source)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: ImportRecord =
            serde_json::from_str(trimmed).map_err(|e| LbError::ImportParse {
                line: index + 1,
                reason: e.to_string(),
            })?;
        records.push(record);
    }
    Ok(records)
}

/// Beads has more statuses than the three canonical ones; blocked and
/// deferred fold into open (blocking is derived from edges here).
fn map_status(status: Option<&str>) -> Status {
    match status.unwrap_or("open") {
        "in_progress" => Status::InProgress,
        "closed" | "tombstone" => Status::Closed,
        _ => Status::Open,
    }
}

fn import_one(
    ctx: &mut CommandCtx,
    remote: Option<&(RemoteClient, ResolvedTeam)>,
    record: &ImportRecord,
) -> Result<String> {
    let status = map_status(record.status.as_deref());
    let priority = record
        .priority
        .and_then(|value| Priority::new(value).ok())
        .unwrap_or_default();
    let issue_type = record
        .issue_type
        .as_deref()
        .and_then(|value| IssueType::from_str(value).ok());

    match remote {
        None => {
            let n = ctx.db.next_local_id()?;
            let identifier = format!("{}-{n}", crate::model::LOCAL_PREFIX);
            let mut issue = Issue::new(identifier.clone(), record.title.clone());
            issue.description = record.description.clone();
            issue.status = status;
            issue.priority = priority;
            issue.issue_type = issue_type;
            issue.assignee = record.assignee.clone();
            if let Some(updated_at) = record.updated_at {
                issue.updated_at = updated_at;
            }
            if status == Status::Closed {
                issue.closed_at = record.closed_at.or_else(|| Some(Utc::now()));
            }
            ctx.db.upsert_issue(&issue)?;
            Ok(identifier)
        }
        Some((client, team)) => {
            let payload = CreatePayload {
                title: record.title.clone(),
                description: record.description.clone(),
                priority: Some(priority),
                issue_type,
                assignee: record.assignee.clone(),
                parent: None,
                relations: Vec::new(),
            };
            let touched = ctx.execute_inline(
                client,
                team,
                OutboxOp::Create,
                outbox::to_value(&payload)?,
            )?;
            let identifier = touched.first().cloned().ok_or_else(|| {
                LbError::RemoteRejection {
                    operation: "issueCreate".to_string(),
                    reason: format!("import of '{}' returned no identifier", record.id),
                }
            })?;

            if status != Status::Open {
                let update = UpdatePayload {
                    id: identifier.clone(),
                    status: Some(status),
                    ..UpdatePayload::default()
                };
                if let Err(e) = ctx.execute_inline(
                    client,
                    team,
                    OutboxOp::Update,
                    outbox::to_value(&update)?,
                ) {
                    warn!(identifier = %identifier, error = %e, "imported status not applied");
                }
            }
            Ok(identifier)
        }
    }
}

fn write_map(path: &std::path::Path, id_map: &HashMap<String, String>) -> Result<()> {
    let mut pairs: Vec<(&String, &String)> = id_map.iter().collect();
    pairs.sort();
    let mut file = fs::File::create(path)?;
    for (bd_id, lb_id) in pairs {
        let entry = MapEntry { bd_id, lb_id };
        file.write_all(serde_json::to_string(&entry)?.as_bytes())?;
        file.write_all(b"\n")?;
    }
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_status_folds_noncanonical() {
        assert_eq!(map_status(Some("blocked")), Status::Open);
        assert_eq!(map_status(Some("deferred")), Status::Open);
        assert_eq!(map_status(Some("in_progress")), Status::InProgress);
        assert_eq!(map_status(Some("tombstone")), Status::Closed);
        assert_eq!(map_status(None), Status::Open);
    }

    #[test]
    fn test_record_parses_minimal_line() {
        let record: ImportRecord =
            serde_json::from_str(r#"{"id":"bd-1","title":"just a title"}"#).unwrap();
        assert_eq!(record.id, "bd-1");
        assert!(record.dependencies.is_empty());
        assert!(record.status.is_none());
    }

    #[test]
    fn test_record_parses_full_line() {
        let record: ImportRecord = serde_json::from_str(
            r#"{"id":"bd-2","title":"t","status":"closed","priority":1,
                "issue_type":"bug","closed_at":"2025-01-01T00:00:00Z",
                "dependencies":[{"issue_id":"bd-2","depends_on_id":"bd-1","type":"blocks"}],
                "unknown_field":"ignored"}"#,
        )
        .unwrap();
        assert_eq!(record.dependencies.len(), 1);
        assert_eq!(record.priority, Some(1));
    }
}
