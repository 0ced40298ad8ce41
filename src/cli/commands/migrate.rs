//! One-off workspace migrations.
//!
//! `remove-type-labels` undoes type labelling; `to-project` moves the
//! repo scope from a label to a project. Both operate on the currently
//! cached scope (run `sync --full` first for completeness).

use crate::cli::MigrateCommands;
use crate::cli::commands::{self};
use crate::config::RepoScope;
use crate::error::Result;
use crate::model::{Issue, Status};
use crate::remote::client::UpdateIssueInput;
use tracing::{info, warn};

/// Execute a migrate subcommand.
///
/// # Errors
///
/// Returns an error on storage or Remote failure.
pub fn execute(command: &MigrateCommands, json: bool) -> Result<()> {
    match command {
        MigrateCommands::RemoveTypeLabels { dry_run } => remove_type_labels(*dry_run, json),
        MigrateCommands::ToProject {
            dry_run,
            remove_label,
        } => to_project(*dry_run, *remove_label, json),
    }
}

fn remove_type_labels(dry_run: bool, json: bool) -> Result<()> {
    let mut ctx = commands::open_ctx(None)?;

    let typed: Vec<Issue> = ctx
        .db
        .list_issues()?
        .into_iter()
        .filter(|issue| issue.issue_type.is_some())
        .collect();

    if dry_run {
        if json {
            return commands::print_json(&serde_json::json!({
                "would_update": typed.len(),
            }));
        }
        println!("Would strip type labels from {} issues", typed.len());
        return Ok(());
    }

    let remote = if ctx.config.local_only {
        None
    } else {
        Some(ctx.resolve_team()?)
    };

    let mut updated = 0usize;
    for mut issue in typed {
        if let Some((client, team)) = &remote {
            let Some(remote_id) = issue.remote_id.clone() else {
                continue;
            };
            // Keep only the repo-scope label; the label set is replaced
            // wholesale, which is what drops the type label.
            let keep: Vec<String> = team
                .repo_label
                .iter()
                .map(|label| label.id.clone())
                .collect();
            let input = UpdateIssueInput {
                label_ids: Some(keep),
                ..UpdateIssueInput::default()
            };
            if let Err(e) = client.update_issue(&remote_id, &input) {
                warn!(identifier = %issue.identifier, error = %e, "label strip failed");
                continue;
            }
        }
        issue.issue_type = None;
        ctx.db.upsert_issue(&issue)?;
        updated += 1;
    }

    ctx.request_export();
    info!(updated, "type labels removed");
    if json {
        commands::print_json(&serde_json::json!({ "updated": updated }))?;
    } else {
        println!("Stripped type labels from {updated} issues");
        println!("Consider setting \"use_issue_types\": false in .lb/config.jsonc");
    }
    Ok(())
}

fn to_project(dry_run: bool, remove_label: bool, json: bool) -> Result<()> {
    let mut ctx = commands::open_ctx(None)?;

    let issues: Vec<Issue> = ctx
        .db
        .list_issues()?
        .into_iter()
        .filter(|issue| issue.status != Status::Closed && issue.remote_id.is_some())
        .collect();

    if dry_run {
        if json {
            return commands::print_json(&serde_json::json!({
                "would_move": issues.len(),
                "remove_label": remove_label,
            }));
        }
        println!("Would move {} issues into the repo project", issues.len());
        return Ok(());
    }

    let (client, team) = ctx.resolve_team()?;
    let project = client.find_or_create_project(&team.team.id, &ctx.config.repo_name)?;

    let mut moved = 0usize;
    for issue in &issues {
        let Some(remote_id) = issue.remote_id.clone() else {
            continue;
        };
        let input = UpdateIssueInput {
            project_id: Some(project.id.clone()),
            label_ids: remove_label.then(Vec::new),
            ..UpdateIssueInput::default()
        };
        if let Err(e) = client.update_issue(&remote_id, &input) {
            warn!(identifier = %issue.identifier, error = %e, "project move failed");
            continue;
        }
        moved += 1;
    }

    // Flip the repo scope so future pulls use the project filter.
    let mut repo_config = crate::config::load_config_file(&ctx.paths.config_path())?;
    repo_config.repo_scope = Some(RepoScope::Project);
    crate::config::save_repo_config(&ctx.paths, &repo_config)?;

    ctx.request_export();
    info!(moved, project = %project.name, "migrated to project scope");
    if json {
        commands::print_json(&serde_json::json!({
            "moved": moved,
            "project": project.name,
        }))?;
    } else {
        println!("Moved {moved} issues into project \"{}\"", project.name);
        println!("repo_scope set to \"project\" in .lb/config.jsonc");
    }
    Ok(())
}
