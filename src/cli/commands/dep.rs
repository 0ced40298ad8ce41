//! Dependency commands: add, remove, tree.

use crate::cli::DepCommands;
use crate::cli::commands::{self};
use crate::error::{LbError, Result};
use crate::model::{Dependency, DependencyType, OutboxOp};
use crate::outbox::{self, RelationPayload};
use crate::util;
use std::collections::HashMap;
use tracing::info;

/// Execute a dep subcommand.
///
/// # Errors
///
/// Returns an error on validation failure or storage/Remote failure.
pub fn execute(command: &DepCommands, json: bool) -> Result<()> {
    match command {
        DepCommands::Add {
            id,
            blocks,
            blocked_by,
            related,
        } => add(id, blocks.as_deref(), blocked_by.as_deref(), related.as_deref(), json),
        DepCommands::Remove { a, b } => remove(a, b, json),
        DepCommands::Tree { id } => tree(id, json),
    }
}

fn add(
    id: &str,
    blocks: Option<&str>,
    blocked_by: Option<&str>,
    related: Option<&str>,
    json: bool,
) -> Result<()> {
    util::validate_identifier(id)?;
    let picked = [blocks, blocked_by, related]
        .iter()
        .filter(|option| option.is_some())
        .count();
    if picked != 1 {
        return Err(LbError::validation(
            "dep",
            "pass exactly one of --blocks, --blocked-by, --related",
        ));
    }

    // `--blocked-by T` is stored as `(T, id, blocks)`: the inverse form.
    let (from, to, dep_type) = if let Some(target) = blocks {
        (id.to_string(), target.to_string(), DependencyType::Blocks)
    } else if let Some(target) = blocked_by {
        (target.to_string(), id.to_string(), DependencyType::Blocks)
    } else if let Some(target) = related {
        (id.to_string(), target.to_string(), DependencyType::Related)
    } else {
        unreachable!("picked == 1 checked above");
    };
    util::validate_identifier(if from == id { &to } else { &from })?;
    if from == to {
        return Err(LbError::validation("dep", "an issue cannot block itself"));
    }

    let mut ctx = commands::open_ctx(None)?;
    ctx.db
        .upsert_dep(&Dependency::new(from.clone(), to.clone(), dep_type))?;

    if !ctx.config.local_only {
        let payload = RelationPayload {
            issue_id: from.clone(),
            depends_on_id: to.clone(),
            dep_type,
        };
        ctx.enqueue_and_signal(OutboxOp::CreateRelation, outbox::to_value(&payload)?)?;
    }
    ctx.request_export();
    info!(from = %from, to = %to, dep_type = %dep_type, "dependency added");

    if json {
        commands::print_json(&serde_json::json!({
            "issue_id": from,
            "depends_on_id": to,
            "type": dep_type,
        }))?;
    } else {
        println!("{from} {dep_type} {to}");
    }
    Ok(())
}

fn remove(a: &str, b: &str, json: bool) -> Result<()> {
    util::validate_identifier(a)?;
    util::validate_identifier(b)?;

    let mut ctx = commands::open_ctx(None)?;

    // Record the edge types before the local rows vanish, so the queued
    // removals hit the right Remote objects (a parent edge needs a
    // detach, anything else a relation delete).
    let existing: Vec<Dependency> = ctx
        .db
        .list_deps_out(a)?
        .into_iter()
        .filter(|dep| dep.depends_on_id == b)
        .chain(
            ctx.db
                .list_deps_out(b)?
                .into_iter()
                .filter(|dep| dep.depends_on_id == a),
        )
        .collect();

    let removed = ctx.db.remove_dep_pair(a, b)?;

    if !ctx.config.local_only && !existing.is_empty() {
        for dep in &existing {
            let payload = RelationPayload {
                issue_id: dep.issue_id.clone(),
                depends_on_id: dep.depends_on_id.clone(),
                dep_type: dep.dep_type,
            };
            ctx.db
                .enqueue(OutboxOp::DeleteRelation, &outbox::to_value(&payload)?)?;
        }
        crate::worker::launcher::notify_worker(&ctx.paths)?;
    }
    ctx.request_export();

    if json {
        commands::print_json(&serde_json::json!({ "removed": removed }))?;
    } else if removed == 0 {
        println!("No edges between {a} and {b}");
    } else {
        println!("Removed {removed} edge{}", if removed == 1 { "" } else { "s" });
    }
    Ok(())
}

fn tree(id: &str, json: bool) -> Result<()> {
    util::validate_identifier(id)?;

    let mut ctx = commands::open_ctx(None)?;
    ctx.ensure_fresh_tolerant(false)?;

    if ctx.db.get_issue(id)?.is_none() {
        return Err(LbError::IssueNotFound { id: id.to_string() });
    }

    let issues: HashMap<String, crate::model::Issue> = ctx
        .db
        .list_issues()?
        .into_iter()
        .map(|issue| (issue.identifier.clone(), issue))
        .collect();
    let deps = ctx.db.all_deps()?;

    if json {
        // The JSON form is the flat edge list; the tree is a text affair.
        let edges: Vec<&Dependency> = deps
            .iter()
            .filter(|dep| {
                matches!(
                    dep.dep_type,
                    DependencyType::Blocks | DependencyType::ParentChild
                )
            })
            .collect();
        return commands::print_json(&edges);
    }

    print!(
        "{}",
        crate::format::dep_tree(id, &issues, &deps, commands::use_color())
    );
    Ok(())
}
