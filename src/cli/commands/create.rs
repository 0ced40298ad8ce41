//! Create command implementation.

use crate::cli::CreateArgs;
use crate::cli::commands::{self, CommandCtx};
use crate::error::{LbError, Result};
use crate::model::{
    Dependency, DependencyType, Issue, IssueType, OutboxOp, Priority, PENDING_IDENTIFIER,
};
use crate::outbox::{self, CreatePayload, DeferredRelation};
use crate::util;
use std::str::FromStr;
use tracing::info;

/// Execute the create command.
///
/// Validation happens before any cache or queue mutation. The default
/// path caches a placeholder (`pending`) and queues the Remote create;
/// `--sync` creates inline; local-only mode allocates `LOCAL-<n>`.
///
/// # Errors
///
/// Returns an error on validation failure or storage/Remote failure.
pub fn execute(args: &CreateArgs, json: bool) -> Result<()> {
    // Eager validation, before side effects.
    if args.title.trim().is_empty() {
        return Err(LbError::validation("title", "cannot be empty"));
    }
    let priority = args
        .priority
        .as_deref()
        .map(Priority::from_str)
        .transpose()?;
    let issue_type = args
        .issue_type
        .as_deref()
        .map(IssueType::from_str)
        .transpose()?;
    if let Some(parent) = &args.parent {
        util::validate_identifier(parent)?;
    }
    let relations = commands::parse_relations(
        &args.blocks,
        &args.blocked_by,
        &args.related,
        &args.discovered_from,
        args.deps.as_deref(),
    )?;
    let assignee = resolve_assign_flags(args.assign.as_deref(), args.unassign);

    let mut ctx = commands::open_ctx(args.team.clone())?;

    let payload = CreatePayload {
        title: args.title.trim().to_string(),
        description: args.description.clone(),
        priority,
        issue_type,
        assignee: assignee.clone(),
        parent: args.parent.clone(),
        relations: relations.clone(),
    };

    let issue = if ctx.config.local_only {
        create_local(&mut ctx, &payload)?
    } else if args.sync {
        let (client, team) = ctx.resolve_team()?;
        let touched = ctx.execute_inline(
            &client,
            &team,
            OutboxOp::Create,
            outbox::to_value(&payload)?,
        )?;
        let identifier = touched.first().cloned().ok_or_else(|| {
            LbError::RemoteRejection {
                operation: "issueCreate".to_string(),
                reason: "create returned no identifier".to_string(),
            }
        })?;
        ctx.db
            .get_issue(&identifier)?
            .ok_or(LbError::IssueNotFound { id: identifier })?
    } else {
        // Optimistic placeholder so list/show reflect the write at once;
        // the worker swaps in the real identifier when the Remote confirms.
        let mut placeholder = Issue::new(PENDING_IDENTIFIER, payload.title.clone());
        placeholder.description = payload.description.clone();
        placeholder.priority = priority.unwrap_or_default();
        placeholder.issue_type = issue_type;
        placeholder.assignee = assignee;
        ctx.db.upsert_issue(&placeholder)?;
        ctx.enqueue_and_signal(OutboxOp::Create, outbox::to_value(&payload)?)?;
        info!(title = %payload.title, "queued create");
        placeholder
    };

    ctx.request_export();

    if json {
        commands::print_json(&issue)?;
    } else if issue.is_pending() {
        println!("Queued: {} (identifier pending)", issue.title);
    } else {
        println!("Created {}: {}", issue.identifier, issue.title);
    }
    Ok(())
}

fn resolve_assign_flags(assign: Option<&str>, unassign: bool) -> Option<String> {
    if unassign {
        return None;
    }
    assign.map(str::to_string)
}

/// Local-only create: allocate `LOCAL-<n>` and write rows directly.
fn create_local(ctx: &mut CommandCtx, payload: &CreatePayload) -> Result<Issue> {
    if payload.assignee.as_deref() == Some("me") {
        return Err(LbError::validation(
            "assign",
            "\"me\" needs a Remote viewer; use an email in local-only mode",
        ));
    }

    let n = ctx.db.next_local_id()?;
    let identifier = format!("{}-{n}", crate::model::LOCAL_PREFIX);

    let mut issue = Issue::new(identifier.clone(), payload.title.clone());
    issue.description = payload.description.clone();
    issue.priority = payload.priority.unwrap_or_default();
    issue.issue_type = payload.issue_type;
    issue.assignee = payload.assignee.clone();
    ctx.db.upsert_issue(&issue)?;

    if let Some(parent) = &payload.parent {
        ctx.db.upsert_dep(&Dependency::new(
            identifier.clone(),
            parent.clone(),
            DependencyType::ParentChild,
        ))?;
    }
    for DeferredRelation {
        dep_type,
        target,
        inverse,
    } in &payload.relations
    {
        let (from, to) = if *inverse {
            (target.clone(), identifier.clone())
        } else {
            (identifier.clone(), target.clone())
        };
        ctx.db.upsert_dep(&Dependency::new(from, to, *dep_type))?;
    }

    info!(identifier = %identifier, "created local issue");
    Ok(issue)
}
