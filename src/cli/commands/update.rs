//! Update command implementation.

use crate::cli::UpdateArgs;
use crate::cli::commands::{self};
use crate::error::{LbError, Result};
use crate::model::{Dependency, OutboxOp, Priority, Status};
use crate::outbox::{self, RelationPayload, UpdatePayload};
use crate::util;
use std::str::FromStr;
use tracing::info;

/// Execute the update command.
///
/// The cache is mutated optimistically first, then the intended Remote
/// mutation is queued (or run inline with `--sync`).
///
/// # Errors
///
/// Returns an error on validation failure, unknown issue, or
/// storage/Remote failure.
pub fn execute(args: &UpdateArgs, json: bool) -> Result<()> {
    util::validate_identifier(&args.id)?;
    let status = args.status.as_deref().map(Status::from_str).transpose()?;
    let priority = args
        .priority
        .as_deref()
        .map(Priority::from_str)
        .transpose()?;
    if let Some(title) = args.title.as_deref() {
        if title.trim().is_empty() {
            return Err(LbError::validation("title", "cannot be empty"));
        }
    }
    if let Some(parent) = &args.parent {
        util::validate_identifier(parent)?;
    }
    let relations = commands::parse_relations(
        &args.blocks,
        &args.blocked_by,
        &args.related,
        &[],
        None,
    )?;
    let assignee: Option<Option<String>> = if args.unassign {
        Some(None)
    } else {
        args.assign.as_ref().map(|email| Some(email.clone()))
    };

    let mut ctx = commands::open_ctx(args.team.clone())?;
    let mut issue = ctx
        .db
        .get_issue(&args.id)?
        .ok_or_else(|| LbError::IssueNotFound {
            id: args.id.clone(),
        })?;

    // Optimistic local write so reads reflect it immediately.
    if let Some(title) = &args.title {
        issue.title = title.clone();
    }
    if let Some(description) = &args.description {
        issue.description = Some(description.clone());
    }
    if let Some(priority) = priority {
        issue.priority = priority;
    }
    if let Some(status) = status {
        crate::worker::apply_status_locally(&mut issue, status);
    }
    if let Some(assignee) = &assignee {
        issue.assignee = assignee.clone();
    }
    issue.updated_at = chrono::Utc::now();
    ctx.db.upsert_issue(&issue)?;

    if let Some(parent) = &args.parent {
        ctx.db.upsert_dep(&Dependency::new(
            args.id.clone(),
            parent.clone(),
            crate::model::DependencyType::ParentChild,
        ))?;
    }
    // Relation flags write local edges now; the Remote edge follows.
    let mut relation_payloads = Vec::new();
    for relation in &relations {
        let (from, to) = if relation.inverse {
            (relation.target.clone(), args.id.clone())
        } else {
            (args.id.clone(), relation.target.clone())
        };
        ctx.db
            .upsert_dep(&Dependency::new(from.clone(), to.clone(), relation.dep_type))?;
        relation_payloads.push(RelationPayload {
            issue_id: from,
            depends_on_id: to,
            dep_type: relation.dep_type,
        });
    }

    let payload = UpdatePayload {
        id: args.id.clone(),
        title: args.title.clone(),
        description: args.description.clone(),
        status,
        priority,
        assignee,
        parent: args.parent.clone(),
    };

    if ctx.config.local_only {
        // Nothing to push; the cache write above is the whole story.
    } else if args.sync {
        let (client, team) = ctx.resolve_team()?;
        ctx.execute_inline(&client, &team, OutboxOp::Update, outbox::to_value(&payload)?)?;
        for relation in &relation_payloads {
            ctx.execute_inline(
                &client,
                &team,
                OutboxOp::CreateRelation,
                outbox::to_value(relation)?,
            )?;
        }
        issue = ctx
            .db
            .get_issue(&args.id)?
            .ok_or_else(|| LbError::IssueNotFound {
                id: args.id.clone(),
            })?;
    } else {
        ctx.db
            .enqueue(OutboxOp::Update, &outbox::to_value(&payload)?)?;
        for relation in &relation_payloads {
            ctx.db
                .enqueue(OutboxOp::CreateRelation, &outbox::to_value(relation)?)?;
        }
        crate::worker::launcher::notify_worker(&ctx.paths)?;
        info!(identifier = %args.id, "queued update");
    }

    ctx.request_export();

    if json {
        commands::print_json(&issue)?;
    } else {
        println!("Updated {}: {}", issue.identifier, issue.title);
    }
    Ok(())
}
