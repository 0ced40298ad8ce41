//! Close command implementation.

use crate::cli::CloseArgs;
use crate::cli::commands::{self};
use crate::error::{LbError, Result};
use crate::model::{OutboxOp, Status};
use crate::outbox::{self, ClosePayload};
use crate::util;
use tracing::info;

/// Execute the close command.
///
/// # Errors
///
/// Returns an error on unknown issue or storage/Remote failure.
pub fn execute(args: &CloseArgs, json: bool) -> Result<()> {
    util::validate_identifier(&args.id)?;

    let mut ctx = commands::open_ctx(args.team.clone())?;
    let mut issue = ctx
        .db
        .get_issue(&args.id)?
        .ok_or_else(|| LbError::IssueNotFound {
            id: args.id.clone(),
        })?;

    if issue.status == Status::Closed {
        if !json {
            println!("{} is already closed", issue.identifier);
        } else {
            commands::print_json(&issue)?;
        }
        return Ok(());
    }

    // Optimistic close: closed_at is set the moment the user closes it.
    crate::worker::apply_status_locally(&mut issue, Status::Closed);
    ctx.db.upsert_issue(&issue)?;

    let payload = ClosePayload {
        id: args.id.clone(),
        reason: args.reason.clone(),
    };

    if ctx.config.local_only {
        // Cache write is authoritative.
    } else if args.sync {
        let (client, team) = ctx.resolve_team()?;
        ctx.execute_inline(&client, &team, OutboxOp::Close, outbox::to_value(&payload)?)?;
        issue = ctx
            .db
            .get_issue(&args.id)?
            .ok_or_else(|| LbError::IssueNotFound {
                id: args.id.clone(),
            })?;
    } else {
        ctx.enqueue_and_signal(OutboxOp::Close, outbox::to_value(&payload)?)?;
        info!(identifier = %args.id, "queued close");
    }

    ctx.request_export();

    if json {
        commands::print_json(&issue)?;
    } else {
        match &args.reason {
            Some(reason) => println!("Closed {} ({reason})", issue.identifier),
            None => println!("Closed {}", issue.identifier),
        }
    }
    Ok(())
}
