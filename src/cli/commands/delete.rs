//! Delete command implementation.

use crate::cli::DeleteArgs;
use crate::cli::commands::{self};
use crate::error::{LbError, Result};
use crate::model::OutboxOp;
use crate::outbox::{self, DeletePayload};
use crate::util;
use tracing::info;

/// Execute the delete command.
///
/// The cache row goes away immediately; the Remote delete is queued (the
/// payload carries the Remote id captured before removal) or run inline.
///
/// # Errors
///
/// Returns an error on unknown issue or storage/Remote failure.
pub fn execute(args: &DeleteArgs, json: bool) -> Result<()> {
    util::validate_identifier(&args.id)?;

    let mut ctx = commands::open_ctx(args.team.clone())?;
    let issue = ctx
        .db
        .get_issue(&args.id)?
        .ok_or_else(|| LbError::IssueNotFound {
            id: args.id.clone(),
        })?;

    let prompt = format!("Delete {} \"{}\"?", issue.identifier, issue.title);
    if !commands::confirm_or_force(&prompt, args.force)? {
        println!("Aborted");
        return Ok(());
    }

    // Capture the Remote id before the row disappears.
    let payload = DeletePayload {
        id: issue.identifier.clone(),
        remote_id: issue.remote_id.clone(),
    };

    ctx.db.delete_issue(&args.id)?;

    if ctx.config.local_only || payload.remote_id.is_none() {
        // A row the Remote never saw needs no push.
    } else if args.sync {
        let (client, team) = ctx.resolve_team()?;
        ctx.execute_inline(&client, &team, OutboxOp::Delete, outbox::to_value(&payload)?)?;
    } else {
        ctx.enqueue_and_signal(OutboxOp::Delete, outbox::to_value(&payload)?)?;
        info!(identifier = %args.id, "queued delete");
    }

    ctx.request_export();

    if json {
        commands::print_json(&serde_json::json!({
            "deleted": issue.identifier,
        }))?;
    } else {
        println!("Deleted {}", issue.identifier);
    }
    Ok(())
}
