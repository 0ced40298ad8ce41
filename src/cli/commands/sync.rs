//! Sync command implementation.

use crate::cli::SyncArgs;
use crate::cli::commands::{self};
use crate::error::{LbError, Result};
use crate::sync::SyncMode;

/// Execute the sync command: push the outbox, then pull.
///
/// Offline is a distinctive failure here (unlike reads): report the
/// pending outbox size and exit non-zero, leaving all state intact.
///
/// # Errors
///
/// Returns `Offline` when the Remote is unreachable.
pub fn execute(args: &SyncArgs, json: bool) -> Result<()> {
    let mut ctx = commands::open_ctx(args.team.clone())?;

    if ctx.config.local_only {
        if json {
            commands::print_json(&serde_json::json!({ "local_only": true }))?;
        } else {
            println!("local-only mode; nothing to sync");
        }
        return Ok(());
    }

    let client = ctx.client()?;
    let result = crate::sync::smart_sync(&mut ctx.db, &client, &ctx.config, &ctx.paths, args.full);
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) if e.is_transient() => {
            let pending = ctx.db.outbox_len().unwrap_or(0);
            return Err(LbError::Offline { pending });
        }
        Err(e) => return Err(e),
    };

    ctx.request_export();

    if json {
        return commands::print_json(&outcome);
    }

    let mode = match outcome.mode {
        SyncMode::Full => "full",
        SyncMode::Incremental => "incremental",
    };
    println!(
        "Synced ({mode}): pushed {} ({} failed), pulled {}, pruned {}",
        outcome.pushed.success, outcome.pushed.failed, outcome.pulled, outcome.pruned
    );
    if outcome.pushed.failed > 0 {
        eprintln!("note: failed pushes stay queued and will be retried");
    }
    Ok(())
}
