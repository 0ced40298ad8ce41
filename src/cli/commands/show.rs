//! Show command implementation.

use crate::cli::ShowArgs;
use crate::cli::commands::{self};
use crate::error::{LbError, Result};
use crate::format::issue_panel;
use crate::util;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ShowOutput {
    #[serde(flatten)]
    issue: crate::model::Issue,
    dependencies: Vec<crate::model::Dependency>,
    dependents: Vec<crate::model::Dependency>,
}

/// Execute the show command.
///
/// `--sync` fetches this one issue with its outgoing and inverse
/// relations from the Remote (the only place bulk-unfetched relations
/// get hydrated), then serves the reconciled local view.
///
/// # Errors
///
/// Returns an error on unknown issue or storage failure.
pub fn execute(args: &ShowArgs, json: bool) -> Result<()> {
    util::validate_identifier(&args.id)
        .or_else(|_| {
            // `show pending` is allowed: it is the placeholder's name.
            if args.id.starts_with(crate::model::PENDING_IDENTIFIER) {
                Ok(())
            } else {
                Err(LbError::InvalidId {
                    id: args.id.clone(),
                })
            }
        })?;

    let mut ctx = commands::open_ctx(None)?;

    if args.sync && !ctx.config.local_only {
        let client = ctx.client()?;
        match crate::sync::hydrate_relations(&mut ctx.db, &client, &args.id, &ctx.config) {
            Ok(_) => debug!(identifier = %args.id, "hydrated relations"),
            Err(e) if e.is_transient() => {
                eprintln!("note: offline; serving cached relations");
            }
            Err(e) => return Err(e),
        }
        ctx.request_export();
    }

    let issue = ctx
        .db
        .get_issue(&args.id)?
        .ok_or_else(|| LbError::IssueNotFound {
            id: args.id.clone(),
        })?;
    let dependencies = ctx.db.list_deps_out(&args.id)?;
    let dependents = ctx.db.list_deps_in(&args.id)?;

    if json {
        return commands::print_json(&ShowOutput {
            issue,
            dependencies,
            dependents,
        });
    }

    print!(
        "{}",
        issue_panel(&issue, &dependencies, &dependents, commands::use_color())
    );
    Ok(())
}
