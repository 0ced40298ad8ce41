//! Ready command implementation.
//!
//! Shows open issues with no open blockers, restricted (unless `--all`)
//! to unassigned issues and those assigned to the viewer.

use crate::cli::ListArgs;
use crate::cli::commands::{self};
use crate::cli::commands::list::Filters;
use crate::error::Result;
use crate::format::{issue_line, terminal_width};
use crate::model::Issue;
use std::io::IsTerminal;
use tracing::debug;

/// Execute the ready command.
///
/// # Errors
///
/// Returns an error on storage failure; network failures degrade to the
/// cache with a notice.
pub fn execute(args: &ListArgs, json: bool) -> Result<()> {
    let filters = Filters::parse(args)?;

    let mut ctx = commands::open_ctx(args.team.clone())?;
    ctx.ensure_fresh_tolerant(args.sync)?;

    let viewer = ctx.viewer_email();
    let ready: Vec<Issue> = ctx
        .db
        .ready_issues(viewer.as_deref(), args.all)?
        .into_iter()
        .filter(|issue| filters.matches(issue))
        .collect();
    debug!(count = ready.len(), "ready issues");

    if json {
        return commands::print_json(&ready);
    }

    if ready.is_empty() {
        println!("No ready issues");
        return Ok(());
    }

    let use_color = commands::use_color();
    let max_width = std::io::stdout()
        .is_terminal()
        .then(terminal_width);
    println!(
        "Ready work ({} issue{} with no blockers):\n",
        ready.len(),
        if ready.len() == 1 { "" } else { "s" }
    );
    for (index, issue) in ready.iter().enumerate() {
        println!("{}. {}", index + 1, issue_line(issue, use_color, max_width));
    }
    Ok(())
}
