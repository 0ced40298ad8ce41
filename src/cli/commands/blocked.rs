//! Blocked command implementation.

use crate::cli::ListArgs;
use crate::cli::commands::{self};
use crate::cli::commands::list::Filters;
use crate::error::Result;
use crate::format::{issue_line, terminal_width};
use crate::model::Status;
use crate::util::identifier_sort_key;
use serde::Serialize;
use std::io::IsTerminal;

#[derive(Debug, Serialize)]
struct BlockedEntry {
    #[serde(flatten)]
    issue: crate::model::Issue,
    blocked_by: Vec<String>,
}

/// Execute the blocked command: every non-closed issue in the blocked
/// set, with the open issues blocking it.
///
/// # Errors
///
/// Returns an error on storage failure; network failures degrade to the
/// cache with a notice.
pub fn execute(args: &ListArgs, json: bool) -> Result<()> {
    let filters = Filters::parse(args)?;

    let mut ctx = commands::open_ctx(args.team.clone())?;
    ctx.ensure_fresh_tolerant(args.sync)?;

    let blocked_set = ctx.db.blocked_set()?;
    let mut entries: Vec<BlockedEntry> = ctx
        .db
        .list_issues()?
        .into_iter()
        .filter(|issue| issue.status != Status::Closed)
        .filter(|issue| filters.matches(issue))
        .filter_map(|issue| {
            blocked_set.get(&issue.identifier).map(|blockers| {
                let mut blocked_by = blockers.clone();
                blocked_by.sort();
                blocked_by.dedup();
                BlockedEntry { issue, blocked_by }
            })
        })
        .collect();
    entries.sort_by_key(|entry| identifier_sort_key(&entry.issue.identifier));

    if json {
        return commands::print_json(&entries);
    }

    if entries.is_empty() {
        println!("No blocked issues");
        return Ok(());
    }

    let use_color = commands::use_color();
    let max_width = std::io::stdout()
        .is_terminal()
        .then(terminal_width);
    for entry in &entries {
        println!("{}", issue_line(&entry.issue, use_color, max_width));
        println!("    blocked by: {}", entry.blocked_by.join(", "));
    }
    Ok(())
}
