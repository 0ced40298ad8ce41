//! List command implementation.

use crate::cli::ListArgs;
use crate::cli::commands::{self};
use crate::error::Result;
use crate::format::{issue_line, terminal_width};
use crate::model::{Issue, IssueType, Priority, Status};
use crate::util::identifier_sort_key;
use std::io::IsTerminal;
use std::str::FromStr;
use tracing::debug;

/// Parsed `-s/-p/-t` filters, shared with `ready` and `blocked`.
#[derive(Debug, Default)]
pub struct Filters {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub issue_type: Option<IssueType>,
}

impl Filters {
    /// Parse and validate filter flags before any side effect.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown values.
    pub fn parse(args: &ListArgs) -> Result<Self> {
        Ok(Self {
            status: args.status.as_deref().map(Status::from_str).transpose()?,
            priority: args
                .priority
                .as_deref()
                .map(Priority::from_str)
                .transpose()?,
            issue_type: args
                .issue_type
                .as_deref()
                .map(IssueType::from_str)
                .transpose()?,
        })
    }

    #[must_use]
    pub fn matches(&self, issue: &Issue) -> bool {
        self.status.map_or(true, |s| issue.status == s)
            && self.priority.map_or(true, |p| issue.priority == p)
            && self.issue_type.map_or(true, |t| issue.issue_type == Some(t))
    }
}

/// Execute the list command.
///
/// # Errors
///
/// Returns an error on storage failure; network failures degrade to the
/// cache with a notice.
pub fn execute(args: &ListArgs, json: bool) -> Result<()> {
    let filters = Filters::parse(args)?;

    let mut ctx = commands::open_ctx(args.team.clone())?;
    ctx.ensure_fresh_tolerant(args.sync)?;

    let mut issues: Vec<Issue> = ctx
        .db
        .list_issues()?
        .into_iter()
        .filter(|issue| args.all || filters.status.is_some() || issue.status != Status::Closed)
        .filter(|issue| filters.matches(issue))
        .collect();
    issues.sort_by_key(|issue| identifier_sort_key(&issue.identifier));
    debug!(count = issues.len(), "listing issues");

    if json {
        return commands::print_json(&issues);
    }

    if issues.is_empty() {
        println!("No issues");
        return Ok(());
    }

    let use_color = commands::use_color();
    let max_width = std::io::stdout()
        .is_terminal()
        .then(terminal_width);
    for issue in &issues {
        println!("{}", issue_line(issue, use_color, max_width));
    }
    Ok(())
}
