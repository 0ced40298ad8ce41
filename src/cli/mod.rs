//! CLI definitions.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "lb",
    version,
    about = "Offline-first mirror of your Linear workspace",
    long_about = "Reads are served instantly from a local cache; writes are queued to a \
                  durable outbox and pushed by a detached background worker."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Emit machine-readable JSON on stdout
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Internal: re-enter as the background worker
    #[arg(long, hide = true, exclusive = true)]
    pub worker: bool,

    /// Internal: re-enter as the export child
    #[arg(long = "export-worker", hide = true, exclusive = true)]
    pub export_worker: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize this repo: create .lb/ and the per-repo config
    Init(InitArgs),
    /// Store or inspect the Remote credential
    Auth(AuthArgs),
    /// Show the authenticated user
    Whoami,
    /// List cached issues
    List(ListArgs),
    /// Open issues with no open blockers, yours or unassigned
    Ready(ListArgs),
    /// Non-closed issues that are blocked, with their blockers
    Blocked(ListArgs),
    /// Show one issue (use --sync to hydrate its relations)
    Show(ShowArgs),
    /// Create an issue
    Create(CreateArgs),
    /// Update fields of an issue
    Update(UpdateArgs),
    /// Close an issue
    Close(CloseArgs),
    /// Delete an issue
    Delete(DeleteArgs),
    /// Manage dependencies
    Dep {
        #[command(subcommand)]
        command: DepCommands,
    },
    /// Push queued writes, then pull from the Remote
    Sync(SyncArgs),
    /// Import issues from a beads JSONL export
    Import(ImportArgs),
    /// Write the canonical JSONL snapshot
    Export(ExportArgs),
    /// One-off migrations of the Remote workspace
    Migrate {
        #[command(subcommand)]
        command: MigrateCommands,
    },
    /// Print the agent onboarding guide
    Onboard(OnboardArgs),
}

#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Overwrite an existing per-repo config
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Default)]
pub struct AuthArgs {
    /// API key (reads stdin when omitted)
    #[arg(long)]
    pub key: Option<String>,

    /// Team short code to store alongside the credential
    #[arg(long)]
    pub team: Option<String>,

    /// Print the stored credential (masked)
    #[arg(long)]
    pub show: bool,

    /// Remove the stored credential
    #[arg(long)]
    pub clear: bool,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Filter by status (open, in_progress, closed)
    #[arg(short = 's', long = "status")]
    pub status: Option<String>,

    /// Filter by priority (0-4, P0-P4)
    #[arg(short = 'p', long = "priority")]
    pub priority: Option<String>,

    /// Filter by type (bug, feature, task, epic, chore)
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// list: include closed issues; ready: ignore the assignee filter
    #[arg(long)]
    pub all: bool,

    /// Force a sync before reading
    #[arg(long)]
    pub sync: bool,

    /// Team short code override
    #[arg(long)]
    pub team: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Issue identifier (e.g. TEAM-123)
    pub id: String,

    /// Fetch this issue and its relations from the Remote first
    #[arg(long)]
    pub sync: bool,
}

#[derive(Args, Debug, Default)]
pub struct CreateArgs {
    /// Issue title
    pub title: String,

    /// Description body
    #[arg(short = 'd', long)]
    pub description: Option<String>,

    /// Issue type (bug, feature, task, epic, chore)
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// Priority (0-4, 0 = most urgent)
    #[arg(short = 'p', long)]
    pub priority: Option<String>,

    /// Parent issue identifier
    #[arg(long)]
    pub parent: Option<String>,

    /// This issue blocks the given issue (repeatable)
    #[arg(long)]
    pub blocks: Vec<String>,

    /// This issue is blocked by the given issue (repeatable)
    #[arg(long = "blocked-by")]
    pub blocked_by: Vec<String>,

    /// Related issue (repeatable)
    #[arg(long)]
    pub related: Vec<String>,

    /// Issue this was discovered from (repeatable)
    #[arg(long = "discovered-from")]
    pub discovered_from: Vec<String>,

    /// Legacy comma-separated dependency list (type:ID,...)
    #[arg(long)]
    pub deps: Option<String>,

    /// Assignee email, or "me"
    #[arg(long)]
    pub assign: Option<String>,

    /// Leave the issue unassigned
    #[arg(long, conflicts_with = "assign")]
    pub unassign: bool,

    /// Create on the Remote inline instead of queueing
    #[arg(long)]
    pub sync: bool,

    /// Team short code override
    #[arg(long)]
    pub team: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Issue identifier
    pub id: String,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New description
    #[arg(short = 'd', long)]
    pub description: Option<String>,

    /// New status (open, in_progress, closed)
    #[arg(short = 's', long)]
    pub status: Option<String>,

    /// New priority (0-4)
    #[arg(short = 'p', long)]
    pub priority: Option<String>,

    /// Assignee email, or "me"
    #[arg(long)]
    pub assign: Option<String>,

    /// Clear the assignee
    #[arg(long, conflicts_with = "assign")]
    pub unassign: bool,

    /// New parent issue identifier
    #[arg(long)]
    pub parent: Option<String>,

    /// This issue blocks the given issue (repeatable)
    #[arg(long)]
    pub blocks: Vec<String>,

    /// This issue is blocked by the given issue (repeatable)
    #[arg(long = "blocked-by")]
    pub blocked_by: Vec<String>,

    /// Related issue (repeatable)
    #[arg(long)]
    pub related: Vec<String>,

    /// Update the Remote inline instead of queueing
    #[arg(long)]
    pub sync: bool,

    /// Team short code override
    #[arg(long)]
    pub team: Option<String>,
}

#[derive(Args, Debug)]
pub struct CloseArgs {
    /// Issue identifier
    pub id: String,

    /// Close reason (recorded as a Remote comment)
    #[arg(short = 'r', long)]
    pub reason: Option<String>,

    /// Close on the Remote inline instead of queueing
    #[arg(long)]
    pub sync: bool,

    /// Team short code override
    #[arg(long)]
    pub team: Option<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Issue identifier
    pub id: String,

    /// Skip the confirmation prompt
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Delete on the Remote inline instead of queueing
    #[arg(long)]
    pub sync: bool,

    /// Team short code override
    #[arg(long)]
    pub team: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum DepCommands {
    /// Add a dependency edge
    Add {
        /// Issue identifier
        id: String,

        /// <id> blocks the given issue
        #[arg(long)]
        blocks: Option<String>,

        /// <id> is blocked by the given issue
        #[arg(long = "blocked-by")]
        blocked_by: Option<String>,

        /// <id> is related to the given issue
        #[arg(long)]
        related: Option<String>,
    },
    /// Remove every edge between two issues
    Remove {
        /// First issue identifier
        a: String,
        /// Second issue identifier
        b: String,
    },
    /// Print the dependency tree rooted at an issue
    Tree {
        /// Root issue identifier
        id: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Force a full paginated pull
    #[arg(long)]
    pub full: bool,

    /// Team short code override
    #[arg(long)]
    pub team: Option<String>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Path of the beads JSONL export to import
    #[arg(long)]
    pub source: PathBuf,

    /// Report what would be imported without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Import closed issues too
    #[arg(long)]
    pub include_closed: bool,

    /// Only import issues updated on or after this date
    #[arg(long)]
    pub since: Option<String>,

    /// Re-import even when an import map already exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Default)]
pub struct ExportArgs {
    /// Output path (defaults to .lb/issues.jsonl)
    pub output: Option<PathBuf>,

    /// Output format (only "beads" is supported)
    #[arg(long)]
    pub format: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum MigrateCommands {
    /// Strip type labels from scoped issues, locally and on the Remote
    RemoveTypeLabels {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Move scoped issues into a repo project
    ToProject {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Also remove the repo label from migrated issues
        #[arg(long)]
        remove_label: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct OnboardArgs {
    /// Write the guide to a file instead of stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_worker_flag_parses_alone() {
        let cli = Cli::try_parse_from(["lb", "--worker"]).unwrap();
        assert!(cli.worker);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_create_with_repeatable_relations() {
        let cli = Cli::try_parse_from([
            "lb", "create", "Title", "--blocks", "TEAM-1", "--blocks", "TEAM-2",
            "--blocked-by", "TEAM-3", "-p", "1",
        ])
        .unwrap();
        let Some(Commands::Create(args)) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.blocks, vec!["TEAM-1", "TEAM-2"]);
        assert_eq!(args.blocked_by, vec!["TEAM-3"]);
        assert_eq!(args.priority.as_deref(), Some("1"));
    }

    #[test]
    fn test_assign_conflicts_with_unassign() {
        let parsed = Cli::try_parse_from([
            "lb", "update", "TEAM-1", "--assign", "me", "--unassign",
        ]);
        assert!(parsed.is_err());
    }
}
