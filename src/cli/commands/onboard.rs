//! Onboard command implementation: the agent-facing usage guide.

use crate::cli::OnboardArgs;
use crate::error::Result;
use std::fs;

const ONBOARD_TEXT: &str = r#"# lb — issue tracking for agents

lb mirrors the team's Linear workspace into this repo. Reads are instant
(local cache); writes queue locally and push in the background. Always
prefer `-j` for machine-readable output.

## The loop

1. `lb ready -j` — open issues with no blockers, yours or unassigned.
2. Pick one; `lb update <ID> -s in_progress --assign me`.
3. Work. Record discoveries: `lb create "..." --discovered-from <ID>`.
4. `lb close <ID> -r "what changed"`.

## Useful commands

- `lb show <ID> --sync -j` — full detail including fresh relations.
- `lb blocked -j` — what is stuck and why.
- `lb dep add <A> --blocks <B>` — A must land before B.
- `lb dep tree <ID>` — the dependency neighborhood.
- `lb sync` — push queued writes and pull now (exit 1 when offline).

## Rules of thumb

- Queued creates print `pending`; the real identifier appears after the
  background worker confirms (check `lb list -j`).
- Blocking is inherited: children of a blocked parent are blocked.
- The canonical snapshot lives at .lb/issues.jsonl; it is safe to diff
  and never contains unconfirmed writes.
"#;

/// Execute the onboard command.
///
/// # Errors
///
/// Returns an error when the output file cannot be written.
pub fn execute(args: &OnboardArgs) -> Result<()> {
    match &args.output {
        Some(path) => {
            fs::write(path, ONBOARD_TEXT)?;
            println!("Wrote onboarding guide to {}", path.display());
        }
        None => print!("{ONBOARD_TEXT}"),
    }
    Ok(())
}
