//! Whoami command implementation.

use crate::cli::commands::{self};
use crate::error::Result;

/// Execute the whoami command. The viewer's email is remembered in the
/// cache metadata so `ready` can filter by assignee offline.
///
/// # Errors
///
/// Returns an error on missing credential or Remote failure.
pub fn execute(json: bool) -> Result<()> {
    let mut ctx = commands::open_ctx(None)?;
    let client = ctx.client()?;
    let viewer = client.viewer()?;
    ctx.db.set_meta("viewer_email", &viewer.email)?;

    if json {
        return commands::print_json(&viewer);
    }
    println!("{} <{}>", viewer.name, viewer.email);
    Ok(())
}
