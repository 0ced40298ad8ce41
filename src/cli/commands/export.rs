//! Export command implementation: write the canonical snapshot now,
//! synchronously (no scheduler involved).

use crate::cli::ExportArgs;
use crate::cli::commands::{self};
use crate::error::{LbError, Result};
use std::fs;
use std::io::Write as _;

/// Execute the export command.
///
/// # Errors
///
/// Returns an error for unknown formats or I/O failures.
pub fn execute(args: &ExportArgs, json: bool) -> Result<()> {
    if let Some(format) = args.format.as_deref() {
        if format != "beads" {
            return Err(LbError::validation(
                "format",
                format!("unknown format '{format}' (only \"beads\" is supported)"),
            ));
        }
    }

    let ctx = commands::open_ctx(None)?;

    let (path, lines) = match &args.output {
        None => {
            let count = crate::export::write_snapshot(&ctx.db, &ctx.paths)?;
            (ctx.paths.jsonl_path(), count)
        }
        Some(output) => {
            // Same tmp-then-rename discipline for custom destinations.
            let lines = crate::export::snapshot_lines(&ctx.db)?;
            let tmp = output.with_extension("jsonl.tmp");
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let mut file = fs::File::create(&tmp)?;
            for line in &lines {
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
            }
            file.sync_all()?;
            drop(file);
            fs::rename(&tmp, output)?;
            (output.clone(), lines.len())
        }
    };

    if json {
        commands::print_json(&serde_json::json!({
            "path": path,
            "issues": lines,
        }))?;
    } else {
        println!("Exported {lines} issues to {}", path.display());
    }
    Ok(())
}
