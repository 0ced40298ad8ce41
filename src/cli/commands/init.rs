//! Init command implementation.

use crate::cli::InitArgs;
use crate::cli::commands::{self};
use crate::config::{self, ConfigFile};
use crate::error::{LbError, Result};
use crate::storage::CacheDb;

/// Execute the init command: create `.lb/`, a per-repo config skeleton,
/// and the cache database.
///
/// # Errors
///
/// Returns an error when already initialized (without `--force`) or on
/// I/O failure.
pub fn execute(args: &InitArgs, json: bool) -> Result<()> {
    let paths = config::discover_paths()?;

    if paths.config_path().exists() && !args.force {
        return Err(LbError::Config(format!(
            "{} already exists (use --force to overwrite)",
            paths.config_path().display()
        )));
    }

    paths.ensure_dir()?;
    let repo_name = config::default_repo_name(&paths.repo_root);
    let skeleton = ConfigFile {
        repo_name: Some(repo_name.clone()),
        ..ConfigFile::default()
    };
    config::save_repo_config(&paths, &skeleton)?;

    // Creating the database applies the schema up front, so the first
    // real command does not pay for it.
    let _db = CacheDb::open(&paths.db_path())?;

    if json {
        commands::print_json(&serde_json::json!({
            "lb_dir": paths.lb_dir,
            "repo_name": repo_name,
        }))?;
    } else {
        println!("Initialized {} (repo \"{repo_name}\")", paths.lb_dir.display());
        println!("Next: lb auth, then lb sync");
    }
    Ok(())
}
