//! Detached spawning of the worker and export children.
//!
//! The launcher re-enters the current executable with an internal flag
//! (`--worker` / `--export-worker`), detached from the caller's terminal
//! with both output streams redirected to `<repo>/.lb/sync.log`. User
//! commands never drain the outbox synchronously: they spawn a worker or
//! touch the PID file of a running one.

use crate::config::LbPaths;
use crate::error::Result;
use crate::worker::pidfile::PidFile;
use std::fs::OpenOptions;
use std::process::{Command, Stdio};
use tracing::debug;

/// Signal the worker after an enqueue: spawn one if none is running,
/// otherwise touch the PID file so an idle worker stays alive.
///
/// # Errors
///
/// Returns an error when the child cannot be spawned.
pub fn notify_worker(paths: &LbPaths) -> Result<()> {
    let pidfile = PidFile::new(paths.pid_path());
    if pidfile.is_alive() {
        debug!("worker already running; touching pid file");
        pidfile.touch()?;
        return Ok(());
    }
    spawn_detached(paths, "--worker")
}

/// Spawn the export child unconditionally (the scheduler has already
/// applied its debounce and in-flight checks).
///
/// # Errors
///
/// Returns an error when the child cannot be spawned.
pub fn spawn_export_worker(paths: &LbPaths) -> Result<()> {
    spawn_detached(paths, "--export-worker")
}

fn spawn_detached(paths: &LbPaths, flag: &str) -> Result<()> {
    paths.ensure_dir()?;
    let exe = std::env::current_exe()?;
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.log_path())?;

    let mut cmd = Command::new(exe);
    cmd.arg(flag)
        .current_dir(&paths.repo_root)
        .stdin(Stdio::null())
        .stdout(log.try_clone()?)
        .stderr(log);

    // New process group: the child survives the caller's terminal and is
    // reparented to init as soon as this process exits.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd.spawn()?;
    debug!(pid = child.id(), flag, "spawned detached child");
    Ok(())
}
