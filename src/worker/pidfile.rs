//! PID file management for single-worker election.
//!
//! Workers coordinate through `<repo>/.lb/sync.pid`. Acquisition uses
//! create-new semantics so two racing enqueuers cannot both install
//! themselves; the loser re-reads the file and observes the winner.
//! Enqueuers signal a running worker by touching the file's mtime.

use crate::error::Result;
use nix::sys::signal;
use nix::unistd::Pid;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{debug, warn};

/// How many times acquisition retries after removing a stale file.
const ACQUIRE_RETRIES: usize = 5;

/// Handle on the worker PID file.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Read the PID recorded in the file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is missing or does not parse.
    pub fn read(&self) -> io::Result<u32> {
        let content = fs::read_to_string(&self.path)?;
        content
            .trim()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Is a worker with the recorded PID alive right now?
    #[must_use]
    pub fn is_alive(&self) -> bool {
        match self.read() {
            Ok(pid) => process_exists(pid),
            Err(_) => false,
        }
    }

    /// Stay-alive signal: advance the file's mtime so an idle worker
    /// resets its idle timer. Idempotent; a missing file is fine (the
    /// worker exited between our check and the touch).
    ///
    /// # Errors
    ///
    /// Returns an error only for unexpected I/O failures.
    pub fn touch(&self) -> Result<()> {
        match fs::OpenOptions::new().append(true).open(&self.path) {
            Ok(file) => {
                file.set_modified(SystemTime::now())?;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The file's current mtime, polled by the worker to notice touches.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be stat'ed.
    pub fn mtime(&self) -> io::Result<SystemTime> {
        fs::metadata(&self.path)?.modified()
    }

    /// Try to become the single worker for this repo.
    ///
    /// Returns `Ok(None)` when a live worker already owns the queue. A
    /// stale file (recorded PID dead or unreadable) is removed and the
    /// attempt retries.
    ///
    /// Publication is a hard link from a fully-written temp file, so a
    /// concurrent reader never observes a partially-written PID.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be created after retries.
    pub fn acquire(&self) -> Result<Option<PidLock>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Unique per attempt: pids disambiguate across processes, the
        // sequence across threads of one process.
        static STAGING_SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = STAGING_SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let staging = self
            .path
            .with_extension(format!("pid.{}.{seq}", std::process::id()));
        {
            let mut file = fs::File::create(&staging)?;
            writeln!(file, "{}", std::process::id())?;
            file.sync_all()?;
        }

        let outcome = self.try_link(&staging);
        let _ = fs::remove_file(&staging);
        outcome
    }

    fn try_link(&self, staging: &std::path::Path) -> Result<Option<PidLock>> {
        for _ in 0..ACQUIRE_RETRIES {
            match fs::hard_link(staging, &self.path) {
                Ok(()) => {
                    debug!(pid = std::process::id(), "acquired worker pid file");
                    return Ok(Some(PidLock {
                        path: self.path.clone(),
                    }));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if self.is_alive() {
                        return Ok(None);
                    }
                    warn!(path = %self.path.display(), "removing stale pid file");
                    let _ = fs::remove_file(&self.path);
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Lost every race; someone else is the worker.
        Ok(None)
    }
}

/// Scoped ownership of the PID file; unlinks it on all exit paths.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
            }
        }
    }
}

/// Probe a PID with signal 0. `EPERM` means the process exists but is not
/// ours; anything else negative means it is gone.
fn process_exists(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    match signal::kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_writes_own_pid() {
        let tmp = TempDir::new().unwrap();
        let pidfile = PidFile::new(tmp.path().join("sync.pid"));

        let lock = pidfile.acquire().unwrap().expect("should acquire");
        assert_eq!(pidfile.read().unwrap(), std::process::id());
        assert!(pidfile.is_alive());
        drop(lock);
        assert!(!pidfile.path().exists());
    }

    #[test]
    fn test_second_acquire_defers_to_live_owner() {
        let tmp = TempDir::new().unwrap();
        let pidfile = PidFile::new(tmp.path().join("sync.pid"));

        let _lock = pidfile.acquire().unwrap().expect("should acquire");
        // Our own (live) pid is recorded, so a second caller must defer.
        assert!(pidfile.acquire().unwrap().is_none());
    }

    #[test]
    fn test_stale_file_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sync.pid");
        // A pid that cannot be a live process.
        fs::write(&path, "999999999\n").unwrap();

        let pidfile = PidFile::new(path.clone());
        assert!(!pidfile.is_alive());
        let lock = pidfile.acquire().unwrap().expect("should steal stale file");
        assert_eq!(pidfile.read().unwrap(), std::process::id());
        drop(lock);
    }

    #[test]
    fn test_garbage_file_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sync.pid");
        fs::write(&path, "not a pid\n").unwrap();

        let pidfile = PidFile::new(path);
        let lock = pidfile.acquire().unwrap();
        assert!(lock.is_some());
    }

    #[test]
    fn test_touch_advances_mtime() {
        let tmp = TempDir::new().unwrap();
        let pidfile = PidFile::new(tmp.path().join("sync.pid"));
        let _lock = pidfile.acquire().unwrap().unwrap();

        let before = pidfile.mtime().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        pidfile.touch().unwrap();
        let after = pidfile.mtime().unwrap();
        assert!(after > before);
    }

    #[test]
    fn test_touch_missing_file_is_ok() {
        let tmp = TempDir::new().unwrap();
        let pidfile = PidFile::new(tmp.path().join("sync.pid"));
        pidfile.touch().unwrap();
        assert!(!pidfile.path().exists());
    }
}
