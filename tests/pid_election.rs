//! Single-worker election under contention.

mod common;

use common::{init_test_logging, log_start};
use lb::worker::pidfile::PidFile;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

#[test]
fn concurrent_acquirers_elect_exactly_one() {
    log_start("concurrent_acquirers_elect_exactly_one");
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sync.pid");

    let winners = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for _ in 0..8 {
            let path = path.clone();
            let winners = &winners;
            scope.spawn(move || {
                let pidfile = PidFile::new(path);
                if let Ok(Some(lock)) = pidfile.acquire() {
                    winners.fetch_add(1, Ordering::SeqCst);
                    // Hold the lock long enough that every loser has
                    // observed a live owner before we release.
                    std::thread::sleep(std::time::Duration::from_millis(100));
                    drop(lock);
                }
            });
        }
    });

    assert_eq!(
        winners.load(Ordering::SeqCst),
        1,
        "exactly one worker may ever hold the pid file"
    );
    assert!(!path.exists(), "the winner released the file on drop");
}

#[test]
fn acquire_after_release_succeeds() {
    init_test_logging();
    let tmp = TempDir::new().unwrap();
    let pidfile = PidFile::new(tmp.path().join("sync.pid"));

    let first = pidfile.acquire().unwrap().expect("first acquire");
    drop(first);
    let second = pidfile.acquire().unwrap();
    assert!(second.is_some(), "release makes the slot available again");
}

#[test]
fn pid_file_reflects_liveness_invariant() {
    init_test_logging();
    let tmp = TempDir::new().unwrap();
    let pidfile = PidFile::new(tmp.path().join("sync.pid"));

    // File absent: no live worker.
    assert!(!pidfile.is_alive());

    // File present with our (live) pid.
    let lock = pidfile.acquire().unwrap().unwrap();
    assert!(pidfile.is_alive());

    // File gone after release.
    drop(lock);
    assert!(!pidfile.is_alive());
}
