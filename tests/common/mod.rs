#![allow(dead_code)]

use chrono::Utc;
use lb::model::{Issue, Priority, Status};
use lb::storage::CacheDb;
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        lb::logging::init_test_logging();
    });
}

pub fn test_db() -> CacheDb {
    init_test_logging();
    CacheDb::open_memory().expect("Failed to create test database")
}

/// Build an issue with explicit status/priority; timestamps default to now.
pub fn issue(identifier: &str, title: &str, status: Status, priority: i64) -> Issue {
    let mut issue = Issue::new(identifier, title);
    issue.status = status;
    issue.priority = Priority(priority);
    if status == Status::Closed {
        issue.closed_at = Some(Utc::now());
    }
    issue
}

pub fn log_start(name: &str) {
    init_test_logging();
    info!("{name}: starting");
}
