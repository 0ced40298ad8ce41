//! `lb` — an offline-first mirror of a Linear-style issue tracker.
//!
//! Reads are served instantly from a local SQLite cache; writes are applied
//! optimistically to the cache and enqueued to a durable outbox that a
//! detached background worker drains against the Remote.

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod logging;
pub mod model;
pub mod outbox;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod util;
pub mod worker;

pub use error::{LbError, Result};
