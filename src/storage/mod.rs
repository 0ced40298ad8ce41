//! Local cache storage: schema + typed accessors over `SQLite`.

pub mod schema;
pub mod sqlite;

pub use sqlite::{ts, CacheDb};
