//! Error types and handling for `lb`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Supports `anyhow` integration for context-wrapped paths
//! - Provides recovery hints for user-facing errors
//! - Validation mistakes exit 2, operational failures exit 1

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `lb` operations.
#[derive(Error, Debug)]
pub enum LbError {
    // === Storage Errors ===
    /// `SQLite` database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database schema is newer than this binary understands.
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: i32, found: i32 },

    /// Schema migration failed; the cache is unusable.
    #[error("Schema migration to version {version} failed: {reason}")]
    MigrationFailed { version: i32, reason: String },

    /// The cache file cannot be read or written.
    #[error("Storage unavailable at '{path}': {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    // === Issue Errors ===
    /// Issue with the specified identifier was not found.
    #[error("Issue not found: {id}")]
    IssueNotFound { id: String },

    /// User lookup on the Remote came back empty.
    #[error("User not found: {query}")]
    UserNotFound { query: String },

    /// Team short code did not resolve to a workspace team.
    #[error("Team not found: {key}")]
    TeamNotFound { key: String },

    /// Issue identifier format is invalid.
    #[error("Invalid issue identifier: {id}")]
    InvalidId { id: String },

    // === Validation Errors ===
    /// Field validation failed.
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Invalid status value.
    #[error("Invalid status: {status}")]
    InvalidStatus { status: String },

    /// Invalid issue type value.
    #[error("Invalid issue type: {issue_type}")]
    InvalidType { issue_type: String },

    /// Priority out of valid range (0-4).
    #[error("Priority must be 0-4, got: {priority}")]
    InvalidPriority { priority: i64 },

    /// Malformed `--deps` entry (expected `type:ID`).
    #[error("Invalid dependency spec '{spec}': expected type:ID")]
    InvalidDepSpec { spec: String },

    // === Remote Errors ===
    /// Transient network failure talking to the Remote.
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials missing or rejected by the Remote.
    #[error("Authentication failed: {reason}")]
    Auth { reason: String },

    /// The Remote rejected an operation despite local validation.
    #[error("Remote rejected {operation}: {reason}")]
    RemoteRejection { operation: String, reason: String },

    /// `sync` invoked with no reachable Remote.
    #[error("Offline: cannot reach the Remote ({pending} queued writes pending)")]
    Offline { pending: usize },

    // === Configuration Errors ===
    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Command needs a Remote but no credential is configured.
    #[error("No API key configured")]
    NoApiKey,

    /// Command needs a team but none is configured or resolvable.
    #[error("No team configured")]
    NoTeam,

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSONL import parse failure.
    #[error("Import parse error at line {line}: {reason}")]
    ImportParse { line: usize, reason: String },

    /// Wrapped anyhow error for context-heavy paths.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for LbError {
    fn from(err: reqwest::Error) -> Self {
        if err
            .status()
            .is_some_and(|s| s == reqwest::StatusCode::UNAUTHORIZED || s == reqwest::StatusCode::FORBIDDEN)
        {
            Self::Auth {
                reason: err.to_string(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl LbError {
    /// Is this a connectivity failure (reads degrade to the cache,
    /// `sync` reports Offline)? Rejections are retried too, but they are
    /// their own class: the Remote answered.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Offline { .. })
    }

    /// Is this an argument mistake the user can correct on the spot?
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::InvalidStatus { .. }
                | Self::InvalidType { .. }
                | Self::InvalidPriority { .. }
                | Self::InvalidDepSpec { .. }
                | Self::InvalidId { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NoApiKey | Self::Auth { .. } => Some("Run: lb auth"),
            Self::NoTeam => Some("Run: lb auth --team <KEY>"),
            Self::InvalidStatus { .. } => Some("Valid statuses: open, in_progress, closed"),
            Self::InvalidType { .. } => Some("Valid types: bug, feature, task, epic, chore"),
            Self::InvalidPriority { .. } => {
                Some("Use a priority between 0 (urgent) and 4 (none)")
            }
            Self::InvalidDepSpec { .. } => {
                Some("Use --deps blocks:TEAM-1,related:TEAM-2 or the long flags")
            }
            Self::Offline { .. } => Some("Queued writes will push on the next sync"),
            _ => None,
        }
    }

    /// Get the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.is_validation() {
            2
        } else {
            1
        }
    }

    /// Create a validation error for a specific field.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type using `LbError`.
pub type Result<T> = std::result::Result<T, LbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LbError::IssueNotFound {
            id: "TEAM-123".to_string(),
        };
        assert_eq!(err.to_string(), "Issue not found: TEAM-123");
    }

    #[test]
    fn test_offline_reports_pending() {
        let err = LbError::Offline { pending: 3 };
        assert!(err.to_string().contains("3 queued writes pending"));
    }

    #[test]
    fn test_validation_exits_2() {
        let err = LbError::InvalidPriority { priority: 9 };
        assert_eq!(err.exit_code(), 2);
        assert!(err.is_validation());

        let err = LbError::Network("timed out".to_string());
        assert_eq!(err.exit_code(), 1);
        assert!(err.is_transient());
    }

    #[test]
    fn test_suggestion() {
        let err = LbError::NoApiKey;
        assert_eq!(err.suggestion(), Some("Run: lb auth"));
        let err = LbError::validation("title", "cannot be empty");
        assert_eq!(err.suggestion(), None);
    }
}
