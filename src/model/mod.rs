//! Core data types for `lb`.
//!
//! This module defines the fundamental types used throughout the application:
//! - `Issue` - The cached work item
//! - `Status` - The three canonical lifecycle states
//! - `IssueType` - Categories of issues (optional type labelling)
//! - `Dependency` - Directed relationships between issues
//! - `OutboxItem` - A durable intended Remote mutation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier cached for an optimistic `create` before the worker confirms.
pub const PENDING_IDENTIFIER: &str = "pending";

/// Prefix used for identifiers allocated in local-only mode.
pub const LOCAL_PREFIX: &str = "LOCAL";

/// Issue lifecycle status. Exactly three canonical states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Closed,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = crate::error::LbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "in_progress" | "inprogress" | "in-progress" => Ok(Self::InProgress),
            "closed" | "done" => Ok(Self::Closed),
            other => Err(crate::error::LbError::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Issue priority (0=Urgent, 4=None).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Priority(pub i64);

impl Priority {
    pub const URGENT: Self = Self(0);
    pub const HIGH: Self = Self(1);
    pub const MEDIUM: Self = Self(2);
    pub const LOW: Self = Self(3);
    pub const NONE: Self = Self(4);

    /// Validate a raw value into a priority.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is outside 0..=4.
    pub fn new(value: i64) -> crate::error::Result<Self> {
        if (0..=4).contains(&value) {
            Ok(Self(value))
        } else {
            Err(crate::error::LbError::InvalidPriority { priority: value })
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl FromStr for Priority {
    type Err = crate::error::LbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();
        let val = s.strip_prefix('P').unwrap_or(&s);
        match val.parse::<i64>() {
            Ok(p) => Self::new(p),
            Err(_) => Err(crate::error::LbError::InvalidPriority {
                priority: val.parse().unwrap_or(-1),
            }),
        }
    }
}

/// Issue type category. Only applied when type labelling is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Bug,
    Feature,
    Task,
    Epic,
    Chore,
}

impl IssueType {
    pub const ALL: [Self; 5] = [Self::Bug, Self::Feature, Self::Task, Self::Epic, Self::Chore];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Task => "task",
            Self::Epic => "epic",
            Self::Chore => "chore",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = crate::error::LbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "task" => Ok(Self::Task),
            "epic" => Ok(Self::Epic),
            "chore" => Ok(Self::Chore),
            other => Err(crate::error::LbError::InvalidType {
                issue_type: other.to_string(),
            }),
        }
    }
}

/// Dependency relationship type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyType {
    Blocks,
    Related,
    ParentChild,
    DiscoveredFrom,
}

impl DependencyType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Related => "related",
            Self::ParentChild => "parent-child",
            Self::DiscoveredFrom => "discovered-from",
        }
    }

    /// Only `blocks` edges (and inheritance through `parent-child`) affect
    /// reachability; `related` and `discovered-from` are informational.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Blocks)
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = crate::error::LbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocks" => Ok(Self::Blocks),
            "related" => Ok(Self::Related),
            "parent-child" | "parent_child" => Ok(Self::ParentChild),
            "discovered-from" | "discovered_from" => Ok(Self::DiscoveredFrom),
            other => Err(crate::error::LbError::InvalidDepSpec {
                spec: other.to_string(),
            }),
        }
    }
}

/// The cached issue entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    /// Stable public identifier, e.g. `TEAM-123` or `LOCAL-7`.
    pub identifier: String,

    /// The Remote's internal state identifier (a UUID). Absent for rows
    /// that exist only locally (placeholders, local-only mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub priority: Priority,

    /// Only set when type labelling is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set iff `status == Closed`. Reopening clears it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// When this row was last written to the cache. Monotonically
    /// non-decreasing per issue.
    #[serde(skip)]
    pub cached_at: DateTime<Utc>,
}

impl Issue {
    /// Build a new issue with defaulted metadata fields.
    #[must_use]
    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identifier: identifier.into(),
            remote_id: None,
            title: title.into(),
            description: None,
            status: Status::Open,
            priority: Priority::default(),
            issue_type: None,
            assignee: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            cached_at: now,
        }
    }

    /// Is this the optimistic placeholder row for a queued `create`?
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.identifier.starts_with(PENDING_IDENTIFIER)
    }
}

/// A directed dependency edge `(issue_id, depends_on_id, type)`.
///
/// `issue_id blocks depends_on_id` means: while `issue_id` is not closed,
/// `depends_on_id` is blocked. For `parent-child`, `depends_on_id` is the
/// parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependency {
    pub issue_id: String,
    pub depends_on_id: String,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Dependency {
    #[must_use]
    pub fn new(
        issue_id: impl Into<String>,
        depends_on_id: impl Into<String>,
        dep_type: DependencyType,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            depends_on_id: depends_on_id.into(),
            dep_type,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    #[must_use]
    pub fn by(mut self, who: impl Into<String>) -> Self {
        self.created_by = Some(who.into());
        self
    }
}

/// A label as cached from the Remote (`repo:<name>` scoping, type tagging).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

/// Operations the outbox can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxOp {
    Create,
    Update,
    Close,
    Delete,
    CreateRelation,
    DeleteRelation,
}

impl OutboxOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Close => "close",
            Self::Delete => "delete",
            Self::CreateRelation => "create_relation",
            Self::DeleteRelation => "delete_relation",
        }
    }
}

impl fmt::Display for OutboxOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutboxOp {
    type Err = crate::error::LbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "close" => Ok(Self::Close),
            "delete" => Ok(Self::Delete),
            "create_relation" => Ok(Self::CreateRelation),
            "delete_relation" => Ok(Self::DeleteRelation),
            other => Err(crate::error::LbError::validation(
                "operation",
                format!("unknown outbox operation '{other}'"),
            )),
        }
    }
}

/// A durable queued Remote mutation.
///
/// Rows are never mutated except to bump `retry_count` / set `last_error`;
/// removal happens only on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxItem {
    pub id: i64,
    pub op: OutboxOp,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub retry_count: i64,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [Status::Open, Status::InProgress, Status::Closed] {
            assert_eq!(s.as_str().parse::<Status>().unwrap(), s);
        }
        assert!("cancelled".parse::<Status>().is_err());
    }

    #[test]
    fn test_status_aliases() {
        assert_eq!("in-progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("done".parse::<Status>().unwrap(), Status::Closed);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("2".parse::<Priority>().unwrap(), Priority::MEDIUM);
        assert_eq!("P0".parse::<Priority>().unwrap(), Priority::URGENT);
        assert!("5".parse::<Priority>().is_err());
        assert!("-1".parse::<Priority>().is_err());
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_issue_type_parse() {
        for t in IssueType::ALL {
            assert_eq!(t.as_str().parse::<IssueType>().unwrap(), t);
        }
        assert!("docs".parse::<IssueType>().is_err());
    }

    #[test]
    fn test_dependency_type_blocking() {
        assert!(DependencyType::Blocks.is_blocking());
        assert!(!DependencyType::Related.is_blocking());
        assert!(!DependencyType::ParentChild.is_blocking());
        assert!(!DependencyType::DiscoveredFrom.is_blocking());
    }

    #[test]
    fn test_dependency_type_serde_kebab() {
        let json = serde_json::to_string(&DependencyType::ParentChild).unwrap();
        assert_eq!(json, "\"parent-child\"");
        let back: DependencyType = serde_json::from_str("\"discovered-from\"").unwrap();
        assert_eq!(back, DependencyType::DiscoveredFrom);
    }

    #[test]
    fn test_outbox_op_round_trip() {
        for op in [
            OutboxOp::Create,
            OutboxOp::Update,
            OutboxOp::Close,
            OutboxOp::Delete,
            OutboxOp::CreateRelation,
            OutboxOp::DeleteRelation,
        ] {
            assert_eq!(op.as_str().parse::<OutboxOp>().unwrap(), op);
        }
    }

    #[test]
    fn test_pending_detection() {
        let issue = Issue::new(PENDING_IDENTIFIER, "queued");
        assert!(issue.is_pending());
        let issue = Issue::new("TEAM-1", "real");
        assert!(!issue.is_pending());
    }

    #[test]
    fn test_issue_optional_fields_skipped() {
        let issue = Issue::new("TEAM-1", "title");
        let json = serde_json::to_value(&issue).unwrap();
        assert!(json.get("description").is_none());
        assert!(json.get("closed_at").is_none());
        assert!(json.get("issue_type").is_none());
        assert_eq!(json["status"], "open");
    }
}
