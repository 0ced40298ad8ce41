//! Remote wire types and local<->remote translation rules.
//!
//! The Remote's priority scale is `1 urgent, 2 high, 3 medium, 4 low,
//! 0 none`; locally 0 is most urgent and 4 is none. Statuses map to the
//! Remote's workflow-state *type*, not a specific state; the client picks
//! some state of the right type when writing.

use crate::model::{DependencyType, Issue, IssueType, Priority, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// A workspace team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteTeam {
    pub id: String,
    pub key: String,
    pub name: String,
}

/// A label; `parent` is set for members of a label group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteLabel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent: Option<RemoteLabelRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteLabelRef {
    pub id: String,
    pub name: String,
}

/// A workflow state. `state_type` is one of the Remote's fixed categories
/// (`backlog`, `unstarted`, `started`, `completed`, `canceled`, `triage`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteState {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub state_type: String,
}

/// A project (used for `repo_scope = project`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LabelConnection {
    #[serde(default)]
    pub nodes: Vec<RemoteLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueRef {
    pub id: String,
    pub identifier: String,
}

/// One issue as returned by the Remote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIssue {
    pub id: String,
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i64,
    pub state: RemoteState,
    #[serde(default)]
    pub assignee: Option<RemoteUser>,
    #[serde(default)]
    pub labels: LabelConnection,
    #[serde(default)]
    pub parent: Option<IssueRef>,
    #[serde(default)]
    pub project: Option<RemoteProject>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,
}

/// An issue-to-issue relation, flattened to the far identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRelation {
    pub id: String,
    pub relation_type: String,
    pub other: IssueRef,
}

impl RemoteRelation {
    /// The local dependency type this relation carries. `blocks` is the
    /// only reachability-relevant kind; everything else is informational.
    #[must_use]
    pub fn dep_type(&self) -> DependencyType {
        match self.relation_type.as_str() {
            "blocks" => DependencyType::Blocks,
            _ => DependencyType::Related,
        }
    }
}

/// Map a local priority to the Remote scale.
///
/// Local `0..=3` shift up by one (`0 -> 1 urgent` ... `3 -> 4 low`);
/// local `4` (none) maps to remote `0`.
#[must_use]
pub const fn priority_to_remote(priority: Priority) -> i64 {
    match priority.0 {
        0 => 1,
        1 => 2,
        2 => 3,
        3 => 4,
        _ => 0,
    }
}

/// Map a Remote priority back to the local scale (inverse of
/// [`priority_to_remote`]).
#[must_use]
pub const fn priority_from_remote(remote: i64) -> Priority {
    match remote {
        1 => Priority(0),
        2 => Priority(1),
        3 => Priority(2),
        4 => Priority(3),
        _ => Priority(4),
    }
}

/// The workflow-state type a canonical status writes as.
#[must_use]
pub const fn status_to_state_type(status: Status) -> &'static str {
    match status {
        Status::Open => "unstarted",
        Status::InProgress => "started",
        Status::Closed => "completed",
    }
}

/// The canonical status a workflow-state type reads as. `completed` and
/// `canceled` both fold into closed; anything not started reads as open.
#[must_use]
pub fn status_from_state_type(state_type: &str) -> Status {
    match state_type {
        "started" => Status::InProgress,
        "completed" | "canceled" => Status::Closed,
        _ => Status::Open,
    }
}

/// Pick some state of the type a status maps to. Closed prefers a
/// `completed` state and falls back to `canceled`.
#[must_use]
pub fn select_state(states: &[RemoteState], status: Status) -> Option<&RemoteState> {
    let wanted = status_to_state_type(status);
    states
        .iter()
        .find(|s| s.state_type == wanted)
        .or_else(|| {
            (status == Status::Closed)
                .then(|| states.iter().find(|s| s.state_type == "canceled"))
                .flatten()
        })
}

/// Translate a Remote issue into the cached model, returning the parent
/// identifier (if any) so the caller can upsert the `parent-child` edge.
#[must_use]
pub fn issue_from_remote(remote: &RemoteIssue, use_issue_types: bool) -> (Issue, Option<String>) {
    let status = status_from_state_type(&remote.state.state_type);
    let closed_at = match status {
        Status::Closed => remote.completed_at.or(remote.canceled_at).or_else(|| Some(remote.updated_at)),
        _ => None,
    };

    let issue_type = if use_issue_types {
        remote
            .labels
            .nodes
            .iter()
            .find_map(|label| IssueType::from_str(&label.name).ok())
    } else {
        None
    };

    let issue = Issue {
        identifier: remote.identifier.clone(),
        remote_id: Some(remote.id.clone()),
        title: remote.title.clone(),
        description: remote
            .description
            .clone()
            .filter(|d| !d.trim().is_empty()),
        status,
        priority: priority_from_remote(remote.priority),
        issue_type,
        assignee: remote.assignee.as_ref().map(|u| u.email.clone()),
        created_at: remote.created_at,
        updated_at: remote.updated_at,
        closed_at,
        cached_at: Utc::now(),
    };

    let parent = remote.parent.as_ref().map(|p| p.identifier.clone());
    (issue, parent)
}
