//! Typed payloads for the durable outbox.
//!
//! Each write command serializes one of these into the `payload` column;
//! the worker (and the inline `--sync` executor) deserializes it back and
//! performs the corresponding Remote mutation.

use crate::error::Result;
use crate::model::{DependencyType, IssueType, OutboxOp, Priority, Status};
use serde::{Deserialize, Deserializer, Serialize};

/// Distinguish "field absent" from "field explicitly null" for
/// `Option<Option<T>>` fields: a present `null` becomes `Some(None)`.
fn double_option<'de, T, D>(de: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

/// A relation recorded textually at create time, applied best-effort once
/// the issue exists on the Remote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeferredRelation {
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    pub target: String,
    /// When true the edge points at the new issue (`target blocks new`),
    /// i.e. the `--blocked-by` inverse form.
    #[serde(default)]
    pub inverse: bool,
}

/// Intended `create` mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CreatePayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<DeferredRelation>,
}

/// Intended `update` mutation. `None` fields are untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UpdatePayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// `Some(None)` clears the assignee, `Some(Some(email))` sets it.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub assignee: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Intended `close` mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClosePayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Intended `delete` mutation. The cache row is already gone, so the
/// Remote's internal id is captured at enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletePayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

/// Intended relation create/delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationPayload {
    pub issue_id: String,
    pub depends_on_id: String,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
}

/// Serialize a payload for `CacheDb::enqueue`.
///
/// # Errors
///
/// Returns an error if serialization fails (it cannot for these types,
/// but the signature stays honest).
pub fn to_value<T: Serialize>(payload: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(payload)?)
}

/// Deserialize a queued payload back into its typed form.
///
/// # Errors
///
/// Returns an error when the stored JSON does not match the operation's
/// payload shape (a poisoned row surfaces as `RemoteRejection`-class).
pub fn from_value<T: serde::de::DeserializeOwned>(value: &serde_json::Value) -> Result<T> {
    Ok(serde_json::from_value(value.clone())?)
}

/// Human summary of a queued item, for `sync` output and logs.
#[must_use]
pub fn describe(op: OutboxOp, payload: &serde_json::Value) -> String {
    let id = payload
        .get("id")
        .or_else(|| payload.get("issue_id"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let title = payload.get("title").and_then(|v| v.as_str()).unwrap_or("");
    match (id.is_empty(), title.is_empty()) {
        (false, _) => format!("{op} {id}"),
        (true, false) => format!("{op} \"{title}\""),
        (true, true) => op.to_string(),
    }
}
