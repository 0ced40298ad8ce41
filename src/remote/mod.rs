//! Typed layer over the Remote's API: wire types, translation rules, and
//! the blocking GraphQL client.

pub mod client;
pub mod types;

pub use client::RemoteClient;
pub use types::{
    issue_from_remote, priority_from_remote, priority_to_remote, select_state, status_from_state_type,
    status_to_state_type, RemoteIssue, RemoteLabel, RemoteProject, RemoteRelation, RemoteState,
    RemoteTeam, RemoteUser,
};
