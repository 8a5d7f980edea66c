//! The structured event record emitted once per pipeline invocation
//! (spec §6 "Events"), independent of human-readable logging so an
//! embedding application or external handler can consume it
//! programmatically. One `Event` is built per `clone`/`update`/
//! `validate` call (and one per recursive dependency descent, since
//! each re-runs the same pipeline) and handed to the configured
//! [`crate::handler::HandlerSink`] exactly once, after the run's
//! outcome — success or failure — is known.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::{CommitId, FullName, Outcome};

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event: Outcome,
    pub auth_repo: AuthRepoRecord,
    pub target_repos: HashMap<String, TargetRepoRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthRepoRecord {
    pub name: FullName,
    pub path: String,
    pub urls: Vec<String>,
    pub commits: CommitsRecord,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CommitsRecord {
    pub before_pull: Option<CommitId>,
    pub new: Vec<CommitId>,
    pub after_pull: Option<CommitId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TargetRepoRecord {
    pub commits_by_branch: HashMap<String, BranchCommitsRecord>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BranchCommitsRecord {
    pub before_pull: Option<CommitId>,
    pub after_pull: Option<CommitId>,
    pub new: Vec<CommitId>,
    pub unauthenticated: Vec<CommitId>,
}

impl Event {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("Event always serializes")
    }
}
