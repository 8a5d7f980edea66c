//! The top-level error taxonomy (spec §7), aggregating the
//! component-local enums (`GitError`, `MetadataError`) the way
//! `rust-tuf`'s single flat `Error` aggregates several concerns, rather
//! than the teacher's single-subsystem `GitError`. Component boundaries
//! still match and propagate on the precise variants (e.g. forced mode
//! only ever matches `WorkingTreeDirty`/`DivergentHistory`); this enum
//! exists so embedding applications get one type to pattern-match at the
//! public API surface.

use crate::git::GitError;
use crate::tuf::MetadataError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // -- Network --
    #[error(transparent)]
    Fetch(#[from] GitError),

    #[error("operation timed out")]
    Timeout,

    // -- Local state --
    #[error("working tree for {0} is dirty")]
    WorkingTreeDirty(String),

    #[error("{ancestor} is not an ancestor of {descendant}")]
    DivergentHistory { ancestor: String, descendant: String },

    #[error("last validated commit {lvc} is not reachable from remote head {remote_head} of {repo}")]
    LvcUnreachable {
        repo: String,
        lvc: String,
        remote_head: String,
    },

    #[error("dependency {0} reached with conflicting pinned commits: {1} vs {2}")]
    PinConflict(String, String, String),

    // -- Authentication --
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("out-of-band commit {expected} does not match first commit {actual} of {repo}")]
    OutOfBandMismatch {
        repo: String,
        expected: String,
        actual: String,
    },

    // -- Target chain --
    #[error("target {repo} diverges from authorized history at auth commit {ar_commit} on branch {branch}")]
    TargetMismatch {
        repo: String,
        ar_commit: String,
        branch: String,
    },

    #[error("authorized commit {commit} for {repo} on {branch} is missing from its actual history")]
    MissingAuthorizedCommit {
        repo: String,
        branch: String,
        commit: String,
    },

    #[error("unexpected, unauthorized commit {commit} found on {repo}/{branch}")]
    UnexpectedAuthorizedCommit {
        repo: String,
        branch: String,
        commit: String,
    },

    // -- Dependency graph --
    #[error("cyclic dependency detected re-entering {0}")]
    CyclicDependency(String),

    // -- Config parsing --
    #[error("invalid commit id: {0}")]
    InvalidCommitId(String),

    #[error("invalid repository full name: {0}")]
    InvalidFullName(String),

    #[error("malformed {file}: {reason}")]
    MalformedConfig { file: String, reason: String },

    #[error("no mirrors configured for {0}")]
    NoMirrors(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
