use std::io;

#[derive(Debug, Clone)]
pub(super) struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Errors raised by shelling out to the system `git` binary.
///
/// Mirrors the taxonomy a Git Worker must expose per spec §4.1: fetch
/// failures, destination conflicts, and history-shape violations are all
/// distinguishable so the pipeline can attribute failures correctly.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("failed to fetch {url}: {0}\n{1}", output.stdout, output.stderr)]
    FetchError { url: String, output: GitOutput },

    #[error("destination {path} is not empty and not a compatible mirror")]
    InvalidInitError { path: String },

    #[error("path {path} not found at commit {commit}")]
    NotFound { commit: String, path: String },

    #[error("{from} is not an ancestor of {to}")]
    DivergentHistory { from: String, to: String },

    #[error("working tree at {path} has unstaged, staged, or untracked changes")]
    WorkingTreeDirty { path: String },

    #[error("git failed to execute: {command}\n\nstdout:\n{0}\nstderr:\n{1}", output.stdout, output.stderr)]
    ExecError { command: String, output: GitOutput },

    #[error("branch {branch} does not exist in {path}")]
    NoSuchBranch { path: String, branch: String },

    #[error("failed to execute git: {0}")]
    IoError(#[from] io::Error),
}
