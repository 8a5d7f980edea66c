//! The Auth-Chain Walker (component C4, spec §4.4): iterates commits of
//! the authentication repository and drives the TUF Verifier stepwise.

use std::collections::HashMap;

use log::{debug, warn};

use crate::error::Error;
use crate::git::{worker, BareHandle};
use crate::tuf::{self, store::GitStore, MetadataError, TufState};
use crate::types::CommitId;

pub struct WalkResult {
    /// The authentication repository's very first commit, regardless of
    /// where verification started from (used to cross-check pins across
    /// dependency edges).
    pub first_commit: CommitId,
    /// The last AR commit accepted (either the remote head or the
    /// parent of the first bad commit).
    pub last_good: CommitId,
    /// Every commit successfully authenticated this run, oldest first.
    pub authenticated: Vec<CommitId>,
    /// The loaded, verified TUF state at `starting_commit` and at every
    /// commit in `authenticated` — callers need these to check declared
    /// target hashes (spec §4.3 rule 5) for config/target files read at
    /// any of those commits, not just `last_good`.
    pub states: HashMap<CommitId, TufState>,
    /// If the walk stopped due to a verification failure, the offending
    /// commit and the error (spec §7 "the first bad commit").
    pub first_bad: Option<(CommitId, MetadataError)>,
    /// Set when a cancellation signal was observed between commits
    /// (spec §5 "Cancellation").
    pub cancelled: bool,
}

#[allow(clippy::too_many_arguments)]
pub fn walk(
    handle: &BareHandle,
    default_branch: &str,
    remote_head: &CommitId,
    lvc: Option<&CommitId>,
    pinned_first_commit: Option<&CommitId>,
    should_cancel: &dyn Fn() -> bool,
) -> Result<WalkResult, Error> {
    let full_history = worker::commits_on_branch(handle, default_branch, None)?;
    let first_commit: CommitId = full_history
        .first()
        .ok_or_else(|| Error::MalformedConfig {
            file: "<auth repo>".to_string(),
            reason: "repository has no commits".to_string(),
        })?
        .parse()?;

    if let Some(pinned) = pinned_first_commit {
        if pinned != &first_commit {
            return Err(Error::OutOfBandMismatch {
                repo: default_branch.to_string(),
                expected: pinned.to_string(),
                actual: first_commit.to_string(),
            });
        }
    }

    let starting_commit = match lvc {
        Some(lvc) => {
            if !full_history.iter().any(|c| c.as_str() == lvc.as_str())
                && !is_ancestor_of_head(handle, lvc, remote_head)?
            {
                return Err(Error::LvcUnreachable {
                    repo: default_branch.to_string(),
                    lvc: lvc.to_string(),
                    remote_head: remote_head.to_string(),
                });
            }
            lvc.clone()
        }
        None => first_commit.clone(),
    };

    let store = GitStore::new(handle.clone(), starting_commit.as_str().to_string());
    let mut state: TufState = tuf::state::load(&store)?;
    let bootstrap_outcome = tuf::verify_bootstrap(&state);

    let mut authenticated = Vec::new();

    let bad = match bootstrap_outcome {
        Ok(_) => None,
        Err(e) => Some((starting_commit.clone(), e)),
    };
    let mut states = HashMap::new();
    states.insert(starting_commit.clone(), state.clone());

    if let Some((bad_commit, err)) = bad {
        return Ok(WalkResult {
            first_commit,
            last_good: starting_commit.clone(),
            authenticated,
            states,
            first_bad: Some((bad_commit, err)),
            cancelled: false,
        });
    }

    let chain = worker::walk_linear(handle, starting_commit.as_str(), remote_head.as_str())?;

    let mut last_good = starting_commit.clone();
    let mut first_bad = None;
    let mut cancelled = false;

    for commit_str in chain {
        if should_cancel() {
            debug!("auth-chain walk cancelled after {last_good}");
            cancelled = true;
            break;
        }

        let commit: CommitId = commit_str.parse()?;
        let store = GitStore::new(handle.clone(), commit.as_str().to_string());
        let next_state = match tuf::state::load(&store) {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to load TUF state at {commit}: {e}");
                first_bad = Some((commit, e));
                break;
            }
        };

        match tuf::verify_transition(&state, &next_state) {
            Ok(_) => {
                states.insert(commit.clone(), next_state.clone());
                state = next_state;
                last_good = commit.clone();
                authenticated.push(commit);
            }
            Err(e) => {
                warn!("verification failed at {commit}: {e}");
                first_bad = Some((commit, e));
                break;
            }
        }
    }

    Ok(WalkResult {
        first_commit,
        last_good,
        authenticated,
        states,
        first_bad,
        cancelled,
    })
}

fn is_ancestor_of_head(
    handle: &BareHandle,
    lvc: &CommitId,
    remote_head: &CommitId,
) -> Result<bool, Error> {
    match worker::walk_linear(handle, lvc.as_str(), remote_head.as_str()) {
        Ok(_) => Ok(true),
        Err(crate::git::GitError::DivergentHistory { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
