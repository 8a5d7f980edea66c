//! The Target Comparator (component C5, spec §4.5): reconciles the
//! sequence of commits a target repository's history *authorizes*,
//! drawn from AR commits, against the commits that history actually
//! contains on its remote.

use std::collections::HashMap;

use itertools::Itertools;

use crate::config_files::{self, TargetCommit};
use crate::error::Error;
use crate::git::{worker, BareHandle};
use crate::tuf::{self, TufState};
use crate::types::{CommitId, FullName, UpdateOptions};
use crate::urls;

/// One authorized `{ar_commit, branch, commit}` triple, as published by
/// the AR at one of its commits.
#[derive(Debug, Clone)]
pub struct AuthorizedEntry {
    pub ar_commit: CommitId,
    pub branch: String,
    pub commit: CommitId,
}

/// Build the expected sequence of target commits by reading the
/// per-target commit file at every authenticated AR commit, in order.
/// AR commits at which the target file is absent are skipped (spec §9
/// Open Question: "ignored", resolved in DESIGN.md); consecutive
/// repeats of the same `{branch, commit}` collapse to one entry.
pub fn build_expected_sequence(
    ar_handle: &BareHandle,
    authenticated_ar_commits: &[CommitId],
    states: &HashMap<CommitId, TufState>,
    target_name: &FullName,
) -> Result<Vec<AuthorizedEntry>, Error> {
    let path = config_files::target_commit_path(target_name);

    let mut raw = Vec::new();
    for ar_commit in authenticated_ar_commits {
        let Some(bytes) = worker::read_blob(ar_handle, ar_commit.as_str(), &format!("targets/{path}"))?
        else {
            continue;
        };
        if let Some(state) = states.get(ar_commit) {
            tuf::verify_target_bytes(state, &path, &bytes)?;
        }
        let parsed: TargetCommit = config_files::parse_target_commit(&bytes)?;
        raw.push(AuthorizedEntry {
            ar_commit: ar_commit.clone(),
            branch: parsed.branch,
            commit: parsed.commit_id()?,
        });
    }

    Ok(raw
        .into_iter()
        .dedup_by(|a, b| a.branch == b.branch && a.commit == b.commit)
        .collect())
}

/// Per-branch result of a successful comparison: the commit the local
/// working copy may advance to, plus the commits to report in the
/// event record's `commits_by_branch` entry (spec §6).
#[derive(Debug, Clone)]
pub struct TargetCheckOutcome {
    pub branch: String,
    pub advance_to: CommitId,
    /// Authorized commits newly checked this run, oldest first.
    pub new: Vec<CommitId>,
    /// Commits found interleaved between authorized checkpoints that
    /// are not themselves authorized (only ever non-empty when
    /// `options.strict` is false — strict mode rejects them outright).
    pub unauthenticated: Vec<CommitId>,
}

/// Outcome of comparing the expected sequence against the target
/// repository's actual history (spec §4.5 rules).
#[derive(Debug)]
pub enum ComparisonOutcome {
    Authorized(TargetCheckOutcome),
    /// No authorized commits exist for this target yet (AR never
    /// published a commit file for it).
    NoAuthorizedHistory,
}

/// Compare the expected sequence to the target repo's actual commits on
/// `branch` and decide where the local working copy may advance to.
///
/// On failure, returns the AR commit the failure should be attributed
/// to (the authorized entry being checked when things went wrong) so a
/// caller comparing several TRs breadth-first can pick the earliest one
/// (spec §4.5 rule 6).
pub fn compare(
    target_handle: &BareHandle,
    branch: &str,
    expected: &[AuthorizedEntry],
    options: &UpdateOptions,
) -> Result<ComparisonOutcome, (CommitId, Error)> {
    let on_branch: Vec<&AuthorizedEntry> = expected.iter().filter(|e| e.branch == branch).collect();
    if on_branch.is_empty() {
        return Ok(ComparisonOutcome::NoAuthorizedHistory);
    }
    let anchor = on_branch[0].ar_commit.clone();

    if !worker::branch_exists(target_handle, branch).map_err(|e| (anchor.clone(), Error::from(e)))? {
        return Err((
            anchor,
            Error::MissingAuthorizedCommit {
                repo: branch.to_string(),
                branch: branch.to_string(),
                commit: on_branch[0].commit.to_string(),
            },
        ));
    }
    let head = worker::top_of_branch(target_handle, branch).map_err(|e| (anchor.clone(), Error::from(e)))?;

    let mut new = Vec::new();
    let mut unauthenticated = Vec::new();
    let mut prev_commit: Option<CommitId> = None;

    for entry in &on_branch {
        let present = worker::commits_on_branch(target_handle, branch, None)
            .map_err(|e| (entry.ar_commit.clone(), Error::from(e)))?
            .iter()
            .any(|c| c.as_str() == entry.commit.as_str());
        if !present {
            return Err((
                entry.ar_commit.clone(),
                Error::MissingAuthorizedCommit {
                    repo: branch.to_string(),
                    branch: branch.to_string(),
                    commit: entry.commit.to_string(),
                },
            ));
        }

        // The commits strictly between the previous checkpoint and this
        // one: exactly `[entry.commit]` when nothing unauthorized sits
        // in between, more than one element otherwise (spec I4 / §4.5
        // rule 6 — strict TRs must reject any extras here, not just a
        // trailing tail past the last authorized commit).
        let between = match &prev_commit {
            Some(prev) => worker::walk_linear(target_handle, prev.as_str(), entry.commit.as_str())
                .map_err(|e| (entry.ar_commit.clone(), Error::from(e)))?,
            None => vec![entry.commit.to_string()],
        };

        let extra_count = between.len().saturating_sub(1);
        if extra_count > 0 {
            if options.strict {
                return Err((
                    entry.ar_commit.clone(),
                    Error::TargetMismatch {
                        repo: branch.to_string(),
                        ar_commit: entry.ar_commit.to_string(),
                        branch: branch.to_string(),
                    },
                ));
            }
            for extra in &between[..extra_count] {
                unauthenticated.push(
                    extra
                        .parse::<CommitId>()
                        .map_err(|e| (entry.ar_commit.clone(), e))?,
                );
            }
        }

        new.push(entry.commit.clone());
        prev_commit = Some(entry.commit.clone());
    }

    let last_entry = on_branch.last().expect("on_branch checked non-empty above");
    let newest_authorized = last_entry.commit.clone();

    if options.strict && newest_authorized.as_str() != head {
        let head_id: CommitId = head.parse().map_err(|e| (last_entry.ar_commit.clone(), e))?;
        return Err((
            last_entry.ar_commit.clone(),
            Error::UnexpectedAuthorizedCommit {
                repo: branch.to_string(),
                branch: branch.to_string(),
                commit: head_id.to_string(),
            },
        ));
    }

    Ok(ComparisonOutcome::Authorized(TargetCheckOutcome {
        branch: branch.to_string(),
        advance_to: newest_authorized,
        new,
        unauthenticated,
    }))
}

/// Fetch a mirror of the target repository named by `name`, trying each
/// resolved URL in order (spec §4.5 "Per-TR URL resolution").
pub fn fetch_target_mirror(
    scratch_dir: &std::path::Path,
    templates: &[String],
    name: &FullName,
) -> Result<BareHandle, Error> {
    let urls = urls::resolve_urls(templates, name);
    urls::first_success(&urls, |url| worker::fetch_bare(url, scratch_dir))
        .map_err(|errors| {
            Error::Fetch(
                errors
                    .into_iter()
                    .last()
                    .map(|(_, e)| e)
                    .expect("resolve_urls never returns an empty list for a non-empty template set"),
            )
        })
}

/// Cross-TR tie-break (spec §4.5 rule 6 / §5): when more than one
/// target repository fails at the same earliest-divergence AR commit,
/// the lowest-indexed one in `repositories.json` wins. `names` must be
/// in `repositories.json`'s declared order; `failures` is keyed by
/// whichever TRs tied for the earliest divergence.
pub fn attribute_first_divergence<'a, V>(
    names: &'a [FullName],
    failures: &HashMap<FullName, V>,
) -> Option<&'a FullName> {
    names.iter().find(|n| failures.contains_key(n))
}
