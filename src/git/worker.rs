//! The Git Worker (spec §4.1): clone/fetch/merge/inspect repositories
//! without exposing untrusted content to disk prematurely.
//!
//! Every operation shells out to the system `git` binary, exactly as the
//! teacher's git_interop module does, rather than linking a Git
//! implementation into the process. Blob reads return raw bytes and
//! never execute or interpret them; only the TUF verifier is allowed to
//! do that (spec §4.1 "Safety").

use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{debug, warn};

use super::lowlevel::{capture_git_bytes, capture_git_output, git_rev_parse, is_ancestor};
use super::types::GitError;

/// A bare, working-tree-less mirror of a repository, used as scratch
/// space while inspecting remote history (spec §5 "Scratch bare store").
#[derive(Debug, Clone)]
pub struct BareHandle {
    path: PathBuf,
}

impl BareHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Clone a bare mirror of `url_or_path` into `dest`. `dest` must either
/// not exist or already be an empty directory.
pub fn fetch_bare(url_or_path: &str, dest: &Path) -> Result<BareHandle, GitError> {
    if dest.exists() {
        let is_empty = dest
            .read_dir()
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            return Err(GitError::InvalidInitError {
                path: dest.display().to_string(),
            });
        }
    } else {
        std::fs::create_dir_all(dest)?;
    }

    capture_git_output(
        &[
            "clone",
            "--bare",
            "--mirror",
            "--",
            url_or_path,
            dest.to_str().ok_or_else(|| GitError::InvalidInitError {
                path: dest.display().to_string(),
            })?,
        ],
        None,
    )
    .map_err(|e| match e {
        GitError::ExecError { output, .. } => GitError::FetchError {
            url: url_or_path.to_string(),
            output,
        },
        other => other,
    })?;

    Ok(BareHandle {
        path: dest.to_path_buf(),
    })
}

/// Return the exact tracked bytes of `path` at `commit`. Never executes
/// or otherwise interprets the content.
pub fn read_blob(handle: &BareHandle, commit: &str, path: &str) -> Result<Option<Vec<u8>>, GitError> {
    let spec = format!("{commit}:{path}");
    match capture_git_bytes(&["cat-file", "blob", &spec], Some(&handle.path)) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(GitError::ExecError { output, .. })
            if output.stderr.contains("does not exist")
                || output.stderr.contains("bad file")
                || output.stderr.contains("fatal: Path") =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// List the tracked paths under `prefix` at `commit`.
pub fn list_tree(handle: &BareHandle, commit: &str, prefix: &str) -> Result<Vec<String>, GitError> {
    let spec = format!("{commit}:{prefix}");
    match capture_git_output(
        &["ls-tree", "-r", "--name-only", &spec],
        Some(&handle.path),
    ) {
        Ok(out) => Ok(out
            .stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| format!("{}/{}", prefix.trim_end_matches('/'), l))
            .collect_vec()),
        Err(GitError::ExecError { output, .. }) if output.stderr.contains("not a tree object") => {
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

/// Enumerate the chain from `from` (exclusive) to `to` (inclusive),
/// oldest first. Requires `from` to be an ancestor of `to`.
pub fn walk_linear(handle: &BareHandle, from: &str, to: &str) -> Result<Vec<String>, GitError> {
    if !is_ancestor(Some(&handle.path), from, to)? {
        return Err(GitError::DivergentHistory {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let range = format!("{from}..{to}");
    let out = capture_git_output(
        &["rev-list", "--reverse", "--ancestry-path", &range],
        Some(&handle.path),
    )?;
    Ok(out
        .stdout
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect_vec())
}

/// Every commit reachable from `branch`, oldest first, after `since`
/// (exclusive). If `since` is `None`, the full history is returned.
pub fn commits_on_branch(
    handle: &BareHandle,
    branch: &str,
    since: Option<&str>,
) -> Result<Vec<String>, GitError> {
    let branch_ref = format!("refs/heads/{branch}");
    let range = match since {
        Some(s) => format!("{s}..{branch_ref}"),
        None => branch_ref,
    };
    let out = capture_git_output(&["rev-list", "--reverse", &range], Some(&handle.path))?;
    Ok(out
        .stdout
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect_vec())
}

pub fn branch_exists(handle: &BareHandle, branch: &str) -> Result<bool, GitError> {
    Ok(git_rev_parse(
        Some(&handle.path),
        &format!("refs/heads/{branch}"),
    )
    .is_ok())
}

pub fn top_of_branch(handle: &BareHandle, branch: &str) -> Result<String, GitError> {
    git_rev_parse(Some(&handle.path), &format!("refs/heads/{branch}")).map_err(|_| {
        GitError::NoSuchBranch {
            path: handle.path.display().to_string(),
            branch: branch.to_string(),
        }
    })
}

/// A checked-out working copy, mutated only after the destination commit
/// has been fully validated (spec §3 "Lifecycles").
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    path: PathBuf,
}

impl WorkingCopy {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_clean(path: &Path) -> Result<bool, GitError> {
    let out = capture_git_output(&["status", "--porcelain"], Some(path))?;
    Ok(out.stdout.trim().is_empty())
}

fn current_head(path: &Path) -> Result<String, GitError> {
    git_rev_parse(Some(path), "HEAD")
}

/// The current HEAD of an existing local working copy, or `None` if no
/// working copy exists yet there. Used to report `before_pull` state
/// without otherwise touching the working copy.
pub fn local_head(path: &Path) -> Option<String> {
    if !path.exists() || path.read_dir().map(|mut it| it.next().is_none()).unwrap_or(true) {
        return None;
    }
    current_head(path).ok()
}

/// Ensure a local working copy exists at `local_path` and is fast-forward
/// up to date with `expected_head`: clone if absent, verify cleanliness
/// and ancestry if present, advance fast-forward only. Never rewrites
/// local history (spec §4.1) unless `forced` and the tree is dirty, in
/// which case the dirty tree is discarded and hard-reset to
/// `expected_head` instead of erroring (spec §3/§4.8 "forced mode").
pub fn ensure_working_copy(
    url_or_path: &str,
    local_path: &Path,
    expected_head: &str,
    forced: bool,
) -> Result<WorkingCopy, GitError> {
    if !local_path.exists() || local_path.read_dir()?.next().is_none() {
        std::fs::create_dir_all(local_path)?;
        capture_git_output(&["clone", "--", url_or_path, "."], Some(local_path)).map_err(|e| {
            match e {
                GitError::ExecError { output, .. } => GitError::FetchError {
                    url: url_or_path.to_string(),
                    output,
                },
                other => other,
            }
        })?;
        checkout_detached(local_path, expected_head)?;
        return Ok(WorkingCopy {
            path: local_path.to_path_buf(),
        });
    }

    if !is_clean(local_path)? {
        if !forced {
            return Err(GitError::WorkingTreeDirty {
                path: local_path.display().to_string(),
            });
        }
        warn!("working tree at {local_path:?} is dirty; forced mode resetting to {expected_head}");
        if git_rev_parse(Some(local_path), expected_head).is_err() {
            if let Err(e) = capture_git_output(&["fetch", "--", url_or_path], Some(local_path)) {
                warn!("fetch of working copy at {local_path:?} failed: {e}");
            }
        }
        force_reset_to(local_path, expected_head)?;
        return Ok(WorkingCopy {
            path: local_path.to_path_buf(),
        });
    }

    let head = current_head(local_path)?;
    if head == expected_head {
        return Ok(WorkingCopy {
            path: local_path.to_path_buf(),
        });
    }

    if !is_ancestor(Some(local_path), &head, expected_head)? {
        return Err(GitError::DivergentHistory {
            from: head,
            to: expected_head.to_string(),
        });
    }

    // Fetch in case expected_head is not yet present locally, then fast-forward.
    if git_rev_parse(Some(local_path), expected_head).is_err() {
        if let Err(e) = capture_git_output(&["fetch", "--", url_or_path], Some(local_path)) {
            warn!("fetch of working copy at {local_path:?} failed: {e}");
        }
    }
    checkout_detached(local_path, expected_head)?;

    Ok(WorkingCopy {
        path: local_path.to_path_buf(),
    })
}

/// Reset a (now known-dirty) working copy back to the last validated
/// commit. Only used in forced mode; never invoked implicitly.
pub fn force_reset_to(local_path: &Path, commit: &str) -> Result<(), GitError> {
    capture_git_output(&["reset", "--hard", commit], Some(local_path))?;
    capture_git_output(&["clean", "-fdx"], Some(local_path))?;
    Ok(())
}

fn checkout_detached(local_path: &Path, commit: &str) -> Result<(), GitError> {
    debug!("checking out {commit} at {local_path:?}");
    capture_git_output(&["checkout", "--detach", commit], Some(local_path))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_helpers::{commit_file, dir_with_repo, hermetic_git_env};

    #[test]
    fn test_fetch_bare_and_read_blob() {
        hermetic_git_env();
        let origin = dir_with_repo();
        commit_file(origin.path(), "hello.txt", b"world", "add hello");
        let head = git_rev_parse(Some(origin.path()), "HEAD").unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let dest = scratch.path().join("mirror");
        let handle = fetch_bare(origin.path().to_str().unwrap(), &dest).unwrap();

        let bytes = read_blob(&handle, &head, "hello.txt").unwrap();
        assert_eq!(bytes.unwrap(), b"world");

        let missing = read_blob(&handle, &head, "nope.txt").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_walk_linear_rejects_non_ancestor() {
        hermetic_git_env();
        let origin = dir_with_repo();
        let first = git_rev_parse(Some(origin.path()), "HEAD").unwrap();
        commit_file(origin.path(), "a.txt", b"a", "add a");
        let second = git_rev_parse(Some(origin.path()), "HEAD").unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let dest = scratch.path().join("mirror");
        let handle = fetch_bare(origin.path().to_str().unwrap(), &dest).unwrap();

        let chain = walk_linear(&handle, &first, &second).unwrap();
        assert_eq!(chain, vec![second.clone()]);

        let err = walk_linear(&handle, &second, &first);
        assert!(matches!(err, Err(GitError::DivergentHistory { .. })));
    }

    #[test]
    fn test_list_tree() {
        hermetic_git_env();
        let origin = dir_with_repo();
        commit_file(origin.path(), "metadata/root.json", b"{}", "add root");
        let head = git_rev_parse(Some(origin.path()), "HEAD").unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let dest = scratch.path().join("mirror");
        let handle = fetch_bare(origin.path().to_str().unwrap(), &dest).unwrap();

        let paths = list_tree(&handle, &head, "metadata").unwrap();
        assert_eq!(paths, vec!["metadata/root.json".to_string()]);
    }
}
