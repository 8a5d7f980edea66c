use std::{
    io::{self},
    path::{Path, PathBuf},
    process::{self, Child, Stdio},
};

use itertools::Itertools;
use log::{debug, trace};

use super::types::{GitError, GitOutput};

/// Hermetic pre-args applied to every invocation: disable maintenance
/// that could interfere with a concurrently-running Updater, and never
/// fsck objects we are about to verify ourselves.
const HERMETIC_PRE_ARGS: &[&str] = &["-c", "gc.auto=0", "-c", "maintenance.auto=0"];

pub(super) fn spawn_git_command(
    args: &[&str],
    working_dir: Option<&Path>,
    stdin: Option<Stdio>,
) -> Result<Child, io::Error> {
    let working_dir = working_dir
        .map(PathBuf::from)
        .unwrap_or(std::env::current_dir()?);
    let stdin = stdin.unwrap_or(Stdio::null());
    let all_args: Vec<_> = HERMETIC_PRE_ARGS.iter().chain(args.iter()).collect();
    debug!("execute: git {}", all_args.iter().join(" "));
    process::Command::new("git")
        .env("LANG", "C.UTF-8")
        .env("LC_ALL", "C.UTF-8")
        .env("LANGUAGE", "C.UTF-8")
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .current_dir(working_dir)
        .args(all_args)
        .spawn()
}

pub(super) fn capture_git_output(
    args: &[&str],
    working_dir: Option<&Path>,
) -> Result<GitOutput, GitError> {
    let child = spawn_git_command(args, working_dir, None)?;
    let output = child.wait_with_output()?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    trace!("stdout: {stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    trace!("stderr: {stderr}");

    let git_output = GitOutput { stdout, stderr };

    if output.status.success() {
        Ok(git_output)
    } else {
        Err(GitError::ExecError {
            command: args.join(" "),
            output: git_output,
        })
    }
}

/// Capture raw (non-UTF8-lossy-safe) bytes from a `git` invocation, used
/// for blob reads where the tracked file may not be valid UTF-8.
pub(super) fn capture_git_bytes(
    args: &[&str],
    working_dir: Option<&Path>,
) -> Result<Vec<u8>, GitError> {
    let child = spawn_git_command(args, working_dir, None)?;
    let output = child.wait_with_output()?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(GitError::ExecError {
            command: args.join(" "),
            output: GitOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            },
        })
    }
}

pub(super) fn git_rev_parse(
    working_dir: Option<&Path>,
    reference: &str,
) -> Result<String, GitError> {
    capture_git_output(&["rev-parse", "--verify", "-q", reference], working_dir)
        .map(|s| s.stdout.trim().to_owned())
}

pub(super) fn is_ancestor(
    working_dir: Option<&Path>,
    ancestor: &str,
    descendant: &str,
) -> Result<bool, GitError> {
    let result = spawn_git_command(
        &["merge-base", "--is-ancestor", ancestor, descendant],
        working_dir,
        None,
    )?
    .wait_with_output()?;
    Ok(result.status.success())
}
