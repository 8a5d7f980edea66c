//! End-to-end exercises of the pipeline against real, hermetic, on-disk
//! git repositories (mirroring the teacher's own interop tests rather
//! than mocking git or the filesystem): an authentication repository and
//! one target repository are built by hand, commit by commit, and
//! `taf::pipeline` is driven against them directly.

use std::path::Path;
use std::process::{Command, Stdio};

use taf::error::Error;
use taf::handler::NullSink;
use taf::pipeline::{self, PipelineContext};
use taf::test_helpers::{
    build_fixture_ar, commit_file, dir_with_repo, generate_ed25519_keypair, hermetic_git_env,
    write_fixture_ar, TestKeyPair,
};
use taf::types::{CommitId, ExpectedType, FullName, Outcome, UpdateOptions};

fn git(args: &[&str], dir: &Path) {
    assert!(Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("failed to spawn git")
        .success());
}

fn rev_parse(dir: &Path, rev: &str) -> CommitId {
    let out = Command::new("git")
        .args(["rev-parse", rev])
        .current_dir(dir)
        .output()
        .expect("failed to spawn git rev-parse");
    assert!(out.status.success());
    String::from_utf8(out.stdout)
        .unwrap()
        .trim()
        .parse()
        .unwrap()
}

/// Initializes a plain repository with branch `main` and no initial
/// commit, so the very first commit written by the caller becomes the
/// authentication repository's genuine first commit.
fn init_bare_main(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    git(&["init", "--initial-branch", "main"], dir);
}

/// Writes `repositories.json`/`mirrors.json`/(optionally) a per-target
/// commit file plus a fresh, self-consistent TUF metadata set declaring
/// them, and commits the whole tree.
fn write_ar_commit(
    ar_dir: &Path,
    key: &TestKeyPair,
    repositories_json: &[u8],
    mirrors_json: &[u8],
    target_commit: Option<(&str, &[u8])>,
    message: &str,
) -> CommitId {
    let mut targets: Vec<(&str, &[u8])> = vec![
        ("repositories.json", repositories_json),
        ("mirrors.json", mirrors_json),
    ];
    if let Some(tc) = target_commit {
        targets.push(tc);
    }

    let fixture = build_fixture_ar(key, &targets);
    write_fixture_ar(ar_dir, &fixture);

    let targets_dir = ar_dir.join("targets");
    std::fs::create_dir_all(&targets_dir).unwrap();
    std::fs::write(targets_dir.join("repositories.json"), repositories_json).unwrap();
    std::fs::write(targets_dir.join("mirrors.json"), mirrors_json).unwrap();
    if let Some((path, bytes)) = target_commit {
        let full = targets_dir.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, bytes).unwrap();
    }

    git(&["add", "-A"], ar_dir);
    git(&["commit", "-m", message], ar_dir);
    rev_parse(ar_dir, "HEAD")
}

fn repositories_json(tr_name: &str, allow_unauthenticated: bool) -> Vec<u8> {
    serde_json::json!({
        "repositories": { tr_name: { "custom": { "allow-unauthenticated-commits": allow_unauthenticated } } }
    })
    .to_string()
    .into_bytes()
}

fn mirrors_json(url: &str) -> Vec<u8> {
    serde_json::json!({ "mirrors": [url] }).to_string().into_bytes()
}

fn target_commit_json(branch: &str, commit: &CommitId) -> Vec<u8> {
    serde_json::json!({ "branch": branch, "commit": commit.as_str() })
        .to_string()
        .into_bytes()
}

struct Harness {
    _root: tempfile::TempDir,
    library_dir: std::path::PathBuf,
    conf_dir_root: std::path::PathBuf,
    scratch_root: std::path::PathBuf,
}

impl Harness {
    fn new() -> Self {
        hermetic_git_env();
        let root = tempfile::tempdir().unwrap();
        let library_dir = root.path().join("library");
        let conf_dir_root = root.path().join("conf");
        let scratch_root = root.path().join("scratch");
        std::fs::create_dir_all(&library_dir).unwrap();
        std::fs::create_dir_all(&conf_dir_root).unwrap();
        std::fs::create_dir_all(&scratch_root).unwrap();
        Harness {
            _root: root,
            library_dir,
            conf_dir_root,
            scratch_root,
        }
    }

    fn ctx(&self) -> PipelineContext {
        PipelineContext {
            library_dir: &self.library_dir,
            conf_dir_root: &self.conf_dir_root,
            scratch_root: &self.scratch_root,
            sink: &NullSink,
        }
    }
}

/// Scenario 1 (spec §8): happy path update with two new AR commits
/// authorizing two successive target commits, strict mode on.
#[test]
fn happy_path_update_advances_target_and_lvc() {
    let harness = Harness::new();
    let key = generate_ed25519_keypair();

    let ar_dir = harness._root.path().join("origin-ar");
    init_bare_main(&ar_dir);

    let tr_name = "ns/tr1";
    let tr_full: FullName = tr_name.parse().unwrap();

    let tr_dir = dir_with_repo();
    commit_file(tr_dir.path(), "a.txt", b"a", "commit a1");
    let a1 = rev_parse(tr_dir.path(), "HEAD");
    commit_file(tr_dir.path(), "b.txt", b"b", "commit a2");
    let a2 = rev_parse(tr_dir.path(), "HEAD");

    let repos = repositories_json(tr_name, false);
    let mirrors = mirrors_json(tr_dir.path().to_str().unwrap());

    let c1 = write_ar_commit(&ar_dir, &key, &repos, &mirrors, None, "bootstrap");
    write_ar_commit(
        &ar_dir,
        &key,
        &repos,
        &mirrors,
        Some(("ns/tr1", &target_commit_json("main", &a1))),
        "authorize a1",
    );
    let c3 = write_ar_commit(
        &ar_dir,
        &key,
        &repos,
        &mirrors,
        Some(("ns/tr1", &target_commit_json("main", &a2))),
        "authorize a2",
    );

    // Pre-seed the LVC at c1, as if an earlier run had already validated
    // the bootstrap commit.
    let ar_full: FullName = "ns/ar".parse().unwrap();
    let lvc_dir = harness
        .conf_dir_root
        .join(format!("_{}_{}", ar_full.namespace, ar_full.name));
    std::fs::create_dir_all(&lvc_dir).unwrap();
    taf::persistence::write_lvc(&lvc_dir, &c1).unwrap();

    let options = UpdateOptions {
        strict: true,
        ..Default::default()
    };
    let summary = pipeline::update(
        &harness.ctx(),
        ar_dir.to_str().unwrap(),
        &ar_full,
        &options,
    )
    .expect("update should succeed");

    assert_eq!(summary.outcome, Outcome::Changed);
    assert_eq!(summary.lvc_before, Some(c1));
    assert_eq!(summary.lvc_after, Some(c3.clone()));
    let target = summary.targets.get(&tr_full).expect("tr1 should be tracked");
    assert_eq!(target.after_pull, Some(a2.clone()));

    let lvc_after = taf::persistence::read_lvc(&lvc_dir).unwrap();
    assert_eq!(lvc_after, Some(c3));

    let tr_local = harness.library_dir.join("ns").join("tr1");
    let head = rev_parse(&tr_local, "HEAD");
    assert_eq!(head, a2);
}

/// Scenario 2 (spec §8): an unauthorized trailing commit on the target's
/// branch is rejected outright in strict mode, and nothing is persisted.
#[test]
fn strict_mode_rejects_unauthorized_trailing_commit() {
    let harness = Harness::new();
    let key = generate_ed25519_keypair();

    let ar_dir = harness._root.path().join("origin-ar");
    init_bare_main(&ar_dir);

    let tr_name = "ns/tr1";
    let tr_full: FullName = tr_name.parse().unwrap();

    let tr_dir = dir_with_repo();
    commit_file(tr_dir.path(), "a.txt", b"a", "commit a1");
    let a1 = rev_parse(tr_dir.path(), "HEAD");
    commit_file(tr_dir.path(), "unauthorized.txt", b"x", "commit extra, unauthorized");

    let repos = repositories_json(tr_name, false);
    let mirrors = mirrors_json(tr_dir.path().to_str().unwrap());

    write_ar_commit(&ar_dir, &key, &repos, &mirrors, None, "bootstrap");
    write_ar_commit(
        &ar_dir,
        &key,
        &repos,
        &mirrors,
        Some(("ns/tr1", &target_commit_json("main", &a1))),
        "authorize a1",
    );

    let ar_full: FullName = "ns/ar".parse().unwrap();
    let options = UpdateOptions {
        strict: true,
        ..Default::default()
    };
    let result = pipeline::update(
        &harness.ctx(),
        ar_dir.to_str().unwrap(),
        &ar_full,
        &options,
    );

    assert!(matches!(
        result,
        Err(Error::UnexpectedAuthorizedCommit { .. })
    ));

    let lvc_dir = harness
        .conf_dir_root
        .join(format!("_{}_{}", ar_full.namespace, ar_full.name));
    assert_eq!(taf::persistence::read_lvc(&lvc_dir).unwrap(), None);
    assert!(!harness.library_dir.join("ns").join(&tr_full.name).exists());
}

/// A strict TR must reject a commit interleaved *between* two authorized
/// checkpoints, not just a trailing one past the last authorized commit
/// (the failure mode scenario 2 above does not exercise).
#[test]
fn strict_mode_rejects_commit_interleaved_between_two_authorized_commits() {
    let harness = Harness::new();
    let key = generate_ed25519_keypair();

    let ar_dir = harness._root.path().join("origin-ar");
    init_bare_main(&ar_dir);

    let tr_name = "ns/tr1";

    let tr_dir = dir_with_repo();
    commit_file(tr_dir.path(), "a.txt", b"a", "commit a1");
    let a1 = rev_parse(tr_dir.path(), "HEAD");
    commit_file(tr_dir.path(), "m.txt", b"m", "commit m, unauthorized");
    commit_file(tr_dir.path(), "b.txt", b"b", "commit a2");
    let a2 = rev_parse(tr_dir.path(), "HEAD");

    let repos = repositories_json(tr_name, false);
    let mirrors = mirrors_json(tr_dir.path().to_str().unwrap());

    write_ar_commit(&ar_dir, &key, &repos, &mirrors, None, "bootstrap");
    write_ar_commit(
        &ar_dir,
        &key,
        &repos,
        &mirrors,
        Some(("ns/tr1", &target_commit_json("main", &a1))),
        "authorize a1",
    );
    write_ar_commit(
        &ar_dir,
        &key,
        &repos,
        &mirrors,
        Some(("ns/tr1", &target_commit_json("main", &a2))),
        "authorize a2",
    );

    let ar_full: FullName = "ns/ar".parse().unwrap();
    let options = UpdateOptions {
        strict: true,
        ..Default::default()
    };
    let result = pipeline::update(&harness.ctx(), ar_dir.to_str().unwrap(), &ar_full, &options);

    assert!(matches!(result, Err(Error::TargetMismatch { .. })));

    let lvc_dir = harness
        .conf_dir_root
        .join(format!("_{}_{}", ar_full.namespace, ar_full.name));
    assert_eq!(taf::persistence::read_lvc(&lvc_dir).unwrap(), None);
}

/// Scenario 6 (spec §8): an out-of-band pin that disagrees with the
/// authentication repository's actual first commit is rejected before
/// anything else is read or written.
#[test]
fn out_of_band_mismatch_rejects_before_any_write() {
    let harness = Harness::new();
    let key = generate_ed25519_keypair();

    let ar_dir = harness._root.path().join("origin-ar");
    init_bare_main(&ar_dir);

    let repos = repositories_json("ns/tr1", false);
    let mirrors = mirrors_json("/nonexistent");
    write_ar_commit(&ar_dir, &key, &repos, &mirrors, None, "bootstrap");

    let ar_full: FullName = "ns/ar".parse().unwrap();
    let wrong_pin: CommitId = "f".repeat(40).parse().unwrap();
    let options = UpdateOptions {
        out_of_band: Some(wrong_pin),
        ..Default::default()
    };
    let result = pipeline::update(
        &harness.ctx(),
        ar_dir.to_str().unwrap(),
        &ar_full,
        &options,
    );

    assert!(matches!(result, Err(Error::OutOfBandMismatch { .. })));

    let lvc_dir = harness
        .conf_dir_root
        .join(format!("_{}_{}", ar_full.namespace, ar_full.name));
    assert_eq!(taf::persistence::read_lvc(&lvc_dir).unwrap(), None);
    assert!(!harness.library_dir.join("ns").join("ar").exists());
}

/// Scenario B3 (spec §8): an authentication repository whose tree never
/// contains `dependencies.json` recurses into nothing.
#[test]
fn missing_dependencies_json_means_no_recursion() {
    let harness = Harness::new();
    let key = generate_ed25519_keypair();

    let ar_dir = harness._root.path().join("origin-ar");
    init_bare_main(&ar_dir);

    // No target repositories at all: an empty repositories map still
    // exercises the dependency-less path end to end.
    let repos = serde_json::json!({ "repositories": {} })
        .to_string()
        .into_bytes();
    let mirrors = mirrors_json("/nonexistent");
    write_ar_commit(&ar_dir, &key, &repos, &mirrors, None, "bootstrap");

    let ar_full: FullName = "ns/ar".parse().unwrap();
    let summary = pipeline::clone(
        &harness.ctx(),
        ar_dir.to_str().unwrap(),
        &ar_full,
        ExpectedType::Either,
        &UpdateOptions::default(),
    )
    .expect("clone of a dependency-less repo should succeed");

    assert!(summary.dependency_results.is_empty());
    assert!(summary.targets.is_empty());
    assert_eq!(summary.outcome, Outcome::Changed);
}

/// Property R2 (spec §8): clone is equivalent to update against an empty
/// library — re-running update afterwards with no new AR commits is a
/// no-op (property R1, idempotence).
#[test]
fn clone_then_update_with_no_new_commits_is_unchanged() {
    let harness = Harness::new();
    let key = generate_ed25519_keypair();

    let ar_dir = harness._root.path().join("origin-ar");
    init_bare_main(&ar_dir);

    let repos = serde_json::json!({ "repositories": {} })
        .to_string()
        .into_bytes();
    let mirrors = mirrors_json("/nonexistent");
    write_ar_commit(&ar_dir, &key, &repos, &mirrors, None, "bootstrap");

    let ar_full: FullName = "ns/ar".parse().unwrap();
    let first = pipeline::clone(
        &harness.ctx(),
        ar_dir.to_str().unwrap(),
        &ar_full,
        ExpectedType::Either,
        &UpdateOptions::default(),
    )
    .unwrap();
    assert_eq!(first.outcome, Outcome::Changed);

    let second = pipeline::update(
        &harness.ctx(),
        ar_dir.to_str().unwrap(),
        &ar_full,
        &UpdateOptions::default(),
    )
    .unwrap();
    assert_eq!(second.outcome, Outcome::Unchanged);
    assert_eq!(second.lvc_before, first.lvc_after);
    assert_eq!(second.lvc_after, first.lvc_after);
}
