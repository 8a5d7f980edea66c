//! Centralized test fixtures: hermetic git environment setup plus
//! repository and authentication-repository builders shared by unit and
//! integration tests.

use std::env;
use std::path::Path;
use std::process::{Command, Stdio};

use tempfile::{tempdir, TempDir};

/// Sets up a hermetic git environment by configuring environment
/// variables to isolate git operations from the user's global git
/// configuration.
pub fn hermetic_git_env() {
    env::set_var("GIT_CONFIG_NOSYSTEM", "true");
    env::set_var("GIT_CONFIG_GLOBAL", "/dev/null");
    env::set_var("GIT_AUTHOR_NAME", "testuser");
    env::set_var("GIT_AUTHOR_EMAIL", "testuser@example.com");
    env::set_var("GIT_COMMITTER_NAME", "testuser");
    env::set_var("GIT_COMMITTER_EMAIL", "testuser@example.com");
}

fn run_git_command(args: &[&str], dir: &Path) {
    assert!(Command::new("git")
        .args(args)
        .envs([
            ("GIT_CONFIG_NOSYSTEM", "true"),
            ("GIT_CONFIG_GLOBAL", "/dev/null"),
            ("GIT_AUTHOR_NAME", "testuser"),
            ("GIT_AUTHOR_EMAIL", "testuser@example.com"),
            ("GIT_COMMITTER_NAME", "testuser"),
            ("GIT_COMMITTER_EMAIL", "testuser@example.com"),
        ])
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("Failed to spawn git command")
        .success());
}

fn init_repo(dir: &Path) {
    run_git_command(&["init", "--initial-branch", "main"], dir);
    run_git_command(&["commit", "--allow-empty", "-m", "Initial commit"], dir);
}

/// Creates a temporary directory with an initialized repository (branch
/// `main`, one empty initial commit).
pub fn dir_with_repo() -> TempDir {
    let tempdir = tempdir().unwrap();
    init_repo(tempdir.path());
    tempdir
}

/// Writes `content` to `relative_path` inside `repo` and commits it on
/// the currently checked-out branch.
pub fn commit_file(repo: &Path, relative_path: &str, content: &[u8], message: &str) {
    let full = repo.join(relative_path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(&full, content).expect("write fixture file");
    run_git_command(&["add", "--", relative_path], repo);
    run_git_command(&["commit", "-m", message], repo);
}

/// Writes `content` to `relative_path` without committing it, to
/// simulate a dirty working tree.
pub fn write_uncommitted(repo: &Path, relative_path: &str, content: &[u8]) {
    let full = repo.join(relative_path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(&full, content).expect("write fixture file");
}

/// The raw bytes of a genuine ed25519 keypair, produced once per process
/// via `ring`, for tests that need a signing key instead of hand-rolled
/// byte soup (spec §4.3 signature checks exercise real crypto).
pub struct TestKeyPair {
    pub keypair: ring::signature::Ed25519KeyPair,
    pub public_key_hex: String,
}

pub fn generate_ed25519_keypair() -> TestKeyPair {
    let rng = ring::rand::SystemRandom::new();
    let pkcs8 = ring::signature::Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    let keypair = ring::signature::Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
    let public_key_hex =
        data_encoding::HEXLOWER.encode(keypair.public_key().as_ref());
    TestKeyPair {
        keypair,
        public_key_hex,
    }
}

/// A minimal, internally consistent fixture AR commit: a one-key,
/// threshold-1 root plus matching targets/snapshot/timestamp, all signed
/// with `key`. Returns the role bodies as pretty-printed JSON strings
/// ready to be written under `metadata/`.
pub struct FixtureAr {
    pub root_json: String,
    pub targets_json: String,
    pub snapshot_json: String,
    pub timestamp_json: String,
}

/// Builds a self-consistent, minimally-valid metadata set signed by
/// `key`, with the given `targets` map (`path -> bytes`) declared in
/// `targets.json` and all versions set to 1.
pub fn build_fixture_ar(key: &TestKeyPair, targets: &[(&str, &[u8])]) -> FixtureAr {
    use crate::tuf::metadata::canonicalize;
    use serde_json::json;

    let target_entries: serde_json::Map<String, serde_json::Value> = targets
        .iter()
        .map(|(path, bytes)| {
            let hash =
                data_encoding::HEXLOWER.encode(ring::digest::digest(&ring::digest::SHA256, bytes).as_ref());
            (
                (*path).to_string(),
                json!({ "length": bytes.len(), "hashes": { "sha256": hash } }),
            )
        })
        .collect();

    let targets_body = json!({
        "_type": "targets",
        "spec_version": "1.0.0",
        "version": 1,
        "expires": "2999-01-01T00:00:00Z",
        "targets": target_entries,
    });
    let targets_sig = sign_body(key, &targets_body);
    let targets_json = json!({ "signed": targets_body, "signatures": [targets_sig] });

    let targets_hash = data_encoding::HEXLOWER
        .encode(ring::digest::digest(&ring::digest::SHA256, &canonicalize(&targets_json["signed"])).as_ref());

    let root_body = json!({
        "_type": "root",
        "spec_version": "1.0.0",
        "version": 1,
        "expires": "2999-01-01T00:00:00Z",
        "keys": { key.public_key_hex.clone(): { "keytype": "ed25519", "scheme": "ed25519", "keyval": { "public": key.public_key_hex } } },
        "roles": {
            "root": { "keyids": [key.public_key_hex], "threshold": 1 },
            "targets": { "keyids": [key.public_key_hex], "threshold": 1 },
            "snapshot": { "keyids": [key.public_key_hex], "threshold": 1 },
            "timestamp": { "keyids": [key.public_key_hex], "threshold": 1 },
        },
    });
    let root_sig = sign_body(key, &root_body);
    let root_json = json!({ "signed": root_body, "signatures": [root_sig] });

    let snapshot_body = json!({
        "_type": "snapshot",
        "spec_version": "1.0.0",
        "version": 1,
        "expires": "2999-01-01T00:00:00Z",
        "meta": { "targets.json": { "version": 1, "hashes": { "sha256": targets_hash } } },
    });
    let snapshot_sig = sign_body(key, &snapshot_body);
    let snapshot_json = json!({ "signed": snapshot_body, "signatures": [snapshot_sig] });

    let snapshot_hash = data_encoding::HEXLOWER
        .encode(ring::digest::digest(&ring::digest::SHA256, &canonicalize(&snapshot_json["signed"])).as_ref());

    let timestamp_body = json!({
        "_type": "timestamp",
        "spec_version": "1.0.0",
        "version": 1,
        "expires": "2999-01-01T00:00:00Z",
        "meta": { "snapshot.json": { "version": 1, "hashes": { "sha256": snapshot_hash } } },
    });
    let timestamp_sig = sign_body(key, &timestamp_body);
    let timestamp_json = json!({ "signed": timestamp_body, "signatures": [timestamp_sig] });

    FixtureAr {
        root_json: serde_json::to_string_pretty(&root_json).unwrap(),
        targets_json: serde_json::to_string_pretty(&targets_json).unwrap(),
        snapshot_json: serde_json::to_string_pretty(&snapshot_json).unwrap(),
        timestamp_json: serde_json::to_string_pretty(&timestamp_json).unwrap(),
    }
}

fn sign_body(key: &TestKeyPair, body: &serde_json::Value) -> serde_json::Value {
    use crate::tuf::metadata::canonicalize;
    let message = canonicalize(body);
    let signature = key.keypair.sign(&message);
    serde_json::json!({
        "keyid": key.public_key_hex,
        "sig": data_encoding::HEXLOWER.encode(signature.as_ref()),
    })
}

/// Writes a [`FixtureAr`]'s role bodies into `repo/metadata/` and stages
/// them (caller commits).
pub fn write_fixture_ar(repo: &Path, ar: &FixtureAr) {
    std::fs::create_dir_all(repo.join("metadata")).unwrap();
    std::fs::write(repo.join("metadata/root.json"), &ar.root_json).unwrap();
    std::fs::write(repo.join("metadata/targets.json"), &ar.targets_json).unwrap();
    std::fs::write(repo.join("metadata/snapshot.json"), &ar.snapshot_json).unwrap();
    std::fs::write(repo.join("metadata/timestamp.json"), &ar.timestamp_json).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hermetic_git_env() {
        hermetic_git_env();
        assert_eq!(env::var("GIT_CONFIG_NOSYSTEM").unwrap(), "true");
        assert_eq!(env::var("GIT_AUTHOR_NAME").unwrap(), "testuser");
    }

    #[test]
    fn test_dir_with_repo() {
        hermetic_git_env();
        let repo_dir = dir_with_repo();
        let output = Command::new("git")
            .args(["rev-parse", "--is-inside-work-tree"])
            .current_dir(repo_dir.path())
            .output()
            .expect("Failed to run git command");
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "true");
    }

    #[test]
    fn test_build_fixture_ar_round_trips() {
        let key = generate_ed25519_keypair();
        let ar = build_fixture_ar(&key, &[("ns/repo", b"abc123")]);
        assert!(ar.root_json.contains("\"version\": 1"));
        assert!(ar.targets_json.contains("ns/repo"));
    }
}
