//! Typed parsing of the AR's own tracked JSON configuration files (spec
//! §6): `repositories.json`, `mirrors.json`, `dependencies.json`,
//! `protected/info.json`, and per-target commit files. These are core
//! domain data served by the Metadata Store Adapter, not ambient
//! application configuration — they are parsed with `serde`/`serde_json`
//! the same way the teacher parses its own on-disk files, but read from
//! Git blobs rather than the filesystem directly.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::types::{CommitId, FullName};

/// `IndexMap`, not `HashMap`: breadth-first target comparison (spec
/// §4.5 rule 6) attributes a failure to the lowest-*indexed* TR, i.e.
/// its declared position in the JSON object, which a `HashMap` would
/// scramble on deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoriesJson {
    pub repositories: IndexMap<String, RepositoryEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryEntry {
    #[serde(default)]
    pub custom: Option<Value>,
    /// Accepted going forward in addition to `custom.allow-unauthenticated-commits`
    /// (spec Design Notes "file-format quirks").
    #[serde(rename = "allow-unauthenticated-commits", default)]
    pub allow_unauthenticated_commits_toplevel: Option<bool>,
}

impl RepositoryEntry {
    /// Resolve the `allow-unauthenticated-commits` flag, preferring the
    /// historical `custom` location and falling back to a top-level key.
    pub fn allow_unauthenticated_commits(&self) -> bool {
        if let Some(top) = self.allow_unauthenticated_commits_toplevel {
            return top;
        }
        self.custom
            .as_ref()
            .and_then(|c| c.get("allow-unauthenticated-commits"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

pub fn parse_repositories(bytes: &[u8]) -> Result<RepositoriesJson, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::MalformedConfig {
        file: "repositories.json".to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct MirrorsJson {
    pub mirrors: Vec<String>,
}

pub fn parse_mirrors(bytes: &[u8]) -> Result<MirrorsJson, Error> {
    let parsed: MirrorsJson = serde_json::from_slice(bytes).map_err(|e| Error::MalformedConfig {
        file: "mirrors.json".to_string(),
        reason: e.to_string(),
    })?;
    if parsed.mirrors.is_empty() {
        return Err(Error::MalformedConfig {
            file: "mirrors.json".to_string(),
            reason: "mirrors list must be non-empty".to_string(),
        });
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Deserialize)]
pub struct DependenciesJson {
    pub dependencies: HashMap<String, DependencyEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DependencyEntry {
    #[serde(rename = "out-of-band-authentication", default)]
    pub out_of_band_authentication: Option<String>,
}

pub fn parse_dependencies(bytes: &[u8]) -> Result<DependenciesJson, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::MalformedConfig {
        file: "dependencies.json".to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtectedInfo {
    pub namespace: String,
    pub name: String,
}

pub fn parse_protected_info(bytes: &[u8]) -> Result<ProtectedInfo, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::MalformedConfig {
        file: "protected/info.json".to_string(),
        reason: e.to_string(),
    })
}

/// The authorized `{branch, commit}` pair published for a target
/// repository at one AR commit (spec §3 "Target repository").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCommit {
    pub branch: String,
    pub commit: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

pub fn parse_target_commit(bytes: &[u8]) -> Result<TargetCommit, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::MalformedConfig {
        file: "targets/<ns>/<name>".to_string(),
        reason: e.to_string(),
    })
}

impl TargetCommit {
    pub fn commit_id(&self) -> Result<CommitId, Error> {
        self.commit.parse()
    }
}

/// Path of the per-target commit file relative to `targets/`.
pub fn target_commit_path(name: &FullName) -> String {
    format!("{}/{}", name.namespace, name.name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn allow_unauthenticated_commits_reads_custom_first() {
        let entry: RepositoryEntry = serde_json::from_value(serde_json::json!({
            "custom": {"allow-unauthenticated-commits": true}
        }))
        .unwrap();
        assert!(entry.allow_unauthenticated_commits());

        let entry: RepositoryEntry = serde_json::from_value(serde_json::json!({
            "allow-unauthenticated-commits": true
        }))
        .unwrap();
        assert!(entry.allow_unauthenticated_commits());

        let entry: RepositoryEntry = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(!entry.allow_unauthenticated_commits());
    }

    #[test]
    fn mirrors_json_rejects_empty_list() {
        let bytes = br#"{"mirrors": []}"#;
        assert!(parse_mirrors(bytes).is_err());
    }

    #[test]
    fn target_commit_roundtrips_extra_fields() {
        let bytes = br#"{"branch": "main", "commit": "abc123", "custom-field": 1}"#;
        let parsed = parse_target_commit(bytes).unwrap();
        assert_eq!(parsed.branch, "main");
        assert_eq!(parsed.commit, "abc123");
        assert_eq!(parsed.extra.get("custom-field").unwrap(), &serde_json::json!(1));
    }
}
