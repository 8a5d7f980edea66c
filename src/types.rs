//! Core data model (spec §3): commit identifiers, full names, and the
//! outcomes/configuration the pipeline's entry points accept and return.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An opaque, fixed-length Git commit identifier (spec §3 "Commit
/// identifier"): 40 hex characters when rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CommitId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 40 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidCommitId(s.to_string()));
        }
        Ok(CommitId(s.to_lowercase()))
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CommitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A repository's two-segment full name, `namespace/name` (spec §3
/// "Authentication repository").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct FullName {
    pub namespace: String,
    pub name: String,
}

impl From<FullName> for String {
    fn from(name: FullName) -> Self {
        name.to_string()
    }
}

impl FullName {
    pub fn as_path_components(&self) -> (&str, &str) {
        (&self.namespace, &self.name)
    }
}

impl FromStr for FullName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('\\', "/");
        let parts: Vec<&str> = normalized.split('/').collect();
        match parts[..] {
            [namespace, name] if !namespace.is_empty() && !name.is_empty() => Ok(FullName {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            _ => Err(Error::InvalidFullName(s.to_string())),
        }
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Expected repository type, checked against `protected/info.json` or
/// caller expectations (spec §6 "Updater invocation surface").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    Test,
    Official,
    Either,
}

/// Terminal outcome of one pipeline invocation (spec §4.8 "Pipeline
/// state").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Changed,
    Unchanged,
    Failed,
    Completed,
    Cancelled,
}

/// Arguments shared by `clone`/`update`/`validate` (spec §6).
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub exclude_target_globs: Vec<String>,
    pub strict: bool,
    pub out_of_band: Option<CommitId>,
    pub forced: bool,
    /// Validate only: skip persistence (spec §4.7 "Validate only mode").
    pub validate_only: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn commit_id_accepts_only_forty_hex_chars() {
        let ok: CommitId = "a".repeat(40).parse().unwrap();
        assert_eq!(ok.as_str(), "a".repeat(40));

        assert!("abc".parse::<CommitId>().is_err());
        assert!("g".repeat(40).parse::<CommitId>().is_err());
    }

    #[test]
    fn full_name_requires_exactly_two_segments() {
        let name: FullName = "openlawlibrary/taf".parse().unwrap();
        assert_eq!(name.namespace, "openlawlibrary");
        assert_eq!(name.name, "taf");

        assert!("toplevel".parse::<FullName>().is_err());
        assert!("a/b/c".parse::<FullName>().is_err());

        let normalized: FullName = "openlawlibrary\\taf".parse().unwrap();
        assert_eq!(normalized.to_string(), "openlawlibrary/taf");
    }
}
