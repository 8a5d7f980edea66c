//! TUF metadata shapes (spec §3 "Metadata role" / "TUF repository
//! state"), simplified to canonical JSON only — spec.md does not
//! require pluggable wire encodings the way `rust-tuf`'s `DataInterchange`
//! trait does, so that abstraction is dropped.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One of the roles a TUF repository state carries (spec §3 "Metadata
/// role").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Root,
    Targets,
    Snapshot,
    Timestamp,
    Delegated(String),
}

impl Role {
    /// The metadata filename (without extension) this role is stored
    /// under in `metadata/`.
    pub fn filename(&self) -> String {
        match self {
            Role::Root => "root".to_string(),
            Role::Targets => "targets".to_string(),
            Role::Snapshot => "snapshot".to_string(),
            Role::Timestamp => "timestamp".to_string(),
            Role::Delegated(name) => name.clone(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filename())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    pub keyval: KeyValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValue {
    pub public: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    pub sig: String,
}

/// A role body together with the signatures over its canonical JSON
/// encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signed<T> {
    pub signed: T,
    pub signatures: Vec<Signature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootMetadata {
    #[serde(rename = "_type")]
    pub typ: String,
    pub version: u64,
    #[serde(default)]
    pub expires: Option<String>,
    pub keys: HashMap<String, Key>,
    pub roles: HashMap<String, RoleKeys>,
}

impl RootMetadata {
    pub fn role_keys(&self, role: &Role) -> Option<&RoleKeys> {
        self.roles.get(&role.filename())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetFile {
    pub length: u64,
    pub hashes: HashMap<String, String>,
    #[serde(default)]
    pub custom: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedRole {
    pub name: String,
    pub keyids: Vec<String>,
    pub threshold: u32,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub terminating: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegations {
    pub keys: HashMap<String, Key>,
    pub roles: Vec<DelegatedRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsMetadata {
    #[serde(rename = "_type")]
    pub typ: String,
    pub version: u64,
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default)]
    pub targets: HashMap<String, TargetFile>,
    #[serde(default)]
    pub delegations: Option<Delegations>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFileInfo {
    pub version: u64,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default)]
    pub hashes: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    #[serde(rename = "_type")]
    pub typ: String,
    pub version: u64,
    #[serde(default)]
    pub expires: Option<String>,
    pub meta: HashMap<String, MetaFileInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampMetadata {
    #[serde(rename = "_type")]
    pub typ: String,
    pub version: u64,
    #[serde(default)]
    pub expires: Option<String>,
    pub meta: HashMap<String, MetaFileInfo>,
}

/// Render `value` as the canonical JSON bytes TUF signatures are
/// computed over: object keys sorted, no insignificant whitespace.
/// Mirrors what `rust-tuf`'s `Json` interchange does internally, without
/// the trait indirection spec.md does not ask for.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(&Value::String((*key).clone()), out);
                out.push(b':');
                write_canonical(&map[*key], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        other => {
            out.extend_from_slice(serde_json::to_string(other).unwrap().as_bytes());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_sorts_keys_and_drops_whitespace() {
        let value = json!({"b": 1, "a": [1, 2, {"z": 1, "y": 2}]});
        let bytes = canonicalize(&value);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":[1,2,{"y":2,"z":1}],"b":1}"#
        );
    }
}
