//! Loading a complete TUF repository state (spec §3 "TUF repository
//! state") from a [`MetadataStore`] at one commit. Loading never
//! verifies anything — that is `verifier::verify_transition`'s job; this
//! module only has to find and parse the files.

use std::collections::{HashMap, VecDeque};

use super::metadata::{RootMetadata, Signed, SnapshotMetadata, TargetsMetadata, TimestampMetadata};
use super::store::{MetadataStore, StoreError};
use super::verifier::MetadataError;

#[derive(Clone)]
pub struct TufState {
    pub root: Signed<RootMetadata>,
    pub targets: Signed<TargetsMetadata>,
    pub snapshot: Signed<SnapshotMetadata>,
    pub timestamp: Signed<TimestampMetadata>,
    /// Delegated targets roles, keyed by role name, loaded transitively
    /// starting from `targets.delegations`.
    pub delegated: HashMap<String, Signed<TargetsMetadata>>,
}

fn load_role<T: serde::de::DeserializeOwned>(
    store: &dyn MetadataStore,
    filename: &str,
) -> Result<Signed<T>, MetadataError> {
    let bytes = store
        .read_role(filename)
        .map_err(MetadataError::Store)?
        .ok_or_else(|| MetadataError::MetadataMissing(filename.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| MetadataError::MalformedJson(filename.to_string(), e.to_string()))
}

/// Load root, timestamp, snapshot, targets, and every transitively
/// delegated targets role, in that order (spec §5 "Ordering
/// guarantees").
pub fn load(store: &dyn MetadataStore) -> Result<TufState, MetadataError> {
    let root: Signed<RootMetadata> = load_role(store, "root")?;
    let timestamp: Signed<TimestampMetadata> = load_role(store, "timestamp")?;
    let snapshot: Signed<SnapshotMetadata> = load_role(store, "snapshot")?;
    let targets: Signed<TargetsMetadata> = load_role(store, "targets")?;

    let mut delegated = HashMap::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut seen = std::collections::HashSet::new();
    if let Some(delegations) = &targets.signed.delegations {
        for role in &delegations.roles {
            if seen.insert(role.name.clone()) {
                queue.push_back(role.name.clone());
            }
        }
    }

    while let Some(name) = queue.pop_front() {
        let role: Signed<TargetsMetadata> = load_role(store, &name)?;
        if let Some(delegations) = &role.signed.delegations {
            for child in &delegations.roles {
                if seen.insert(child.name.clone()) {
                    queue.push_back(child.name.clone());
                }
            }
        }
        delegated.insert(name, role);
    }

    Ok(TufState {
        root,
        targets,
        snapshot,
        timestamp,
        delegated,
    })
}

impl From<StoreError> for MetadataError {
    fn from(e: StoreError) -> Self {
        MetadataError::Store(e)
    }
}
