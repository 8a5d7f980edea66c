//! The Metadata Store Adapter (spec §4.2): serves TUF metadata and
//! target bytes as of a specific Git commit (or, for maintenance
//! tooling, a plain filesystem tree). The TUF Verifier is never aware
//! of which backend it is talking to.

use std::path::{Path, PathBuf};

use crate::git::{worker, BareHandle, GitError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error("failed to read {0}: {1}")]
    Io(String, #[source] std::io::Error),
}

/// Capability interface implemented by both backends (spec Design Notes
/// "Polymorphism via inheritance ... no deep inheritance is needed").
pub trait MetadataStore {
    /// Read `metadata/<role>.json`, or `None` if absent.
    fn read_role(&self, role_filename: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Read `targets/<path>`, or `None` if absent.
    fn read_target(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// List every path under `targets/<prefix>`.
    fn list_targets(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

pub struct GitStore {
    handle: BareHandle,
    commit: String,
}

impl GitStore {
    pub fn new(handle: BareHandle, commit: impl Into<String>) -> Self {
        GitStore {
            handle,
            commit: commit.into(),
        }
    }

    pub fn commit(&self) -> &str {
        &self.commit
    }
}

impl MetadataStore for GitStore {
    fn read_role(&self, role_filename: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = format!("metadata/{role_filename}.json");
        Ok(worker::read_blob(&self.handle, &self.commit, &path)?)
    }

    fn read_target(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let full = format!("targets/{path}");
        Ok(worker::read_blob(&self.handle, &self.commit, &full)?)
    }

    fn list_targets(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let full_prefix = format!("targets/{prefix}");
        let paths = worker::list_tree(&self.handle, &self.commit, &full_prefix)?;
        Ok(paths
            .into_iter()
            .map(|p| p.trim_start_matches("targets/").to_string())
            .collect())
    }
}

/// Used by maintenance tooling (out of scope for the Updater itself, but
/// the same adapter contract applies, per spec §4.2) and by tests that
/// build fixtures directly on disk instead of through Git.
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FilesystemStore { root: root.into() }
    }
}

impl MetadataStore for FilesystemStore {
    fn read_role(&self, role_filename: &str) -> Result<Option<Vec<u8>>, StoreError> {
        read_file_opt(&self.root.join("metadata").join(format!("{role_filename}.json")))
    }

    fn read_target(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        read_file_opt(&self.root.join("targets").join(path))
    }

    fn list_targets(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join("targets").join(prefix);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        walk_dir(&dir, &self.root.join("targets"), &mut out)?;
        Ok(out)
    }
}

fn walk_dir(dir: &Path, targets_root: &Path, out: &mut Vec<String>) -> Result<(), StoreError> {
    for entry in std::fs::read_dir(dir).map_err(|e| StoreError::Io(dir.display().to_string(), e))? {
        let entry = entry.map_err(|e| StoreError::Io(dir.display().to_string(), e))?;
        let path = entry.path();
        if path.is_dir() {
            walk_dir(&path, targets_root, out)?;
        } else if let Ok(rel) = path.strip_prefix(targets_root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

fn read_file_opt(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Io(path.display().to_string(), e)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn filesystem_store_reads_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("metadata")).unwrap();
        fs::write(dir.path().join("metadata/root.json"), b"{}").unwrap();
        fs::create_dir_all(dir.path().join("targets/ns/repo")).unwrap();
        fs::write(dir.path().join("targets/ns/repo/a"), b"data").unwrap();

        let store = FilesystemStore::new(dir.path());
        assert_eq!(store.read_role("root").unwrap(), Some(b"{}".to_vec()));
        assert_eq!(store.read_role("missing").unwrap(), None);
        assert_eq!(
            store.read_target("ns/repo/a").unwrap(),
            Some(b"data".to_vec())
        );
        let listed = store.list_targets("ns").unwrap();
        assert_eq!(listed, vec!["ns/repo/a".to_string()]);
    }
}
