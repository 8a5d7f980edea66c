//! Persistence and the Last Validated Commit (component C7, spec §4.7).
//! Writes the LVC file atomically and only after every affected target
//! working copy has already been advanced, so a crash mid-update can
//! never leave the LVC pointing past commits that were never actually
//! checked out.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::CommitId;

/// Where the last validated commit for an authentication repository is
/// recorded: `<conf_dir>/last_validated_commit`, where `conf_dir` is the
/// AR's own directory under the conf-dir root (`_<ns>_<name>`), not its
/// working-copy clone (spec §4.7 "Last validated commit").
pub fn lvc_path(conf_dir: &Path) -> PathBuf {
    conf_dir.join("last_validated_commit")
}

pub fn read_lvc(conf_dir: &Path) -> Result<Option<CommitId>, Error> {
    let path = lvc_path(conf_dir);
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(Some(contents.trim().parse()?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `commit` as the new LVC, via a temp file in the same directory
/// followed by an atomic rename, so a reader never observes a
/// partially-written file (spec §4.7 "Atomic LVC write").
pub fn write_lvc(conf_dir: &Path, commit: &CommitId) -> Result<(), Error> {
    let path = lvc_path(conf_dir);
    let parent = path.parent().expect("lvc_path always has a parent");
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(commit.as_str().as_bytes())?;
    tmp.flush()?;
    tmp.persist(&path).map_err(|e| e.error)?;
    Ok(())
}

/// Remove a scratch bare mirror created for the duration of one update,
/// tolerating a mirror that was never created.
pub fn cleanup_scratch(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_dir_all(path) {
            log::warn!("failed to remove scratch dir {path:?}: {e}");
        }
    }
}

/// Commit the results of one successful update: advance every target
/// working copy first, then the AR's own working copy, then finally
/// write the LVC (spec §4.7 "Ordering"). `validate_only` skips every
/// step (spec §4.7 "Validate only mode").
pub struct CommitPlan<'a> {
    pub conf_dir: &'a Path,
    pub new_lvc: CommitId,
    pub validate_only: bool,
}

pub fn commit<F>(plan: CommitPlan, advance_targets: F) -> Result<(), Error>
where
    F: FnOnce() -> Result<(), Error>,
{
    if plan.validate_only {
        return Ok(());
    }
    advance_targets()?;
    write_lvc(plan.conf_dir, &plan.new_lvc)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn write_then_read_lvc_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let lvc: CommitId = "a".repeat(40).parse().unwrap();
        write_lvc(dir.path(), &lvc).unwrap();
        assert_eq!(read_lvc(dir.path()).unwrap(), Some(lvc));
    }

    #[test]
    fn read_lvc_returns_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_lvc(dir.path()).unwrap(), None);
    }

    #[test]
    fn validate_only_never_advances_or_writes() {
        let dir = tempfile::tempdir().unwrap();
        let lvc: CommitId = "b".repeat(40).parse().unwrap();
        let mut advanced = false;
        commit(
            CommitPlan {
                conf_dir: dir.path(),
                new_lvc: lvc,
                validate_only: true,
            },
            || {
                advanced = true;
                Ok(())
            },
        )
        .unwrap();
        assert!(!advanced);
        assert_eq!(read_lvc(dir.path()).unwrap(), None);
    }
}
