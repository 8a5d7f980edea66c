//! The Dependency Recursor (component C6, spec §4.6): enumerates
//! `dependencies.json` edges and tracks, across one whole top-level
//! invocation's recursive descent, which authentication repositories
//! have already been pinned and which are still on the current path
//! (for cycle detection). The actual recursive descent into each edge's
//! own authentication repository is the pipeline's job (it needs to
//! re-run the full C1–C7 sequence per child); this module only owns the
//! bookkeeping that has to survive across those recursive calls.

use std::collections::{HashMap, HashSet};

use crate::config_files::{self, DependenciesJson};
use crate::error::Error;
use crate::git::{worker, BareHandle};
use crate::tuf::{self, TufState};
use crate::types::{CommitId, FullName};

/// Tracks every authentication repository reached so far across one
/// top-level invocation's whole dependency tree (spec §4.6 "no global
/// database" — this lives on the call stack, never as a `static`).
#[derive(Debug, Default)]
pub struct VisitContext {
    pinned_first_commit: HashMap<FullName, CommitId>,
    in_progress: HashSet<FullName>,
}

impl VisitContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `name` on the current recursion path. Returns
    /// `Err(CyclicDependency)` if `name` is already an ancestor of this
    /// call.
    pub fn enter(&mut self, name: &FullName) -> Result<(), Error> {
        if !self.in_progress.insert(name.clone()) {
            return Err(Error::CyclicDependency(name.to_string()));
        }
        Ok(())
    }

    pub fn leave(&mut self, name: &FullName) {
        self.in_progress.remove(name);
    }

    /// Record (or validate) the pin for `name`. Returns `Err(PinConflict)`
    /// if a different commit was already pinned via another path (spec
    /// §9 Open Question, resolved as "not relaxed" in DESIGN.md).
    pub fn pin(&mut self, name: &FullName, first_commit: &CommitId) -> Result<(), Error> {
        match self.pinned_first_commit.get(name) {
            Some(existing) if existing != first_commit => Err(Error::PinConflict(
                name.to_string(),
                existing.to_string(),
                first_commit.to_string(),
            )),
            Some(_) => Ok(()),
            None => {
                self.pinned_first_commit
                    .insert(name.clone(), first_commit.clone());
                Ok(())
            }
        }
    }

    /// Whether `name` has already been fully pinned (reached via some
    /// earlier, already-completed path this run).
    pub fn already_pinned(&self, name: &FullName) -> bool {
        self.pinned_first_commit.contains_key(name)
    }
}

/// One dependency edge read out of `dependencies.json`.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub name: FullName,
    pub out_of_band_authentication: Option<CommitId>,
}

/// Parse `dependencies.json` at `ar_commit`, if present (spec §8 B3:
/// absent means no recursion). `state` is the verified TUF state at
/// `ar_commit`, used to check the file against its declared hash (spec
/// §4.3 rule 5) before it is trusted.
pub fn read_dependencies(
    ar_handle: &BareHandle,
    ar_commit: &str,
    state: &TufState,
) -> Result<Vec<DependencyEdge>, Error> {
    let Some(bytes) = worker::read_blob(ar_handle, ar_commit, "targets/dependencies.json")? else {
        return Ok(Vec::new());
    };
    tuf::verify_target_bytes(state, "dependencies.json", &bytes)?;
    let parsed: DependenciesJson = config_files::parse_dependencies(&bytes)?;

    parsed
        .dependencies
        .into_iter()
        .map(|(name, entry)| {
            let name: FullName = name.parse()?;
            let out_of_band_authentication = entry
                .out_of_band_authentication
                .map(|c| c.parse())
                .transpose()?;
            Ok(DependencyEdge {
                name,
                out_of_band_authentication,
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cycle_detection_rejects_reentry() {
        let mut ctx = VisitContext::new();
        let name: FullName = "ns/a".parse().unwrap();
        ctx.enter(&name).unwrap();
        assert!(matches!(ctx.enter(&name), Err(Error::CyclicDependency(_))));
        ctx.leave(&name);
        assert!(ctx.enter(&name).is_ok());
    }

    #[test]
    fn pin_conflict_rejected_on_disagreement() {
        let mut ctx = VisitContext::new();
        let name: FullName = "ns/a".parse().unwrap();
        let c1: CommitId = "a".repeat(40).parse().unwrap();
        let c2: CommitId = "b".repeat(40).parse().unwrap();
        ctx.pin(&name, &c1).unwrap();
        assert!(ctx.pin(&name, &c1).is_ok());
        assert!(matches!(ctx.pin(&name, &c2), Err(Error::PinConflict(..))));
    }
}
