//! The Git Worker (component C1). See [`worker`] for the operations
//! exposed to the rest of the pipeline.

mod lowlevel;
pub mod types;
pub mod worker;

pub use types::GitError;
pub use worker::{BareHandle, WorkingCopy};
