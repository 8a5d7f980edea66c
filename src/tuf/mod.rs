//! TUF metadata state, the Metadata Store Adapter (C2), and the TUF
//! Verifier (C3).

pub mod crypto;
pub mod metadata;
pub mod state;
pub mod store;
pub mod verifier;

pub use metadata::Role;
pub use state::TufState;
pub use store::{FilesystemStore, GitStore, MetadataStore, StoreError};
pub use verifier::{
    verify_bootstrap, verify_target_bytes, verify_transition, MetadataError, VerifyOutcome, Warning,
};
