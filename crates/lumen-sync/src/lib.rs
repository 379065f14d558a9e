//! Reconciliation engine keeping the IDE project model in agreement with
//! Leiningen build descriptors.
//!
//! [`SyncEngine`] drives one project's reimport end to end: load the
//! descriptor through a [`lumen_descriptor::DescriptorSource`], take a
//! snapshot of the IDE model, rebuild the target module's content roots and
//! order entries against the descriptor, then commit the snapshot in one
//! atomic swap. Observers never see a half-synced model.
//!
//! [`ProjectRegistry`] is the session-scoped set of tracked descriptor
//! files. Only the ordered file locations are persisted; everything else is
//! rebuilt from disk when a session restores its state.

mod engine;
mod libraries;
mod naming;
mod paths;
mod registry;

pub use engine::{ImportReport, SyncConfig, SyncEngine};
pub use naming::{library_name, library_owner, LEIN_LIBRARY_PREFIX, MAVEN_LIBRARY_PREFIX};
pub use registry::{
    ProjectIdentity, ProjectRegistry, RegistryEvent, RegistryState, SyncState, TrackedProject,
};

use std::path::PathBuf;

use lumen_descriptor::DescriptorError;
use thiserror::Error;

/// Why one project's sync failed.
///
/// Failures never cross project boundaries: batch operations record the
/// error for the offending descriptor and continue with the rest.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The descriptor could not be read or parsed.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// The target module is already managed by a competing build
    /// integration. Nothing was mutated.
    #[error("module `{module}` is managed by another build tool integration")]
    Conflict { module: String },

    /// The compiler output directory could not be created.
    #[error("failed to create compiler output directory `{path}`")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The IDE session closed while the sync was in flight. The pending
    /// edit was discarded.
    #[error("the IDE project session closed before the sync could commit")]
    SessionClosed,
}

impl From<lumen_project::CommitError> for SyncError {
    fn from(err: lumen_project::CommitError) -> Self {
        match err {
            lumen_project::CommitError::SessionClosed => SyncError::SessionClosed,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
