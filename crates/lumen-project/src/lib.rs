//! In-memory model of the host IDE's module and library structure.
//!
//! The IDE side of the sync is represented as two arenas addressed by opaque
//! ids: modules ([`ModuleId`]) and the project-wide shared library table
//! ([`LibraryId`]). Cross-references between them (a module's order entries)
//! are ids, not pointers, so a reference may dangle after its target is
//! removed; the sync engine's garbage-collection pass is the component that
//! cleans such references up.
//!
//! Mutation follows the modifiable-model discipline: take a snapshot with
//! [`IdeProject::edit`], change it freely off the lock, then swap it in with
//! [`IdeProject::commit`]. The commit is the only writer, runs under a single
//! write lock, and either applies entirely or (when the session has been
//! closed) not at all.

mod model;
mod project;

pub use model::{
    BuildOwner, ContentEntry, Library, LibraryId, Module, ModuleId, OrderEntry, ProjectModel,
    SourceFolder, SourceFolderKind,
};
pub use project::IdeProject;

use thiserror::Error;

/// Reasons a [`IdeProject::commit`] can be refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("the IDE project session is closed")]
    SessionClosed,
}
