use crate::{CommitError, ProjectModel};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    model: ProjectModel,
    revision: u64,
}

/// Handle on one IDE project session: the live model plus a liveness flag.
///
/// Reads take the shared side of the lock and never block behind more than
/// one in-flight commit. Writers never mutate in place: they take a snapshot
/// with [`edit`], change it off the lock, and swap it back in with
/// [`commit`]. Closing the session makes every later commit fail, which is
/// how an in-flight sync is told to discard its work.
///
/// [`edit`]: IdeProject::edit
/// [`commit`]: IdeProject::commit
#[derive(Debug, Default)]
pub struct IdeProject {
    inner: RwLock<Inner>,
    open: AtomicBool,
}

impl IdeProject {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            open: AtomicBool::new(true),
        }
    }

    /// Runs `f` against the current model under the read lock.
    pub fn with_read<R>(&self, f: impl FnOnce(&ProjectModel) -> R) -> R {
        f(&self.inner.read().model)
    }

    /// Independent copy of the current model.
    pub fn snapshot(&self) -> ProjectModel {
        self.inner.read().model.clone()
    }

    /// Snapshot to mutate and hand back to [`IdeProject::commit`].
    pub fn edit(&self) -> ProjectModel {
        self.snapshot()
    }

    /// Atomically replaces the model with `model`.
    ///
    /// Returns the new revision. Fails without applying anything when the
    /// session has been closed.
    pub fn commit(&self, model: ProjectModel) -> Result<u64, CommitError> {
        let mut inner = self.inner.write();
        if !self.open.load(Ordering::SeqCst) {
            return Err(CommitError::SessionClosed);
        }
        inner.model = model;
        inner.revision += 1;
        debug!(
            target: "lumen.project",
            revision = inner.revision,
            modules = inner.model.module_count(),
            libraries = inner.model.library_count(),
            "committed project model"
        );
        Ok(inner.revision)
    }

    /// Number of commits applied so far.
    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Marks the session as torn down. In-flight syncs observe this at their
    /// commit step and abort cleanly.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
