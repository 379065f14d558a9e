//! The sync engine: one descriptor in, one committed model edit out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lumen_descriptor::{DescriptorSource, ProjectDescriptor};
use lumen_project::{BuildOwner, ContentEntry, IdeProject, ModuleId};
use tracing::{debug, info, warn};

use crate::libraries::{gc_order_entries, reconcile_libraries};
use crate::paths::reconcile_paths;
use crate::registry::{
    canonical_path, ProjectIdentity, ProjectRegistry, RegistryState, TrackedProject,
};
use crate::{Result, SyncError};

/// Tunables for [`SyncEngine`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remove Maven-prefixed order entries from modules this integration
    /// manages. Their libraries are never deleted either way.
    pub delete_foreign_entries: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            delete_foreign_entries: true,
        }
    }
}

/// Outcome of a batch operation over several descriptors.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub synced: Vec<(PathBuf, ModuleId)>,
    pub failed: Vec<(PathBuf, SyncError)>,
    /// Persisted entries whose descriptor no longer resolves to a file.
    pub skipped: Vec<PathBuf>,
    /// Entries whose module is owned by a competing integration and which
    /// were therefore released rather than imported.
    pub conflicted: Vec<PathBuf>,
}

impl ImportReport {
    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.synced.iter().map(|(_, module)| *module).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && self.conflicted.is_empty()
    }
}

/// Drives a project's reimport end to end.
///
/// All mutation happens on a snapshot of the IDE model and lands in a single
/// commit, so a failure anywhere leaves the model exactly as it was. The
/// engine itself is synchronous; callers that want serialized background
/// syncs push closures invoking it onto a queue.
#[derive(Debug)]
pub struct SyncEngine {
    ide: Arc<IdeProject>,
    registry: Arc<ProjectRegistry>,
    source: Arc<dyn DescriptorSource>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        ide: Arc<IdeProject>,
        registry: Arc<ProjectRegistry>,
        source: Arc<dyn DescriptorSource>,
    ) -> Self {
        Self::with_config(ide, registry, source, SyncConfig::default())
    }

    pub fn with_config(
        ide: Arc<IdeProject>,
        registry: Arc<ProjectRegistry>,
        source: Arc<dyn DescriptorSource>,
        config: SyncConfig,
    ) -> Self {
        Self {
            ide,
            registry,
            source,
            config,
        }
    }

    pub fn ide(&self) -> &Arc<IdeProject> {
        &self.ide
    }

    pub fn registry(&self) -> &Arc<ProjectRegistry> {
        &self.registry
    }

    /// Full reimport of the descriptor at `path`.
    ///
    /// Loads the project map, resolves or creates the module rooted at the
    /// descriptor's directory, rebuilds folder markers and compiler output,
    /// resolves dependencies and reconciles order entries, then commits.
    /// If `path` is tracked, its registry entry is updated with the outcome.
    pub fn sync(&self, path: &Path) -> Result<ModuleId> {
        let path = canonical_path(path);
        debug!(target: "lumen.sync", descriptor = %path.display(), "sync started");
        let outcome = self.sync_inner(&path);
        match &outcome {
            Ok(module) => {
                info!(
                    target: "lumen.sync",
                    descriptor = %path.display(),
                    module = module.as_u32(),
                    "sync committed"
                );
            }
            Err(SyncError::SessionClosed) => {
                debug!(
                    target: "lumen.sync",
                    descriptor = %path.display(),
                    "sync abandoned, session closed"
                );
            }
            Err(err) => {
                warn!(
                    target: "lumen.sync",
                    descriptor = %path.display(),
                    error = %err,
                    "sync failed"
                );
                self.registry.record_failed(&path);
            }
        }
        outcome
    }

    fn sync_inner(&self, path: &Path) -> Result<ModuleId> {
        if !self.ide.is_open() {
            return Err(SyncError::SessionClosed);
        }
        let descriptor = self.source.load_project(path)?;
        let root = descriptor.root_dir().to_path_buf();
        self.check_ownership(&root)?;

        let mut edit = self.ide.edit();
        let module = match edit.find_module_by_content_root(&root) {
            Some(id) => {
                debug!(
                    target: "lumen.sync",
                    module = %edit[id].name,
                    "reusing module at content root"
                );
                id
            }
            None => {
                let id = edit.create_module(descriptor.name.clone(), module_file(&root, &descriptor.name));
                edit[id].content_entries.push(ContentEntry::new(root.clone()));
                debug!(target: "lumen.sync", module = %descriptor.name, "created module");
                id
            }
        };
        edit[module].owner = Some(BuildOwner::Leiningen);

        reconcile_paths(&mut edit, module, &descriptor)?;
        let records = self.source.load_dependencies(path)?;
        reconcile_libraries(&mut edit, module, &records, self.config.delete_foreign_entries);

        self.ide.commit(edit)?;
        self.registry
            .record_synced(path, identity_of(&descriptor), module);
        Ok(module)
    }

    /// Fails with [`SyncError::Conflict`] when the module rooted at `root`
    /// belongs to another integration. Runs against the live model before
    /// any edit exists, so a conflicting project is never half-touched.
    fn check_ownership(&self, root: &Path) -> Result<()> {
        self.ide
            .with_read(|model| match model.find_module_by_content_root(root) {
                Some(id) if model[id].owner == Some(BuildOwner::Maven) => {
                    Err(SyncError::Conflict {
                        module: model[id].name.clone(),
                    })
                }
                _ => Ok(()),
            })
    }

    /// Registers and syncs each descriptor. A failing entry is recorded in
    /// the report and does not stop the rest of the batch.
    pub fn import_projects(&self, paths: &[PathBuf]) -> ImportReport {
        let mut report = ImportReport::default();
        for path in paths {
            let path = canonical_path(path);
            self.registry.add(&path);
            match self.sync(&path) {
                Ok(module) => report.synced.push((path, module)),
                Err(err) => report.failed.push((path, err)),
            }
        }
        report
    }

    /// Re-syncs every tracked project.
    ///
    /// A project whose module has been taken over by another integration is
    /// released: its entries are tidied (foreign cleanup off) and it is
    /// untracked.
    pub fn refresh_all(&self) -> ImportReport {
        let mut report = ImportReport::default();
        for project in self.registry.all() {
            let path = project.descriptor_path().to_path_buf();
            match self.sync(&path) {
                Ok(module) => report.synced.push((path, module)),
                Err(SyncError::Conflict { module }) => {
                    warn!(
                        target: "lumen.sync",
                        descriptor = %path.display(),
                        module = %module,
                        "module was taken over by another integration, releasing it"
                    );
                    if let Err(err) = self.tidy(&path, false) {
                        warn!(
                            target: "lumen.sync",
                            descriptor = %path.display(),
                            error = %err,
                            "cleanup after takeover failed"
                        );
                    }
                    self.registry.remove(&path);
                    report.conflicted.push(path);
                }
                Err(err) => report.failed.push((path, err)),
            }
        }
        report
    }

    /// Removes this integration's order entries from the module rooted at
    /// the descriptor's directory without re-importing, deleting libraries
    /// that end up unreferenced, and releases module ownership. Folder
    /// markers and compiler output settings are left as they are.
    pub fn tidy(&self, path: &Path, delete_foreign: bool) -> Result<()> {
        if !self.ide.is_open() {
            return Err(SyncError::SessionClosed);
        }
        let path = canonical_path(path);
        let Some(root) = path.parent().map(Path::to_path_buf) else {
            return Ok(());
        };
        let mut edit = self.ide.edit();
        let Some(module) = edit.find_module_by_content_root(&root) else {
            return Ok(());
        };
        gc_order_entries(&mut edit, module, delete_foreign);
        if edit[module].owner == Some(BuildOwner::Leiningen) {
            edit[module].owner = None;
        }
        self.ide.commit(edit)?;
        info!(
            target: "lumen.sync",
            descriptor = %path.display(),
            "released module dependencies"
        );
        Ok(())
    }

    /// Untracks `path`. Module and library state is deliberately untouched;
    /// [`SyncEngine::tidy`] exists for callers that want the model cleaned
    /// as well.
    pub fn remove_project(&self, path: &Path) -> Option<TrackedProject> {
        self.registry.remove(path)
    }

    /// Transactionally deletes `module` from the IDE model. Deleting a
    /// module that is already gone is not an error.
    pub fn dispose_module(&self, module: ModuleId) -> Result<()> {
        if !self.ide.is_open() {
            return Err(SyncError::SessionClosed);
        }
        let mut edit = self.ide.edit();
        let Some(removed) = edit.remove_module(module) else {
            return Ok(());
        };
        self.ide.commit(edit)?;
        info!(target: "lumen.sync", module = %removed.name, "removed module");
        Ok(())
    }

    /// Rebuilds the session from persisted state.
    ///
    /// Entries that no longer resolve to a file are dropped with a warning.
    /// Entries whose module now belongs to another integration are tidied
    /// (foreign cleanup off) and left untracked. Everything else is
    /// re-imported in order.
    pub fn load_state(&self, state: &RegistryState) -> ImportReport {
        let mut report = ImportReport::default();
        for location in &state.descriptor_files {
            let path = canonical_path(Path::new(location));
            if !path.is_file() {
                warn!(
                    target: "lumen.sync",
                    descriptor = %path.display(),
                    "persisted descriptor is gone, dropping it"
                );
                report.skipped.push(path);
                continue;
            }
            let conflict = path
                .parent()
                .and_then(|root| self.check_ownership(root).err());
            if let Some(SyncError::Conflict { module }) = conflict {
                warn!(
                    target: "lumen.sync",
                    descriptor = %path.display(),
                    module = %module,
                    "persisted project now belongs to another integration"
                );
                if let Err(err) = self.tidy(&path, false) {
                    warn!(
                        target: "lumen.sync",
                        descriptor = %path.display(),
                        error = %err,
                        "cleanup of reassigned project failed"
                    );
                }
                report.conflicted.push(path);
                continue;
            }
            self.registry.add(&path);
            match self.sync(&path) {
                Ok(module) => report.synced.push((path, module)),
                Err(err) => report.failed.push((path, err)),
            }
        }
        report
    }
}

fn module_file(root: &Path, name: &str) -> PathBuf {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    root.join(format!("{sanitized}.iml"))
}

fn identity_of(descriptor: &ProjectDescriptor) -> ProjectIdentity {
    ProjectIdentity {
        name: descriptor.name.clone(),
        group: descriptor.group.clone(),
        version: descriptor.version.clone(),
    }
}
