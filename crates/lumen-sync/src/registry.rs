//! Session-scoped set of tracked descriptor files.

use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use lumen_project::ModuleId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Best-effort canonicalization. Descriptor paths arrive from user input,
/// persisted state and watcher events; resolving them keeps one registry
/// entry per file regardless of spelling. Paths that do not resolve (the
/// file may be gone) are kept verbatim.
pub(crate) fn canonical_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Project coordinates as of the last successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIdentity {
    pub name: String,
    pub group: Option<String>,
    pub version: String,
}

impl ProjectIdentity {
    /// `group/name:version`, omitting the group segment when it is absent or
    /// equal to the name, and the version when empty.
    pub fn display_name(&self) -> String {
        let mut out = String::new();
        if let Some(group) = &self.group {
            if group != &self.name {
                out.push_str(group);
                out.push('/');
            }
        }
        out.push_str(&self.name);
        if !self.version.is_empty() {
            out.push(':');
            out.push_str(&self.version);
        }
        out
    }
}

/// Lifecycle state of one tracked project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Tracked but never successfully synced in this session.
    Discovered,
    /// Last sync committed.
    Synced,
    /// Last sync failed; the project stays tracked and will be retried.
    Failed,
    /// Untracked. Only ever observed on values returned by removal.
    Removed,
}

/// One build-tool project known to the registry.
///
/// Equality and hashing are keyed solely on the canonical descriptor path:
/// two values denote the same project iff they point at the same file, no
/// matter how their sync states differ.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedProject {
    path: PathBuf,
    pub state: SyncState,
    pub identity: Option<ProjectIdentity>,
    /// Module produced by the last successful sync.
    pub module: Option<ModuleId>,
}

impl TrackedProject {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: SyncState::Discovered,
            identity: None,
            module: None,
        }
    }

    pub fn descriptor_path(&self) -> &Path {
        &self.path
    }

    /// Human-readable name: the synced coordinates when known, otherwise the
    /// descriptor location.
    pub fn display_name(&self) -> String {
        match &self.identity {
            Some(identity) => identity.display_name(),
            None => self.path.display().to_string(),
        }
    }
}

impl PartialEq for TrackedProject {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for TrackedProject {}

impl Hash for TrackedProject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

/// Registry membership change, delivered synchronously to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added(PathBuf),
    Removed(PathBuf),
}

type Listener = Box<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Ordered set of tracked projects for one IDE session.
///
/// Iteration and persistence follow insertion order. Listeners run on the
/// thread performing the mutation, after the membership lock is released;
/// they may query the registry but must not register further listeners.
#[derive(Default)]
pub struct ProjectRegistry {
    projects: Mutex<Vec<TrackedProject>>,
    listeners: Mutex<Vec<Listener>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `path`. Returns false when the file is already
    /// tracked under any spelling.
    pub fn add(&self, path: &Path) -> bool {
        let canonical = canonical_path(path);
        {
            let mut projects = self.projects.lock();
            if projects.iter().any(|project| project.path == canonical) {
                return false;
            }
            projects.push(TrackedProject::new(canonical.clone()));
        }
        info!(
            target: "lumen.sync",
            descriptor = %canonical.display(),
            "tracking project"
        );
        self.notify(&RegistryEvent::Added(canonical));
        true
    }

    /// Stops tracking `path`. The returned value carries the final
    /// [`SyncState::Removed`] state.
    pub fn remove(&self, path: &Path) -> Option<TrackedProject> {
        let canonical = canonical_path(path);
        let removed = {
            let mut projects = self.projects.lock();
            projects
                .iter()
                .position(|project| project.path == canonical)
                .map(|index| projects.remove(index))
        };
        let mut project = removed?;
        project.state = SyncState::Removed;
        info!(
            target: "lumen.sync",
            descriptor = %canonical.display(),
            "untracked project"
        );
        self.notify(&RegistryEvent::Removed(canonical));
        Some(project)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.by_path(path).is_some()
    }

    pub fn by_path(&self, path: &Path) -> Option<TrackedProject> {
        let canonical = canonical_path(path);
        self.projects
            .lock()
            .iter()
            .find(|project| project.path == canonical)
            .cloned()
    }

    pub fn all(&self) -> Vec<TrackedProject> {
        self.projects.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.projects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.lock().is_empty()
    }

    pub(crate) fn record_synced(&self, path: &Path, identity: ProjectIdentity, module: ModuleId) {
        self.update(path, |project| {
            project.state = SyncState::Synced;
            project.identity = Some(identity);
            project.module = Some(module);
        });
    }

    pub(crate) fn record_failed(&self, path: &Path) {
        self.update(path, |project| {
            project.state = SyncState::Failed;
        });
    }

    fn update(&self, path: &Path, apply: impl FnOnce(&mut TrackedProject)) {
        let canonical = canonical_path(path);
        let mut projects = self.projects.lock();
        if let Some(project) = projects
            .iter_mut()
            .find(|project| project.path == canonical)
        {
            apply(project);
        }
    }

    pub fn add_listener(&self, listener: impl Fn(&RegistryEvent) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    fn notify(&self, event: &RegistryEvent) {
        for listener in self.listeners.lock().iter() {
            listener(event);
        }
    }

    /// Persistable form: the ordered descriptor locations, nothing else.
    pub fn state(&self) -> RegistryState {
        RegistryState {
            descriptor_files: self
                .projects
                .lock()
                .iter()
                .map(|project| project.path.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

impl fmt::Debug for ProjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectRegistry")
            .field("projects", &self.projects.lock().len())
            .finish_non_exhaustive()
    }
}

/// Persisted registry state. Descriptor locations round-trip verbatim and
/// keep their order; sync results are deliberately not stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub descriptor_files: Vec<String>,
}
