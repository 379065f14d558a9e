use crate::{DependencyRecord, DescriptorError, ProjectDescriptor, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Supplies parsed project data for a descriptor file.
///
/// `load_project` returns the project map only. `load_dependencies` may
/// trigger dependency resolution on the build-tool side and is a separate
/// call so the engine controls when that cost is paid.
pub trait DescriptorSource: Send + Sync + std::fmt::Debug {
    fn load_project(&self, descriptor: &Path) -> Result<ProjectDescriptor>;
    fn load_dependencies(&self, descriptor: &Path) -> Result<Vec<DependencyRecord>>;
}

/// In-memory [`DescriptorSource`] answering from registered descriptors.
///
/// The unit of registration is a full [`ProjectDescriptor`] including its
/// dependency list; `load_project` strips the list so the two-step protocol
/// of the real helper is preserved. Descriptors can be replaced between
/// loads, which is how tests model a descriptor edit.
#[derive(Debug, Default)]
pub struct StaticDescriptorSource {
    projects: Mutex<HashMap<PathBuf, ProjectDescriptor>>,
}

impl StaticDescriptorSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the descriptor served for its `file` path.
    pub fn insert(&self, descriptor: ProjectDescriptor) {
        self.projects
            .lock()
            .expect("descriptor map poisoned")
            .insert(descriptor.file.clone(), descriptor);
    }

    /// Drops the registration, making subsequent loads fail.
    pub fn remove(&self, descriptor: &Path) {
        self.projects
            .lock()
            .expect("descriptor map poisoned")
            .remove(descriptor);
    }

    fn get(&self, descriptor: &Path) -> Result<ProjectDescriptor> {
        self.projects
            .lock()
            .expect("descriptor map poisoned")
            .get(descriptor)
            .cloned()
            .ok_or_else(|| DescriptorError::Unknown {
                path: descriptor.to_path_buf(),
            })
    }
}

impl DescriptorSource for StaticDescriptorSource {
    fn load_project(&self, descriptor: &Path) -> Result<ProjectDescriptor> {
        let mut project = self.get(descriptor)?;
        project.dependencies.clear();
        Ok(project)
    }

    fn load_dependencies(&self, descriptor: &Path) -> Result<Vec<DependencyRecord>> {
        Ok(self.get(descriptor)?.dependencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DependencyScope;

    fn descriptor(file: &str) -> ProjectDescriptor {
        ProjectDescriptor {
            file: PathBuf::from(file),
            name: "app".to_string(),
            group: Some("org.example".to_string()),
            version: "1.0.0".to_string(),
            source_paths: vec![PathBuf::from("/work/app/src")],
            java_source_paths: Vec::new(),
            resource_paths: Vec::new(),
            test_paths: Vec::new(),
            compile_path: PathBuf::from("/work/app/target/classes"),
            dependencies: vec![DependencyRecord {
                group_id: "ring".to_string(),
                artifact_id: "ring".to_string(),
                version: "1.2.0".to_string(),
                scope: DependencyScope::Compile,
                file: PathBuf::from("/repo/ring-1.2.0.jar"),
            }],
        }
    }

    #[test]
    fn load_project_strips_dependencies() {
        let source = StaticDescriptorSource::new();
        source.insert(descriptor("/work/app/project.clj"));

        let project = source
            .load_project(Path::new("/work/app/project.clj"))
            .expect("registered");
        assert!(project.dependencies.is_empty());

        let deps = source
            .load_dependencies(Path::new("/work/app/project.clj"))
            .expect("registered");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].artifact_id, "ring");
    }

    #[test]
    fn unknown_path_is_an_error() {
        let source = StaticDescriptorSource::new();
        let err = source
            .load_project(Path::new("/nowhere/project.clj"))
            .expect_err("nothing registered");
        assert!(matches!(err, DescriptorError::Unknown { .. }));
    }

    #[test]
    fn insert_replaces_previous_registration() {
        let source = StaticDescriptorSource::new();
        source.insert(descriptor("/work/app/project.clj"));

        let mut updated = descriptor("/work/app/project.clj");
        updated.version = "2.0.0".to_string();
        source.insert(updated);

        let project = source
            .load_project(Path::new("/work/app/project.clj"))
            .expect("registered");
        assert_eq!(project.version, "2.0.0");
    }
}
