//! Content-root folder markers and compiler output reconciliation.

use std::fs;
use std::path::Path;

use lumen_descriptor::ProjectDescriptor;
use lumen_project::{ContentEntry, ModuleId, ProjectModel, SourceFolder, SourceFolderKind};
use tracing::trace;

use crate::{Result, SyncError};

/// Rebuilds `module`'s folder markers and compiler output from `descriptor`.
///
/// The folder set on the descriptor's content root is fully replaced:
/// resource, source and java-source paths become ordinary source folders in
/// that order, test paths become test folders. Paths missing on disk are
/// skipped. The compiler output directory is created if needed; failure
/// there aborts the sync before any library work happens.
pub(crate) fn reconcile_paths(
    model: &mut ProjectModel,
    module: ModuleId,
    descriptor: &ProjectDescriptor,
) -> Result<()> {
    let root = descriptor.root_dir().to_path_buf();
    let folders = plan_folders(descriptor);

    let module_data = &mut model[module];
    match module_data.content_entry_mut(&root) {
        Some(entry) => entry.folders = folders,
        None => {
            let mut entry = ContentEntry::new(root);
            entry.folders = folders;
            module_data.content_entries.push(entry);
        }
    }

    create_output_dir(&descriptor.compile_path)?;
    let module_data = &mut model[module];
    module_data.inherit_output = false;
    module_data.output_path = Some(descriptor.compile_path.clone());
    module_data.test_output_path = Some(descriptor.compile_path.clone());
    Ok(())
}

fn plan_folders(descriptor: &ProjectDescriptor) -> Vec<SourceFolder> {
    let mut folders = Vec::new();
    let sources = descriptor
        .resource_paths
        .iter()
        .chain(descriptor.source_paths.iter())
        .chain(descriptor.java_source_paths.iter());
    for path in sources {
        push_existing(&mut folders, path, SourceFolderKind::Source);
    }
    for path in &descriptor.test_paths {
        push_existing(&mut folders, path, SourceFolderKind::Test);
    }
    folders
}

fn push_existing(folders: &mut Vec<SourceFolder>, path: &Path, kind: SourceFolderKind) {
    if path.exists() {
        folders.push(SourceFolder {
            path: path.to_path_buf(),
            kind,
        });
    } else {
        trace!(
            target: "lumen.sync",
            path = %path.display(),
            "skipping folder marker for path missing on disk"
        );
    }
}

fn create_output_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| SyncError::OutputDir {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn descriptor_in(dir: &Path) -> ProjectDescriptor {
        ProjectDescriptor {
            file: dir.join("project.clj"),
            name: "sample".to_string(),
            group: None,
            version: "0.1.0".to_string(),
            source_paths: vec![dir.join("src")],
            java_source_paths: vec![dir.join("java")],
            resource_paths: vec![dir.join("resources")],
            test_paths: vec![dir.join("test")],
            compile_path: dir.join("target/classes"),
            dependencies: Vec::new(),
        }
    }

    fn module_with_root(model: &mut ProjectModel, root: &Path) -> ModuleId {
        let module = model.create_module("sample", root.join("sample.iml"));
        model[module]
            .content_entries
            .push(ContentEntry::new(root.to_path_buf()));
        module
    }

    #[test]
    fn folders_ordered_resources_then_sources_then_tests() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for dir in ["src", "java", "resources", "test"] {
            fs::create_dir(root.join(dir)).unwrap();
        }
        let mut model = ProjectModel::default();
        let module = module_with_root(&mut model, root);

        reconcile_paths(&mut model, module, &descriptor_in(root)).unwrap();

        let entry = &model[module].content_entries[0];
        let paths: Vec<&PathBuf> = entry.folders.iter().map(|f| &f.path).collect();
        assert_eq!(
            paths,
            [
                &root.join("resources"),
                &root.join("src"),
                &root.join("java"),
                &root.join("test"),
            ]
        );
        assert_eq!(entry.folders[0].kind, SourceFolderKind::Source);
        assert_eq!(entry.folders[3].kind, SourceFolderKind::Test);
    }

    #[test]
    fn missing_directories_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir(root.join("src")).unwrap();
        let mut model = ProjectModel::default();
        let module = module_with_root(&mut model, root);

        reconcile_paths(&mut model, module, &descriptor_in(root)).unwrap();

        let entry = &model[module].content_entries[0];
        assert_eq!(entry.folders.len(), 1);
        assert_eq!(entry.folders[0].path, root.join("src"));
    }

    #[test]
    fn stale_folders_are_replaced_not_merged() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir(root.join("src")).unwrap();
        let mut model = ProjectModel::default();
        let module = module_with_root(&mut model, root);
        model[module].content_entries[0].folders.push(SourceFolder {
            path: root.join("old-src"),
            kind: SourceFolderKind::Source,
        });

        reconcile_paths(&mut model, module, &descriptor_in(root)).unwrap();

        let entry = &model[module].content_entries[0];
        assert!(entry.folders.iter().all(|f| f.path != root.join("old-src")));
    }

    #[test]
    fn output_directory_is_created_and_assigned() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let mut model = ProjectModel::default();
        let module = module_with_root(&mut model, root);

        reconcile_paths(&mut model, module, &descriptor_in(root)).unwrap();

        assert!(root.join("target/classes").is_dir());
        let module_data = &model[module];
        assert!(!module_data.inherit_output);
        assert_eq!(module_data.output_path, Some(root.join("target/classes")));
        assert_eq!(
            module_data.test_output_path,
            Some(root.join("target/classes"))
        );
    }

    #[test]
    fn unwritable_output_path_reports_io_error() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        // A regular file where a directory component should be.
        fs::write(root.join("target"), b"not a directory").unwrap();
        let mut model = ProjectModel::default();
        let module = module_with_root(&mut model, root);

        let err = reconcile_paths(&mut model, module, &descriptor_in(root)).unwrap_err();
        match err {
            SyncError::OutputDir { path, .. } => assert_eq!(path, root.join("target/classes")),
            other => panic!("expected OutputDir, got {other:?}"),
        }
    }
}
