//! End-to-end session lifecycle over real directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lumen_descriptor::{
    DependencyRecord, DependencyScope, DescriptorSource, ProjectDescriptor, StaticDescriptorSource,
};
use lumen_project::IdeProject;
use lumen_sync::{ProjectRegistry, RegistryState, SyncEngine, SyncState};
use tempfile::TempDir;

fn descriptor(
    ws: &Path,
    name: &str,
    version: &str,
    deps: Vec<DependencyRecord>,
) -> ProjectDescriptor {
    let root = ws.join(name);
    fs::create_dir_all(root.join("src")).unwrap();
    let file = root.join("project.clj");
    fs::write(&file, format!("(defproject {name} \"{version}\")")).unwrap();
    ProjectDescriptor {
        file,
        name: name.to_string(),
        group: Some("org.acme".to_string()),
        version: version.to_string(),
        source_paths: vec![root.join("src")],
        java_source_paths: Vec::new(),
        resource_paths: Vec::new(),
        test_paths: Vec::new(),
        compile_path: root.join("target/classes"),
        dependencies: deps,
    }
}

fn jar(artifact: &str, version: &str) -> DependencyRecord {
    DependencyRecord {
        group_id: artifact.to_string(),
        artifact_id: artifact.to_string(),
        version: version.to_string(),
        scope: DependencyScope::Compile,
        file: PathBuf::from(format!("/repo/{artifact}-{version}.jar")),
    }
}

struct Session {
    ide: Arc<IdeProject>,
    registry: Arc<ProjectRegistry>,
    engine: SyncEngine,
}

fn session(source: &Arc<StaticDescriptorSource>) -> Session {
    let ide = Arc::new(IdeProject::new());
    let registry = Arc::new(ProjectRegistry::new());
    let engine = SyncEngine::new(
        Arc::clone(&ide),
        Arc::clone(&registry),
        Arc::clone(source) as Arc<dyn DescriptorSource>,
    );
    Session {
        ide,
        registry,
        engine,
    }
}

#[test]
fn full_session_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let ws = tmp.path().canonicalize().unwrap();
    let source = Arc::new(StaticDescriptorSource::new());

    let app = descriptor(
        &ws,
        "app",
        "1.0.0",
        vec![jar("clojure", "1.5.1"), jar("ring", "1.2.0")],
    );
    let app_file = app.file.clone();
    let lib = descriptor(&ws, "lib", "0.3.0", vec![jar("clojure", "1.5.1")]);
    let lib_file = lib.file.clone();
    source.insert(app);
    source.insert(lib);

    // First session: import both projects.
    let first = session(&source);
    let report = first
        .engine
        .import_projects(&[app_file.clone(), lib_file.clone()]);
    assert!(report.is_clean());
    first.ide.with_read(|model| {
        assert_eq!(model.module_count(), 2);
        assert_eq!(model.library_count(), 2, "clojure is shared");
    });

    // The app descriptor upgrades ring; a refresh picks it up.
    source.insert(descriptor(
        &ws,
        "app",
        "1.0.0",
        vec![jar("clojure", "1.5.1"), jar("ring", "1.3.0")],
    ));
    let refresh = first.engine.refresh_all();
    assert!(refresh.is_clean());
    first.ide.with_read(|model| {
        assert!(model.find_library_by_name("Leiningen: ring:1.3.0").is_some());
        assert!(model.find_library_by_name("Leiningen: ring:1.2.0").is_none());
    });

    // Persist, close, restore into a fresh session.
    let saved = serde_json::to_string(&first.registry.state()).unwrap();
    first.ide.close();

    let restored: RegistryState = serde_json::from_str(&saved).unwrap();
    let second = session(&source);
    let report = second.engine.load_state(&restored);
    assert_eq!(report.synced.len(), 2);
    assert!(report.is_clean());
    assert_eq!(second.registry.len(), 2);
    for project in second.registry.all() {
        assert_eq!(project.state, SyncState::Synced);
        assert!(project.module.is_some());
    }
    assert_eq!(
        second.registry.by_path(&app_file).unwrap().display_name(),
        "org.acme/app:1.0.0"
    );
    second.ide.with_read(|model| {
        assert_eq!(model.module_count(), 2);
        assert_eq!(model.library_count(), 2);
    });
}

#[test]
fn vanished_descriptor_is_dropped_on_restore() {
    let tmp = TempDir::new().unwrap();
    let ws = tmp.path().canonicalize().unwrap();
    let source = Arc::new(StaticDescriptorSource::new());
    let app = descriptor(&ws, "app", "1.0.0", Vec::new());
    let app_file = app.file.clone();
    source.insert(app);

    let first = session(&source);
    first.engine.import_projects(&[app_file.clone()]);
    let saved = first.registry.state();

    fs::remove_file(&app_file).unwrap();
    let second = session(&source);
    let report = second.engine.load_state(&saved);

    assert!(report.synced.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert!(second.registry.is_empty());
}

#[test]
fn remove_then_tidy_cleans_the_model() {
    let tmp = TempDir::new().unwrap();
    let ws = tmp.path().canonicalize().unwrap();
    let source = Arc::new(StaticDescriptorSource::new());
    let app = descriptor(&ws, "app", "1.0.0", vec![jar("ring", "1.2.0")]);
    let app_file = app.file.clone();
    source.insert(app);

    let session = session(&source);
    let report = session.engine.import_projects(&[app_file.clone()]);
    let module = report.module_ids()[0];

    session.engine.remove_project(&app_file);
    assert!(session.registry.is_empty());
    session.ide.with_read(|model| {
        assert_eq!(
            model[module].order_entries.len(),
            1,
            "untracking leaves the model alone"
        );
    });

    session.engine.tidy(&app_file, true).unwrap();
    session.ide.with_read(|model| {
        assert!(model[module].order_entries.is_empty());
        assert_eq!(model[module].owner, None);
        assert_eq!(model.library_count(), 0);
    });
}
