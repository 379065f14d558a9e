use crate::command::{CommandRunner, DefaultCommandRunner};
use crate::{
    DependencyRecord, DependencyScope, DescriptorError, DescriptorSource, ProjectDescriptor,
    Result,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Configuration for the JSON-emitting descriptor helper.
///
/// The helper is a build-tool task (e.g. a `lein` plugin) that prints the
/// project map or the resolved dependency list as a single JSON document on
/// stdout.
#[derive(Debug, Clone)]
pub struct HelperConfig {
    /// Build tool executable (defaults to `lein` in `PATH`).
    pub program: PathBuf,
    /// Arguments that print the project map.
    pub project_args: Vec<String>,
    /// Arguments that print the resolved dependency list.
    pub dependency_args: Vec<String>,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("lein"),
            project_args: vec!["lumen".into(), "project".into()],
            dependency_args: vec!["lumen".into(), "dependencies".into()],
        }
    }
}

/// [`DescriptorSource`] backed by the external build tool.
///
/// Every load shells into the tool from the descriptor's directory and
/// decodes the JSON it prints; nothing is cached between loads.
#[derive(Debug)]
pub struct HelperDescriptorSource {
    config: HelperConfig,
    runner: Arc<dyn CommandRunner>,
}

impl HelperDescriptorSource {
    pub fn new(config: HelperConfig) -> Self {
        Self::with_runner(config, Arc::new(DefaultCommandRunner))
    }

    pub fn with_runner(config: HelperConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    fn invoke(&self, descriptor: &Path, args: &[String]) -> Result<String> {
        let cwd = descriptor.parent().unwrap_or(Path::new("."));
        debug!(
            target: "lumen.descriptor",
            descriptor = %descriptor.display(),
            program = %self.config.program.display(),
            ?args,
            "invoking descriptor helper"
        );
        let output = self.runner.run(cwd, &self.config.program, args)?;
        Ok(output.stdout)
    }
}

impl DescriptorSource for HelperDescriptorSource {
    fn load_project(&self, descriptor: &Path) -> Result<ProjectDescriptor> {
        let payload = self.invoke(descriptor, &self.config.project_args)?;
        let raw: RawProject =
            serde_json::from_str(&payload).map_err(|source| DescriptorError::Malformed {
                path: descriptor.to_path_buf(),
                source,
            })?;
        Ok(raw.into_descriptor(descriptor))
    }

    fn load_dependencies(&self, descriptor: &Path) -> Result<Vec<DependencyRecord>> {
        let payload = self.invoke(descriptor, &self.config.dependency_args)?;
        let raw: Vec<RawDependency> =
            serde_json::from_str(&payload).map_err(|source| DescriptorError::Malformed {
                path: descriptor.to_path_buf(),
                source,
            })?;
        let base = descriptor.parent().unwrap_or(Path::new("."));
        Ok(raw.into_iter().map(|dep| dep.into_record(base)).collect())
    }
}

/// Project map as printed by the helper. Keys follow the descriptor's own
/// spelling (`source-paths`, `compile-path`, ...).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawProject {
    name: String,
    #[serde(default)]
    group: Option<String>,
    version: String,
    #[serde(default)]
    source_paths: Vec<String>,
    #[serde(default)]
    java_source_paths: Vec<String>,
    #[serde(default)]
    resource_paths: Vec<String>,
    #[serde(default)]
    test_paths: Vec<String>,
    compile_path: String,
}

impl RawProject {
    fn into_descriptor(self, descriptor: &Path) -> ProjectDescriptor {
        let base = descriptor.parent().unwrap_or(Path::new("")).to_path_buf();
        ProjectDescriptor {
            file: descriptor.to_path_buf(),
            name: self.name,
            group: self.group,
            version: self.version,
            source_paths: resolve_paths(&base, self.source_paths),
            java_source_paths: resolve_paths(&base, self.java_source_paths),
            resource_paths: resolve_paths(&base, self.resource_paths),
            test_paths: resolve_paths(&base, self.test_paths),
            compile_path: resolve_path(&base, self.compile_path),
            dependencies: Vec::new(),
        }
    }
}

/// One dependency tuple as printed by the helper.
#[derive(Debug, Deserialize)]
struct RawDependency {
    #[serde(rename = "groupid")]
    group_id: String,
    #[serde(rename = "artifactid")]
    artifact_id: String,
    version: String,
    #[serde(default)]
    scope: String,
    file: String,
}

impl RawDependency {
    fn into_record(self, base: &Path) -> DependencyRecord {
        DependencyRecord {
            scope: DependencyScope::parse_lenient(&self.scope),
            group_id: self.group_id,
            artifact_id: self.artifact_id,
            version: self.version,
            file: resolve_path(base, self.file),
        }
    }
}

fn resolve_path(base: &Path, raw: String) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

fn resolve_paths(base: &Path, raw: Vec<String>) -> Vec<PathBuf> {
    raw.into_iter().map(|p| resolve_path(base, p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandOutput;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct MockRunner {
        responses: Mutex<BTreeMap<Vec<String>, String>>,
    }

    impl MockRunner {
        fn with_stdout(self, args: &[&str], stdout: &str) -> Self {
            {
                let mut guard = self.responses.lock().expect("responses lock");
                guard.insert(
                    args.iter().map(|s| s.to_string()).collect(),
                    stdout.to_string(),
                );
            }
            self
        }
    }

    impl CommandRunner for MockRunner {
        fn run(&self, _cwd: &Path, _program: &Path, args: &[String]) -> Result<CommandOutput> {
            let guard = self.responses.lock().expect("responses lock");
            guard
                .get(args)
                .map(|stdout| CommandOutput {
                    stdout: stdout.clone(),
                    stderr: String::new(),
                })
                .ok_or_else(|| DescriptorError::HelperFailed {
                    command: format!("lein {}", args.join(" ")),
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "unexpected invocation".to_string(),
                })
        }
    }

    fn source_with(runner: MockRunner) -> HelperDescriptorSource {
        HelperDescriptorSource::with_runner(HelperConfig::default(), Arc::new(runner))
    }

    #[test]
    fn decodes_project_map_and_resolves_relative_paths() {
        let runner = MockRunner::default().with_stdout(
            &["lumen", "project"],
            r#"{
                "name": "app",
                "group": "org.example",
                "version": "0.3.0",
                "source-paths": ["src/clj", "/abs/src"],
                "java-source-paths": ["src/java"],
                "resource-paths": ["resources"],
                "test-paths": ["test"],
                "compile-path": "target/classes"
            }"#,
        );
        let source = source_with(runner);

        let project = source
            .load_project(Path::new("/work/app/project.clj"))
            .expect("valid payload");

        assert_eq!(project.name, "app");
        assert_eq!(project.group.as_deref(), Some("org.example"));
        assert_eq!(project.version, "0.3.0");
        assert_eq!(
            project.source_paths,
            vec![PathBuf::from("/work/app/src/clj"), PathBuf::from("/abs/src")]
        );
        assert_eq!(
            project.compile_path,
            PathBuf::from("/work/app/target/classes")
        );
        assert!(project.dependencies.is_empty());
    }

    #[test]
    fn missing_group_and_path_lists_default() {
        let runner = MockRunner::default().with_stdout(
            &["lumen", "project"],
            r#"{"name": "bare", "version": "0.1.0", "compile-path": "target/classes"}"#,
        );
        let source = source_with(runner);

        let project = source
            .load_project(Path::new("/work/bare/project.clj"))
            .expect("valid payload");

        assert_eq!(project.group, None);
        assert!(project.source_paths.is_empty());
        assert!(project.test_paths.is_empty());
    }

    #[test]
    fn decodes_dependency_tuples() {
        let runner = MockRunner::default().with_stdout(
            &["lumen", "dependencies"],
            r#"[
                {
                    "groupid": "org.clojure",
                    "artifactid": "clojure",
                    "version": "1.5.1",
                    "scope": "Provided",
                    "file": "/repo/org/clojure/clojure/1.5.1/clojure-1.5.1.jar"
                },
                {
                    "groupid": "ring",
                    "artifactid": "ring",
                    "version": "1.2.0",
                    "file": "ring-1.2.0.jar"
                }
            ]"#,
        );
        let source = source_with(runner);

        let deps = source
            .load_dependencies(Path::new("/work/app/project.clj"))
            .expect("valid payload");

        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].group_id, "org.clojure");
        assert_eq!(deps[0].scope, DependencyScope::Provided);
        assert_eq!(deps[1].scope, DependencyScope::Compile);
        assert_eq!(deps[1].file, PathBuf::from("/work/app/ring-1.2.0.jar"));
    }

    #[test]
    fn malformed_payload_is_reported_with_the_descriptor_path() {
        let runner = MockRunner::default().with_stdout(&["lumen", "project"], "not json");
        let source = source_with(runner);

        let err = source
            .load_project(Path::new("/work/app/project.clj"))
            .expect_err("payload is not JSON");
        match err {
            DescriptorError::Malformed { path, .. } => {
                assert_eq!(path, PathBuf::from("/work/app/project.clj"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn helper_failure_propagates() {
        let source = source_with(MockRunner::default());
        let err = source
            .load_dependencies(Path::new("/work/app/project.clj"))
            .expect_err("no canned response");
        assert!(matches!(err, DescriptorError::HelperFailed { .. }));
    }
}
