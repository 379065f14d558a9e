use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// File name of a Leiningen build descriptor.
pub const DESCRIPTOR_FILE_NAME: &str = "project.clj";

/// Returns `true` when `path` names a build descriptor this crate understands.
pub fn is_descriptor_file(path: &Path) -> bool {
    path.file_name().and_then(|name| name.to_str()) == Some(DESCRIPTOR_FILE_NAME)
}

/// Canonical dependency scope as attached to a module's order entries.
///
/// Descriptors carry free-form scope strings; [`DependencyScope::parse_lenient`]
/// maps them onto this set once, at the port boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyScope {
    #[default]
    Compile,
    Test,
    Runtime,
    Provided,
}

impl DependencyScope {
    /// Maps a raw descriptor scope string onto the canonical set.
    ///
    /// Matching is case-insensitive. Empty and unrecognized values fall back
    /// to [`DependencyScope::Compile`].
    pub fn parse_lenient(raw: &str) -> DependencyScope {
        if raw.eq_ignore_ascii_case("test") {
            DependencyScope::Test
        } else if raw.eq_ignore_ascii_case("runtime") {
            DependencyScope::Runtime
        } else if raw.eq_ignore_ascii_case("provided") {
            DependencyScope::Provided
        } else {
            DependencyScope::Compile
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DependencyScope::Compile => "compile",
            DependencyScope::Test => "test",
            DependencyScope::Runtime => "runtime",
            DependencyScope::Provided => "provided",
        }
    }
}

impl fmt::Display for DependencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolved dependency from the descriptor's dependency list.
///
/// Resolution (fetching the artifact into the local repository) has already
/// happened on the build-tool side; `file` points at the local jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub scope: DependencyScope,
    /// Resolved local artifact location.
    pub file: PathBuf,
}

/// A parsed build descriptor, reloaded from the build tool on every sync.
///
/// Path lists preserve the descriptor's declared order; reconciliation relies
/// on it when rebuilding a module's source folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    /// The descriptor file this was loaded from.
    pub file: PathBuf,
    pub name: String,
    /// Group (namespace) segment of the project coordinate, when declared.
    pub group: Option<String>,
    pub version: String,
    pub source_paths: Vec<PathBuf>,
    pub java_source_paths: Vec<PathBuf>,
    pub resource_paths: Vec<PathBuf>,
    pub test_paths: Vec<PathBuf>,
    /// Compiled-output directory (`:compile-path`).
    pub compile_path: PathBuf,
    /// Populated via [`crate::DescriptorSource::load_dependencies`]; empty
    /// right after a bare `load_project`.
    pub dependencies: Vec<DependencyRecord>,
}

impl ProjectDescriptor {
    /// Directory containing the descriptor file, i.e. the module's content
    /// root.
    pub fn root_dir(&self) -> &Path {
        self.file.parent().unwrap_or(Path::new(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_descriptor_files() {
        assert!(is_descriptor_file(Path::new("/work/app/project.clj")));
        assert!(is_descriptor_file(Path::new("project.clj")));
        assert!(!is_descriptor_file(Path::new("/work/app/pom.xml")));
        assert!(!is_descriptor_file(Path::new("/work/app/project.clj.bak")));
    }

    #[test]
    fn scope_mapping_is_case_insensitive_with_compile_fallback() {
        let cases = [
            ("Compile", DependencyScope::Compile),
            ("TEST", DependencyScope::Test),
            ("runtime", DependencyScope::Runtime),
            ("Provided", DependencyScope::Provided),
            ("", DependencyScope::Compile),
            ("bogus", DependencyScope::Compile),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                DependencyScope::parse_lenient(raw),
                expected,
                "scope string {raw:?}"
            );
        }
    }

    #[test]
    fn scope_round_trips_through_display() {
        for scope in [
            DependencyScope::Compile,
            DependencyScope::Test,
            DependencyScope::Runtime,
            DependencyScope::Provided,
        ] {
            assert_eq!(DependencyScope::parse_lenient(&scope.to_string()), scope);
        }
    }

    #[test]
    fn root_dir_is_the_descriptor_parent() {
        let descriptor = ProjectDescriptor {
            file: PathBuf::from("/work/app/project.clj"),
            name: "app".to_string(),
            group: None,
            version: "0.1.0".to_string(),
            source_paths: Vec::new(),
            java_source_paths: Vec::new(),
            resource_paths: Vec::new(),
            test_paths: Vec::new(),
            compile_path: PathBuf::from("/work/app/target/classes"),
            dependencies: Vec::new(),
        };
        assert_eq!(descriptor.root_dir(), Path::new("/work/app"));
    }
}
