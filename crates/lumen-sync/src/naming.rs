//! Shared-library naming and ownership classification.

use lumen_descriptor::DependencyRecord;
use lumen_project::BuildOwner;

/// Prefix of library names created by this integration.
pub const LEIN_LIBRARY_PREFIX: &str = "Leiningen: ";

/// Prefix used by the Maven integration. Recognized so stale entries can be
/// cleaned out of modules we manage, never created by us.
pub const MAVEN_LIBRARY_PREFIX: &str = "Maven: ";

/// Project-level library name for a resolved dependency.
///
/// The group segment is omitted when it equals the artifact id, so
/// `Leiningen: ring:1.2.0` rather than `Leiningen: ring/ring:1.2.0`.
pub fn library_name(record: &DependencyRecord) -> String {
    let mut name = String::from(LEIN_LIBRARY_PREFIX);
    if record.group_id != record.artifact_id {
        name.push_str(&record.group_id);
        name.push('/');
    }
    name.push_str(&record.artifact_id);
    name.push(':');
    name.push_str(&record.version);
    name
}

/// Classifies a library by its name prefix. `None` means the library belongs
/// to neither build integration and must be left untouched.
pub fn library_owner(name: &str) -> Option<BuildOwner> {
    if name.starts_with(LEIN_LIBRARY_PREFIX) {
        Some(BuildOwner::Leiningen)
    } else if name.starts_with(MAVEN_LIBRARY_PREFIX) {
        Some(BuildOwner::Maven)
    } else {
        None
    }
}
