use lumen_descriptor::DependencyScope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};

/// Opaque handle of a module in the IDE project model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(u32);

impl ModuleId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// Opaque handle of a library in the project-wide shared table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LibraryId(u32);

impl LibraryId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// Which build-tool integration owns a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildOwner {
    Leiningen,
    Maven,
}

/// Marker kind of one source folder below a content root.
///
/// Resource directories are registered as ordinary [`Source`] folders; the
/// IDE model here does not distinguish them further.
///
/// [`Source`]: SourceFolderKind::Source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFolderKind {
    Source,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFolder {
    pub path: PathBuf,
    pub kind: SourceFolderKind,
}

/// One content root of a module together with its folder markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub root: PathBuf,
    pub folders: Vec<SourceFolder>,
}

impl ContentEntry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            folders: Vec::new(),
        }
    }
}

/// A module's reference to a shared library plus the dependency scope it is
/// consumed under. The `library` id may dangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderEntry {
    pub library: LibraryId,
    pub scope: DependencyScope,
}

/// One IDE module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    /// Module definition file; lives next to the content it describes.
    pub file: PathBuf,
    pub content_entries: Vec<ContentEntry>,
    /// Explicit compiler output location, when `inherit_output` is off.
    pub output_path: Option<PathBuf>,
    pub test_output_path: Option<PathBuf>,
    pub inherit_output: bool,
    pub order_entries: Vec<OrderEntry>,
    pub owner: Option<BuildOwner>,
}

impl Module {
    fn new(name: String, file: PathBuf) -> Self {
        Self {
            name,
            file,
            content_entries: Vec::new(),
            output_path: None,
            test_output_path: None,
            inherit_output: true,
            order_entries: Vec::new(),
            owner: None,
        }
    }

    pub fn has_content_root(&self, root: &Path) -> bool {
        self.content_entries.iter().any(|entry| entry.root == root)
    }

    pub fn content_entry_mut(&mut self, root: &Path) -> Option<&mut ContentEntry> {
        self.content_entries
            .iter_mut()
            .find(|entry| entry.root == root)
    }

    /// Whether any order entry points at `library`.
    pub fn references(&self, library: LibraryId) -> bool {
        self.order_entries
            .iter()
            .any(|entry| entry.library == library)
    }
}

/// One shared library in the project-wide table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    /// Coordinate string, namespaced by the owning integration's prefix.
    /// Unique within the table.
    pub name: String,
    pub roots: Vec<PathBuf>,
}

/// The complete module/library structure of one IDE project.
///
/// Plain data with value semantics: cloning it yields an independent snapshot,
/// which is what [`crate::IdeProject::edit`] hands out for mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectModel {
    modules: BTreeMap<ModuleId, Module>,
    libraries: BTreeMap<LibraryId, Library>,
    next_module_id: u32,
    next_library_id: u32,
}

impl ProjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id)
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(&id)
    }

    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().map(|(id, module)| (*id, module))
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn library(&self, id: LibraryId) -> Option<&Library> {
        self.libraries.get(&id)
    }

    pub fn library_mut(&mut self, id: LibraryId) -> Option<&mut Library> {
        self.libraries.get_mut(&id)
    }

    pub fn libraries(&self) -> impl Iterator<Item = (LibraryId, &Library)> {
        self.libraries.iter().map(|(id, library)| (*id, library))
    }

    pub fn library_count(&self) -> usize {
        self.libraries.len()
    }

    /// First module with a content entry rooted at `root`.
    pub fn find_module_by_content_root(&self, root: &Path) -> Option<ModuleId> {
        self.modules
            .iter()
            .find(|(_, module)| module.has_content_root(root))
            .map(|(id, _)| *id)
    }

    /// Library lookup by exact coordinate name.
    pub fn find_library_by_name(&self, name: &str) -> Option<LibraryId> {
        self.libraries
            .iter()
            .find(|(_, library)| library.name == name)
            .map(|(id, _)| *id)
    }

    pub fn create_module(&mut self, name: impl Into<String>, file: impl Into<PathBuf>) -> ModuleId {
        let id = ModuleId(self.next_module_id);
        self.next_module_id += 1;
        self.modules.insert(id, Module::new(name.into(), file.into()));
        id
    }

    pub fn remove_module(&mut self, id: ModuleId) -> Option<Module> {
        self.modules.remove(&id)
    }

    pub fn create_library(&mut self, name: impl Into<String>) -> LibraryId {
        let id = LibraryId(self.next_library_id);
        self.next_library_id += 1;
        self.libraries.insert(
            id,
            Library {
                name: name.into(),
                roots: Vec::new(),
            },
        );
        id
    }

    pub fn remove_library(&mut self, id: LibraryId) -> Option<Library> {
        self.libraries.remove(&id)
    }
}

impl Index<ModuleId> for ProjectModel {
    type Output = Module;

    /// Panics when `id` is not present; use [`ProjectModel::module`] for
    /// lookups that may dangle.
    fn index(&self, id: ModuleId) -> &Module {
        self.modules.get(&id).unwrap_or_else(|| {
            panic!("module {id:?} is not part of this project model");
        })
    }
}

impl IndexMut<ModuleId> for ProjectModel {
    fn index_mut(&mut self, id: ModuleId) -> &mut Module {
        self.modules.get_mut(&id).unwrap_or_else(|| {
            panic!("module {id:?} is not part of this project model");
        })
    }
}

impl Index<LibraryId> for ProjectModel {
    type Output = Library;

    /// Panics when `id` is not present; use [`ProjectModel::library`] for
    /// lookups that may dangle.
    fn index(&self, id: LibraryId) -> &Library {
        self.libraries.get(&id).unwrap_or_else(|| {
            panic!("library {id:?} is not part of this project model");
        })
    }
}

impl IndexMut<LibraryId> for ProjectModel {
    fn index_mut(&mut self, id: LibraryId) -> &mut Library {
        self.libraries.get_mut(&id).unwrap_or_else(|| {
            panic!("library {id:?} is not part of this project model");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_ids_are_stable_and_unique() {
        let mut model = ProjectModel::new();
        let a = model.create_module("a", "/work/a/a.iml");
        let b = model.create_module("b", "/work/b/b.iml");
        assert_ne!(a, b);

        model.remove_module(a);
        let c = model.create_module("c", "/work/c/c.iml");
        assert_ne!(b, c, "removed ids are not reused");
        assert!(model.module(a).is_none());
        assert_eq!(model[c].name, "c");
    }

    #[test]
    fn content_root_lookup_scans_all_entries() {
        let mut model = ProjectModel::new();
        let id = model.create_module("app", "/work/app/app.iml");
        model[id]
            .content_entries
            .push(ContentEntry::new("/work/app"));
        model[id]
            .content_entries
            .push(ContentEntry::new("/work/app-extra"));

        assert_eq!(
            model.find_module_by_content_root(Path::new("/work/app-extra")),
            Some(id)
        );
        assert_eq!(
            model.find_module_by_content_root(Path::new("/elsewhere")),
            None
        );
    }

    #[test]
    fn library_lookup_is_by_exact_name() {
        let mut model = ProjectModel::new();
        let id = model.create_library("Leiningen: ring:1.2.0");
        assert_eq!(model.find_library_by_name("Leiningen: ring:1.2.0"), Some(id));
        assert_eq!(model.find_library_by_name("Leiningen: ring:1.2"), None);
    }

    #[test]
    fn order_entries_may_dangle_after_library_removal() {
        let mut model = ProjectModel::new();
        let module = model.create_module("app", "/work/app/app.iml");
        let library = model.create_library("Leiningen: ring:1.2.0");
        model[module].order_entries.push(OrderEntry {
            library,
            scope: DependencyScope::Compile,
        });

        model.remove_library(library);
        assert!(model[module].references(library));
        assert!(model.library(library).is_none());
    }

    #[test]
    #[should_panic(expected = "not part of this project model")]
    fn indexing_a_missing_module_panics() {
        let model = ProjectModel::new();
        let _ = &model[ModuleId::from_raw(7)];
    }
}
