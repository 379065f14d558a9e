//! Order-entry garbage collection and shared-library reconciliation.

use lumen_descriptor::DependencyRecord;
use lumen_project::{BuildOwner, LibraryId, ModuleId, OrderEntry, ProjectModel};
use tracing::{debug, trace};

use crate::naming::{library_name, library_owner};

/// Garbage-collects `module`'s build-integration order entries, then
/// attaches one entry per dependency record.
///
/// Libraries are reused by coordinate name across the whole project and
/// always end up with exactly one root, the record's jar. An upgraded
/// version produces a new coordinate name and therefore a new library; the
/// old one falls to the GC once no module references it.
pub(crate) fn reconcile_libraries(
    model: &mut ProjectModel,
    module: ModuleId,
    records: &[DependencyRecord],
    delete_foreign: bool,
) {
    gc_order_entries(model, module, delete_foreign);
    for record in records {
        let library = upsert_library(model, record);
        model[module].order_entries.push(OrderEntry {
            library,
            scope: record.scope,
        });
    }
}

/// Removes `module`'s stale build-integration order entries.
///
/// Entries pointing at libraries we own are removed, and the library itself
/// is deleted once no other module references it. Entries pointing at
/// Maven-prefixed libraries are removed only when `delete_foreign` is set,
/// and their libraries always survive. Entries with unrecognized names are
/// left untouched; entries whose library no longer exists are dropped.
pub(crate) fn gc_order_entries(model: &mut ProjectModel, module: ModuleId, delete_foreign: bool) {
    let entries = std::mem::take(&mut model[module].order_entries);
    let mut kept = Vec::with_capacity(entries.len());
    let mut doomed: Vec<LibraryId> = Vec::new();

    for entry in entries {
        match model.library(entry.library) {
            Some(library) => match library_owner(&library.name) {
                Some(BuildOwner::Leiningen) => {
                    if !referenced_elsewhere(model, module, entry.library) {
                        doomed.push(entry.library);
                    }
                }
                Some(BuildOwner::Maven) => {
                    if !delete_foreign {
                        kept.push(entry);
                    }
                }
                None => kept.push(entry),
            },
            None => {
                trace!(
                    target: "lumen.sync",
                    library = entry.library.as_u32(),
                    "dropping order entry for deleted library"
                );
            }
        }
    }

    model[module].order_entries = kept;
    for id in doomed {
        if let Some(library) = model.remove_library(id) {
            debug!(
                target: "lumen.sync",
                library = %library.name,
                "deleted unreferenced library"
            );
        }
    }
}

fn referenced_elsewhere(model: &ProjectModel, module: ModuleId, library: LibraryId) -> bool {
    model
        .modules()
        .any(|(id, data)| id != module && data.references(library))
}

fn upsert_library(model: &mut ProjectModel, record: &DependencyRecord) -> LibraryId {
    let name = library_name(record);
    let id = match model.find_library_by_name(&name) {
        Some(id) => id,
        None => {
            trace!(target: "lumen.sync", library = %name, "creating library");
            model.create_library(&name)
        }
    };
    let library = &mut model[id];
    library.roots.clear();
    library.roots.push(record.file.clone());
    id
}
