//! Fixed-point patch scheduling.
//!
//! Classes can only be patched after their superclass's vtable exists, and
//! intra-kext inheritance chains arrive in arbitrary symbol order. Rather
//! than toposorting, the scheduler sweeps the pending entries repeatedly:
//! every sweep patches each class whose superclass vtable has become
//! available, and the loop ends when everything is patched or a full sweep
//! makes no progress.

use tracing::{debug, trace};

use super::patcher::patch_vtable;
use super::planner::{ClassPatchEntry, PatchState};
use super::store::{Vtable, VtableStore};
use crate::error::{Error, Result};
use crate::macho::{names, KextSymbolTable};

/// Looks up a vtable by name across the dependency stores and the local
/// store, dependencies first.
fn lookup_vtable<'a>(
    name: &str,
    deps: &[&'a VtableStore],
    local: &'a VtableStore,
) -> Option<&'a Vtable> {
    deps.iter()
        .find_map(|store| store.get(name))
        .or_else(|| local.get(name))
}

/// Patches one class and its metaclass vtable against the already-available
/// superclass vtable, inserting both results into `store`.
fn patch_class(
    table: &mut KextSymbolTable,
    entry: &ClassPatchEntry,
    super_vtable: Vtable,
    deps: &[&VtableStore],
    store: &mut VtableStore,
) -> Result<()> {
    // A final superclass emits a marker symbol into every translation unit
    // that subclasses it, so the local symbol table is the place to look.
    let final_name = names::final_symbol_name_from_class(&entry.super_class_name);
    if table.defined_symbol_by_name(&final_name).is_some() {
        return Err(Error::SuperclassIsFinal {
            class: entry.class_name.clone(),
            superclass: entry.super_class_name.clone(),
        });
    }

    let vtable = patch_vtable(table, entry.vtable_sym, &super_vtable)?;
    store.insert(vtable)?;

    if store.contains(&entry.meta_vtable_name)
        || deps.iter().any(|d| d.contains(&entry.meta_vtable_name))
    {
        return Err(Error::DuplicateVtable {
            name: entry.meta_vtable_name.clone(),
        });
    }

    // Every metaclass vtable inherits from OSMetaClass's own vtable, which
    // the kernel dependency is expected to provide.
    let meta_parent = lookup_vtable(names::OS_METACLASS_VTABLE_NAME, deps, store)
        .cloned()
        .ok_or_else(|| Error::MissingMetaclassBase {
            class: entry.class_name.clone(),
        })?;

    let meta_vtable = patch_vtable(table, entry.meta_vtable_sym, &meta_parent)?;
    store.insert(meta_vtable)?;

    Ok(())
}

/// Drives patching of all planned classes to a fixed point.
///
/// Per-entry hard errors mark the entry [`PatchState::Failed`] and abort the
/// session immediately. If a full sweep completes without progress while
/// entries remain pending, the superclass vtables are unresolvable and the
/// session fails with the pending class list.
pub fn run_fixed_point(
    table: &mut KextSymbolTable,
    entries: &mut [ClassPatchEntry],
    deps: &[&VtableStore],
) -> Result<VtableStore> {
    run_sweeps(table, entries, deps).map(|(store, _)| store)
}

/// Sweep loop body; also reports how many sweeps were needed.
fn run_sweeps(
    table: &mut KextSymbolTable,
    entries: &mut [ClassPatchEntry],
    deps: &[&VtableStore],
) -> Result<(VtableStore, usize)> {
    let mut store = VtableStore::new();
    let mut sweep = 0usize;

    loop {
        sweep += 1;
        let mut progressed = false;
        let mut pending = 0usize;

        for i in 0..entries.len() {
            if entries[i].state != PatchState::Pending {
                continue;
            }

            let super_vtable = match lookup_vtable(&entries[i].super_vtable_name, deps, &store) {
                Some(vtable) => vtable.clone(),
                None => {
                    trace!(
                        class = %entries[i].class_name,
                        waiting_on = %entries[i].super_vtable_name,
                        "superclass vtable not yet available"
                    );
                    pending += 1;
                    continue;
                }
            };

            match patch_class(table, &entries[i], super_vtable, deps, &mut store) {
                Ok(()) => {
                    entries[i].state = PatchState::Patched;
                    progressed = true;
                }
                Err(err) => {
                    entries[i].state = PatchState::Failed;
                    return Err(err);
                }
            }
        }

        debug!(sweep, pending, "patch sweep complete");

        if pending == 0 {
            return Ok((store, sweep));
        }
        if !progressed {
            let pending: Vec<String> = entries
                .iter()
                .filter(|e| e.state == PatchState::Pending)
                .map(|e| e.class_name.clone())
                .collect();
            return Err(Error::DependencyDeadlock { pending });
        }
    }
}
