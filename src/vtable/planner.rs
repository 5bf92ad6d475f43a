//! Class discovery and patch planning.
//!
//! Classes participating in inheritance are the only ones that need
//! patching, and each of them carries a super metaclass pointer symbol. One
//! pass over the symbol table derives, per class, the full name set and the
//! (class, superclass) edge the fixed-point scheduler resolves over. No
//! binary data is touched here; this is pure name derivation over the
//! mangling convention.

use tracing::debug;

use crate::error::{Error, Result};
use crate::macho::{names, KextSymbolTable, RelocTarget};

/// Patch progress of one discovered class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    /// Superclass vtable not yet available; retried next sweep.
    Pending,
    /// Class and metaclass vtables patched and stored.
    Patched,
    /// Hard failure; session-fatal.
    Failed,
}

/// One class discovered for patching, with its derived name set and the
/// materialized superclass edge.
#[derive(Debug, Clone)]
pub struct ClassPatchEntry {
    /// Length-prefixed mangled class name (e.g. `5Child`).
    pub class_name: String,
    /// Length-prefixed mangled superclass name.
    pub super_class_name: String,
    /// The class vtable's name.
    pub vtable_name: String,
    /// The metaclass vtable's name.
    pub meta_vtable_name: String,
    /// The superclass vtable's name the scheduler waits for.
    pub super_vtable_name: String,
    /// Symbol index of the super metaclass pointer.
    pub smcp: usize,
    /// Symbol index of the class vtable.
    pub vtable_sym: usize,
    /// Symbol index of the metaclass vtable.
    pub meta_vtable_sym: usize,
    /// Scheduler state.
    pub state: PatchState,
}

/// Scans the symbol table and derives one [`ClassPatchEntry`] per class
/// with a super metaclass pointer symbol.
///
/// Each derivation step is fatal on failure: a malformed SMCP or metaclass
/// name, or a missing vtable symbol, indicates symbol table corruption.
pub fn plan_patches(table: &KextSymbolTable) -> Result<Vec<ClassPatchEntry>> {
    let mut entries = Vec::new();

    for (smcp, symbol) in table.symbols() {
        if !names::is_smcp_name(&symbol.name) {
            continue;
        }

        let class_name = names::class_name_from_smcp(&symbol.name)?.to_string();
        let vtable_name = names::vtable_name_from_class(&class_name);
        let meta_vtable_name = names::meta_vtable_name_from_class(&class_name);

        let vtable_sym = table.defined_symbol_by_name(&vtable_name).ok_or_else(|| {
            Error::VtableSymbolNotFound {
                class: class_name.clone(),
                vtable: vtable_name.clone(),
            }
        })?;
        let meta_vtable_sym =
            table
                .defined_symbol_by_name(&meta_vtable_name)
                .ok_or_else(|| Error::VtableSymbolNotFound {
                    class: class_name.clone(),
                    vtable: meta_vtable_name.clone(),
                })?;

        // The SMCP data directly references the superclass's metaclass
        // object, so the relocation at its address names the superclass.
        let metaclass_sym = match table.extern_reloc_at(symbol.value) {
            Some(RelocTarget::Symbol(sym)) => sym,
            _ => {
                return Err(Error::MetaclassNotFound {
                    smcp: symbol.name.clone(),
                })
            }
        };

        let metaclass_name = table.symbol_name(metaclass_sym);
        if !names::is_metaclass_name(metaclass_name) {
            return Err(Error::MetaclassNotFound {
                smcp: symbol.name.clone(),
            });
        }

        let super_class_name = names::class_name_from_metaclass(metaclass_name)?.to_string();
        let super_vtable_name = names::vtable_name_from_class(&super_class_name);

        debug!(
            class = %class_name,
            superclass = %super_class_name,
            "discovered class for vtable patching"
        );

        entries.push(ClassPatchEntry {
            class_name,
            super_class_name,
            vtable_name,
            meta_vtable_name,
            super_vtable_name,
            smcp,
            vtable_sym,
            meta_vtable_sym,
            state: PatchState::Pending,
        });
    }

    debug!(classes = entries.len(), "patch planning complete");
    Ok(entries)
}
