//! The vtable override decision engine.
//!
//! For each positional entry pair of a child vtable and its resolved parent
//! vtable, the patcher decides whether the child slot keeps its own
//! implementation, inherits the parent's, or reports a binary
//! incompatibility. The decision rules mirror the kernel linker's vtable
//! patching semantics and apply in a fixed priority order; the first
//! matching rule wins.

use tracing::{debug, trace, warn};

use super::reader::vtable_location;
use super::store::{Vtable, VtableEntry};
use crate::error::{Error, Result};
use crate::macho::{names, KextSymbolTable, RelocTarget, VTABLE_ENTRY_SIZE, VTABLE_HEADER_LEN};

/// Patches a child vtable against its resolved parent vtable.
///
/// Walks the child's raw slots at the vtable symbol's defining offset,
/// applies the override decision to every relocation-covered slot, and
/// returns the completed vtable. Rule 8 decisions rewrite the owning
/// symbol's binding in place so the slot resolves to the inherited
/// implementation.
///
/// A failure from any rule aborts the entire vtable; partial patches are
/// never committed as complete.
pub fn patch_vtable(
    table: &mut KextSymbolTable,
    vtable_sym: usize,
    parent: &Vtable,
) -> Result<Vtable> {
    let (name, offset, base_addr) = vtable_location(table, vtable_sym)?;
    debug!(vtable = %name, parent = %parent.name, "patching vtable");

    let mut entries = Vec::new();
    for index in 0.. {
        let slot = (VTABLE_HEADER_LEN + index) as u64;
        let slot_offset = offset + slot * VTABLE_ENTRY_SIZE;
        let raw = table
            .read_u64_at(slot_offset)
            .ok_or_else(|| Error::TruncatedVtable {
                vtable: name.clone(),
                offset: slot_offset,
            })?;

        if raw != 0 {
            // Statically resolved slot; never patched.
            match table.symbol_by_value(raw, true) {
                Some(sym) => entries.push(VtableEntry::named(table.symbol_name(sym), raw)),
                None => entries.push(VtableEntry::unnamed(raw)),
            }
            continue;
        }

        match table.extern_reloc_at(base_addr + slot * VTABLE_ENTRY_SIZE) {
            // A zero slot with no relocation is the end-of-table sentinel.
            None => break,

            // Rule 1: the slot's locally-defined symbol was stripped. We
            // would not patch it anyway, so it stays unpatched; subclasses
            // cannot inherit through this slot.
            Some(RelocTarget::Stripped) => {
                warn!(vtable = %name, index, "slot symbol stripped; leaving unpatched");
                entries.push(VtableEntry::unnamed(0));
            }

            Some(RelocTarget::Symbol(child)) => match parent.entry(index) {
                Some(parent_entry) => {
                    let entry = patch_vtable_entry(table, parent_entry, &name, child)?;
                    entries.push(entry);
                }
                // Slots past the parent's length are the child's own new
                // virtual methods; there is nothing to inherit.
                None => {
                    let symbol = table.symbol(child);
                    entries.push(VtableEntry::named(symbol.name.clone(), symbol.value));
                }
            },
        }
    }

    debug!(vtable = %name, entries = entries.len(), "vtable patched");
    Ok(Vtable { name, entries })
}

/// Applies the override decision rules to one entry pair.
///
/// Returns the completed entry for the child vtable. Only the final
/// override rule mutates state; every other rule is a read-only validation.
fn patch_vtable_entry(
    table: &mut KextSymbolTable,
    parent: &VtableEntry,
    vtable_name: &str,
    child: usize,
) -> Result<VtableEntry> {
    // Rule 2: the inherited implementation was itself inlined. Nothing to
    // substitute; the child's own resolution must stand.
    let Some(parent_name) = parent.name.as_deref() else {
        return pass_through(table, vtable_name, child);
    };

    let (child_name, locally_defined, undefined) = {
        let symbol = table.symbol(child);
        (
            symbol.name.clone(),
            symbol.is_locally_defined(),
            symbol.is_undefined(),
        )
    };

    // Rule 3: the subclass provides its own implementation.
    if locally_defined {
        return pass_through(table, vtable_name, child);
    }

    // Rule 4: the subclass declares the method abstract. The pure virtual
    // property itself overrides the parent's implementation, so patching
    // would defeat the intentional trap.
    if names::is_pure_virtual(&child_name) {
        return pass_through(table, vtable_name, child);
    }

    // Rule 5: both slots resolve to the same inherited implementation.
    if child_name == parent_name {
        return pass_through(table, vtable_name, child);
    }

    // Rule 6: the parent slot is reserved padding and the child does not
    // match it, so the child was built against an incompatible revision of
    // the superclass's library.
    if names::is_padslot_name(parent_name) {
        return Err(Error::PadSlotOverride {
            vtable: vtable_name.to_string(),
            parent: parent_name.to_string(),
            child: child_name,
        });
    }

    // Rule 7: strict patching. Symbols are resolved before patching, so a
    // still-undefined symbol carrying this class's own method prefix was
    // declared as a new method of the class and never implemented.
    if undefined {
        let class = names::class_name_from_vtable(vtable_name)?;
        let prefix = names::function_prefix_from_class(class);
        if child_name.starts_with(&prefix) {
            return Err(Error::DeclaredWithoutImplementation {
                vtable: vtable_name.to_string(),
                symbol: child_name,
            });
        }
    }

    // Rule 8: the child entry is unresolved and differs from its parent, so
    // the slot inherits the parent's implementation. The C++ ABI requires
    // function pointers to be at least 2-byte aligned; an odd address is
    // tolerated only for the pure virtual trap.
    let value = parent.address;
    if !names::is_pure_virtual(parent_name) && (value & 1) != 0 {
        return Err(Error::MisalignedFunctionPointer {
            vtable: vtable_name.to_string(),
            symbol: parent_name.to_string(),
            value,
        });
    }

    trace!(
        vtable = %vtable_name,
        child = %child_name,
        parent = %parent_name,
        address = value,
        "substituting inherited implementation"
    );
    table.solve_symbol(child, value);
    Ok(VtableEntry::named(parent_name, value))
}

/// Validates that a non-overridden child slot resolves into the loaded
/// address range and records it unchanged.
fn pass_through(
    table: &KextSymbolTable,
    vtable_name: &str,
    child: usize,
) -> Result<VtableEntry> {
    let symbol = table.symbol(child);
    if !table.is_value_in_loaded_range(symbol.value) {
        return Err(Error::SymbolOutOfRange {
            vtable: vtable_name.to_string(),
            symbol: symbol.name.clone(),
            value: symbol.value,
        });
    }
    Ok(VtableEntry::named(symbol.name.clone(), symbol.value))
}
