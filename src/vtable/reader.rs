//! Vtable reconstruction from raw binary data.
//!
//! A vtable's method slots start after the two header slots and run until a
//! zero slot that is not covered by an external relocation. A zero slot that
//! *is* covered by a relocation means "unresolved symbol, determine via
//! relocation", not end of table.

use tracing::trace;

use super::store::{Vtable, VtableEntry};
use crate::error::{Error, Result};
use crate::macho::{KextSymbolTable, RelocTarget, VTABLE_ENTRY_SIZE, VTABLE_HEADER_LEN};
use crate::util::is_aligned;

/// Checks the vtable symbol's definition and returns (name, file offset,
/// base vm address) for slot iteration.
pub(crate) fn vtable_location(
    table: &KextSymbolTable,
    vtable_sym: usize,
) -> Result<(String, u64, u64)> {
    let symbol = table.symbol(vtable_sym);
    let name = symbol.name.clone();
    let base_addr = symbol.value;

    let offset = table
        .symbol_file_offset(vtable_sym)
        .ok_or_else(|| Error::SymbolOffsetMissing {
            symbol: name.clone(),
        })?;

    if !is_aligned(offset, VTABLE_ENTRY_SIZE) {
        return Err(Error::MisalignedVtable {
            vtable: name,
            offset,
        });
    }

    Ok((name, offset, base_addr))
}

/// Reads an already-resolved vtable at the symbol's defining offset.
///
/// Each non-zero slot is a statically resolved address whose owning symbol
/// is recovered by C++-restricted value lookup; when no symbol matches, the
/// virtual function was defined inline and the entry records no name. Zero
/// slots covered by a relocation take their identity from the relocation's
/// symbol.
pub fn read_vtable(table: &KextSymbolTable, vtable_sym: usize) -> Result<Vtable> {
    let (name, offset, base_addr) = vtable_location(table, vtable_sym)?;

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
            match table.symbol_by_value(raw, true) {
                Some(sym) => entries.push(VtableEntry::named(table.symbol_name(sym), raw)),
                None => {
                    // Defined inline; the address is opaque and the slot can
                    // never be patched over in subclasses.
                    trace!(vtable = %name, index, address = raw, "vtable slot has no owning symbol");
                    entries.push(VtableEntry::unnamed(raw));
                }
            }
            continue;
        }

        match table.extern_reloc_at(base_addr + slot * VTABLE_ENTRY_SIZE) {
            None => break, // end-of-table sentinel
            Some(RelocTarget::Stripped) => entries.push(VtableEntry::unnamed(0)),
            Some(RelocTarget::Symbol(sym)) => {
                let symbol = table.symbol(sym);
                entries.push(VtableEntry::named(symbol.name.clone(), symbol.value));
            }
        }
    }

    trace!(vtable = %name, entries = entries.len(), "read vtable");
    Ok(Vtable { name, entries })
}
