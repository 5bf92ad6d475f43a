//! kxlink - C++ vtable construction and patching for prelinked kexts.
//!
//! When a kernel extension is linked into a prelinked kernel image, every
//! class inheriting from an OSObject-style hierarchy carries vtable slots
//! that still reference symbols of its superclass's library. This library
//! reconstructs those vtables from raw binary data and patches inherited
//! slots against the already-resolved superclass vtables, kxld-style: by
//! positional slot pairing and in-place symbol rebinding, driven to a fixed
//! point over the kext's class hierarchy.
//!
//! # Example
//!
//! ```no_run
//! use kxlink::{build_and_patch_vtables, collect_vtables, KextSymbolTable};
//!
//! fn main() -> kxlink::Result<()> {
//!     # let kernel_image: Vec<u8> = Vec::new();
//!     # let kext_image: Vec<u8> = Vec::new();
//!     // The kernel's vtables are already resolved and only need collecting.
//!     let kernel = KextSymbolTable::new(kernel_image, 0xffff_ff80_0000_0000..0xffff_ff80_4000_0000);
//!     let kernel_vtables = collect_vtables(&kernel)?;
//!
//!     // Patch the kext's class hierarchy against the kernel's vtables.
//!     let mut kext = KextSymbolTable::new(kext_image, 0xffff_ff80_0000_0000..0xffff_ff80_4000_0000);
//!     let kext_vtables = build_and_patch_vtables(&mut kext, &[&kernel_vtables])?;
//!
//!     // kext_vtables now serves as a dependency store for kexts linking
//!     // against this one.
//!     # let _ = kext_vtables;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod macho;
pub mod util;
pub mod vtable;

#[cfg(test)]
mod testutil;

// Re-export main types
pub use error::{Error, Result};
pub use macho::{KextSymbolTable, RelocTarget, Symbol};
pub use vtable::{Vtable, VtableEntry, VtableStore};

use tracing::info;

use vtable::{plan_patches, read_vtable, run_fixed_point};

/// Builds and patches all vtables of one kext against its dependencies.
///
/// Plans one patch entry per class carrying a super metaclass pointer, then
/// drives the entries to a fixed point: each sweep patches every class whose
/// superclass vtable is available in a dependency store or among the
/// already-patched local results. Returns the kext's completed vtable store,
/// which in turn serves as a dependency store for kexts linking against it.
///
/// Dependency stores are searched in order, before the local store. Symbols
/// inherited through rule-based overrides are rebound in place in `table`.
pub fn build_and_patch_vtables(
    table: &mut KextSymbolTable,
    deps: &[&VtableStore],
) -> Result<VtableStore> {
    let mut entries = plan_patches(table)?;
    info!(classes = entries.len(), "building and patching vtables");
    run_fixed_point(table, &mut entries, deps)
}

/// Collects the already-resolved vtables of a fully linked image.
///
/// Used for the kernel itself and for any dependency whose symbols need no
/// patching. Every defined vtable symbol is range-checked and read as-is.
pub fn collect_vtables(table: &KextSymbolTable) -> Result<VtableStore> {
    let mut store = VtableStore::new();

    for (index, symbol) in table.symbols() {
        if !macho::names::is_vtable_name(&symbol.name) || !symbol.is_defined() {
            continue;
        }
        if !table.is_value_in_loaded_range(symbol.value) {
            return Err(Error::SymbolOutOfRange {
                vtable: symbol.name.clone(),
                symbol: symbol.name.clone(),
                value: symbol.value,
            });
        }
        store.insert(read_vtable(table, index)?)?;
    }

    info!(vtables = store.len(), "collected resolved vtables");
    Ok(store)
}
