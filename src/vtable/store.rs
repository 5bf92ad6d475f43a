//! Vtable data model and the per-session vtable store.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

// =============================================================================
// Vtable Entries
// =============================================================================

/// One slot of a virtual method table.
///
/// Entries are positional: the same index in a parent and child vtable
/// denotes the same virtual slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VtableEntry {
    /// Name of the symbol owning the implementation, or `None` when the
    /// implementation was inlined or its local symbol stripped.
    pub name: Option<String>,
    /// The slot's resolved address. Opaque when `name` is `None`.
    pub address: u64,
}

impl VtableEntry {
    /// Creates an entry owned by a named symbol.
    pub fn named(name: impl Into<String>, address: u64) -> Self {
        Self {
            name: Some(name.into()),
            address,
        }
    }

    /// Creates an unnamed entry (inlined or stripped implementation).
    pub fn unnamed(address: u64) -> Self {
        Self {
            name: None,
            address,
        }
    }

    /// Returns true if subclass slots can be patched against this entry.
    #[inline]
    pub fn is_patchable(&self) -> bool {
        self.name.is_some()
    }
}

impl fmt::Display for VtableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} @ {:#x}", self.address),
            None => write!(f, "<inlined> @ {:#x}", self.address),
        }
    }
}

// =============================================================================
// Vtable
// =============================================================================

/// A reconstructed virtual method table.
///
/// Entries cover only the method slots; the two header slots (offset-to-top
/// and RTTI) are never represented or patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vtable {
    /// The vtable's mangled name.
    pub name: String,
    /// Ordered method slots.
    pub entries: Vec<VtableEntry>,
}

impl Vtable {
    /// Creates an empty vtable.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Returns the number of method slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the vtable has no method slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry at the given slot index.
    pub fn entry(&self, index: usize) -> Option<&VtableEntry> {
        self.entries.get(index)
    }
}

impl fmt::Display for Vtable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vtable {{ name: \"{}\", entries: {} }}", self.name, self.len())
    }
}

// =============================================================================
// Vtable Store
// =============================================================================

/// Append-only collection of reconstructed vtables, indexed by mangled name.
///
/// Owned by one prelinking session. Lookup is exact-name only; mangled names
/// already disambiguate overloads and classes.
#[derive(Debug, Default)]
pub struct VtableStore {
    tables: HashMap<String, Vtable>,
}

impl VtableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a completed vtable.
    ///
    /// Vtable names are globally unique within the combined symbol space;
    /// a duplicate indicates symbol table corruption or a duplicate class.
    pub fn insert(&mut self, vtable: Vtable) -> Result<()> {
        if self.tables.contains_key(&vtable.name) {
            return Err(Error::DuplicateVtable { name: vtable.name });
        }
        self.tables.insert(vtable.name.clone(), vtable);
        Ok(())
    }

    /// Looks up a vtable by exact name.
    pub fn get(&self, name: &str) -> Option<&Vtable> {
        self.tables.get(name)
    }

    /// Returns true if the store holds a vtable with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Returns the number of vtables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterates over all vtables.
    pub fn iter(&self) -> impl Iterator<Item = &Vtable> {
        self.tables.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_exact_lookup() {
        let mut store = VtableStore::new();
        store.insert(Vtable::new("__ZTV4Base")).unwrap();

        assert!(store.get("__ZTV4Base").is_some());
        // No prefix or fuzzy matching.
        assert!(store.get("__ZTV4Bas").is_none());
        assert!(store.get("__ZTV4BaseX").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_rejects_duplicates() {
        let mut store = VtableStore::new();
        store.insert(Vtable::new("__ZTV4Base")).unwrap();
        let err = store.insert(Vtable::new("__ZTV4Base")).unwrap_err();
        assert!(matches!(err, Error::DuplicateVtable { name } if name == "__ZTV4Base"));
    }

    #[test]
    fn test_entry_patchability() {
        assert!(VtableEntry::named("__ZN4Base3fooEv", 0x1000).is_patchable());
        assert!(!VtableEntry::unnamed(0x1000).is_patchable());
    }
}
