//! Symbol table capabilities consumed by the vtable engine.
//!
//! This module materializes the Mach-O symbol/relocation data of one kext:
//! symbol lookup by name, value and external-relocation target, vm-address
//! to file-offset translation, and in-place rebinding of a symbol once an
//! inherited implementation has been substituted for it. Structural Mach-O
//! parsing (load commands, segments, relocation enumeration) happens
//! upstream; the table only consumes its results.

use std::ops::Range;

use zerocopy::FromBytes;

use super::constants::*;
use super::structs::Nlist64;
use crate::util::read_u64_le_at;

// =============================================================================
// Symbol
// =============================================================================

/// A materialized symbol table entry.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// The symbol's name.
    pub name: String,
    /// The symbol's resolved value (address), or 0 while undefined.
    pub value: u64,
    /// nlist type flags.
    pub n_type: u8,
    /// Section number or NO_SECT.
    pub n_sect: u8,
}

impl Symbol {
    /// Creates a symbol from raw nlist fields.
    pub fn new(name: impl Into<String>, value: u64, n_type: u8, n_sect: u8) -> Self {
        Self {
            name: name.into(),
            value,
            n_type,
            n_sect,
        }
    }

    /// Creates a section-defined symbol.
    pub fn defined(name: impl Into<String>, value: u64, external: bool) -> Self {
        let n_type = if external { N_SECT | N_EXT } else { N_SECT };
        Self::new(name, value, n_type, 1)
    }

    /// Creates an undefined external symbol.
    pub fn undefined(name: impl Into<String>) -> Self {
        Self::new(name, 0, N_UNDF | N_EXT, NO_SECT)
    }

    /// Creates a symbol from an on-disk nlist record and its name.
    pub fn from_nlist(nlist: &Nlist64, name: impl Into<String>) -> Self {
        Self::new(name, nlist.n_value, nlist.n_type, nlist.n_sect)
    }

    /// Returns true if this is an external symbol.
    #[inline]
    pub fn is_external(&self) -> bool {
        (self.n_type & N_EXT) != 0
    }

    /// Returns true if this symbol has a definition.
    #[inline]
    pub fn is_defined(&self) -> bool {
        matches!(self.n_type & N_TYPE, N_SECT | N_ABS)
    }

    /// Returns true if this symbol is undefined (declared, not implemented).
    #[inline]
    pub fn is_undefined(&self) -> bool {
        (self.n_type & N_TYPE) == N_UNDF
    }

    /// Returns true if this symbol is defined and not visible outside its
    /// compilation unit.
    #[inline]
    pub fn is_locally_defined(&self) -> bool {
        self.is_defined() && !self.is_external()
    }

    /// Returns true if this symbol is defined and externally visible.
    #[inline]
    pub fn is_externally_defined(&self) -> bool {
        self.is_defined() && self.is_external()
    }

    /// Returns true if this is a debugging symbol.
    #[inline]
    pub fn is_debug(&self) -> bool {
        (self.n_type & N_STAB) != 0
    }

    /// Returns true if the symbol belongs to the C++ category.
    #[inline]
    pub fn is_cxx(&self) -> bool {
        super::names::is_cxx_name(&self.name)
    }

    /// Rewrites this symbol's binding to an absolute external definition.
    ///
    /// The name is kept; the value is already resolved and nothing but a
    /// vtable relocation should reference it.
    pub fn solve(&mut self, value: u64) {
        self.n_type = N_ABS | N_EXT;
        self.n_sect = NO_SECT;
        self.value = value;
    }
}

// =============================================================================
// External Relocations
// =============================================================================

/// Target of an external relocation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocTarget {
    /// The relocation binds the slot to a symbol table entry.
    Symbol(usize),
    /// The relocation's locally-defined symbol was stripped; the slot can
    /// never be patched.
    Stripped,
}

// =============================================================================
// Kext Symbol Table
// =============================================================================

/// Segment vm-address to file-offset translation entry.
#[derive(Debug, Clone, Copy)]
struct SegmentMapping {
    vmaddr: u64,
    fileoff: u64,
    size: u64,
}

/// The materialized symbol/relocation view of one kext.
#[derive(Debug)]
pub struct KextSymbolTable {
    /// Raw kext image bytes, addressed by file offset.
    image: Vec<u8>,
    symbols: Vec<Symbol>,
    /// External relocation records keyed by target vm address.
    extern_relocs: std::collections::BTreeMap<u64, RelocTarget>,
    mappings: Vec<SegmentMapping>,
    /// The vm range considered valid for resolved addresses. Spans the whole
    /// combined kernel image, not just this kext.
    loaded_range: Range<u64>,
}

impl KextSymbolTable {
    /// Creates an empty table over a raw kext image.
    pub fn new(image: Vec<u8>, loaded_range: Range<u64>) -> Self {
        Self {
            image,
            symbols: Vec::new(),
            extern_relocs: std::collections::BTreeMap::new(),
            mappings: Vec::new(),
            loaded_range,
        }
    }

    /// Registers a segment vm-to-file mapping.
    pub fn add_mapping(&mut self, vmaddr: u64, fileoff: u64, size: u64) {
        self.mappings.push(SegmentMapping {
            vmaddr,
            fileoff,
            size,
        });
    }

    /// Appends a symbol, returning its index.
    pub fn add_symbol(&mut self, symbol: Symbol) -> usize {
        self.symbols.push(symbol);
        self.symbols.len() - 1
    }

    /// Records an external relocation at the given vm address.
    pub fn add_extern_reloc(&mut self, address: u64, target: RelocTarget) {
        self.extern_relocs.insert(address, target);
    }

    /// Bulk-materializes symbols from raw LINKEDIT nlist records and their
    /// string table. Debug stabs are skipped. Returns the number of symbols
    /// added.
    pub fn load_symbols(&mut self, nlist_data: &[u8], string_table: &[u8]) -> usize {
        let mut added = 0;
        let mut remaining = nlist_data;

        while let Ok((nlist, rest)) = Nlist64::read_from_prefix(remaining) {
            remaining = rest;
            if nlist.is_debug() {
                continue;
            }

            let name = read_cstring(string_table, nlist.n_strx as usize);
            self.symbols.push(Symbol::from_nlist(&nlist, name));
            added += 1;
        }

        added
    }

    /// Returns the number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns true if the table holds no symbols.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Returns the symbol at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn symbol(&self, index: usize) -> &Symbol {
        &self.symbols[index]
    }

    /// Returns the name of the symbol at the given index.
    pub fn symbol_name(&self, index: usize) -> &str {
        &self.symbols[index].name
    }

    /// Iterates over all symbols with their indices.
    pub fn symbols(&self) -> impl Iterator<Item = (usize, &Symbol)> {
        self.symbols.iter().enumerate()
    }

    /// Converts a vm address to a file offset within the image.
    pub fn addr_to_offset(&self, addr: u64) -> Option<u64> {
        self.mappings
            .iter()
            .find(|m| addr >= m.vmaddr && addr < m.vmaddr + m.size)
            .map(|m| m.fileoff + (addr - m.vmaddr))
    }

    /// Returns the file offset at which the symbol's definition lives, or
    /// `None` for undefined symbols and values outside any mapped segment.
    pub fn symbol_file_offset(&self, index: usize) -> Option<u64> {
        let symbol = &self.symbols[index];
        if !symbol.is_defined() {
            return None;
        }
        self.addr_to_offset(symbol.value)
    }

    /// Returns the external relocation record targeting the given vm
    /// address, if one exists.
    pub fn extern_reloc_at(&self, address: u64) -> Option<RelocTarget> {
        self.extern_relocs.get(&address).copied()
    }

    /// Finds a defined symbol by exact value.
    ///
    /// With `cxx_only`, the search is restricted to C++-category symbols so
    /// that arbitrary data symbols sharing an address never masquerade as
    /// virtual method implementations.
    pub fn symbol_by_value(&self, value: u64, cxx_only: bool) -> Option<usize> {
        if value == 0 {
            return None;
        }
        self.symbols.iter().position(|s| {
            s.is_defined() && s.value == value && (!cxx_only || s.is_cxx())
        })
    }

    /// Finds a defined symbol by exact name.
    pub fn defined_symbol_by_name(&self, name: &str) -> Option<usize> {
        self.symbols
            .iter()
            .position(|s| s.is_defined() && s.name == name)
    }

    /// Returns true if the value falls within the loaded address range.
    pub fn is_value_in_loaded_range(&self, value: u64) -> bool {
        self.loaded_range.contains(&value)
    }

    /// Reads an 8-byte little-endian slot at the given file offset, or
    /// `None` if the read would run past the image.
    pub fn read_u64_at(&self, file_offset: u64) -> Option<u64> {
        let offset = usize::try_from(file_offset).ok()?;
        if offset.checked_add(8)? > self.image.len() {
            return None;
        }
        Some(read_u64_le_at(&self.image, offset))
    }

    /// Rewrites a symbol's binding in place to the given resolved value.
    pub fn solve_symbol(&mut self, index: usize, value: u64) {
        self.symbols[index].solve(value);
    }

    /// Returns the raw image bytes.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Returns the raw image bytes as mutable.
    pub fn image_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }
}

/// Extracts a NUL-terminated string from a string table.
fn read_cstring(string_table: &[u8], offset: usize) -> String {
    if offset >= string_table.len() {
        return String::new();
    }
    let data = &string_table[offset..];
    let end = memchr::memchr(0, data).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::IntoBytes;

    #[test]
    fn test_symbol_flags() {
        let local = Symbol::defined("__ZN4Base3fooEv", 0x1000, false);
        assert!(local.is_locally_defined());
        assert!(!local.is_externally_defined());

        let external = Symbol::defined("__ZN4Base3barEv", 0x1010, true);
        assert!(external.is_externally_defined());
        assert!(!external.is_locally_defined());

        let undef = Symbol::undefined("__ZN4Base3bazEv");
        assert!(undef.is_undefined());
        assert!(!undef.is_defined());
    }

    #[test]
    fn test_solve_symbol() {
        let mut table = KextSymbolTable::new(Vec::new(), 0..0x10000);
        let idx = table.add_symbol(Symbol::undefined("__ZN4Base3fooEv"));
        assert!(table.symbol(idx).is_undefined());

        table.solve_symbol(idx, 0x2000);
        let symbol = table.symbol(idx);
        assert!(symbol.is_defined());
        assert!(symbol.is_external());
        assert_eq!(symbol.value, 0x2000);
        assert_eq!(symbol.name, "__ZN4Base3fooEv");
    }

    #[test]
    fn test_symbol_by_value_cxx_restriction() {
        let mut table = KextSymbolTable::new(Vec::new(), 0..0x10000);
        table.add_symbol(Symbol::defined("_plain_data", 0x1000, false));
        let cxx = table.add_symbol(Symbol::defined("__ZN4Base3fooEv", 0x1000, true));

        assert_eq!(table.symbol_by_value(0x1000, true), Some(cxx));
        assert_eq!(table.symbol_by_value(0x1000, false), Some(0));
        assert_eq!(table.symbol_by_value(0x9999, true), None);
        assert_eq!(table.symbol_by_value(0, true), None);
    }

    #[test]
    fn test_extern_reloc_lookup() {
        let mut table = KextSymbolTable::new(Vec::new(), 0..0x10000);
        let idx = table.add_symbol(Symbol::undefined("__ZN4Base3fooEv"));
        table.add_extern_reloc(0x1010, RelocTarget::Symbol(idx));
        table.add_extern_reloc(0x1018, RelocTarget::Stripped);

        assert_eq!(table.extern_reloc_at(0x1010), Some(RelocTarget::Symbol(idx)));
        assert_eq!(table.extern_reloc_at(0x1018), Some(RelocTarget::Stripped));
        assert_eq!(table.extern_reloc_at(0x1020), None);
    }

    #[test]
    fn test_addr_to_offset() {
        let mut table = KextSymbolTable::new(vec![0u8; 0x100], 0x1000..0x2000);
        table.add_mapping(0x1000, 0, 0x100);

        assert_eq!(table.addr_to_offset(0x1000), Some(0));
        assert_eq!(table.addr_to_offset(0x1080), Some(0x80));
        assert_eq!(table.addr_to_offset(0x2000), None);

        let sym = table.add_symbol(Symbol::defined("__ZTV4Base", 0x1040, true));
        assert_eq!(table.symbol_file_offset(sym), Some(0x40));

        let undef = table.add_symbol(Symbol::undefined("__ZN4Base3fooEv"));
        assert_eq!(table.symbol_file_offset(undef), None);
    }

    #[test]
    fn test_read_u64_bounds() {
        let mut image = vec![0u8; 16];
        image[8..].copy_from_slice(&0xDEAD_BEEFu64.to_le_bytes());
        let table = KextSymbolTable::new(image, 0..0x1000);

        assert_eq!(table.read_u64_at(8), Some(0xDEAD_BEEF));
        assert_eq!(table.read_u64_at(9), None);
        assert_eq!(table.read_u64_at(u64::MAX), None);
    }

    #[test]
    fn test_load_symbols_from_nlist() {
        let strings = b"\0__ZTV4Base\0__ZN4Base3fooEv\0";
        let records = [
            Nlist64 {
                n_strx: 1,
                n_type: N_SECT | N_EXT,
                n_sect: 1,
                n_desc: 0,
                n_value: 0x1000,
            },
            // Debug stab, must be skipped.
            Nlist64 {
                n_strx: 12,
                n_type: 0x64,
                n_sect: 0,
                n_desc: 0,
                n_value: 0,
            },
            Nlist64 {
                n_strx: 12,
                n_type: N_UNDF | N_EXT,
                n_sect: NO_SECT,
                n_desc: 0,
                n_value: 0,
            },
        ];

        let mut raw = Vec::new();
        for record in &records {
            raw.extend_from_slice(record.as_bytes());
        }

        let mut table = KextSymbolTable::new(Vec::new(), 0..0x10000);
        assert_eq!(table.load_symbols(&raw, strings), 2);
        assert_eq!(table.symbol_name(0), "__ZTV4Base");
        assert_eq!(table.symbol_name(1), "__ZN4Base3fooEv");
        assert!(table.symbol(1).is_undefined());
    }
}
