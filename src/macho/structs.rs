//! Mach-O symbol table structures.
//!
//! These structures match the on-disk format of the LINKEDIT symbol table.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::constants::*;

/// 64-bit symbol table entry.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Nlist64 {
    /// Index into string table
    pub n_strx: u32,
    /// Type flag
    pub n_type: u8,
    /// Section number or NO_SECT
    pub n_sect: u8,
    /// Flags (see <mach-o/stab.h>)
    pub n_desc: u16,
    /// Value
    pub n_value: u64,
}

impl Nlist64 {
    /// Size of an nlist entry.
    pub const SIZE: usize = 16;

    /// Returns true if this is an external symbol.
    #[inline]
    pub fn is_external(&self) -> bool {
        (self.n_type & N_EXT) != 0
    }

    /// Returns true if this is an undefined symbol.
    #[inline]
    pub fn is_undefined(&self) -> bool {
        (self.n_type & N_TYPE) == N_UNDF
    }

    /// Returns true if this is a defined symbol.
    #[inline]
    pub fn is_defined(&self) -> bool {
        matches!(self.n_type & N_TYPE, N_SECT | N_ABS)
    }

    /// Returns true if this is a debugging symbol.
    #[inline]
    pub fn is_debug(&self) -> bool {
        (self.n_type & N_STAB) != 0
    }
}

impl Default for Nlist64 {
    fn default() -> Self {
        Self {
            n_strx: 0,
            n_type: 0,
            n_sect: 0,
            n_desc: 0,
            n_value: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nlist_flags() {
        let defined = Nlist64 {
            n_type: N_SECT | N_EXT,
            n_sect: 1,
            ..Default::default()
        };
        assert!(defined.is_defined());
        assert!(defined.is_external());
        assert!(!defined.is_undefined());

        let undef = Nlist64 {
            n_type: N_UNDF | N_EXT,
            ..Default::default()
        };
        assert!(undef.is_undefined());
        assert!(!undef.is_defined());

        let stab = Nlist64 {
            n_type: 0x64, // N_SO
            ..Default::default()
        };
        assert!(stab.is_debug());
    }

    #[test]
    fn test_nlist_absolute_is_defined() {
        let solved = Nlist64 {
            n_type: N_ABS | N_EXT,
            n_sect: NO_SECT,
            n_value: 0x1000,
            ..Default::default()
        };
        assert!(solved.is_defined());
    }
}
