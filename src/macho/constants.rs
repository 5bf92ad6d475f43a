//! Mach-O symbol constants and vtable layout constants.

// =============================================================================
// Symbol Types (nlist n_type)
// =============================================================================

/// If any of these bits set, a symbolic debugging entry
pub const N_STAB: u8 = 0xE0;
/// Private external symbol bit
pub const N_PEXT: u8 = 0x10;
/// Mask for the type bits
pub const N_TYPE: u8 = 0x0E;
/// External symbol bit
pub const N_EXT: u8 = 0x01;

/// Undefined symbol
pub const N_UNDF: u8 = 0x0;
/// Absolute symbol
pub const N_ABS: u8 = 0x2;
/// Defined in section number n_sect
pub const N_SECT: u8 = 0xE;
/// Prebound undefined
pub const N_PBUD: u8 = 0xC;
/// Indirect symbol
pub const N_INDR: u8 = 0xA;

/// Symbol is not in any section
pub const NO_SECT: u8 = 0;

// =============================================================================
// Vtable Layout (64-bit C++ ABI)
// =============================================================================

/// Size of one vtable slot in bytes.
pub const VTABLE_ENTRY_SIZE: u64 = 8;

/// Number of header slots (offset-to-top and RTTI pointer) preceding the
/// first virtual method slot. Header slots are never patched.
pub const VTABLE_HEADER_LEN: usize = 2;

/// Byte size of the vtable header.
pub const VTABLE_HEADER_SIZE: u64 = VTABLE_HEADER_LEN as u64 * VTABLE_ENTRY_SIZE;
