//! Error types for kext vtable prelinking.
//!
//! This module provides error handling for all patching operations, including
//! vtable reading, class name derivation, override patching, and fixed-point
//! scheduling.

use thiserror::Error;

/// The main error type for vtable prelinking operations.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== Malformed Input ====================
    #[error("symbol '{symbol}' has no defining file offset")]
    SymbolOffsetMissing { symbol: String },

    #[error("vtable '{vtable}' data at offset {offset:#x} is not 8-byte aligned")]
    MisalignedVtable { vtable: String, offset: u64 },

    #[error(
        "vtable '{vtable}' runs past the end of the image at offset {offset:#x} without a sentinel"
    )]
    TruncatedVtable { vtable: String, offset: u64 },

    #[error("symbol '{symbol}' does not follow the super metaclass pointer convention")]
    MalformedSmcp { symbol: String },

    #[error("symbol '{symbol}' does not follow the metaclass pointer convention")]
    MalformedMetaclass { symbol: String },

    #[error("vtable name '{vtable}' does not carry a class name")]
    MalformedVtableName { vtable: String },

    #[error("class '{class}' has no defined vtable symbol '{vtable}'")]
    VtableSymbolNotFound { class: String, vtable: String },

    #[error("super metaclass pointer '{smcp}' does not reference a metaclass symbol")]
    MetaclassNotFound { smcp: String },

    // ==================== Binary Incompatibility ====================
    #[error("vtable '{vtable}' entry '{symbol}' resolves to {value:#x}, outside the loaded range")]
    SymbolOutOfRange {
        vtable: String,
        symbol: String,
        value: u64,
    },

    #[error("vtable '{vtable}' overrides pad slot '{parent}' with '{child}' (built against an incompatible library revision)")]
    PadSlotOverride {
        vtable: String,
        parent: String,
        child: String,
    },

    #[error("vtable '{vtable}' declares method '{symbol}' without implementing it")]
    DeclaredWithoutImplementation { vtable: String, symbol: String },

    #[error("vtable '{vtable}' inherits '{symbol}' at misaligned address {value:#x}")]
    MisalignedFunctionPointer {
        vtable: String,
        symbol: String,
        value: u64,
    },

    #[error("class '{class}' subclasses final class '{superclass}'")]
    SuperclassIsFinal { class: String, superclass: String },

    // ==================== Store / Scheduling ====================
    #[error("duplicate vtable '{name}' (symbol table corruption or duplicate class)")]
    DuplicateVtable { name: String },

    #[error("class '{class}' has no base metaclass vtable in any dependency")]
    MissingMetaclassBase { class: String },

    #[error("vtable patching made no progress; unresolved superclasses remain for: {}", pending.join(", "))]
    DependencyDeadlock { pending: Vec<String> },
}

/// A specialized Result type for vtable prelinking operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error reports a binary incompatibility.
    ///
    /// Incompatibilities are legitimate "this kext cannot run against this
    /// kernel/dependency version" outcomes rather than malformed input.
    #[inline]
    pub fn is_incompatibility(&self) -> bool {
        matches!(
            self,
            Error::SymbolOutOfRange { .. }
                | Error::PadSlotOverride { .. }
                | Error::DeclaredWithoutImplementation { .. }
                | Error::MisalignedFunctionPointer { .. }
                | Error::SuperclassIsFinal { .. }
        )
    }

    /// Returns true if this error implicates dependency resolution rather
    /// than a single vtable.
    #[inline]
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            Error::DependencyDeadlock { .. } | Error::MissingMetaclassBase { .. }
        )
    }
}
