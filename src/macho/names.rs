//! C++ / IOKit mangled-name conventions.
//!
//! The kext class hierarchy is recovered purely from Itanium-mangled symbol
//! names. A class participating in inheritance carries a super metaclass
//! pointer (SMCP) symbol of the form `__ZN<class>10superClassE`, where
//! `<class>` is the length-prefixed class name (e.g. `4Base`). From that one
//! name every other identity is derived: the class vtable `__ZTV<class>`,
//! the metaclass vtable `__ZTVN<class>9MetaClassE`, and the method-name
//! prefix `__ZN<class>` shared by all of the class's member functions.

use crate::error::{Error, Result};

/// Prefix shared by all C++-mangled symbols.
pub const CXX_PREFIX: &str = "__Z";

/// Prefix of vtable symbols.
pub const VTABLE_PREFIX: &str = "__ZTV";

/// Prefix of mangled nested names (class members and statics).
pub const OSOBJ_PREFIX: &str = "__ZN";

/// Suffix of super metaclass pointer symbols.
pub const SMCP_TOKEN: &str = "10superClassE";

/// Suffix of metaclass pointer symbols.
pub const METACLASS_TOKEN: &str = "10gMetaClassE";

/// Prefix of metaclass vtable symbols.
pub const METACLASS_VTABLE_PREFIX: &str = "__ZTVN";

/// Suffix of metaclass vtable symbols.
pub const METACLASS_VTABLE_SUFFIX: &str = "9MetaClassE";

/// Suffix of the marker emitted for classes declared final.
pub const FINAL_CLASS_TOKEN: &str = "14__OSFinalClassEv";

/// Token embedded in reserved pad-slot symbol names.
pub const RESERVED_TOKEN: &str = "_RESERVED";

/// The synthetic trap invoked when an abstract method is called.
pub const PURE_VIRTUAL_SYMBOL: &str = "___cxa_pure_virtual";

/// Every metaclass ultimately inherits from this one vtable.
pub const OS_METACLASS_VTABLE_NAME: &str = "__ZTV11OSMetaClass";

/// Returns true if the name belongs to the C++ symbol category.
#[inline]
pub fn is_cxx_name(name: &str) -> bool {
    name.starts_with(CXX_PREFIX)
}

/// Returns true if the name denotes a vtable.
#[inline]
pub fn is_vtable_name(name: &str) -> bool {
    name.starts_with(VTABLE_PREFIX)
}

/// Returns true if the name denotes a super metaclass pointer.
#[inline]
pub fn is_smcp_name(name: &str) -> bool {
    extract_inner(name, OSOBJ_PREFIX, SMCP_TOKEN).is_some()
}

/// Returns true if the name denotes a metaclass pointer.
#[inline]
pub fn is_metaclass_name(name: &str) -> bool {
    extract_inner(name, OSOBJ_PREFIX, METACLASS_TOKEN).is_some()
}

/// Returns true if the name denotes a reserved pad slot.
#[inline]
pub fn is_padslot_name(name: &str) -> bool {
    name.contains(RESERVED_TOKEN)
}

/// Returns true if the name denotes the pure virtual trap.
#[inline]
pub fn is_pure_virtual(name: &str) -> bool {
    name == PURE_VIRTUAL_SYMBOL
}

/// Strips `prefix` and `suffix` from `name`, requiring a non-empty middle.
fn extract_inner<'a>(name: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    let inner = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

/// Derives the length-prefixed class name from an SMCP symbol name.
///
/// `__ZN4Base10superClassE` yields `4Base`.
pub fn class_name_from_smcp(name: &str) -> Result<&str> {
    extract_inner(name, OSOBJ_PREFIX, SMCP_TOKEN).ok_or_else(|| Error::MalformedSmcp {
        symbol: name.to_string(),
    })
}

/// Derives the length-prefixed class name from a metaclass pointer symbol.
///
/// `__ZN4Base10gMetaClassE` yields `4Base`.
pub fn class_name_from_metaclass(name: &str) -> Result<&str> {
    extract_inner(name, OSOBJ_PREFIX, METACLASS_TOKEN).ok_or_else(|| Error::MalformedMetaclass {
        symbol: name.to_string(),
    })
}

/// Derives the class name from a vtable name.
///
/// `__ZTV4Base` yields `4Base`. Metaclass vtable names keep their nested
/// wrapping (`__ZTVN4Base9MetaClassE` yields `N4Base9MetaClassE`), which is
/// sufficient for prefix comparison purposes.
pub fn class_name_from_vtable(name: &str) -> Result<&str> {
    let inner = name.strip_prefix(VTABLE_PREFIX).unwrap_or("");
    if inner.is_empty() {
        return Err(Error::MalformedVtableName {
            vtable: name.to_string(),
        });
    }
    Ok(inner)
}

/// Builds the vtable name for a class: `__ZTV<class>`.
pub fn vtable_name_from_class(class: &str) -> String {
    format!("{VTABLE_PREFIX}{class}")
}

/// Builds the metaclass vtable name for a class: `__ZTVN<class>9MetaClassE`.
pub fn meta_vtable_name_from_class(class: &str) -> String {
    format!("{METACLASS_VTABLE_PREFIX}{class}{METACLASS_VTABLE_SUFFIX}")
}

/// Builds the final-class marker symbol name: `__ZN<class>14__OSFinalClassEv`.
pub fn final_symbol_name_from_class(class: &str) -> String {
    format!("{OSOBJ_PREFIX}{class}{FINAL_CLASS_TOKEN}")
}

/// Builds the mangled prefix shared by all member functions of a class:
/// `__ZN<class>`.
pub fn function_prefix_from_class(class: &str) -> String {
    format!("{OSOBJ_PREFIX}{class}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smcp_detection() {
        assert!(is_smcp_name("__ZN4Base10superClassE"));
        assert!(is_smcp_name("__ZN12DriverClient10superClassE"));
        assert!(!is_smcp_name("__ZN10superClassE"));
        assert!(!is_smcp_name("__ZN4Base10gMetaClassE"));
        assert!(!is_smcp_name("_not_mangled"));
    }

    #[test]
    fn test_class_name_from_smcp() {
        assert_eq!(class_name_from_smcp("__ZN4Base10superClassE").unwrap(), "4Base");
        assert!(class_name_from_smcp("__ZN10superClassE").is_err());
        assert!(class_name_from_smcp("__ZTV4Base").is_err());
    }

    #[test]
    fn test_metaclass_detection() {
        assert!(is_metaclass_name("__ZN4Base10gMetaClassE"));
        assert!(!is_metaclass_name("__ZN4Base10superClassE"));
        assert!(!is_metaclass_name("__ZN10gMetaClassE"));
        assert!(!is_metaclass_name("__ZTV4Base"));
    }

    #[test]
    fn test_class_name_from_metaclass() {
        assert_eq!(
            class_name_from_metaclass("__ZN4Base10gMetaClassE").unwrap(),
            "4Base"
        );
        assert!(class_name_from_metaclass("__ZN4Base10superClassE").is_err());
    }

    #[test]
    fn test_derived_names() {
        assert_eq!(vtable_name_from_class("4Base"), "__ZTV4Base");
        assert_eq!(
            meta_vtable_name_from_class("4Base"),
            "__ZTVN4Base9MetaClassE"
        );
        assert_eq!(
            final_symbol_name_from_class("4Base"),
            "__ZN4Base14__OSFinalClassEv"
        );
        assert_eq!(function_prefix_from_class("4Base"), "__ZN4Base");
    }

    #[test]
    fn test_class_name_from_vtable() {
        assert_eq!(class_name_from_vtable("__ZTV4Base").unwrap(), "4Base");
        assert_eq!(
            class_name_from_vtable("__ZTVN4Base9MetaClassE").unwrap(),
            "N4Base9MetaClassE"
        );
        assert!(class_name_from_vtable("__ZTV").is_err());
        assert!(class_name_from_vtable("_other").is_err());
    }

    #[test]
    fn test_padslot_and_pure_virtual() {
        assert!(is_padslot_name("__ZN4Base14_RESERVED_1Ev"));
        assert!(!is_padslot_name("__ZN4Base3fooEv"));
        assert!(is_pure_virtual("___cxa_pure_virtual"));
        assert!(!is_pure_virtual("__ZN4Base3fooEv"));
    }

    #[test]
    fn test_cxx_category() {
        assert!(is_cxx_name("__ZTV4Base"));
        assert!(is_cxx_name("__ZN4Base3fooEv"));
        assert!(!is_cxx_name("_gOSKextUnresolved"));
    }
}
