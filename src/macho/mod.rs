//! Mach-O symbol model: nlist records, naming conventions, and the
//! materialized symbol/relocation table the vtable engine consumes.

pub mod constants;
pub mod names;
mod structs;
mod symbols;

pub use constants::*;
pub use structs::Nlist64;
pub use symbols::{KextSymbolTable, RelocTarget, Symbol};
