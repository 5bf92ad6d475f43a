//! Vtable reconstruction and patching.
//!
//! The engine runs in three stages. The planner scans the symbol table for
//! classes participating in inheritance and materializes their superclass
//! edges. The scheduler drives those edges to a fixed point, pulling parent
//! vtables from dependency stores or the session's own store. For each ready
//! class, the reader reconstructs raw vtable slots and the patcher applies
//! the override decision rules against the parent, rebinding inherited
//! symbols in place.

mod patcher;
mod planner;
mod reader;
mod scheduler;
mod store;

pub use patcher::patch_vtable;
pub use planner::{plan_patches, ClassPatchEntry, PatchState};
pub use reader::read_vtable;
pub use scheduler::run_fixed_point;
pub use store::{Vtable, VtableEntry, VtableStore};
