//! The add-on diff engine.
//!
//! Turns a purchased add-on into a pair of edits on a subscription spec:
//! apply splits item fragments at the add-on's instance boundaries and layers
//! the add-on's rate cards onto them; restore undoes exactly what was
//! recorded, drops inert fragments the add-on created and re-merges the
//! splits.

mod affected;
mod apply;
pub mod diffable;
mod restore;
pub mod workflow;
pub mod zero;

pub use affected::get_affected_item_ids;
pub use diffable::{
  AddonDiffable, AppliesToSpec, ApplyContext, Diffable, get_diffable_from_addon,
};
pub use workflow::{Direction, apply_addon, change_addon_quantity, remove_addon, sync};
