//! Running diffables against a subscription spec as one all-or-nothing step.
//!
//! Every function here works on a copy of its input and only hands the copy
//! back once all steps succeeded and the result validates.

use addendum_core::{
  Error, Result,
  addon::SubscriptionAddon,
  subscription::{SubscriptionSpec, SubscriptionView},
};
use tracing::debug;

use crate::diffable::{ApplyContext, Diffable, get_diffable_from_addon};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Apply,
  Restore,
}

/// Run `steps` in order against a copy of `spec`.
pub fn sync(
  spec: &SubscriptionSpec,
  steps: &[(&dyn Diffable, Direction)],
  ctx: &ApplyContext,
) -> Result<SubscriptionSpec> {
  spec.validate()?;
  let mut out = spec.clone();
  for (i, (diffable, direction)) in steps.iter().enumerate() {
    debug!(step = i, ?direction, "running diffable");
    let edit = match direction {
      Direction::Apply => diffable.get_applies(),
      Direction::Restore => diffable.get_restores(),
    };
    edit(&mut out, ctx)?;
  }
  out.validate()?;
  Ok(out)
}

/// The spec of `view` with `addon` applied.
pub fn apply_addon(
  view: &SubscriptionView,
  addon: &SubscriptionAddon,
  ctx: &ApplyContext,
) -> Result<SubscriptionSpec> {
  let diffable = get_diffable_from_addon(view, addon)?;
  sync(&view.spec, &[(&diffable as &dyn Diffable, Direction::Apply)], ctx)
}

/// The spec of `view` with `addon` taken back out.
pub fn remove_addon(
  view: &SubscriptionView,
  addon: &SubscriptionAddon,
  ctx: &ApplyContext,
) -> Result<SubscriptionSpec> {
  let diffable = get_diffable_from_addon(view, addon)?;
  sync(&view.spec, &[(&diffable as &dyn Diffable, Direction::Restore)], ctx)
}

/// Replace the applied `before` snapshot of a purchase with `after`.
pub fn change_addon_quantity(
  view: &SubscriptionView,
  before: &SubscriptionAddon,
  after: &SubscriptionAddon,
  ctx: &ApplyContext,
) -> Result<SubscriptionSpec> {
  if before.id != after.id {
    return Err(Error::InvalidInput(format!(
      "snapshots belong to different purchases: {} and {}",
      before.id, after.id
    )));
  }
  let restore = get_diffable_from_addon(view, before)?;
  let apply = get_diffable_from_addon(view, after)?;
  sync(
    &view.spec,
    &[
      (&restore as &dyn Diffable, Direction::Restore),
      (&apply as &dyn Diffable, Direction::Apply),
    ],
    ctx,
  )
}
