//! The reversible unit of change one add-on purchase contributes to a
//! subscription spec.
//!
//! A [`Diffable`] hands out two closures over an immutable snapshot of the
//! purchase: one that layers it onto a spec and one that takes it back out.
//! Neither keeps state between calls, so both may be run against any number
//! of spec copies.

use addendum_core::{
  Error, Result,
  addon::{AddonInstance, SubscriptionAddon},
  subscription::{SubscriptionSpec, SubscriptionView},
};
use chrono::{DateTime, Utc};
use tracing::debug_span;
use uuid::Uuid;

use crate::{
  affected::instances_with_affected_items, apply::apply_rate_card,
  restore::restore_rate_card,
};

/// Per-invocation inputs. The engine never reads a clock of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyContext {
  pub current_time: DateTime<Utc>,
}

impl ApplyContext {
  pub fn at(current_time: DateTime<Utc>) -> Self { Self { current_time } }
}

/// An edit of a subscription spec in place.
pub type AppliesToSpec<'a> =
  Box<dyn Fn(&mut SubscriptionSpec, &ApplyContext) -> Result<()> + 'a>;

pub trait Diffable {
  fn get_applies(&self) -> AppliesToSpec<'_>;
  fn get_restores(&self) -> AppliesToSpec<'_>;
}

/// The diffable of one purchased add-on.
#[derive(Debug, Clone)]
pub struct AddonDiffable {
  addon_id:  Uuid,
  instances: Vec<AddonInstance>,
}

impl AddonDiffable {
  pub fn addon_id(&self) -> Uuid { self.addon_id }

  /// The instances this diffable applies, with affected items resolved
  /// against the view it was built from.
  pub fn instances(&self) -> &[AddonInstance] { &self.instances }
}

impl Diffable for AddonDiffable {
  fn get_applies(&self) -> AppliesToSpec<'_> {
    Box::new(move |spec: &mut SubscriptionSpec, ctx: &ApplyContext| {
      let span = debug_span!(
        "apply_addon",
        addon_id = %self.addon_id,
        current_time = %ctx.current_time
      );
      let _enter = span.enter();

      for instance in &self.instances {
        for rc in &instance.rate_cards {
          apply_rate_card(
            spec,
            self.addon_id,
            &instance.cadence,
            instance.quantity,
            &rc.rate_card,
          )?;
        }
      }
      Ok(())
    })
  }

  fn get_restores(&self) -> AppliesToSpec<'_> {
    Box::new(move |spec: &mut SubscriptionSpec, ctx: &ApplyContext| {
      let span = debug_span!(
        "restore_addon",
        addon_id = %self.addon_id,
        current_time = %ctx.current_time
      );
      let _enter = span.enter();

      for instance in self.instances.iter().rev() {
        for rc in instance.rate_cards.iter().rev() {
          restore_rate_card(
            spec,
            self.addon_id,
            &instance.cadence,
            instance.quantity,
            &rc.rate_card,
          )?;
        }
      }
      Ok(())
    })
  }
}

/// Build the diffable of `addon` as purchased onto `view`.
///
/// Fails when the purchase belongs to another subscription, is malformed, or
/// when a phase of the view has no computable cadence.
pub fn get_diffable_from_addon(
  view: &SubscriptionView,
  addon: &SubscriptionAddon,
) -> Result<AddonDiffable> {
  if addon.subscription_id != view.subscription_id {
    return Err(Error::InvalidInput(format!(
      "add-on purchase {} belongs to subscription {}, not {}",
      addon.id, addon.subscription_id, view.subscription_id
    )));
  }
  addon.validate()?;
  for phase_key in view.spec.phases.keys() {
    view.spec.phase_cadence(phase_key)?;
  }

  Ok(AddonDiffable {
    addon_id:  addon.id,
    instances: instances_with_affected_items(view, addon),
  })
}
