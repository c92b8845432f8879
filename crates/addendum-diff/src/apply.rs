//! Projecting one add-on instance onto a subscription spec.
//!
//! For every phase the instance overlaps, fragments of the affected key are
//! split at the instance boundaries; the overlapping pieces are extended by
//! the add-on, and whatever part of the window no fragment covered is filled
//! with a new fragment owned by the add-on subsystem.

use addendum_core::{
  Error, Result,
  annotations::{Contribution, ItemAnnotations},
  cadence::Cadence,
  rate_card::{AddonRateCard, EntitlementTemplate, RateCard},
  subscription::{ItemSpec, SubscriptionSpec},
};
use tracing::debug;
use uuid::Uuid;

/// The parts one unit of `addon` brings onto a fragment currently shaped
/// like `before`, judged against the votes already cast on it.
///
/// A part the fragment already had is claimed only while earlier add-on units
/// hold votes for it, so parts the plan defined are never the add-on's.
fn claims(
  addon: &RateCard,
  before: &RateCard,
  votes: &ItemAnnotations,
) -> Vec<Contribution> {
  let claimed = |part: Contribution, had: bool| !had || votes.votes(part) > 0;
  let mut out = Vec::new();

  if addon.price.is_some() && claimed(Contribution::Price, before.price.is_some()) {
    out.push(Contribution::Price);
  }

  let had_entitlement = before.entitlement_template.is_some();
  match &addon.entitlement_template {
    Some(EntitlementTemplate::Boolean) => {
      if claimed(Contribution::BooleanEntitlement, had_entitlement) {
        out.push(Contribution::BooleanEntitlement);
      }
    }
    Some(EntitlementTemplate::Metered {
      issue_after_reset, ..
    }) => {
      let had_allowance = matches!(
        before.entitlement_template,
        Some(EntitlementTemplate::Metered {
          issue_after_reset: Some(_),
          ..
        })
      );
      if claimed(Contribution::MeteredEntitlement, had_entitlement) {
        out.push(Contribution::MeteredEntitlement);
      } else if issue_after_reset.is_some()
        && claimed(Contribution::Allowance, had_allowance)
      {
        out.push(Contribution::Allowance);
      }
    }
    None => {}
  }

  out
}

/// Layer `units` of `addon` onto one fragment and record them against
/// `addon_id`.
pub(crate) fn extend_item(
  item: &mut ItemSpec,
  addon_id: Uuid,
  addon: &AddonRateCard,
  units: u32,
) -> Result<()> {
  for _ in 0..units {
    let claimed = claims(&addon.rate_card, &item.rate_card, &item.annotations);
    addon.apply(&mut item.rate_card)?;
    for part in claimed {
      item.annotations.add_vote(part);
    }
  }
  item.annotations.record_application(addon_id, units);
  Ok(())
}

/// A fresh fragment carrying `quantity` units of `addon` and nothing else.
fn new_addon_item(
  addon_id: Uuid,
  addon: &AddonRateCard,
  quantity: u32,
) -> Result<ItemSpec> {
  let mut bare = addon.rate_card.clone();
  bare.price = None;
  bare.entitlement_template = None;

  let mut item = ItemSpec::new(bare);
  item.annotations = ItemAnnotations::owned_by_addons();
  extend_item(&mut item, addon_id, addon, quantity)?;
  Ok(item)
}

/// Apply `quantity` units of one add-on rate card over `window`.
pub(crate) fn apply_rate_card(
  spec: &mut SubscriptionSpec,
  addon_id: Uuid,
  window: &Cadence,
  quantity: u32,
  addon: &AddonRateCard,
) -> Result<()> {
  if quantity == 0 {
    return Ok(());
  }
  let key = addon.key().to_owned();
  let window = window.as_period();

  let phase_keys: Vec<String> = spec.phases.keys().cloned().collect();
  for phase_key in phase_keys {
    let phase_cadence = spec.phase_cadence(&phase_key)?;
    let Some(in_phase) = phase_cadence.as_period().intersection(&window) else {
      continue;
    };

    let phase = spec
      .phases
      .get_mut(&phase_key)
      .ok_or_else(|| Error::PhaseNotFound(phase_key.clone()))?;
    // Work on a copy so a failure leaves the phase as it was.
    let existing = phase.items_by_key.get(&key).cloned().unwrap_or_default();

    let mut gaps = vec![in_phase];
    let mut fragments: Vec<(Cadence, ItemSpec)> = Vec::with_capacity(existing.len() + 2);

    for item in existing {
      let cadence = item.cadence(&phase_cadence)?;
      let period = cadence.as_period();
      gaps = gaps.iter().flat_map(|g| g.difference(&period)).collect();

      let Some(overlap) = period.intersection(&in_phase) else {
        fragments.push((cadence, item));
        continue;
      };

      for rest in period.difference(&in_phase) {
        let rest = Cadence::from_period(rest)?;
        let mut kept = item.clone();
        kept.set_cadence(&phase_cadence, &rest)?;
        fragments.push((rest, kept));
      }

      let overlap = Cadence::from_period(overlap)?;
      let mut extended = item;
      extended.set_cadence(&phase_cadence, &overlap)?;
      extend_item(&mut extended, addon_id, addon, quantity)?;
      debug!(phase = %phase_key, key = %key, from = %overlap.active_from, quantity, "extended item");
      fragments.push((overlap, extended));
    }

    for gap in gaps {
      let gap = Cadence::from_period(gap)?;
      let mut created = new_addon_item(addon_id, addon, quantity)?;
      created.set_cadence(&phase_cadence, &gap)?;
      debug!(phase = %phase_key, key = %key, from = %gap.active_from, quantity, "created item");
      fragments.push((gap, created));
    }

    fragments.sort_by_key(|(cadence, _)| cadence.active_from);
    phase
      .items_by_key
      .insert(key.clone(), fragments.into_iter().map(|(_, item)| item).collect());
  }

  Ok(())
}
