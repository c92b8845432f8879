//! Reversing one add-on instance's effect on a subscription spec.
//!
//! Only fragments carrying recorded applications of the add-on are touched,
//! so restoring onto a spec the add-on never reached changes nothing. A
//! fragment reaching past the instance window is split at the window edge and
//! only the inside is retracted. After the arithmetic is undone, inert
//! add-on-owned fragments are dropped and neighbours that became identical
//! again are fused.

use addendum_core::{
  Error, Result,
  annotations::Contribution,
  cadence::Cadence,
  rate_card::{AddonRateCard, EntitlementTemplate, Price, RateCard},
  subscription::{ItemSpec, SubscriptionSpec},
};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::zero::can_delete;

/// The parts one unit of `addon` may have voted for, in the order they are
/// withdrawn. A metered unit voted for either the whole entitlement or only
/// its allowance, never both.
fn withdrawable(addon: &RateCard) -> Vec<Contribution> {
  let mut out = Vec::new();
  if addon.price.is_some() {
    out.push(Contribution::Price);
  }
  match &addon.entitlement_template {
    Some(EntitlementTemplate::Boolean) => out.push(Contribution::BooleanEntitlement),
    Some(EntitlementTemplate::Metered {
      issue_after_reset, ..
    }) => {
      out.push(Contribution::MeteredEntitlement);
      if issue_after_reset.is_some() {
        out.push(Contribution::Allowance);
      }
    }
    None => {}
  }
  out
}

/// Drop a part no remaining add-on unit holds a vote for.
fn clear(rate_card: &mut RateCard, part: Contribution) {
  match part {
    Contribution::Price => rate_card.price = None,
    Contribution::BooleanEntitlement | Contribution::MeteredEntitlement => {
      rate_card.entitlement_template = None;
    }
    Contribution::Allowance => {
      if let Some(EntitlementTemplate::Metered {
        issue_after_reset, ..
      }) = &mut rate_card.entitlement_template
      {
        *issue_after_reset = None;
      }
    }
  }
}

/// Take `units` of `addon` back out of one fragment. Returns how many units
/// were actually recorded and therefore reversed.
pub(crate) fn retract_item(
  item: &mut ItemSpec,
  addon_id: Uuid,
  addon: &AddonRateCard,
  units: u32,
) -> Result<u32> {
  let released = item.annotations.release_applications(addon_id, units);

  // An adopted price that is not summable is withdrawn by its vote alone.
  let mut arithmetic = addon.clone();
  if !matches!(addon.rate_card.price, None | Some(Price::Flat { .. }))
    && item.annotations.votes(Contribution::Price) > 0
  {
    arithmetic.rate_card.price = None;
  }

  let parts = withdrawable(&addon.rate_card);
  for _ in 0..released {
    arithmetic.restore(&mut item.rate_card)?;

    let mut metered_withdrawn = false;
    for &part in &parts {
      if part == Contribution::Allowance && metered_withdrawn {
        continue;
      }
      if item.annotations.votes(part) == 0 {
        continue;
      }
      metered_withdrawn |= part == Contribution::MeteredEntitlement;
      if item.annotations.remove_vote(part) == 0 {
        clear(&mut item.rate_card, part);
      }
    }
  }
  Ok(released)
}

fn can_merge(left: (&Cadence, &ItemSpec), right: (&Cadence, &ItemSpec)) -> bool {
  let ((lc, l), (rc, r)) = (left, right);
  lc.active_to == Some(rc.active_from)
    && l.rate_card == r.rate_card
    && l.annotations == r.annotations
    && l.billing_behavior_override == r.billing_behavior_override
}

/// Fuse time-adjacent fragments that are identical in everything but their
/// cadence. `items` must be sorted.
///
/// The fused fragment keeps the left neighbour's start override and the right
/// neighbour's end override, so the outer bounds read exactly as before.
pub(crate) fn merge_adjacent(items: Vec<(Cadence, ItemSpec)>) -> Result<Vec<ItemSpec>> {
  let mut out: Vec<(Cadence, ItemSpec)> = Vec::with_capacity(items.len());
  for (cadence, item) in items {
    if let Some((prev_cadence, prev)) = out.last_mut()
      && can_merge((&*prev_cadence, &*prev), (&cadence, &item))
    {
      let joined =
        Cadence::from_period(prev_cadence.as_period().union(&cadence.as_period())?)?;
      prev.active_to_override = item.active_to_override;
      trace!(key = %item.key(), from = %joined.active_from, "merged fragments");
      *prev_cadence = joined;
      continue;
    }
    out.push((cadence, item));
  }
  Ok(out.into_iter().map(|(_, item)| item).collect())
}

/// Restore `quantity` units of one add-on rate card over `window`.
pub(crate) fn restore_rate_card(
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
    let phase = spec
      .phases
      .get_mut(&phase_key)
      .ok_or_else(|| Error::PhaseNotFound(phase_key.clone()))?;
    let Some(items) = phase.items_by_key.get(&key) else {
      continue;
    };

    let mut touched = false;
    let mut kept: Vec<(Cadence, ItemSpec)> = Vec::with_capacity(items.len() + 2);
    for item in items {
      let cadence = item.cadence(&phase_cadence)?;
      let period = cadence.as_period();
      let overlap = period
        .intersection(&window)
        .filter(|_| item.annotations.applications_of(addon_id) > 0);
      let Some(overlap) = overlap else {
        kept.push((cadence, item.clone()));
        continue;
      };

      touched = true;
      // Fused neighbours may reach past this instance; their outside keeps
      // the units.
      for rest in period.difference(&window) {
        let rest = Cadence::from_period(rest)?;
        let mut outside = item.clone();
        outside.set_cadence(&phase_cadence, &rest)?;
        kept.push((rest, outside));
      }

      let overlap = Cadence::from_period(overlap)?;
      let mut restored = item.clone();
      restored.set_cadence(&phase_cadence, &overlap)?;
      let released = retract_item(&mut restored, addon_id, addon, quantity)?;
      if released < quantity {
        warn!(
          phase = %phase_key,
          key = %key,
          %addon_id,
          released,
          quantity,
          "fragment carried fewer add-on units than the instance quantity"
        );
      }

      if can_delete(&restored.rate_card, &restored.annotations) {
        debug!(phase = %phase_key, key = %key, from = %overlap.active_from, "deleted item");
        continue;
      }
      debug!(phase = %phase_key, key = %key, from = %overlap.active_from, released, "restored item");
      kept.push((overlap, restored));
    }

    if !touched {
      continue;
    }

    kept.sort_by_key(|(cadence, _)| cadence.active_from);
    let merged = merge_adjacent(kept)?;
    if merged.is_empty() {
      phase.items_by_key.remove(&key);
    } else {
      phase.items_by_key.insert(key.clone(), merged);
    }
  }

  Ok(())
}
