//! Which persisted items an add-on purchase touches.

use std::collections::BTreeMap;

use addendum_core::{
  addon::{AddonInstance, SubscriptionAddon},
  cadence::Cadence,
  subscription::SubscriptionView,
};
use uuid::Uuid;

fn overlapping_items(view: &SubscriptionView, key: &str, window: &Cadence) -> Vec<Uuid> {
  let window = window.as_period();
  view
    .items_for_key(key)
    .filter(|item| item.cadence.as_period().overlaps(&window))
    .map(|item| item.item_id)
    .collect()
}

/// Item ids per add-on rate-card key whose cadence overlaps at least one
/// instance with a non-zero quantity. Every rate-card key of the add-on is
/// present, possibly with an empty list.
pub fn get_affected_item_ids(
  view: &SubscriptionView,
  addon: &SubscriptionAddon,
) -> BTreeMap<String, Vec<Uuid>> {
  let instances = addon.get_instances();
  addon
    .addon
    .rate_cards
    .iter()
    .map(|rc| {
      let key = rc.key();
      let mut ids: Vec<Uuid> = Vec::new();
      for instance in instances.iter().filter(|i| i.quantity > 0) {
        for id in overlapping_items(view, key, &instance.cadence) {
          if !ids.contains(&id) {
            ids.push(id);
          }
        }
      }
      (key.to_owned(), ids)
    })
    .collect()
}

/// The add-on's instances with each rate card's `affected_item_ids` filled in
/// from `view`.
pub(crate) fn instances_with_affected_items(
  view: &SubscriptionView,
  addon: &SubscriptionAddon,
) -> Vec<AddonInstance> {
  let mut instances = addon.get_instances();
  for instance in &mut instances {
    if instance.quantity == 0 {
      continue;
    }
    for rc in &mut instance.rate_cards {
      rc.affected_item_ids = overlapping_items(view, rc.rate_card.key(), &instance.cadence);
    }
  }
  instances
}
