//! Typed metadata carried on subscription item fragments.
//!
//! Persisted data stores annotations as a flat string-keyed map; the field
//! renames below keep that shape while giving the engine real types to work
//! with. Empty fields are omitted so an untouched fragment serialises to `{}`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner tag written by the add-on subsystem onto fragments it creates.
pub const ADDON_SUBSYSTEM: &str = "addons";

fn is_zero(n: &u32) -> bool { *n == 0 }

/// A part of a rate card an add-on can bring onto a fragment that did not
/// have it. Each is tracked with its own vote count so that taking the last
/// contributing unit back out removes the part again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contribution {
  Price,
  BooleanEntitlement,
  MeteredEntitlement,
  /// An `issue_after_reset` on a metered entitlement that had none.
  Allowance,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAnnotations {
  /// Subsystems that created this fragment. A fragment without the add-on tag
  /// pre-dates every add-on and is never deleted by one.
  #[serde(
    rename = "subscription.owner",
    default,
    skip_serializing_if = "BTreeSet::is_empty"
  )]
  pub owner_subsystems:          BTreeSet<String>,
  /// How many add-on units granted the boolean entitlement on this fragment.
  #[serde(
    rename = "subscription.addon.boolean_entitlement.count",
    default,
    skip_serializing_if = "is_zero"
  )]
  pub boolean_entitlement_count: u32,
  /// How many add-on units voted for a price the plan did not define.
  #[serde(
    rename = "subscription.addon.price.count",
    default,
    skip_serializing_if = "is_zero"
  )]
  pub price_count:               u32,
  #[serde(
    rename = "subscription.addon.metered_entitlement.count",
    default,
    skip_serializing_if = "is_zero"
  )]
  pub metered_entitlement_count: u32,
  #[serde(
    rename = "subscription.addon.issue_after_reset.count",
    default,
    skip_serializing_if = "is_zero"
  )]
  pub allowance_count:           u32,
  /// Keeps fragments created by distinct patches from being synced as one.
  #[serde(
    rename = "subscription.unique_patch_id",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub unique_patch_id:           Option<String>,
  /// Units applied per purchased add-on.
  #[serde(
    rename = "subscription.addon.applications",
    default,
    skip_serializing_if = "BTreeMap::is_empty"
  )]
  pub addon_applications:        BTreeMap<Uuid, u32>,
}

impl ItemAnnotations {
  /// Annotations for a fragment created by the add-on subsystem.
  pub fn owned_by_addons() -> Self {
    let mut out = Self::default();
    out.add_owner(ADDON_SUBSYSTEM);
    out.unique_patch_id = Some(Uuid::new_v4().to_string());
    out
  }

  pub fn is_empty(&self) -> bool { *self == Self::default() }

  pub fn add_owner(&mut self, subsystem: &str) {
    self.owner_subsystems.insert(subsystem.to_owned());
  }

  pub fn has_owner(&self, subsystem: &str) -> bool {
    self.owner_subsystems.contains(subsystem)
  }

  pub fn remove_owner(&mut self, subsystem: &str) {
    self.owner_subsystems.remove(subsystem);
  }

  pub fn applications_of(&self, addon_id: Uuid) -> u32 {
    self.addon_applications.get(&addon_id).copied().unwrap_or(0)
  }

  pub fn record_application(&mut self, addon_id: Uuid, units: u32) {
    if units == 0 {
      return;
    }
    *self.addon_applications.entry(addon_id).or_insert(0) += units;
  }

  /// Release up to `units` recorded applications of `addon_id`, returning how
  /// many were actually released.
  pub fn release_applications(&mut self, addon_id: Uuid, units: u32) -> u32 {
    let Some(recorded) = self.addon_applications.get_mut(&addon_id) else {
      return 0;
    };
    let released = units.min(*recorded);
    *recorded -= released;
    if *recorded == 0 {
      self.addon_applications.remove(&addon_id);
    }
    released
  }

  fn votes_mut(&mut self, part: Contribution) -> &mut u32 {
    match part {
      Contribution::Price => &mut self.price_count,
      Contribution::BooleanEntitlement => &mut self.boolean_entitlement_count,
      Contribution::MeteredEntitlement => &mut self.metered_entitlement_count,
      Contribution::Allowance => &mut self.allowance_count,
    }
  }

  /// How many applied add-on units brought `part` onto this fragment.
  pub fn votes(&self, part: Contribution) -> u32 {
    match part {
      Contribution::Price => self.price_count,
      Contribution::BooleanEntitlement => self.boolean_entitlement_count,
      Contribution::MeteredEntitlement => self.metered_entitlement_count,
      Contribution::Allowance => self.allowance_count,
    }
  }

  pub fn add_vote(&mut self, part: Contribution) { *self.votes_mut(part) += 1; }

  /// Withdraw one vote for `part`, returning what remains.
  pub fn remove_vote(&mut self, part: Contribution) -> u32 {
    let votes = self.votes_mut(part);
    *votes = votes.saturating_sub(1);
    *votes
  }
}
