//! Purchased add-ons and the projection of their quantity history onto
//! constant-quantity instances.
//!
//! A purchase owns an append-only list of `(active_from, quantity)` samples.
//! Instances are never stored; they are recomputed from the samples and the
//! deletion timestamp on every read.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, cadence::Cadence, rate_card::AddonRateCard};

// ─── Definition ──────────────────────────────────────────────────────────────

/// Whether an add-on may be purchased more than once at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceType {
  /// Quantity is either 0 or 1.
  #[default]
  Single,
  Multiple,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Addon {
  pub key:           String,
  pub name:          String,
  #[serde(default)]
  pub instance_type: InstanceType,
  pub rate_cards:    Vec<AddonRateCard>,
}

impl Addon {
  fn check_quantity(&self, quantity: u32) -> Result<()> {
    if self.instance_type == InstanceType::Single && quantity > 1 {
      return Err(Error::invalid(format!(
        "add-on {:?} is single-instance; quantity {quantity} is not allowed",
        self.key
      )));
    }
    Ok(())
  }
}

// ─── Purchase ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonQuantitySample {
  pub active_from: DateTime<Utc>,
  pub quantity:    u32,
}

/// An add-on purchased onto one subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionAddon {
  pub id:              Uuid,
  pub subscription_id: Uuid,
  pub addon:           Addon,
  pub quantities:      Vec<AddonQuantitySample>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deleted_at:      Option<DateTime<Utc>>,
}

/// A rate card of the add-on, with the subscription items it currently
/// affects. The item list is informational and recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonRateCardRef {
  pub rate_card:         AddonRateCard,
  #[serde(default)]
  pub affected_item_ids: Vec<Uuid>,
}

/// One contiguous window of constant quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonInstance {
  pub cadence:    Cadence,
  pub quantity:   u32,
  pub rate_cards: Vec<AddonRateCardRef>,
}

impl SubscriptionAddon {
  /// Purchase `addon` with `quantity` units from `active_from`.
  pub fn purchase(
    subscription_id: Uuid,
    addon: Addon,
    active_from: DateTime<Utc>,
    quantity: u32,
  ) -> Result<Self> {
    addon.check_quantity(quantity)?;
    let out = Self {
      id: Uuid::new_v4(),
      subscription_id,
      addon,
      quantities: vec![AddonQuantitySample {
        active_from,
        quantity,
      }],
      deleted_at: None,
    };
    out.validate()?;
    Ok(out)
  }

  /// Append a quantity change effective at `at`.
  pub fn change_quantity(&mut self, at: DateTime<Utc>, quantity: u32) -> Result<()> {
    if self.deleted_at.is_some() {
      return Err(Error::invalid(format!(
        "add-on purchase {} is deleted",
        self.id
      )));
    }
    self.addon.check_quantity(quantity)?;
    if let Some(latest) = self.quantities.iter().map(|q| q.active_from).max()
      && at < latest
    {
      return Err(Error::invalid(format!(
        "quantity change at {at} precedes the latest change at {latest}"
      )));
    }
    self.quantities.push(AddonQuantitySample {
      active_from: at,
      quantity,
    });
    Ok(())
  }

  /// Mark the purchase as ending at `at`.
  pub fn delete_at(&mut self, at: DateTime<Utc>) -> Result<()> {
    if let Some(first) = self.quantities.iter().map(|q| q.active_from).min()
      && at < first
    {
      return Err(Error::invalid(format!(
        "deletion at {at} precedes the purchase at {first}"
      )));
    }
    self.deleted_at = Some(at);
    Ok(())
  }

  pub fn validate(&self) -> Result<()> {
    if self.quantities.is_empty() {
      return Err(Error::invalid(format!(
        "add-on purchase {} has no quantity history",
        self.id
      )));
    }
    for sample in &self.quantities {
      self.addon.check_quantity(sample.quantity)?;
    }
    let mut keys = BTreeSet::new();
    for rc in &self.addon.rate_cards {
      rc.rate_card.validate()?;
      if !keys.insert(rc.key()) {
        return Err(Error::invalid(format!(
          "add-on {:?} defines rate card {:?} twice",
          self.addon.key,
          rc.key()
        )));
      }
    }
    Ok(())
  }

  /// Materialise the quantity history into sorted, gap-free instances.
  ///
  /// Samples sharing an `active_from` collapse to the one appended last.
  /// Instances end at `deleted_at` when it is set; samples starting at or
  /// after it are dropped. Quantity-0 instances are kept.
  pub fn get_instances(&self) -> Vec<AddonInstance> {
    let mut samples: Vec<(usize, AddonQuantitySample)> =
      self.quantities.iter().copied().enumerate().collect();
    samples.sort_by(|(ia, a), (ib, b)| {
      a.active_from.cmp(&b.active_from).then(ia.cmp(ib))
    });

    let mut collapsed: Vec<AddonQuantitySample> = Vec::with_capacity(samples.len());
    for (_, sample) in samples {
      if let Some(deleted_at) = self.deleted_at
        && sample.active_from >= deleted_at
      {
        continue;
      }
      match collapsed.last_mut() {
        Some(last) if last.active_from == sample.active_from => *last = sample,
        _ => collapsed.push(sample),
      }
    }

    let rate_cards: Vec<AddonRateCardRef> = self
      .addon
      .rate_cards
      .iter()
      .map(|rc| AddonRateCardRef {
        rate_card:         rc.clone(),
        affected_item_ids: Vec::new(),
      })
      .collect();

    collapsed
      .iter()
      .enumerate()
      .map(|(i, sample)| {
        let active_to = collapsed
          .get(i + 1)
          .map(|next| next.active_from)
          .or(self.deleted_at);
        AddonInstance {
          cadence:    Cadence {
            active_from: sample.active_from,
            active_to,
          },
          quantity:   sample.quantity,
          rate_cards: rate_cards.clone(),
        }
      })
      .collect()
  }

  /// The quantity in effect at `t`, or 0 outside every instance.
  pub fn quantity_at(&self, t: DateTime<Utc>) -> u32 {
    self
      .get_instances()
      .iter()
      .find(|i| i.cadence.is_active_at(t))
      .map_or(0, |i| i.quantity)
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::{TimeDelta, TimeZone};
  use rust_decimal_macros::dec;

  use super::*;
  use crate::rate_card::{Price, RateCard};

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() }

  fn day(n: i64) -> DateTime<Utc> { t0() + TimeDelta::days(n) }

  fn addon(instance_type: InstanceType) -> Addon {
    Addon {
      key: "extra-seats".into(),
      name: "Extra seats".into(),
      instance_type,
      rate_cards: vec![AddonRateCard::new(
        RateCard::new("seats", "Seats").with_price(Price::flat(dec!(10))),
      )],
    }
  }

  fn purchase(samples: &[(i64, u32)]) -> SubscriptionAddon {
    SubscriptionAddon {
      id:              Uuid::new_v4(),
      subscription_id: Uuid::new_v4(),
      addon:           addon(InstanceType::Multiple),
      quantities:      samples
        .iter()
        .map(|&(d, quantity)| AddonQuantitySample {
          active_from: day(d),
          quantity,
        })
        .collect(),
      deleted_at:      None,
    }
  }

  #[test]
  fn unsorted_samples_become_contiguous_instances() {
    let instances = purchase(&[(10, 3), (0, 1), (5, 0)]).get_instances();
    let windows: Vec<_> = instances
      .iter()
      .map(|i| (i.cadence.active_from, i.cadence.active_to, i.quantity))
      .collect();
    assert_eq!(
      windows,
      vec![
        (day(0), Some(day(5)), 1),
        (day(5), Some(day(10)), 0),
        (day(10), None, 3),
      ]
    );
    assert!(instances.iter().all(|i| i.rate_cards.len() == 1));
  }

  #[test]
  fn deletion_truncates_the_final_instance() {
    let mut p = purchase(&[(0, 1), (5, 2)]);
    p.deleted_at = Some(day(8));
    let instances = p.get_instances();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[1].cadence.active_to, Some(day(8)));
  }

  #[test]
  fn deletion_drops_samples_after_it() {
    let mut p = purchase(&[(0, 1), (5, 2), (9, 4)]);
    p.deleted_at = Some(day(5));
    let instances = p.get_instances();
    assert_eq!(instances.len(), 1);
    assert_eq!(
      instances[0].cadence,
      Cadence::new(day(0), Some(day(5))).unwrap()
    );
  }

  #[test]
  fn same_instant_samples_keep_the_latest_append() {
    let instances = purchase(&[(0, 1), (3, 2), (3, 5)]).get_instances();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[1].quantity, 5);
  }

  #[test]
  fn quantity_at_reads_the_timeline() {
    let p = purchase(&[(0, 1), (5, 0), (10, 3)]);
    assert_eq!(p.quantity_at(day(-1)), 0);
    assert_eq!(p.quantity_at(day(4)), 1);
    assert_eq!(p.quantity_at(day(5)), 0);
    assert_eq!(p.quantity_at(day(100)), 3);
  }

  #[test]
  fn single_instance_addons_reject_multiple_units() {
    let err =
      SubscriptionAddon::purchase(Uuid::new_v4(), addon(InstanceType::Single), t0(), 2);
    assert!(err.is_err());

    let mut p =
      SubscriptionAddon::purchase(Uuid::new_v4(), addon(InstanceType::Single), t0(), 1)
        .unwrap();
    assert!(p.change_quantity(day(1), 3).is_err());
    p.change_quantity(day(1), 0).unwrap();
  }

  #[test]
  fn quantity_changes_are_append_only_in_time() {
    let mut p = purchase(&[(5, 1)]);
    assert!(p.change_quantity(day(4), 2).is_err());
    p.change_quantity(day(5), 2).unwrap();
    p.change_quantity(day(6), 3).unwrap();
    assert_eq!(p.quantities.len(), 3);
  }

  #[test]
  fn deleted_purchases_cannot_change() {
    let mut p = purchase(&[(0, 1)]);
    assert!(p.delete_at(day(-1)).is_err());
    p.delete_at(day(3)).unwrap();
    assert!(p.change_quantity(day(4), 2).is_err());
  }

  #[test]
  fn duplicate_rate_card_keys_are_invalid() {
    let mut p = purchase(&[(0, 1)]);
    let dup = p.addon.rate_cards[0].clone();
    p.addon.rate_cards.push(dup);
    assert!(p.validate().is_err());
  }
}
