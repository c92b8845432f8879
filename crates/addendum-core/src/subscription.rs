//! The subscription spec: phases, and per-key lists of item fragments.
//!
//! Phase starts and item cadence overrides are stored relative to other
//! instants; everything here resolves them to absolute [`Cadence`]s.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  annotations::ItemAnnotations,
  cadence::Cadence,
  isodate::IsoDuration,
  rate_card::RateCard,
};

// ─── Items ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingBehaviorOverride {
  #[serde(default)]
  pub restart_billing_period: bool,
}

/// One time slice of a rate card inside a phase. Several fragments may share
/// a key; they are kept sorted and non-overlapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSpec {
  pub rate_card:                 RateCard,
  /// Start, relative to the phase start. `None` means the phase start.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub active_from_override:      Option<IsoDuration>,
  /// End, relative to the phase start. `None` means the phase end.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub active_to_override:        Option<IsoDuration>,
  #[serde(default)]
  pub billing_behavior_override: BillingBehaviorOverride,
  #[serde(default, skip_serializing_if = "ItemAnnotations::is_empty")]
  pub annotations:               ItemAnnotations,
}

impl ItemSpec {
  /// A fragment spanning its whole phase.
  pub fn new(rate_card: RateCard) -> Self {
    Self {
      rate_card,
      active_from_override: None,
      active_to_override: None,
      billing_behavior_override: BillingBehaviorOverride::default(),
      annotations: ItemAnnotations::default(),
    }
  }

  pub fn key(&self) -> &str { &self.rate_card.key }

  /// Resolve this fragment's absolute cadence within `phase`.
  pub fn cadence(&self, phase: &Cadence) -> Result<Cadence> {
    let resolve = |offset: &IsoDuration| {
      offset.add_to(phase.active_from).ok_or_else(|| {
        Error::invalid(format!("item offset {offset} overflows the calendar"))
      })
    };

    let from = match &self.active_from_override {
      Some(offset) => resolve(offset)?,
      None => phase.active_from,
    };
    let mut to = match &self.active_to_override {
      Some(offset) => Some(resolve(offset)?),
      None => phase.active_to,
    };
    if let (Some(phase_end), Some(end)) = (phase.active_to, to)
      && end > phase_end
    {
      to = Some(phase_end);
    }
    Cadence::new(from, to)
  }

  /// Rewrite the overrides so the fragment covers `cadence` inside `phase`.
  ///
  /// A bound that does not move keeps its override as written, so `P31D`
  /// stays `P31D` even where it resolves to the same instant as `P1M`. Moved
  /// bounds that coincide with the phase's own are stored as `None`.
  pub fn set_cadence(&mut self, phase: &Cadence, cadence: &Cadence) -> Result<()> {
    let current = self.cadence(phase).ok();

    if current.as_ref().is_none_or(|c| c.active_from != cadence.active_from) {
      self.active_from_override = if cadence.active_from == phase.active_from {
        None
      } else {
        Some(IsoDuration::between(phase.active_from, cadence.active_from)?)
      };
    }

    if current.as_ref().is_none_or(|c| c.active_to != cadence.active_to) {
      self.active_to_override = match cadence.active_to {
        to if to == phase.active_to => None,
        Some(to) => Some(IsoDuration::between(phase.active_from, to)?),
        None => {
          return Err(Error::invalid(format!(
            "item cannot outlive its phase ending at {:?}",
            phase.active_to
          )));
        }
      };
    }
    Ok(())
  }
}

// ─── Phases ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
  pub key:          String,
  pub name:         String,
  /// Offset of the phase start from the subscription start.
  pub start_after:  IsoDuration,
  #[serde(default)]
  pub items_by_key: BTreeMap<String, Vec<ItemSpec>>,
}

impl PhaseSpec {
  pub fn new(key: impl Into<String>, start_after: IsoDuration) -> Self {
    let key = key.into();
    Self {
      name: key.clone(),
      key,
      start_after,
      items_by_key: BTreeMap::new(),
    }
  }

  /// Append a whole-phase fragment for the rate card's key.
  pub fn with_item(mut self, rate_card: RateCard) -> Self {
    self
      .items_by_key
      .entry(rate_card.key.clone())
      .or_default()
      .push(ItemSpec::new(rate_card));
    self
  }
}

// ─── Spec ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
  pub active_from: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub active_to:   Option<DateTime<Utc>>,
  pub phases:      BTreeMap<String, PhaseSpec>,
}

impl SubscriptionSpec {
  pub fn new(active_from: DateTime<Utc>) -> Self {
    Self {
      active_from,
      active_to: None,
      phases: BTreeMap::new(),
    }
  }

  pub fn with_phase(mut self, phase: PhaseSpec) -> Self {
    self.phases.insert(phase.key.clone(), phase);
    self
  }

  fn phase_start(&self, phase: &PhaseSpec) -> Result<DateTime<Utc>> {
    phase
      .start_after
      .add_to(self.active_from)
      .ok_or_else(|| Error::CadenceNotFound(phase.key.clone()))
  }

  /// All phases ordered by start time, with their starts.
  pub fn phases_in_order(&self) -> Result<Vec<(DateTime<Utc>, &PhaseSpec)>> {
    let mut out = self
      .phases
      .values()
      .map(|p| Ok((self.phase_start(p)?, p)))
      .collect::<Result<Vec<_>>>()?;
    out.sort_by(|(a, pa), (b, pb)| a.cmp(b).then_with(|| pa.key.cmp(&pb.key)));
    Ok(out)
  }

  /// The phase's active window: from its start until the next phase starts
  /// or the subscription ends.
  pub fn phase_cadence(&self, phase_key: &str) -> Result<Cadence> {
    let phase = self
      .phases
      .get(phase_key)
      .ok_or_else(|| Error::PhaseNotFound(phase_key.to_owned()))?;
    let start = self.phase_start(phase)?;

    let next_start = self
      .phases_in_order()?
      .into_iter()
      .map(|(s, _)| s)
      .find(|s| *s > start);

    let end = match (next_start, self.active_to) {
      (Some(n), Some(e)) => Some(n.min(e)),
      (n, e) => n.or(e),
    };
    Cadence::new(start, end.map(|e| e.max(start)))
  }

  pub fn current_phase_at(&self, t: DateTime<Utc>) -> Option<&PhaseSpec> {
    self.phases.values().find(|p| {
      self
        .phase_cadence(&p.key)
        .is_ok_and(|c| c.is_active_at(t))
    })
  }

  /// Check structural invariants: phase starts are distinct, and per key the
  /// fragments are sorted, non-overlapping, inside their phase, and carry a
  /// rate card whose key matches the map key.
  pub fn validate(&self) -> Result<()> {
    if let Some(end) = self.active_to
      && end < self.active_from
    {
      return Err(Error::invalid("subscription ends before it starts"));
    }

    let ordered = self.phases_in_order()?;
    for pair in ordered.windows(2) {
      if pair[0].0 == pair[1].0 {
        return Err(Error::invalid(format!(
          "phases {:?} and {:?} start at the same time",
          pair[0].1.key, pair[1].1.key
        )));
      }
    }

    for (key, phase) in &self.phases {
      if *key != phase.key {
        return Err(Error::invalid(format!(
          "phase stored under {key:?} is keyed {:?}",
          phase.key
        )));
      }
      let phase_cadence = self.phase_cadence(key)?;
      let phase_period = phase_cadence.as_period();

      for (item_key, items) in &phase.items_by_key {
        if items.is_empty() {
          return Err(Error::invalid(format!(
            "phase {key:?} has an empty item list for {item_key:?}"
          )));
        }
        let mut prev: Option<Cadence> = None;
        for item in items {
          if item.key() != item_key {
            return Err(Error::invalid(format!(
              "item with rate card {:?} stored under {item_key:?}",
              item.key()
            )));
          }
          item.rate_card.validate()?;

          let cadence = item.cadence(&phase_cadence)?;
          if !phase_period.is_superset_of(&cadence.as_period()) {
            return Err(Error::invalid(format!(
              "item {item_key:?} in phase {key:?} extends outside the phase"
            )));
          }
          if let Some(prev) = prev
            && prev.active_to.is_none_or(|end| end > cadence.active_from)
          {
            return Err(Error::invalid(format!(
              "items {item_key:?} in phase {key:?} overlap or are out of order"
            )));
          }
          prev = Some(cadence);
        }
      }
    }
    Ok(())
  }
}

// ─── View ────────────────────────────────────────────────────────────────────

/// A persisted item fragment as seen by readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
  pub item_id:   Uuid,
  pub phase_key: String,
  pub item_key:  String,
  pub cadence:   Cadence,
}

/// A subscription as loaded from storage: its spec plus item identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionView {
  pub subscription_id: Uuid,
  pub spec:            SubscriptionSpec,
  pub items:           Vec<ItemView>,
}

impl SubscriptionView {
  /// Build a view over `spec`, assigning fresh ids to every fragment.
  pub fn materialize(subscription_id: Uuid, spec: SubscriptionSpec) -> Result<Self> {
    let mut items = Vec::new();
    for (_, phase) in spec.phases_in_order()? {
      let phase_cadence = spec.phase_cadence(&phase.key)?;
      for (item_key, fragments) in &phase.items_by_key {
        for fragment in fragments {
          items.push(ItemView {
            item_id:   Uuid::new_v4(),
            phase_key: phase.key.clone(),
            item_key:  item_key.clone(),
            cadence:   fragment.cadence(&phase_cadence)?,
          });
        }
      }
    }
    Ok(Self {
      subscription_id,
      spec,
      items,
    })
  }

  pub fn items_for_key<'a>(
    &'a self,
    item_key: &'a str,
  ) -> impl Iterator<Item = &'a ItemView> + 'a {
    self.items.iter().filter(move |i| i.item_key == item_key)
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
