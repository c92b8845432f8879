//! Active-time windows with an inclusive start and an exclusive, optional end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, period::Period};

/// `[active_from, active_to)`. Equal bounds mean "never active".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cadence {
  pub active_from: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub active_to:   Option<DateTime<Utc>>,
}

impl Cadence {
  pub fn new(
    active_from: DateTime<Utc>,
    active_to: Option<DateTime<Utc>>,
  ) -> Result<Self> {
    if let Some(to) = active_to
      && to < active_from
    {
      return Err(Error::invalid(format!(
        "cadence ends ({to}) before it starts ({active_from})"
      )));
    }
    Ok(Self {
      active_from,
      active_to,
    })
  }

  pub fn open_ended(active_from: DateTime<Utc>) -> Self {
    Self {
      active_from,
      active_to: None,
    }
  }

  pub fn is_active_at(&self, t: DateTime<Utc>) -> bool {
    self.active_from <= t && self.active_to.is_none_or(|to| t < to)
  }

  pub fn is_zero_length(&self) -> bool { self.active_to == Some(self.active_from) }

  pub fn as_period(&self) -> Period {
    Period {
      from: Some(self.active_from),
      to:   self.active_to,
    }
  }

  /// Convert a period back into a cadence; the period must have a start.
  pub fn from_period(period: Period) -> Result<Self> {
    let from = period
      .from
      .ok_or_else(|| Error::invalid(format!("period {period} has no start")))?;
    Self::new(from, period.to)
  }
}

impl From<Cadence> for Period {
  fn from(c: Cadence) -> Self { c.as_period() }
}
