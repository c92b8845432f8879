//! Half-open time intervals `[from, to)` with optional (infinite) bounds.
//!
//! Every gap and overlap computation in the diff engine is built from the
//! four operations here. Intervals that merely touch, like `[t0, t1)` and
//! `[t1, t2)`, do not overlap.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A half-open interval. `None` bounds are infinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
  pub from: Option<DateTime<Utc>>,
  pub to:   Option<DateTime<Utc>>,
}

// Lower bounds treat `None` as -∞, upper bounds treat `None` as +∞.

fn cmp_lower(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
  match (a, b) {
    (None, None) => Ordering::Equal,
    (None, Some(_)) => Ordering::Less,
    (Some(_), None) => Ordering::Greater,
    (Some(a), Some(b)) => a.cmp(&b),
  }
}

fn cmp_upper(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
  match (a, b) {
    (None, None) => Ordering::Equal,
    (None, Some(_)) => Ordering::Greater,
    (Some(_), None) => Ordering::Less,
    (Some(a), Some(b)) => a.cmp(&b),
  }
}

impl Period {
  pub fn new(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
  ) -> Result<Self> {
    if let (Some(f), Some(t)) = (from, to)
      && f > t
    {
      return Err(Error::invalid(format!("period ends ({t}) before it starts ({f})")));
    }
    Ok(Self { from, to })
  }

  pub fn unbounded() -> Self { Self { from: None, to: None } }

  pub fn is_empty(&self) -> bool {
    matches!((self.from, self.to), (Some(f), Some(t)) if f >= t)
  }

  pub fn contains(&self, t: DateTime<Utc>) -> bool {
    self.from.is_none_or(|f| f <= t) && self.to.is_none_or(|to| t < to)
  }

  /// The overlapping part of both periods, or `None` when they are disjoint
  /// or only touch at a boundary.
  pub fn intersection(&self, other: &Self) -> Option<Self> {
    let from = match cmp_lower(self.from, other.from) {
      Ordering::Less => other.from,
      _ => self.from,
    };
    let to = match cmp_upper(self.to, other.to) {
      Ordering::Greater => other.to,
      _ => self.to,
    };
    let out = Self { from, to };
    (!out.is_empty()).then_some(out)
  }

  pub fn overlaps(&self, other: &Self) -> bool {
    self.intersection(other).is_some()
  }

  /// True when one period ends exactly where the other begins.
  pub fn is_adjacent_to(&self, other: &Self) -> bool {
    (self.to.is_some() && self.to == other.from)
      || (other.to.is_some() && other.to == self.from)
  }

  /// The smallest period covering both. Only defined for overlapping or
  /// adjacent periods.
  pub fn union(&self, other: &Self) -> Result<Self> {
    if !self.overlaps(other) && !self.is_adjacent_to(other) {
      return Err(Error::invalid(format!(
        "cannot union disjoint periods {self} and {other}"
      )));
    }
    let from = match cmp_lower(self.from, other.from) {
      Ordering::Greater => other.from,
      _ => self.from,
    };
    let to = match cmp_upper(self.to, other.to) {
      Ordering::Less => other.to,
      _ => self.to,
    };
    Ok(Self { from, to })
  }

  /// The parts of `self` not covered by `other`, ordered by start: zero,
  /// one, or two periods.
  pub fn difference(&self, other: &Self) -> Vec<Self> {
    if !self.overlaps(other) {
      return if self.is_empty() { vec![] } else { vec![*self] };
    }

    let mut out = Vec::with_capacity(2);
    if cmp_lower(self.from, other.from) == Ordering::Less {
      out.push(Self {
        from: self.from,
        to:   other.from,
      });
    }
    if cmp_upper(other.to, self.to) == Ordering::Less {
      out.push(Self {
        from: other.to,
        to:   self.to,
      });
    }
    out
  }

  pub fn is_superset_of(&self, other: &Self) -> bool {
    cmp_lower(self.from, other.from) != Ordering::Greater
      && cmp_upper(self.to, other.to) != Ordering::Less
  }

  /// Order by start, open starts first.
  pub fn cmp_start(&self, other: &Self) -> Ordering {
    cmp_lower(self.from, other.from)
  }
}

impl std::fmt::Display for Period {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self.from {
      Some(t) => write!(f, "[{}, ", t.to_rfc3339())?,
      None => f.write_str("(-∞, ")?,
    }
    match self.to {
      Some(t) => write!(f, "{})", t.to_rfc3339()),
      None => f.write_str("∞)"),
    }
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::{TimeDelta, TimeZone};
  use proptest::prelude::*;

  use super::*;

  fn t(day: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + TimeDelta::days(day)
  }

  fn p(from: Option<i64>, to: Option<i64>) -> Period {
    Period {
      from: from.map(t),
      to:   to.map(t),
    }
  }

  #[test]
  fn touching_periods_do_not_overlap() {
    let a = p(Some(0), Some(1));
    let b = p(Some(1), Some(2));
    assert_eq!(a.intersection(&b), None);
    assert!(a.is_adjacent_to(&b));
    assert!(b.is_adjacent_to(&a));
  }

  #[test]
  fn intersection_with_open_bounds() {
    let a = p(None, Some(10));
    let b = p(Some(5), None);
    assert_eq!(a.intersection(&b), Some(p(Some(5), Some(10))));
    assert_eq!(
      Period::unbounded().intersection(&b),
      Some(b),
      "unbounded is the identity"
    );
  }

  #[test]
  fn difference_splits_into_two() {
    let a = p(Some(0), Some(10));
    let b = p(Some(3), Some(5));
    assert_eq!(a.difference(&b), vec![p(Some(0), Some(3)), p(Some(5), Some(10))]);
  }

  #[test]
  fn difference_of_covered_period_is_empty() {
    let a = p(Some(3), Some(5));
    assert!(a.difference(&p(None, None)).is_empty());
    assert!(a.difference(&a).is_empty());
  }

  #[test]
  fn difference_keeps_open_tail() {
    let a = p(Some(0), None);
    let b = p(Some(0), Some(4));
    assert_eq!(a.difference(&b), vec![p(Some(4), None)]);
  }

  #[test]
  fn union_requires_contact() {
    let a = p(Some(0), Some(1));
    let b = p(Some(1), None);
    assert_eq!(a.union(&b).unwrap(), p(Some(0), None));
    assert!(a.union(&p(Some(2), Some(3))).is_err());
  }

  #[test]
  fn superset_handles_infinity() {
    assert!(p(None, None).is_superset_of(&p(Some(1), None)));
    assert!(!p(Some(0), Some(9)).is_superset_of(&p(Some(1), None)));
    assert!(p(Some(0), Some(9)).is_superset_of(&p(Some(0), Some(9))));
  }

  #[test]
  fn contains_is_half_open() {
    let a = p(Some(0), Some(1));
    assert!(a.contains(t(0)));
    assert!(!a.contains(t(1)));
  }

  #[test]
  fn new_rejects_inverted_bounds() {
    assert!(Period::new(Some(t(2)), Some(t(1))).is_err());
    assert!(Period::new(Some(t(1)), Some(t(1))).unwrap().is_empty());
  }

  fn period() -> impl Strategy<Value = Period> {
    (
      proptest::option::of(0i64..40),
      proptest::option::of(0i64..40),
    )
      .prop_map(|(a, b)| match (a, b) {
        (Some(a), Some(b)) => p(Some(a.min(b)), Some(a.max(b))),
        (a, b) => p(a, b),
      })
  }

  proptest! {
    #[test]
    fn intersection_is_commutative(a in period(), b in period()) {
      prop_assert_eq!(a.intersection(&b), b.intersection(&a));
    }

    #[test]
    fn difference_is_disjoint_from_subtrahend(a in period(), b in period()) {
      for part in a.difference(&b) {
        prop_assert!(!part.overlaps(&b));
        prop_assert!(a.is_superset_of(&part));
        prop_assert!(!part.is_empty());
      }
    }

    #[test]
    fn difference_and_intersection_cover_the_original(
      a in period(),
      b in period(),
      instant in 0i64..40,
    ) {
      let at = t(instant);
      let covered = a.intersection(&b).is_some_and(|i| i.contains(at))
        || a.difference(&b).iter().any(|d| d.contains(at));
      prop_assert_eq!(covered, a.contains(at));
    }
  }
}
