//! Calendar-aware ISO-8601 durations (`P1Y2M3DT4H5M6S`).
//!
//! Phase starts and item cadence overrides are stored relative to another
//! instant, so they must survive month-length differences: `P1M` added to the
//! 31st of January lands on the last day of February, not on a fixed number
//! of seconds later.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Months, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{Error, Result};

const SECS_PER_DAY: i64 = 86_400;

/// A non-negative ISO-8601 duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IsoDuration {
  pub years:   u32,
  pub months:  u32,
  pub days:    u32,
  pub hours:   u32,
  pub minutes: u32,
  pub seconds: u32,
  pub nanos:   u32,
}

impl IsoDuration {
  pub const ZERO: Self = Self {
    years:   0,
    months:  0,
    days:    0,
    hours:   0,
    minutes: 0,
    seconds: 0,
    nanos:   0,
  };

  pub fn from_months(months: u32) -> Self {
    Self {
      years: months / 12,
      months: months % 12,
      ..Self::ZERO
    }
  }

  pub fn from_days(days: u32) -> Self { Self { days, ..Self::ZERO } }

  pub fn from_hours(hours: u32) -> Self { Self { hours, ..Self::ZERO } }

  pub fn is_zero(&self) -> bool { *self == Self::ZERO }

  fn total_months(&self) -> u32 { self.years.saturating_mul(12).saturating_add(self.months) }

  fn clock_delta(&self) -> Option<TimeDelta> {
    let secs = i64::from(self.days) * SECS_PER_DAY
      + i64::from(self.hours) * 3_600
      + i64::from(self.minutes) * 60
      + i64::from(self.seconds);
    TimeDelta::try_seconds(secs)?
      .checked_add(&TimeDelta::nanoseconds(i64::from(self.nanos)))
  }

  /// Add this duration to `t`: whole months first, then days and clock time.
  ///
  /// Returns `None` on overflow.
  pub fn add_to(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    t.checked_add_months(Months::new(self.total_months()))?
      .checked_add_signed(self.clock_delta()?)
  }

  /// The duration that takes `start` to `end`, using as many whole months as
  /// fit. `start + between(start, end) == end` always holds.
  pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
    if end < start {
      return Err(Error::invalid(format!(
        "cannot compute a duration from {start} back to {end}"
      )));
    }

    let mut months = (end.year() - start.year()) * 12
      + (end.month() as i32 - start.month() as i32);
    let mut anchor = start;
    while months > 0 {
      match start.checked_add_months(Months::new(months as u32)) {
        Some(t) if t <= end => {
          anchor = t;
          break;
        }
        _ => months -= 1,
      }
    }
    let months = months.max(0) as u32;

    let rest = end - anchor;
    let total_secs = rest.num_seconds();
    let nanos = rest.subsec_nanos() as u32;

    Ok(Self {
      days: (total_secs / SECS_PER_DAY) as u32,
      hours: ((total_secs % SECS_PER_DAY) / 3_600) as u32,
      minutes: ((total_secs % 3_600) / 60) as u32,
      seconds: (total_secs % 60) as u32,
      nanos,
      ..Self::from_months(months)
    })
  }
}

// ─── Text form ───────────────────────────────────────────────────────────────

impl fmt::Display for IsoDuration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_zero() {
      return f.write_str("PT0S");
    }
    f.write_str("P")?;
    if self.years > 0 {
      write!(f, "{}Y", self.years)?;
    }
    if self.months > 0 {
      write!(f, "{}M", self.months)?;
    }
    if self.days > 0 {
      write!(f, "{}D", self.days)?;
    }
    if self.hours == 0 && self.minutes == 0 && self.seconds == 0 && self.nanos == 0
    {
      return Ok(());
    }
    f.write_str("T")?;
    if self.hours > 0 {
      write!(f, "{}H", self.hours)?;
    }
    if self.minutes > 0 {
      write!(f, "{}M", self.minutes)?;
    }
    if self.nanos > 0 {
      let frac = format!("{:09}", self.nanos);
      write!(f, "{}.{}S", self.seconds, frac.trim_end_matches('0'))?;
    } else if self.seconds > 0 {
      write!(f, "{}S", self.seconds)?;
    }
    Ok(())
  }
}

impl FromStr for IsoDuration {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let bad = || Error::invalid(format!("malformed ISO-8601 duration: {s:?}"));

    let body = s.strip_prefix('P').ok_or_else(bad)?;
    if body.is_empty() {
      return Err(bad());
    }

    let mut out = Self::ZERO;
    let mut in_time = false;
    let mut number = String::new();
    let mut seen_component = false;

    for c in body.chars() {
      match c {
        'T' if !in_time => {
          if !number.is_empty() {
            return Err(bad());
          }
          in_time = true;
        }
        '0'..='9' | '.' => number.push(c),
        unit => {
          if number.is_empty() {
            return Err(bad());
          }
          if unit == 'S' && in_time {
            let (whole, frac) = number.split_once('.').unwrap_or((&number, ""));
            out.seconds = whole.parse().map_err(|_| bad())?;
            if !frac.is_empty() {
              if frac.len() > 9 {
                return Err(bad());
              }
              let padded = format!("{frac:0<9}");
              out.nanos = padded.parse().map_err(|_| bad())?;
            }
          } else {
            let n: u32 = number.parse().map_err(|_| bad())?;
            match (unit, in_time) {
              ('Y', false) => out.years = n,
              ('M', false) => out.months = n,
              ('W', false) => out.days += n * 7,
              ('D', false) => out.days += n,
              ('H', true) => out.hours = n,
              ('M', true) => out.minutes = n,
              _ => return Err(bad()),
            }
          }
          number.clear();
          seen_component = true;
        }
      }
    }

    if !number.is_empty() || !seen_component {
      return Err(bad());
    }
    Ok(out)
  }
}

impl Serialize for IsoDuration {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for IsoDuration {
  fn deserialize<D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
  }

  #[test]
  fn parses_and_prints_common_forms() {
    for s in ["P1M", "P1Y2M3DT4H5M6S", "PT12H", "P14D", "PT0.25S", "PT0S"] {
      let d: IsoDuration = s.parse().unwrap();
      assert_eq!(d.to_string(), s, "round trip of {s}");
    }
    let weeks: IsoDuration = "P2W".parse().unwrap();
    assert_eq!(weeks, IsoDuration::from_days(14));
  }

  #[test]
  fn rejects_malformed_input() {
    for s in ["", "P", "1M", "PT", "P1H", "PT1D", "P1.5M", "PM"] {
      assert!(s.parse::<IsoDuration>().is_err(), "{s:?} should fail");
    }
  }

  #[test]
  fn month_addition_clamps_to_month_end() {
    let jan31 = at(2025, 1, 31, 0);
    let feb = IsoDuration::from_months(1).add_to(jan31).unwrap();
    assert_eq!(feb, at(2025, 2, 28, 0));
  }

  #[test]
  fn between_prefers_whole_months() {
    let d = IsoDuration::between(at(2025, 1, 15, 0), at(2025, 3, 20, 6)).unwrap();
    assert_eq!(d.to_string(), "P2M5DT6H");
  }

  #[test]
  fn between_inverts_add_to_even_across_month_ends() {
    let start = at(2025, 1, 31, 10);
    for end in [
      at(2025, 2, 28, 9),
      at(2025, 2, 28, 10),
      at(2025, 3, 31, 10),
      at(2026, 7, 1, 0),
      start + TimeDelta::nanoseconds(1),
    ] {
      let d = IsoDuration::between(start, end).unwrap();
      assert_eq!(d.add_to(start), Some(end), "{start} + {d} != {end}");
    }
  }

  #[test]
  fn between_rejects_reversed_bounds() {
    let err = IsoDuration::between(at(2025, 2, 1, 0), at(2025, 1, 1, 0));
    assert!(err.is_err());
  }

  #[test]
  fn serde_uses_string_form() {
    let d = IsoDuration::from_months(13);
    let json = serde_json::to_string(&d).unwrap();
    assert_eq!(json, "\"P1Y1M\"");
    let back: IsoDuration = serde_json::from_str(&json).unwrap();
    assert_eq!(back, d);
  }
}
