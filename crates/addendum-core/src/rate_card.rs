//! Rate cards and the arithmetic that layers add-on rate cards onto them.
//!
//! [`AddonRateCard::apply`] adds one unit of an add-on's contribution to a
//! target rate card; multi-unit purchases call it once per unit.
//! [`AddonRateCard::restore`] subtracts one unit again. Restore is only a
//! partial inverse: booleans are not summable and a value adopted onto an
//! empty target comes back as zero rather than absent. The caller undoes both
//! through vote counts kept in item annotations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  error::Incompatibility,
  isodate::IsoDuration,
};

// ─── Prices ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTerm {
  InAdvance,
  InArrears,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceType {
  Flat,
  Unit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Price {
  /// A fixed amount per billing period.
  Flat {
    amount:       Decimal,
    payment_term: PaymentTerm,
  },
  /// An amount per metered unit of usage.
  Unit { amount: Decimal },
}

impl Price {
  pub fn flat(amount: Decimal) -> Self {
    Self::Flat {
      amount,
      payment_term: PaymentTerm::InAdvance,
    }
  }

  pub fn price_type(&self) -> PriceType {
    match self {
      Self::Flat { .. } => PriceType::Flat,
      Self::Unit { .. } => PriceType::Unit,
    }
  }
}

// ─── Entitlements ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementType {
  Boolean,
  Metered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntitlementTemplate {
  /// Grants access to a feature; carries no amount.
  Boolean,
  /// Grants a usage allowance that is re-issued every `usage_period`.
  Metered {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issue_after_reset: Option<Decimal>,
    usage_period:      IsoDuration,
    #[serde(default)]
    is_soft_limit:     bool,
  },
}

impl EntitlementTemplate {
  pub fn metered(issue_after_reset: Decimal, usage_period: IsoDuration) -> Self {
    Self::Metered {
      issue_after_reset: Some(issue_after_reset),
      usage_period,
      is_soft_limit: false,
    }
  }

  pub fn entitlement_type(&self) -> EntitlementType {
    match self {
      Self::Boolean => EntitlementType::Boolean,
      Self::Metered { .. } => EntitlementType::Metered,
    }
  }
}

// ─── RateCard ────────────────────────────────────────────────────────────────

/// A priced, optionally entitlement-bearing unit of a plan or add-on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateCard {
  pub key:                  String,
  pub name:                 String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub feature_key:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub billing_cadence:      Option<IsoDuration>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub price:                Option<Price>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entitlement_template: Option<EntitlementTemplate>,
}

impl RateCard {
  /// A rate card with no price, entitlement, or feature.
  pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      key:                  key.into(),
      name:                 name.into(),
      feature_key:          None,
      billing_cadence:      None,
      price:                None,
      entitlement_template: None,
    }
  }

  pub fn with_price(mut self, price: Price) -> Self {
    self.price = Some(price);
    self
  }

  pub fn with_entitlement(mut self, template: EntitlementTemplate) -> Self {
    self.entitlement_template = Some(template);
    self
  }

  pub fn with_feature(mut self, feature_key: impl Into<String>) -> Self {
    self.feature_key = Some(feature_key.into());
    self
  }

  pub fn key(&self) -> &str { &self.key }

  pub fn has_boolean_entitlement(&self) -> bool {
    matches!(self.entitlement_template, Some(EntitlementTemplate::Boolean))
  }

  pub fn validate(&self) -> Result<()> {
    if self.key.is_empty() {
      return Err(Error::invalid("rate card key must not be empty"));
    }
    if let Some(Price::Flat { amount, .. } | Price::Unit { amount }) = &self.price
      && amount.is_sign_negative()
    {
      return Err(Error::invalid(format!(
        "rate card {:?} has a negative price",
        self.key
      )));
    }
    Ok(())
  }
}

// ─── Add-on rate cards ───────────────────────────────────────────────────────

/// A rate card as defined on an add-on: its price and entitlement are the
/// contribution of one purchased unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddonRateCard {
  pub rate_card: RateCard,
}

impl AddonRateCard {
  pub fn new(rate_card: RateCard) -> Self { Self { rate_card } }

  pub fn key(&self) -> &str { &self.rate_card.key }

  /// True when the add-on contributes neither a price nor an entitlement.
  pub fn is_noop(&self) -> bool {
    self.rate_card.price.is_none() && self.rate_card.entitlement_template.is_none()
  }

  /// Check that this contribution can be layered onto `target` without
  /// mutating anything.
  pub fn check_compatible(&self, target: &RateCard) -> Result<()> {
    let own = &self.rate_card;
    if own.key != target.key {
      return Err(Error::incompatible(
        &own.key,
        Incompatibility::Keys,
        format!("target rate card has key {:?}", target.key),
      ));
    }

    if let (Some(a), Some(b)) = (&own.price, &target.price) {
      if a.price_type() != b.price_type() {
        return Err(Error::incompatible(
          &own.key,
          Incompatibility::Price,
          format!(
            "price types differ: {:?} vs {:?}",
            a.price_type(),
            b.price_type()
          ),
        ));
      }
      if let (
        Price::Flat { payment_term: ta, .. },
        Price::Flat { payment_term: tb, .. },
      ) = (a, b)
        && ta != tb
      {
        return Err(Error::incompatible(
          &own.key,
          Incompatibility::Price,
          format!("payment terms differ: {ta:?} vs {tb:?}"),
        ));
      }
    }

    if let (Some(a), Some(b)) =
      (&own.entitlement_template, &target.entitlement_template)
      && a.entitlement_type() != b.entitlement_type()
    {
      return Err(Error::incompatible(
        &own.key,
        Incompatibility::Entitlement,
        format!(
          "entitlement types differ: {:?} vs {:?}",
          a.entitlement_type(),
          b.entitlement_type()
        ),
      ));
    }

    Ok(())
  }

  /// Add one unit of this add-on's contribution to `target`.
  pub fn apply(&self, target: &mut RateCard) -> Result<()> {
    self.check_compatible(target)?;
    if self.is_noop() {
      return Ok(());
    }
    let own = &self.rate_card;

    if let Some(add) = &own.price {
      match (add, target.price.as_mut()) {
        (_, None) => target.price = Some(add.clone()),
        (Price::Flat { amount: delta, .. }, Some(Price::Flat { amount, .. })) => {
          *amount += *delta;
        }
        (_, Some(_)) => {
          return Err(Error::NotImplemented(format!(
            "extending a {:?} price on rate card {:?}",
            add.price_type(),
            own.key
          )));
        }
      }
    }

    if let Some(add) = &own.entitlement_template {
      match (add, target.entitlement_template.as_mut()) {
        (_, None) => target.entitlement_template = Some(add.clone()),
        (
          EntitlementTemplate::Metered {
            issue_after_reset: Some(delta),
            ..
          },
          Some(EntitlementTemplate::Metered {
            issue_after_reset, ..
          }),
        ) => {
          *issue_after_reset =
            Some(issue_after_reset.unwrap_or(Decimal::ZERO) + *delta);
        }
        // Booleans do not accumulate.
        _ => {}
      }
    }

    Ok(())
  }

  /// Subtract one unit of this add-on's contribution from `target`.
  ///
  /// Boolean entitlements are left in place; whether they go away is decided
  /// by the caller's vote count.
  pub fn restore(&self, target: &mut RateCard) -> Result<()> {
    self.check_compatible(target)?;
    if self.is_noop() {
      return Ok(());
    }
    let own = &self.rate_card;

    if let Some(sub) = &own.price {
      match (sub, target.price.as_mut()) {
        (Price::Flat { .. }, None) => {}
        (Price::Flat { amount: delta, .. }, Some(Price::Flat { amount, .. })) => {
          *amount -= *delta;
        }
        _ => {
          return Err(Error::NotImplemented(format!(
            "restoring a {:?} price on rate card {:?}",
            sub.price_type(),
            own.key
          )));
        }
      }
    }

    if let (
      Some(EntitlementTemplate::Metered {
        issue_after_reset: Some(delta),
        ..
      }),
      Some(EntitlementTemplate::Metered {
        issue_after_reset, ..
      }),
    ) = (&own.entitlement_template, target.entitlement_template.as_mut())
    {
      *issue_after_reset = Some(issue_after_reset.unwrap_or(Decimal::ZERO) - *delta);
    }

    Ok(())
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
