//! Deciding whether a restored fragment may be dropped.

use addendum_core::{
  annotations::{ADDON_SUBSYSTEM, ItemAnnotations},
  rate_card::{EntitlementTemplate, Price, RateCard},
};

/// True when the rate card no longer grants or charges anything.
///
/// Boolean entitlements count as zero: their presence is tracked by the vote
/// count annotation, not by the rate card.
pub fn is_zero_by_contents(rate_card: &RateCard) -> bool {
  let price_is_zero = match &rate_card.price {
    None => true,
    Some(Price::Flat { amount, .. }) => amount.is_zero(),
    Some(Price::Unit { .. }) => false,
  };
  let entitlement_is_zero = match &rate_card.entitlement_template {
    None | Some(EntitlementTemplate::Boolean) => true,
    Some(EntitlementTemplate::Metered {
      issue_after_reset, ..
    }) => issue_after_reset.is_none_or(|v| v.is_zero()),
  };
  price_is_zero && entitlement_is_zero
}

/// A fragment may be deleted only if it is inert, was created by the add-on
/// subsystem, and no add-on still has units applied to it.
pub fn can_delete(rate_card: &RateCard, annotations: &ItemAnnotations) -> bool {
  is_zero_by_contents(rate_card)
    && annotations.has_owner(ADDON_SUBSYSTEM)
    && annotations.addon_applications.is_empty()
}
