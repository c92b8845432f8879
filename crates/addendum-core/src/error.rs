//! Error types for `addendum-core`.
//!
//! Every variant maps to exactly one [`ErrorKind`], so callers can classify a
//! failure with a single `match` instead of probing for concrete types.

use thiserror::Error;

/// Why an add-on rate card cannot be combined with its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incompatibility {
  /// The rate-card keys differ.
  Keys,
  /// Price types (or flat-price payment terms) differ.
  Price,
  /// Entitlement template types differ.
  Entitlement,
}

/// The discriminant of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  IncompatibleRateCard,
  PhaseNotFound,
  CadenceNotFound,
  NotImplemented,
  InvalidInput,
  Serialization,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("incompatible rate card {key:?}: {message}")]
  IncompatibleRateCard {
    key:     String,
    reason:  Incompatibility,
    message: String,
  },

  #[error("phase not found: {0}")]
  PhaseNotFound(String),

  #[error("cadence not found for phase {0}")]
  CadenceNotFound(String),

  #[error("not implemented: {0}")]
  NotImplemented(String),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::IncompatibleRateCard { .. } => ErrorKind::IncompatibleRateCard,
      Self::PhaseNotFound(_) => ErrorKind::PhaseNotFound,
      Self::CadenceNotFound(_) => ErrorKind::CadenceNotFound,
      Self::NotImplemented(_) => ErrorKind::NotImplemented,
      Self::InvalidInput(_) => ErrorKind::InvalidInput,
      Self::Serialization(_) => ErrorKind::Serialization,
    }
  }

  pub(crate) fn incompatible(
    key: &str,
    reason: Incompatibility,
    message: impl Into<String>,
  ) -> Self {
    Self::IncompatibleRateCard {
      key: key.to_owned(),
      reason,
      message: message.into(),
    }
  }

  pub(crate) fn invalid(message: impl Into<String>) -> Self {
    Self::InvalidInput(message.into())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
