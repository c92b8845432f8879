//! Core types for the Addendum add-on engine.
//!
//! Time algebra, rate cards, subscription specs, and purchased add-ons. This
//! crate holds values and their arithmetic only; the diff engine that edits
//! subscription specs lives in `addendum-diff`.

pub mod addon;
pub mod annotations;
pub mod cadence;
pub mod error;
pub mod isodate;
pub mod period;
pub mod rate_card;
pub mod subscription;

pub use error::{Error, ErrorKind, Result};
