//! Observation building for the trading environment.
//!
//! Price-derived features only ever see bars at or before the observed day;
//! earnings distances come from the pre-announced calendar.

pub mod builder;
pub mod earnings;
pub mod indicators;

pub use builder::{FeatureBuilder, FeatureConfig};
pub use earnings::{EarningsCalendar, EarningsDistance};
