pub mod agent;
pub mod baselines;
pub mod config;
pub mod registry;

pub use agent::ExternalAgent;
pub use baselines::{Baseline, BaselineRule};
pub use config::PolicyConfig;
pub use registry::PolicyRegistry;

use common::Observation;

/// Which family a policy belongs to. Used to line up baseline comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyKind {
    /// Opaque decision function supplied from outside the core.
    External,
    BuyAndHold,
    AvoidEarnings,
    FlatExposure,
}

/// Maps an observation to an exposure action.
///
/// Implementations hold no per-episode state, so one instance can be shared
/// across concurrent episodes.
pub trait Policy: Send + Sync {
    /// Human-readable name of this policy instance; unique within a run.
    fn name(&self) -> &str;

    fn kind(&self) -> PolicyKind;

    /// Fraction of capital to allocate to the underlying for the next step.
    fn act(&self, observation: &Observation) -> f64;
}
