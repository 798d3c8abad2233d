use common::Observation;

use crate::{Policy, PolicyKind};

/// Fixed, non-learned exposure rules.
#[derive(Debug, Clone, PartialEq)]
pub enum BaselineRule {
    /// Always fully exposed.
    BuyAndHold { max_exposure: f64 },
    /// Fully exposed except inside the closed window
    /// `[event - window_before, event + window_after]`, where exposure is zero.
    AvoidEarnings {
        max_exposure: f64,
        window_before: usize,
        window_after: usize,
    },
    /// Constant fraction of capital.
    FlatExposure { fraction: f64 },
}

/// A named baseline policy. Pure function of the observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    name: String,
    rule: BaselineRule,
}

impl Baseline {
    pub fn new(name: impl Into<String>, rule: BaselineRule) -> Self {
        Self {
            name: name.into(),
            rule,
        }
    }

    pub fn buy_and_hold(max_exposure: f64) -> Self {
        Self::new("buy_hold", BaselineRule::BuyAndHold { max_exposure })
    }

    pub fn avoid_earnings(max_exposure: f64, window: usize) -> Self {
        Self::new(
            "avoid_earnings",
            BaselineRule::AvoidEarnings {
                max_exposure,
                window_before: window,
                window_after: window,
            },
        )
    }

    pub fn flat(fraction: f64) -> Self {
        Self::new("flat", BaselineRule::FlatExposure { fraction })
    }

    pub fn rule(&self) -> &BaselineRule {
        &self.rule
    }
}

impl Policy for Baseline {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PolicyKind {
        match self.rule {
            BaselineRule::BuyAndHold { .. } => PolicyKind::BuyAndHold,
            BaselineRule::AvoidEarnings { .. } => PolicyKind::AvoidEarnings,
            BaselineRule::FlatExposure { .. } => PolicyKind::FlatExposure,
        }
    }

    fn act(&self, observation: &Observation) -> f64 {
        match self.rule {
            BaselineRule::BuyAndHold { max_exposure } => max_exposure,
            BaselineRule::AvoidEarnings {
                max_exposure,
                window_before,
                window_after,
            } => {
                // Distances come from the observation only; the panel is never consulted.
                let near_upcoming = observation.days_to_earnings <= window_before as f64;
                let near_past = observation.days_since_earnings <= window_after as f64;
                if near_upcoming || near_past {
                    0.0
                } else {
                    max_exposure
                }
            }
            BaselineRule::FlatExposure { fraction } => fraction,
        }
    }
}
