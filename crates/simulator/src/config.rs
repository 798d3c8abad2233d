use serde::{Deserialize, Serialize};
use tracing::warn;

use common::{Error, Result};
use features::FeatureBuilder;

/// What to do with an action outside `[min_exposure, max_exposure]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    /// Clip into range, log, and continue.
    #[default]
    Clamp,
    /// Fail the step with `Error::ActionOutOfRange`.
    Reject,
}

/// Simulation parameters from the `[env]` section of the experiment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Trading days per episode.
    pub horizon: usize,
    /// Bars of trailing history required before the anchor date.
    pub warmup: usize,
    pub min_exposure: f64,
    pub max_exposure: f64,
    pub action_mode: ActionMode,
    /// Weight of the incremental drawdown term in the reward.
    pub dd_penalty: f64,
    /// Extra weight on the drawdown term inside the earnings window.
    pub earnings_dd_multiplier: f64,
    /// Cost per unit of exposure change, in basis points.
    pub transaction_cost_bps: f64,
    pub initial_equity: f64,
    /// Accept anchors whose horizon runs past the end of the data.
    pub allow_partial_horizon: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            horizon: 252,
            warmup: 50,
            min_exposure: 0.0,
            max_exposure: 1.0,
            action_mode: ActionMode::Clamp,
            dd_penalty: 0.10,
            earnings_dd_multiplier: 3.0,
            transaction_cost_bps: 0.0,
            initial_equity: 1.0,
            allow_partial_horizon: false,
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Config(format!("env.{msg}")));
        if self.horizon == 0 {
            return fail("horizon must be positive".into());
        }
        if self.warmup < FeatureBuilder::MIN_HISTORY {
            return fail(format!(
                "warmup must be >= {} bars, got {}",
                FeatureBuilder::MIN_HISTORY,
                self.warmup
            ));
        }
        if !(self.min_exposure.is_finite() && self.max_exposure.is_finite()) {
            return fail("exposure bounds must be finite".into());
        }
        if self.min_exposure < 0.0 || self.min_exposure > self.max_exposure {
            return fail(format!(
                "exposure range [{}, {}] is not valid",
                self.min_exposure, self.max_exposure
            ));
        }
        if !(self.dd_penalty >= 0.0 && self.earnings_dd_multiplier >= 0.0) {
            return fail("dd_penalty and earnings_dd_multiplier must be >= 0".into());
        }
        if !(self.transaction_cost_bps >= 0.0) {
            return fail("transaction_cost_bps must be >= 0".into());
        }
        if !(self.initial_equity > 0.0 && self.initial_equity.is_finite()) {
            return fail("initial_equity must be positive".into());
        }
        Ok(())
    }

    /// Bring a raw policy action into the legal exposure range.
    ///
    /// Returns the exposure to apply and whether it was clamped.
    pub fn admit_action(&self, action: f64) -> Result<(f64, bool)> {
        let (min, max) = (self.min_exposure, self.max_exposure);
        if action.is_finite() && (min..=max).contains(&action) {
            return Ok((action, false));
        }
        match self.action_mode {
            ActionMode::Reject => Err(Error::ActionOutOfRange { action, min, max }),
            ActionMode::Clamp => {
                let exposure = if action.is_finite() {
                    action.clamp(min, max)
                } else {
                    min
                };
                warn!(action, exposure, "Action outside exposure range, clamped");
                Ok((exposure, true))
            }
        }
    }
}
