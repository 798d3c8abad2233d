use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// What counts as a failed episode for the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureCriterion {
    /// Agent ends below buy-and-hold on the same episode.
    #[default]
    BelowBuyHold,
    /// Agent ends below the best baseline on the same episode.
    BelowBestBaseline,
}

/// `[analyzer]` section of the experiment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub criterion: FailureCriterion,
    /// Peak-to-trough drop that raises HARD_DRAWDOWN (0.20 = 20%).
    pub hard_drawdown_threshold: f64,
    /// Tail share of the episode in which the steepest fall raises LATE_CRASH.
    pub late_crash_fraction: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            criterion: FailureCriterion::BelowBuyHold,
            hard_drawdown_threshold: 0.20,
            late_crash_fraction: 0.20,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.hard_drawdown_threshold > 0.0 && self.hard_drawdown_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "analyzer.hard_drawdown_threshold must be in (0, 1], got {}",
                self.hard_drawdown_threshold
            )));
        }
        if !(self.late_crash_fraction > 0.0 && self.late_crash_fraction <= 1.0) {
            return Err(Error::Config(format!(
                "analyzer.late_crash_fraction must be in (0, 1], got {}",
                self.late_crash_fraction
            )));
        }
        Ok(())
    }
}
