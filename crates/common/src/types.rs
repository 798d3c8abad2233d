use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Width of the numeric observation vector handed to policies.
pub const OBS_DIM: usize = 10;

/// Stand-in distance when a symbol has no earnings event on one side.
pub const NO_EARNINGS_SENTINEL: f64 = 99_999.0;

/// Feature vector for one (symbol, date) point.
///
/// Built by `features::FeatureBuilder` from bars at or before `date` only.
/// Vector layout (see [`Observation::to_array`]):
/// `[ret_1, ret_5, ret_20, vol_10, vol_20, volume_z, days_to_earnings,
///   days_since_earnings, earnings_flag, exposure]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub ret_1: f64,
    pub ret_5: f64,
    pub ret_20: f64,
    pub vol_10: f64,
    pub vol_20: f64,
    pub volume_z: f64,
    /// Trading days until the next earnings event (0 on the event day).
    pub days_to_earnings: f64,
    /// Trading days since the previous earnings event (0 on the event day).
    pub days_since_earnings: f64,
    /// Signed trading-day distance to the nearest event: negative before, positive after.
    pub earnings_distance: f64,
    /// 1.0 inside the configured earnings window, else 0.0.
    pub earnings_flag: f64,
    /// Exposure held when the observation was taken.
    pub exposure: f64,
}

impl Observation {
    pub fn to_array(&self) -> [f64; OBS_DIM] {
        [
            self.ret_1,
            self.ret_5,
            self.ret_20,
            self.vol_10,
            self.vol_20,
            self.volume_z,
            self.days_to_earnings,
            self.days_since_earnings,
            self.earnings_flag,
            self.exposure,
        ]
    }
}

/// One simulated trading window. Immutable once drawn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Episode {
    /// Position within the frozen episode set; the pairing key across policies.
    pub id: usize,
    pub symbol: String,
    pub anchor_date: NaiveDate,
    pub horizon: usize,
    pub seed: u64,
}

impl Episode {
    /// The (symbol, anchor date) pair this episode is evaluated on.
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.symbol, self.anchor_date)
    }
}

/// Phase of the episodic environment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnvPhase {
    #[default]
    Uninitialized,
    Ready,
    Stepping,
    Terminated,
}

impl std::fmt::Display for EnvPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvPhase::Uninitialized => write!(f, "uninitialized"),
            EnvPhase::Ready => write!(f, "ready"),
            EnvPhase::Stepping => write!(f, "stepping"),
            EnvPhase::Terminated => write!(f, "terminated"),
        }
    }
}

/// Why an episode stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    HorizonReached,
    DataExhausted,
    Ruin,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::HorizonReached => write!(f, "horizon reached"),
            Termination::DataExhausted => write!(f, "data exhausted"),
            Termination::Ruin => write!(f, "equity ruined"),
        }
    }
}

/// Side information returned with every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub date: NaiveDate,
    pub step: usize,
    pub equity: f64,
    /// Current drawdown from the running equity peak, as a fraction.
    pub drawdown: f64,
    pub days_to_earnings: f64,
    /// Exposure applied on this step, after clamping.
    pub exposure: f64,
    pub asset_return: f64,
    pub portfolio_return: f64,
    pub turnover: f64,
    pub clamped: bool,
    pub termination: Option<Termination>,
}

/// Result of one `step` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStep {
    pub observation: Observation,
    pub action: f64,
    pub reward: f64,
    pub equity: f64,
    pub drawdown: f64,
}

/// Ordered record of one (episode, policy) run. Never mutated after completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub initial_equity: f64,
    pub steps: Vec<TrajectoryStep>,
}

impl Trajectory {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            initial_equity,
            steps: Vec::new(),
        }
    }

    /// Equity values including the starting point.
    pub fn equity_curve(&self) -> Vec<f64> {
        std::iter::once(self.initial_equity)
            .chain(self.steps.iter().map(|s| s.equity))
            .collect()
    }

    pub fn drawdown_curve(&self) -> Vec<f64> {
        std::iter::once(0.0)
            .chain(self.steps.iter().map(|s| s.drawdown))
            .collect()
    }

    pub fn reward_sum(&self) -> f64 {
        self.steps.iter().map(|s| s.reward).sum()
    }
}

/// Unit aggregated into summary metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub episode_id: usize,
    pub symbol: String,
    pub anchor_date: NaiveDate,
    pub policy: String,
    pub final_equity: f64,
    /// Peak-to-trough drawdown over the episode, as a positive fraction.
    pub max_drawdown: f64,
    pub reward_sum: f64,
    pub n_steps: usize,
    pub termination: Termination,
}

/// Peak-to-trough drawdown of an equity curve as a positive fraction.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let Some(&first) = equity.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut worst = 0.0_f64;
    for &value in equity {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}
