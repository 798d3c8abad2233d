use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use common::{
    EnvPhase, Episode, Error, Observation, Panel, Result, StepInfo, StepOutcome, SymbolSeries,
    Termination,
};
use features::{EarningsCalendar, FeatureBuilder, FeatureConfig};

use crate::config::EnvConfig;

/// How `reset` chooses the episode to simulate.
#[derive(Debug, Clone)]
pub enum EpisodeSpec {
    /// Simulate exactly this episode (matched evaluation).
    Explicit(Episode),
    /// Draw a symbol and anchor from `seed`, optionally restricted to `symbols`.
    Sampled {
        seed: u64,
        symbols: Option<Vec<String>>,
    },
}

/// Anchor indices of `series` that can host a full episode under `config`.
pub fn anchor_range(series: &SymbolSeries, config: &EnvConfig) -> Option<RangeInclusive<usize>> {
    let last = series.len().checked_sub(1)?;
    let start = config.warmup;
    let end = if config.allow_partial_horizon {
        last.checked_sub(1)?
    } else {
        last.checked_sub(config.horizon)?
    };
    (start <= end).then_some(start..=end)
}

/// Check that `symbol`@`anchor_date` can host an episode of `horizon` steps.
/// Returns the anchor bar index.
pub fn validate_episode(
    panel: &Panel,
    config: &EnvConfig,
    symbol: &str,
    anchor_date: NaiveDate,
    horizon: usize,
) -> Result<usize> {
    let invalid = |reason: String| Error::invalid_episode(symbol, anchor_date, reason);

    let series = panel
        .series(symbol)
        .ok_or_else(|| invalid("symbol not in panel".into()))?;
    let idx = series
        .index_of(anchor_date)
        .ok_or_else(|| invalid("anchor date is not a trading day".into()))?;
    if idx < config.warmup {
        return Err(invalid(format!(
            "needs {} bars of trailing history, has {idx}",
            config.warmup
        )));
    }
    let forward = series.len() - 1 - idx;
    if horizon == 0 || forward == 0 || (forward < horizon && !config.allow_partial_horizon) {
        return Err(invalid(format!("needs {horizon} forward bars, has {forward}")));
    }
    let first = idx.saturating_sub(config.warmup.max(FeatureBuilder::MIN_HISTORY));
    let last = (idx + horizon).min(series.len() - 1);
    if let Some(bad) = series.bars()[first..=last].iter().find(|b| b.adj_close <= 0.0) {
        return Err(invalid(format!(
            "non-positive adjusted close on {}",
            bad.date
        )));
    }
    Ok(idx)
}

/// Per-episode mutable state. Dropped on every reset.
#[derive(Debug)]
struct ActiveEpisode {
    episode: Episode,
    calendar: EarningsCalendar,
    /// Bar index at which the episode ends.
    end: usize,
    /// Termination reported when `end` is reached.
    end_reason: Termination,
    t: usize,
    exposure: f64,
    equity: f64,
    peak: f64,
    drawdown: f64,
    steps: usize,
}

/// Episodic simulator over one (symbol, anchor date) window at a time.
///
/// `UNINITIALIZED → READY (reset) → STEPPING → TERMINATED`. `step` is a pure
/// function of the episode and the action sequence: no randomness is drawn
/// after `reset`.
///
/// Each concurrent worker owns its own `TradingEnv`; only the panel is shared.
pub struct TradingEnv {
    panel: Arc<Panel>,
    config: EnvConfig,
    features: FeatureBuilder,
    phase: EnvPhase,
    active: Option<ActiveEpisode>,
}

impl TradingEnv {
    pub fn new(panel: Arc<Panel>, config: EnvConfig, features: FeatureConfig) -> Self {
        Self {
            panel,
            config,
            features: FeatureBuilder::new(features),
            phase: EnvPhase::Uninitialized,
            active: None,
        }
    }

    pub fn phase(&self) -> EnvPhase {
        self.phase
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn episode(&self) -> Option<&Episode> {
        self.active.as_ref().map(|a| &a.episode)
    }

    /// Start a new episode and return its first observation.
    pub fn reset(&mut self, spec: EpisodeSpec) -> Result<Observation> {
        self.phase = EnvPhase::Uninitialized;
        self.active = None;

        let episode = match spec {
            EpisodeSpec::Explicit(episode) => episode,
            EpisodeSpec::Sampled { seed, symbols } => self.sample_episode(seed, symbols)?,
        };

        let panel = Arc::clone(&self.panel);
        let anchor = validate_episode(
            &panel,
            &self.config,
            &episode.symbol,
            episode.anchor_date,
            episode.horizon,
        )?;
        let series = panel.series(&episode.symbol).ok_or_else(|| {
            Error::invalid_episode(&episode.symbol, episode.anchor_date, "symbol not in panel")
        })?;

        let horizon_end = anchor + episode.horizon;
        let (end, end_reason) = if horizon_end <= series.len() - 1 {
            (horizon_end, Termination::HorizonReached)
        } else {
            (series.len() - 1, Termination::DataExhausted)
        };

        let calendar = EarningsCalendar::for_series(series);
        let observation = self
            .features
            .observe(series, &calendar, anchor, 0.0)
            .ok_or_else(|| {
                Error::invalid_episode(
                    &episode.symbol,
                    episode.anchor_date,
                    "insufficient history for features",
                )
            })?;

        debug!(
            symbol = %episode.symbol,
            anchor = %episode.anchor_date,
            horizon = episode.horizon,
            "Episode reset"
        );

        self.active = Some(ActiveEpisode {
            episode,
            calendar,
            end,
            end_reason,
            t: anchor,
            exposure: 0.0,
            equity: self.config.initial_equity,
            peak: self.config.initial_equity,
            drawdown: 0.0,
            steps: 0,
        });
        self.phase = EnvPhase::Ready;
        Ok(observation)
    }

    /// Apply `action` as the exposure for the next trading day.
    pub fn step(&mut self, action: f64) -> Result<StepOutcome> {
        if !matches!(self.phase, EnvPhase::Ready | EnvPhase::Stepping) {
            return Err(Error::EnvironmentState {
                state: self.phase,
                operation: "step",
            });
        }
        let (exposure, clamped) = self.config.admit_action(action)?;

        let panel = Arc::clone(&self.panel);
        let config = &self.config;
        let features = &self.features;
        let active = self.active.as_mut().ok_or(Error::EnvironmentState {
            state: EnvPhase::Uninitialized,
            operation: "step",
        })?;
        let series = panel.series(&active.episode.symbol).ok_or_else(|| {
            Error::Other(format!("symbol '{}' vanished from panel", active.episode.symbol))
        })?;
        let bars = series.bars();

        let t0 = active.t;
        let t1 = t0 + 1;
        let asset_return = if bars[t0].adj_close > 0.0 {
            bars[t1].adj_close / bars[t0].adj_close - 1.0
        } else {
            0.0
        };

        let turnover = (exposure - active.exposure).abs();
        let cost = config.transaction_cost_bps / 10_000.0 * turnover;
        let portfolio_return = exposure * asset_return - cost;

        let ruined = portfolio_return <= -1.0;
        let growth = if ruined { 0.0 } else { 1.0 + portfolio_return };
        active.equity *= growth;
        active.peak = active.peak.max(active.equity);
        let drawdown = if active.peak > 0.0 {
            (active.peak - active.equity) / active.peak
        } else {
            0.0
        };

        let window = features.config().earnings_window;
        let dd_weight = if active.calendar.distance(t0).within(window, window) {
            config.dd_penalty * config.earnings_dd_multiplier
        } else {
            config.dd_penalty
        };
        let log_growth = growth.max(1e-12).ln();
        let reward = log_growth - dd_weight * (drawdown - active.drawdown).max(0.0);

        active.t = t1;
        active.steps += 1;
        active.exposure = exposure;
        active.drawdown = drawdown;

        let termination = if ruined {
            Some(Termination::Ruin)
        } else if t1 >= active.end {
            Some(active.end_reason)
        } else {
            None
        };

        let observation = features
            .observe(series, &active.calendar, t1, exposure)
            .ok_or_else(|| {
                Error::invalid_episode(
                    &active.episode.symbol,
                    active.episode.anchor_date,
                    format!("no features at bar {t1}"),
                )
            })?;

        let info = StepInfo {
            date: bars[t1].date,
            step: active.steps,
            equity: active.equity,
            drawdown,
            days_to_earnings: observation.days_to_earnings,
            exposure,
            asset_return,
            portfolio_return,
            turnover,
            clamped,
            termination,
        };

        let done = termination.is_some();
        self.phase = if done {
            EnvPhase::Terminated
        } else {
            EnvPhase::Stepping
        };

        Ok(StepOutcome {
            observation,
            reward,
            done,
            info,
        })
    }

    fn sample_episode(&self, seed: u64, symbols: Option<Vec<String>>) -> Result<Episode> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let pool: Vec<String> = match symbols {
            Some(list) => list,
            None => self.panel.symbols().map(str::to_string).collect(),
        };
        let candidates: Vec<(&SymbolSeries, RangeInclusive<usize>)> = pool
            .iter()
            .filter_map(|s| self.panel.series(s))
            .filter_map(|series| anchor_range(series, &self.config).map(|r| (series, r)))
            .collect();
        if candidates.is_empty() {
            return Err(Error::Config(
                "no symbol in the pool has enough history for an episode".into(),
            ));
        }
        let (series, range) = &candidates[rng.random_range(0..candidates.len())];
        let anchor = rng.random_range(range.clone());
        Ok(Episode {
            id: 0,
            symbol: series.symbol.clone(),
            anchor_date: series.bars()[anchor].date,
            horizon: self.config.horizon,
            seed,
        })
    }
}
