use serde::{Deserialize, Serialize};

use common::{Bar, Error, Observation, Result, SymbolSeries};

use crate::earnings::EarningsCalendar;
use crate::indicators::returns::daily_returns;
use crate::indicators::{RollingVolatility, TrailingReturn, VolumeZScore};

/// Feature parameters from the `[features]` section of the experiment file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Trading days on either side of an event where `earnings_flag` is 1.
    pub earnings_window: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { earnings_window: 5 }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.earnings_window > 63 {
            return Err(Error::Config(format!(
                "features.earnings_window must be <= 63 trading days, got {}",
                self.earnings_window
            )));
        }
        Ok(())
    }
}

/// Derives the fixed-width observation for a (symbol, trading day) point.
///
/// Only bars at or before the requested index are handed to the indicators.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureConfig,
    ret_1: TrailingReturn,
    ret_5: TrailingReturn,
    ret_20: TrailingReturn,
    vol_10: RollingVolatility,
    vol_20: RollingVolatility,
    volume_z: VolumeZScore,
}

impl FeatureBuilder {
    /// Bars needed before the first observable day (longest return lookback).
    pub const MIN_HISTORY: usize = 20;
    /// Returns considered by the volatility and volume windows.
    const WINDOW: usize = 60;
    const VOL_MIN_SAMPLES: usize = 25;
    const VOLUME_MIN_SAMPLES: usize = 10;

    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config,
            ret_1: TrailingReturn::new(1),
            ret_5: TrailingReturn::new(5),
            ret_20: TrailingReturn::new(20),
            vol_10: RollingVolatility::new(10, Self::VOL_MIN_SAMPLES),
            vol_20: RollingVolatility::new(20, Self::VOL_MIN_SAMPLES),
            volume_z: VolumeZScore::new(Self::VOLUME_MIN_SAMPLES),
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Observation at bar `idx` of `series`, or `None` without enough history.
    pub fn observe(
        &self,
        series: &SymbolSeries,
        calendar: &EarningsCalendar,
        idx: usize,
        exposure: f64,
    ) -> Option<Observation> {
        let bars = series.bars();
        if idx < Self::MIN_HISTORY || idx >= bars.len() {
            return None;
        }
        self.observe_history(&bars[..=idx], calendar, exposure)
    }

    /// Observation for the last bar of `history`.
    fn observe_history(
        &self,
        history: &[Bar],
        calendar: &EarningsCalendar,
        exposure: f64,
    ) -> Option<Observation> {
        let idx = history.len().checked_sub(1)?;
        let lo = idx.saturating_sub(Self::WINDOW);
        let window = &history[lo..];

        let closes: Vec<f64> = window.iter().map(|b| b.adj_close).collect();
        let volumes: Vec<f64> = window.iter().map(|b| b.volume).collect();
        let returns = daily_returns(&closes);
        let distance = calendar.distance(idx);
        let window_days = self.config.earnings_window;

        Some(Observation {
            date: history[idx].date,
            ret_1: self.ret_1.compute(&closes)?,
            ret_5: self.ret_5.compute(&closes)?,
            ret_20: self.ret_20.compute(&closes)?,
            vol_10: self.vol_10.compute(&returns),
            vol_20: self.vol_20.compute(&returns),
            volume_z: self.volume_z.compute(&volumes),
            days_to_earnings: distance.days_to_feature(),
            days_since_earnings: distance.days_since_feature(),
            earnings_distance: distance.signed_nearest(),
            earnings_flag: if distance.within(window_days, window_days) {
                1.0
            } else {
                0.0
            },
            exposure,
        })
    }
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new(FeatureConfig::default())
    }
}
