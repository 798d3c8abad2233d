use harness::PairedEpisode;

use crate::flags::{HARD_DRAWDOWN, LATE_CRASH, LOW_EDGE};

/// A pure predicate over one paired episode.
///
/// Rules are evaluated in registration order; the first one that fires
/// becomes the episode's primary flag.
pub trait FlagRule: Send + Sync {
    fn flag(&self) -> &'static str;

    /// Short human-readable explanation used as the symbol `reason`.
    fn description(&self) -> &'static str;

    fn triggers(&self, episode: &PairedEpisode) -> bool;
}

/// Fires when equity falls to `1 − threshold` of its running peak or lower.
#[derive(Debug, Clone, Copy)]
pub struct HardDrawdown {
    pub threshold: f64,
}

impl FlagRule for HardDrawdown {
    fn flag(&self) -> &'static str {
        HARD_DRAWDOWN
    }

    fn description(&self) -> &'static str {
        "Large peak-to-trough drawdown during episode"
    }

    fn triggers(&self, episode: &PairedEpisode) -> bool {
        trough_ratio(&episode.equity_curve).is_some_and(|r| r <= 1.0 - self.threshold)
    }
}

/// Fires when the steepest one-step equity fall lands in the last
/// `ceil(n · fraction)` steps of the episode.
#[derive(Debug, Clone, Copy)]
pub struct LateCrash {
    pub fraction: f64,
}

impl FlagRule for LateCrash {
    fn flag(&self) -> &'static str {
        LATE_CRASH
    }

    fn description(&self) -> &'static str {
        "Steepest equity fall came late in the episode"
    }

    fn triggers(&self, episode: &PairedEpisode) -> bool {
        let curve = &episode.equity_curve;
        let n_steps = curve.len().saturating_sub(1);
        let Some(worst) = steepest_fall(curve) else {
            return false;
        };
        let tail = ((n_steps as f64) * self.fraction).ceil() as usize;
        worst + tail >= n_steps
    }
}

/// Fires when the agent ends below every baseline on the episode.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowEdge;

impl FlagRule for LowEdge {
    fn flag(&self) -> &'static str {
        LOW_EDGE
    }

    fn description(&self) -> &'static str {
        "No edge over any baseline on this episode"
    }

    fn triggers(&self, episode: &PairedEpisode) -> bool {
        !episode.baselines.is_empty()
            && episode
                .baselines
                .iter()
                .all(|b| episode.agent.final_equity < b.final_equity)
    }
}

/// Lowest `equity / running peak` over the curve.
pub fn trough_ratio(curve: &[f64]) -> Option<f64> {
    let mut peak = *curve.first()?;
    let mut worst: f64 = 1.0;
    for &value in curve {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.min(value / peak);
        }
    }
    Some(worst)
}

/// Zero-based step index of the most negative one-step return, if any step
/// lost equity. The earliest step wins a tie.
pub fn steepest_fall(curve: &[f64]) -> Option<usize> {
    let mut worst: Option<(usize, f64)> = None;
    for (i, pair) in curve.windows(2).enumerate() {
        let (prev, next) = (pair[0], pair[1]);
        if prev <= 0.0 || next >= prev {
            continue;
        }
        let ret = next / prev - 1.0;
        if worst.is_none_or(|(_, w)| ret < w) {
            worst = Some((i, ret));
        }
    }
    worst.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::{EpisodeResult, Termination};
    use harness::BaselineOutcome;
    use policy::PolicyKind;

    fn episode(curve: &[f64], baselines: &[f64]) -> PairedEpisode {
        let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        PairedEpisode {
            episode_id: 0,
            symbol: "T".into(),
            anchor_date: date,
            agent: EpisodeResult {
                episode_id: 0,
                symbol: "T".into(),
                anchor_date: date,
                policy: "agent".into(),
                final_equity: *curve.last().unwrap(),
                max_drawdown: common::max_drawdown(curve),
                reward_sum: 0.0,
                n_steps: curve.len() - 1,
                termination: Termination::HorizonReached,
            },
            equity_curve: curve.to_vec(),
            baselines: baselines
                .iter()
                .enumerate()
                .map(|(i, &eq)| BaselineOutcome {
                    policy: format!("b{i}"),
                    kind: PolicyKind::FlatExposure,
                    final_equity: eq,
                    max_drawdown: 0.0,
                })
                .collect(),
        }
    }

    #[test]
    fn hard_drawdown_boundary_is_inclusive() {
        let rule = HardDrawdown { threshold: 0.25 };
        assert!(rule.triggers(&episode(&[1.0, 2.0, 1.5], &[])));
        assert!(!rule.triggers(&episode(&[1.0, 2.0, 1.51], &[])));
        assert!(!rule.triggers(&episode(&[1.0, 1.1, 1.2], &[])));
    }

    #[test]
    fn late_crash_only_in_tail() {
        let rule = LateCrash { fraction: 0.2 };
        // 10 steps, tail is the last 2. Steepest fall at step index 9.
        let late = [1.0, 1.01, 1.02, 1.0, 1.03, 1.04, 1.05, 1.06, 1.07, 1.08, 0.9];
        assert!(rule.triggers(&episode(&late, &[])));
        // Steepest fall at step index 1.
        let early = [1.0, 1.01, 0.8, 0.81, 0.82, 0.83, 0.84, 0.85, 0.86, 0.85, 0.84];
        assert!(!rule.triggers(&episode(&early, &[])));
        assert!(!rule.triggers(&episode(&[1.0, 1.1, 1.2], &[])));
    }

    #[test]
    fn low_edge_needs_every_baseline_ahead() {
        let rule = LowEdge;
        assert!(rule.triggers(&episode(&[1.0, 0.9], &[0.95, 1.1])));
        assert!(!rule.triggers(&episode(&[1.0, 0.9], &[0.85, 1.1])));
        assert!(!rule.triggers(&episode(&[1.0, 0.9], &[])));
    }

    #[test]
    fn steepest_fall_prefers_earliest_tie() {
        assert_eq!(steepest_fall(&[1.0, 0.5, 1.0, 0.5]), Some(0));
        assert_eq!(steepest_fall(&[1.0, 1.0]), None);
        assert_eq!(trough_ratio(&[]), None);
    }
}
