use std::collections::BTreeMap;

use tracing::{debug, info};

use harness::{Aggregate, PairedDelta, PairedEpisode};

use crate::config::{AnalyzerConfig, FailureCriterion};
use crate::flags::{FlagSet, UNATTRIBUTED};
use crate::rules::{FlagRule, HardDrawdown, LateCrash, LowEdge};

const UNATTRIBUTED_REASON: &str = "Underperformed without a recognised failure pattern";

/// Failure statistics and flags for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolFailureRecord {
    pub symbol: String,
    /// Pairs on which the failure criterion could be evaluated.
    pub n_pairs: usize,
    pub failures: usize,
    pub fail_rate: f64,
    pub flags: FlagSet,
    pub primary_flag: Option<String>,
    pub reason: Option<String>,
    pub vs_buy_hold: Option<PairedDelta>,
    pub vs_avoid: Option<PairedDelta>,
}

/// Classifies the agent's failing episodes and rolls flags up per symbol.
pub struct FailureAnalyzer {
    config: AnalyzerConfig,
    rules: Vec<Box<dyn FlagRule>>,
}

impl FailureAnalyzer {
    /// Built-in rules in priority order: HARD_DRAWDOWN, LATE_CRASH, LOW_EDGE.
    pub fn new(config: AnalyzerConfig) -> Self {
        let rules: Vec<Box<dyn FlagRule>> = vec![
            Box::new(HardDrawdown {
                threshold: config.hard_drawdown_threshold,
            }),
            Box::new(LateCrash {
                fraction: config.late_crash_fraction,
            }),
            Box::new(LowEdge),
        ];
        Self { config, rules }
    }

    /// Append a rule with the lowest priority so far.
    pub fn with_rule(mut self, rule: Box<dyn FlagRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// `Some(true)` if the agent failed on this episode, `None` when the
    /// criterion's reference baseline did not complete it.
    pub fn is_failure(&self, episode: &PairedEpisode, buy_hold: Option<&str>) -> Option<bool> {
        let agent = episode.agent.final_equity;
        match self.config.criterion {
            FailureCriterion::BelowBuyHold => {
                let reference = episode.baseline(buy_hold?)?;
                Some(agent < reference.final_equity)
            }
            FailureCriterion::BelowBestBaseline => {
                episode.best_baseline_equity().map(|best| agent < best)
            }
        }
    }

    /// Flags raised by one episode, in priority order. Never empty.
    pub fn flag_episode(&self, episode: &PairedEpisode) -> Vec<&'static str> {
        let fired: Vec<&'static str> = self
            .rules
            .iter()
            .filter(|r| r.triggers(episode))
            .map(|r| r.flag())
            .collect();
        if fired.is_empty() {
            vec![UNATTRIBUTED]
        } else {
            fired
        }
    }

    pub fn analyze(&self, aggregate: &Aggregate) -> Vec<SymbolFailureRecord> {
        let buy_hold = aggregate.roles.buy_hold.as_deref();

        let mut by_symbol: BTreeMap<&str, Vec<&PairedEpisode>> = BTreeMap::new();
        for pair in &aggregate.pairs {
            by_symbol.entry(pair.symbol.as_str()).or_default().push(pair);
        }

        let records: Vec<SymbolFailureRecord> = aggregate
            .symbols
            .iter()
            .map(|comparison| {
                let episodes = by_symbol.remove(comparison.symbol.as_str()).unwrap_or_default();
                let mut n_pairs = 0;
                let mut failures = 0;
                let mut flags = FlagSet::new();
                let mut primary_counts: BTreeMap<&'static str, usize> = BTreeMap::new();

                for episode in episodes {
                    let Some(failed) = self.is_failure(episode, buy_hold) else {
                        continue;
                    };
                    n_pairs += 1;
                    if !failed {
                        continue;
                    }
                    failures += 1;
                    let fired = self.flag_episode(episode);
                    debug!(symbol = %episode.symbol, episode = episode.episode_id, flags = ?fired, "Failing episode");
                    *primary_counts.entry(fired[0]).or_default() += 1;
                    flags.extend(fired.into_iter().map(str::to_string));
                }

                let primary = self.most_frequent(&primary_counts);
                SymbolFailureRecord {
                    symbol: comparison.symbol.clone(),
                    n_pairs,
                    failures,
                    fail_rate: if n_pairs > 0 {
                        failures as f64 / n_pairs as f64
                    } else {
                        0.0
                    },
                    flags,
                    primary_flag: primary.map(str::to_string),
                    reason: primary.map(|flag| self.describe(flag).to_string()),
                    vs_buy_hold: comparison.vs_buy_hold,
                    vs_avoid: comparison.vs_avoid,
                }
            })
            .collect();

        info!(
            symbols = records.len(),
            failing_symbols = records.iter().filter(|r| r.failures > 0).count(),
            criterion = ?self.config.criterion,
            "Failure attribution complete"
        );
        records
    }

    /// Most frequent primary flag; ties go to the higher-priority rule.
    fn most_frequent(&self, counts: &BTreeMap<&'static str, usize>) -> Option<&'static str> {
        let max = *counts.values().max()?;
        self.priority()
            .find(|flag| counts.get(flag) == Some(&max))
    }

    fn priority(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules
            .iter()
            .map(|r| r.flag())
            .chain(std::iter::once(UNATTRIBUTED))
    }

    fn describe(&self, flag: &str) -> &'static str {
        self.rules
            .iter()
            .find(|r| r.flag() == flag)
            .map_or(UNATTRIBUTED_REASON, |r| r.description())
    }
}

impl Default for FailureAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}
