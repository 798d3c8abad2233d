use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use common::EpisodeResult;
use policy::{PolicyKind, PolicyRegistry};

use crate::runner::HarnessRun;

/// A baseline's terminal numbers on one episode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineOutcome {
    pub policy: String,
    #[serde(skip)]
    pub kind: PolicyKind,
    pub final_equity: f64,
    pub max_drawdown: f64,
}

/// The agent and every baseline that completed the same episode.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedEpisode {
    pub episode_id: usize,
    pub symbol: String,
    pub anchor_date: NaiveDate,
    pub agent: EpisodeResult,
    /// Agent equity, starting with the initial value.
    pub equity_curve: Vec<f64>,
    pub baselines: Vec<BaselineOutcome>,
}

impl PairedEpisode {
    pub fn baseline(&self, name: &str) -> Option<&BaselineOutcome> {
        self.baselines.iter().find(|b| b.policy == name)
    }

    /// `(agent − baseline)` terminal equity and `(baseline − agent)` max drawdown.
    pub fn delta_vs(&self, name: &str) -> Option<(f64, f64)> {
        self.baseline(name).map(|b| {
            (
                self.agent.final_equity - b.final_equity,
                b.max_drawdown - self.agent.max_drawdown,
            )
        })
    }

    pub fn best_baseline_equity(&self) -> Option<f64> {
        self.baselines
            .iter()
            .map(|b| b.final_equity)
            .max_by(f64::total_cmp)
    }
}

/// Paired means against one reference baseline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PairedDelta {
    pub n_pairs: usize,
    pub mean_delta_eq: f64,
    pub mean_dd_improve: f64,
}

impl PairedDelta {
    fn from_pairs(deltas: &[(f64, f64)]) -> Option<Self> {
        if deltas.is_empty() {
            return None;
        }
        let n = deltas.len() as f64;
        Some(Self {
            n_pairs: deltas.len(),
            mean_delta_eq: deltas.iter().map(|d| d.0).sum::<f64>() / n,
            mean_dd_improve: deltas.iter().map(|d| d.1).sum::<f64>() / n,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolComparison {
    pub symbol: String,
    /// Episodes where the agent and at least one baseline both completed.
    pub n_pairs: usize,
    pub vs_buy_hold: Option<PairedDelta>,
    pub vs_avoid: Option<PairedDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySummary {
    pub policy: String,
    pub n_episodes: usize,
    pub n_skipped: usize,
    pub mean_final_equity: Option<f64>,
    pub median_final_equity: Option<f64>,
    pub mean_max_drawdown: Option<f64>,
    pub median_max_drawdown: Option<f64>,
    pub mean_reward: Option<f64>,
}

/// Names of the policies playing each role in the comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Roles {
    pub agent: Option<String>,
    pub buy_hold: Option<String>,
    pub avoid: Option<String>,
    pub baselines: Vec<String>,
}

impl Roles {
    pub fn from_registry(registry: &PolicyRegistry) -> Self {
        let name = |kind| registry.reference(kind).map(|p| p.name().to_string());
        Self {
            agent: registry.agent().map(|p| p.name().to_string()),
            buy_hold: name(PolicyKind::BuyAndHold),
            avoid: name(PolicyKind::AvoidEarnings),
            baselines: registry.baselines().map(|p| p.name().to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub roles: Roles,
    pub pairs: Vec<PairedEpisode>,
    /// Sorted by symbol.
    pub symbols: Vec<SymbolComparison>,
    /// Registry order.
    pub policies: Vec<PolicySummary>,
}

/// Pair the agent with each baseline on identical episodes and summarise.
pub fn aggregate(run: &HarnessRun, registry: &PolicyRegistry) -> Aggregate {
    let roles = Roles::from_registry(registry);
    let policies = run.runs.iter().map(|r| summarize(&r.policy, r.results(), r.skipped().count())).collect();

    let pairs = match roles.agent.as_deref().and_then(|a| run.run(a)) {
        Some(agent_run) => {
            let mut by_episode: HashMap<usize, Vec<BaselineOutcome>> = HashMap::new();
            for name in &roles.baselines {
                let (Some(baseline_run), Some(policy)) = (run.run(name), registry.get(name)) else {
                    continue;
                };
                for result in baseline_run.results() {
                    by_episode.entry(result.episode_id).or_default().push(BaselineOutcome {
                        policy: name.clone(),
                        kind: policy.kind(),
                        final_equity: result.final_equity,
                        max_drawdown: result.max_drawdown,
                    });
                }
            }
            agent_run
                .completed()
                .filter_map(|(result, trajectory)| {
                    let baselines = by_episode.remove(&result.episode_id)?;
                    Some(PairedEpisode {
                        episode_id: result.episode_id,
                        symbol: result.symbol.clone(),
                        anchor_date: result.anchor_date,
                        agent: result.clone(),
                        equity_curve: trajectory.equity_curve(),
                        baselines,
                    })
                })
                .collect()
        }
        None => Vec::new(),
    };

    let symbols = compare_by_symbol(&pairs, &roles);
    Aggregate {
        roles,
        pairs,
        symbols,
        policies,
    }
}

fn compare_by_symbol(pairs: &[PairedEpisode], roles: &Roles) -> Vec<SymbolComparison> {
    let mut grouped: BTreeMap<&str, Vec<&PairedEpisode>> = BTreeMap::new();
    for pair in pairs {
        grouped.entry(pair.symbol.as_str()).or_default().push(pair);
    }
    let versus = |group: &[&PairedEpisode], name: Option<&str>| {
        let name = name?;
        let deltas: Vec<(f64, f64)> = group.iter().filter_map(|p| p.delta_vs(name)).collect();
        PairedDelta::from_pairs(&deltas)
    };
    grouped
        .into_iter()
        .map(|(symbol, group)| SymbolComparison {
            symbol: symbol.to_string(),
            n_pairs: group.len(),
            vs_buy_hold: versus(&group, roles.buy_hold.as_deref()),
            vs_avoid: versus(&group, roles.avoid.as_deref()),
        })
        .collect()
}

fn summarize<'a>(
    policy: &str,
    results: impl Iterator<Item = &'a EpisodeResult>,
    n_skipped: usize,
) -> PolicySummary {
    let (finals, drawdowns, rewards): (Vec<f64>, Vec<f64>, Vec<f64>) = results.fold(
        Default::default(),
        |(mut f, mut d, mut r), res| {
            f.push(res.final_equity);
            d.push(res.max_drawdown);
            r.push(res.reward_sum);
            (f, d, r)
        },
    );
    PolicySummary {
        policy: policy.to_string(),
        n_episodes: finals.len(),
        n_skipped,
        mean_final_equity: mean(&finals),
        median_final_equity: median(&finals),
        mean_max_drawdown: mean(&drawdowns),
        median_max_drawdown: median(&drawdowns),
        mean_reward: mean(&rewards),
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}
