use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use common::{Result, Termination};

use crate::aggregate::{Aggregate, PolicySummary, SymbolComparison};
use crate::runner::{HarnessRun, PolicyRun};

pub const METRICS_FILE: &str = "metrics.json";
pub const SUMMARY_TABLE_FILE: &str = "summary_table.csv";
pub const POLICY_SUMMARY_FILE: &str = "policy_summary.csv";
pub const SKIPPED_FILE: &str = "skipped_episodes.csv";

pub const SUMMARY_TABLE_HEADERS: [&str; 8] = [
    "symbol",
    "n_pairs",
    "mean_delta_eq_vs_buyhold",
    "mean_dd_improve_vs_buyhold",
    "n_pairs_vs_buyhold",
    "mean_delta_eq_vs_avoid",
    "mean_dd_improve_vs_avoid",
    "n_pairs_vs_avoid",
];

const POLICY_SUMMARY_HEADERS: [&str; 8] = [
    "policy",
    "n_episodes",
    "n_skipped",
    "mean_final_equity",
    "median_final_equity",
    "mean_max_drawdown",
    "median_max_drawdown",
    "mean_reward",
];

const SKIPPED_HEADERS: [&str; 5] = ["episode_id", "symbol", "anchor_date", "policy", "reason"];

/// Run-level metadata read by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: String,
    pub seed: u64,
    /// Environment steps simulated across every policy.
    pub total_timesteps: usize,
    pub n_episodes: usize,
    pub primary_metric: String,
    pub constraint: String,
    pub agent: Option<String>,
    pub baselines: Vec<String>,
    pub timed_out: bool,
    pub policies: BTreeMap<String, PolicySummary>,
}

impl RunMetrics {
    pub fn new(run_id: impl Into<String>, run: &HarnessRun, aggregate: &Aggregate) -> Self {
        Self {
            run_id: run_id.into(),
            seed: run.episode_set.seed(),
            total_timesteps: run
                .runs
                .iter()
                .flat_map(|r| r.results())
                .map(|r| r.n_steps)
                .sum(),
            n_episodes: run.episode_set.len(),
            primary_metric: "final_equity".into(),
            constraint: "drawdown-aware".into(),
            agent: aggregate.roles.agent.clone(),
            baselines: aggregate.roles.baselines.clone(),
            timed_out: run.timed_out,
            policies: aggregate
                .policies
                .iter()
                .map(|p| (p.policy.clone(), p.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub symbol: String,
    pub n_pairs: usize,
    pub mean_delta_eq_vs_buyhold: Option<f64>,
    pub mean_dd_improve_vs_buyhold: Option<f64>,
    pub n_pairs_vs_buyhold: usize,
    pub mean_delta_eq_vs_avoid: Option<f64>,
    pub mean_dd_improve_vs_avoid: Option<f64>,
    pub n_pairs_vs_avoid: usize,
}

impl From<&SymbolComparison> for SummaryRow {
    fn from(c: &SymbolComparison) -> Self {
        Self {
            symbol: c.symbol.clone(),
            n_pairs: c.n_pairs,
            mean_delta_eq_vs_buyhold: c.vs_buy_hold.map(|d| d.mean_delta_eq),
            mean_dd_improve_vs_buyhold: c.vs_buy_hold.map(|d| d.mean_dd_improve),
            n_pairs_vs_buyhold: c.vs_buy_hold.map_or(0, |d| d.n_pairs),
            mean_delta_eq_vs_avoid: c.vs_avoid.map(|d| d.mean_delta_eq),
            mean_dd_improve_vs_avoid: c.vs_avoid.map(|d| d.mean_dd_improve),
            n_pairs_vs_avoid: c.vs_avoid.map_or(0, |d| d.n_pairs),
        }
    }
}

#[derive(Debug, Serialize)]
struct CurveEpisode<'a> {
    episode_id: usize,
    symbol: &'a str,
    anchor_date: NaiveDate,
    final_equity: f64,
    max_drawdown: f64,
    reward_sum: f64,
    termination: Termination,
    equity: Vec<f64>,
    drawdown: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct CurveFile<'a> {
    policy: &'a str,
    episodes: Vec<CurveEpisode<'a>>,
}

/// Write `rows` under a fixed header line. The header is written even when
/// there are no rows.
pub fn write_csv<T: Serialize>(
    path: &Path,
    headers: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary_table(path: &Path, symbols: &[SymbolComparison]) -> Result<()> {
    write_csv(path, &SUMMARY_TABLE_HEADERS, symbols.iter().map(SummaryRow::from))
}

pub fn read_summary_table(path: &Path) -> Result<Vec<SummaryRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<std::result::Result<Vec<SummaryRow>, _>>()?;
    Ok(rows)
}

pub fn write_policy_summary(path: &Path, policies: &[PolicySummary]) -> Result<()> {
    write_csv(path, &POLICY_SUMMARY_HEADERS, policies)
}

pub fn write_metrics(path: &Path, metrics: &RunMetrics) -> Result<()> {
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, metrics)?;
    Ok(())
}

/// `<policy>_curves.json`: per-episode equity and drawdown curves.
pub fn write_curves(dir: &Path, run: &PolicyRun) -> Result<PathBuf> {
    let episodes = run
        .completed()
        .map(|(result, trajectory)| CurveEpisode {
            episode_id: result.episode_id,
            symbol: &result.symbol,
            anchor_date: result.anchor_date,
            final_equity: result.final_equity,
            max_drawdown: result.max_drawdown,
            reward_sum: result.reward_sum,
            termination: result.termination,
            equity: trajectory.equity_curve(),
            drawdown: trajectory.drawdown_curve(),
        })
        .collect();
    let path = dir.join(format!("{}_curves.json", file_stem(&run.policy)));
    let file = fs::File::create(&path)?;
    serde_json::to_writer(
        file,
        &CurveFile {
            policy: &run.policy,
            episodes,
        },
    )?;
    Ok(path)
}

/// Write every harness artifact into `dir`, creating it if needed.
pub fn export_run(dir: &Path, run_id: &str, run: &HarnessRun, aggregate: &Aggregate) -> Result<()> {
    fs::create_dir_all(dir)?;

    write_metrics(&dir.join(METRICS_FILE), &RunMetrics::new(run_id, run, aggregate))?;
    write_summary_table(&dir.join(SUMMARY_TABLE_FILE), &aggregate.symbols)?;
    write_policy_summary(&dir.join(POLICY_SUMMARY_FILE), &aggregate.policies)?;
    write_csv(
        &dir.join(SKIPPED_FILE),
        &SKIPPED_HEADERS,
        run.runs.iter().flat_map(|r| r.skipped()),
    )?;
    for policy_run in &run.runs {
        write_curves(dir, policy_run)?;
    }

    info!(
        dir = %dir.display(),
        symbols = aggregate.symbols.len(),
        policies = run.runs.len(),
        "Harness artifacts written"
    );
    Ok(())
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
