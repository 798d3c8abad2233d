mod experiment;

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use attribution::{write_failure_summary, FailureAnalyzer, FAILURE_SUMMARY_FILE};
use common::{Config, Panel};
use harness::{
    aggregate, build_matched_episode_set, build_stratified_episode_set, export_run, split_universe,
    DateRange, Harness, RunContext,
};
use policy::PolicyRegistry;

use crate::experiment::ExperimentFile;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("invalid run configuration")?;
    let run_id = Uuid::new_v4().to_string();
    info!(run_id = %run_id, seed = cfg.seed, "EarningsEdge evaluation starting");

    let experiment = ExperimentFile::load(&cfg.experiment_config_path)?;
    info!(
        path = %cfg.experiment_config_path.display(),
        horizon = experiment.env.horizon,
        policies = experiment.policies.len(),
        "Experiment loaded"
    );

    // ── Panel ─────────────────────────────────────────────────────────────────
    let panel = Panel::from_csv(&cfg.prices_path, &cfg.earnings_path).with_context(|| {
        format!(
            "failed to load panel from '{}' and '{}'",
            cfg.prices_path.display(),
            cfg.earnings_path.display()
        )
    })?;
    if panel.is_empty() {
        bail!("panel has no symbols with usable price history");
    }
    let panel = Arc::new(panel);

    // ── Policies ──────────────────────────────────────────────────────────────
    let registry = PolicyRegistry::from_config(&experiment.policies, experiment.env.max_exposure)?;
    if registry.agent().is_none() {
        warn!("No policy marked `agent = true`; paired comparisons will be empty");
    }

    // ── Universe ──────────────────────────────────────────────────────────────
    std::fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("failed to create output dir '{}'", cfg.output_dir.display()))?;
    let symbols: Vec<String> = panel.symbols().map(str::to_string).collect();
    let universe = match cfg.test_fraction {
        Some(fraction) => {
            let split = split_universe(&symbols, fraction, cfg.seed)?;
            split.save(cfg.output_dir.join("universe_split.json"))?;
            info!(train = split.train.len(), test = split.test.len(), "Evaluating on held-out symbols");
            split.test
        }
        None => symbols,
    };

    // ── Matched episodes ──────────────────────────────────────────────────────
    let range = DateRange::new(cfg.date_start, cfg.date_end);
    let episode_set = match cfg.episodes_per_symbol {
        Some(per_symbol) => {
            build_stratified_episode_set(&panel, &experiment.env, per_symbol, &universe, range, cfg.seed)
        }
        None => build_matched_episode_set(&panel, &experiment.env, cfg.n_episodes, &universe, range, cfg.seed),
    };
    info!(
        episodes = episode_set.len(),
        symbols = episode_set.symbols().len(),
        "Episode set frozen"
    );

    // ── Evaluation ────────────────────────────────────────────────────────────
    let ctx = RunContext::new(panel, experiment.env.clone(), experiment.features.clone());
    let run = Harness::new(ctx, registry.clone())
        .with_timeout(cfg.run_timeout)
        .evaluate(&episode_set)
        .await
        .context("evaluation aborted")?;
    if run.timed_out {
        warn!(timeout_secs = cfg.run_timeout.as_secs(), "Run hit its timeout; unfinished episodes are recorded as skipped");
    }

    // ── Artifacts ─────────────────────────────────────────────────────────────
    let summary = aggregate(&run, &registry);
    export_run(&cfg.output_dir, &run_id, &run, &summary)?;

    let records = FailureAnalyzer::new(experiment.analyzer).analyze(&summary);
    write_failure_summary(&cfg.output_dir.join(FAILURE_SUMMARY_FILE), &records)?;

    info!(
        run_id = %run_id,
        output_dir = %cfg.output_dir.display(),
        episodes = episode_set.len(),
        symbols = summary.symbols.len(),
        "Evaluation complete"
    );
    Ok(())
}
