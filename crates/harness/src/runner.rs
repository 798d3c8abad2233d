use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use common::{
    max_drawdown, Episode, EpisodeResult, Error, Panel, Result, Termination, Trajectory,
    TrajectoryStep,
};
use features::FeatureConfig;
use policy::{Policy, PolicyRegistry};
use simulator::{EnvConfig, EpisodeSpec, TradingEnv};

use crate::episodes::EpisodeSet;

/// Reason recorded for episodes cut off by the run-level deadline.
pub const TIMEOUT_REASON: &str = "timeout";

/// Everything a worker needs to build its own environment.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub panel: Arc<Panel>,
    pub env: EnvConfig,
    pub features: FeatureConfig,
}

impl RunContext {
    pub fn new(panel: Arc<Panel>, env: EnvConfig, features: FeatureConfig) -> Self {
        Self {
            panel,
            env,
            features,
        }
    }

    pub fn environment(&self) -> TradingEnv {
        TradingEnv::new(Arc::clone(&self.panel), self.env.clone(), self.features.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEpisode {
    pub episode_id: usize,
    pub symbol: String,
    pub anchor_date: NaiveDate,
    pub policy: String,
    pub reason: String,
}

impl SkippedEpisode {
    fn new(episode: &Episode, policy: &str, reason: impl Into<String>) -> Self {
        Self {
            episode_id: episode.id,
            symbol: episode.symbol.clone(),
            anchor_date: episode.anchor_date,
            policy: policy.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeOutcome {
    Completed {
        result: EpisodeResult,
        trajectory: Trajectory,
    },
    Skipped(SkippedEpisode),
}

/// All outcomes of one policy over an episode set, in episode order.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyRun {
    pub policy: String,
    pub outcomes: Vec<EpisodeOutcome>,
}

impl PolicyRun {
    pub fn completed(&self) -> impl Iterator<Item = (&EpisodeResult, &Trajectory)> {
        self.outcomes.iter().filter_map(|o| match o {
            EpisodeOutcome::Completed { result, trajectory } => Some((result, trajectory)),
            EpisodeOutcome::Skipped(_) => None,
        })
    }

    pub fn results(&self) -> impl Iterator<Item = &EpisodeResult> {
        self.completed().map(|(r, _)| r)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &SkippedEpisode> {
        self.outcomes.iter().filter_map(|o| match o {
            EpisodeOutcome::Skipped(s) => Some(s),
            EpisodeOutcome::Completed { .. } => None,
        })
    }
}

/// Every policy's run over one frozen episode set.
#[derive(Debug, Clone)]
pub struct HarnessRun {
    pub episode_set: EpisodeSet,
    pub runs: Vec<PolicyRun>,
    pub timed_out: bool,
}

impl HarnessRun {
    pub fn run(&self, policy: &str) -> Option<&PolicyRun> {
        self.runs.iter().find(|r| r.policy == policy)
    }
}

/// Reset `env` to `episode` and step `policy` until termination.
pub fn run_episode(
    env: &mut TradingEnv,
    policy: &dyn Policy,
    episode: &Episode,
) -> Result<(EpisodeResult, Trajectory)> {
    let never = AtomicBool::new(false);
    run_episode_until(env, policy, episode, &never)?
        .ok_or_else(|| Error::Other(format!("episode {} cancelled", episode.id)))
}

/// Like [`run_episode`], but gives up between steps once `cancel` is set.
/// Returns `None` when cancelled.
fn run_episode_until(
    env: &mut TradingEnv,
    policy: &dyn Policy,
    episode: &Episode,
    cancel: &AtomicBool,
) -> Result<Option<(EpisodeResult, Trajectory)>> {
    let mut observation = env.reset(EpisodeSpec::Explicit(episode.clone()))?;
    let mut trajectory = Trajectory::new(env.config().initial_equity);

    let termination = loop {
        if cancel.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let action = policy.act(&observation);
        let outcome = env.step(action)?;
        trajectory.steps.push(TrajectoryStep {
            observation,
            action: outcome.info.exposure,
            reward: outcome.reward,
            equity: outcome.info.equity,
            drawdown: outcome.info.drawdown,
        });
        observation = outcome.observation;
        if outcome.done {
            break outcome.info.termination.unwrap_or(Termination::HorizonReached);
        }
    };

    let result = EpisodeResult {
        episode_id: episode.id,
        symbol: episode.symbol.clone(),
        anchor_date: episode.anchor_date,
        policy: policy.name().to_string(),
        final_equity: trajectory
            .steps
            .last()
            .map_or(trajectory.initial_equity, |s| s.equity),
        max_drawdown: max_drawdown(&trajectory.equity_curve()),
        reward_sum: trajectory.reward_sum(),
        n_steps: trajectory.steps.len(),
        termination,
    };
    Ok(Some((result, trajectory)))
}

/// Run one episode, turning data problems into a skipped outcome.
/// Contract violations are returned as errors.
fn evaluate_episode(
    env: &mut TradingEnv,
    policy: &dyn Policy,
    episode: &Episode,
    cancel: &AtomicBool,
) -> Result<EpisodeOutcome> {
    match run_episode_until(env, policy, episode, cancel) {
        Ok(None) => Ok(EpisodeOutcome::Skipped(SkippedEpisode::new(
            episode,
            policy.name(),
            TIMEOUT_REASON,
        ))),
        Ok(Some((result, trajectory))) => {
            debug!(
                policy = policy.name(),
                episode = episode.id,
                final_equity = result.final_equity,
                "Episode completed"
            );
            Ok(EpisodeOutcome::Completed { result, trajectory })
        }
        Err(e) if e.is_episode_skippable() => {
            warn!(
                policy = policy.name(),
                episode = episode.id,
                symbol = %episode.symbol,
                error = %e,
                "Episode skipped"
            );
            Ok(EpisodeOutcome::Skipped(SkippedEpisode::new(
                episode,
                policy.name(),
                e.to_string(),
            )))
        }
        Err(e) => Err(e),
    }
}

/// Sequentially run `policy` over every episode in `set`.
pub fn run_policy(ctx: &RunContext, policy: &dyn Policy, set: &EpisodeSet) -> Result<PolicyRun> {
    let mut env = ctx.environment();
    let never = AtomicBool::new(false);
    let outcomes = set
        .iter()
        .map(|episode| evaluate_episode(&mut env, policy, episode, &never))
        .collect::<Result<Vec<_>>>()?;
    Ok(PolicyRun {
        policy: policy.name().to_string(),
        outcomes,
    })
}

/// Runs every registered policy over the same episode set on a blocking pool.
pub struct Harness {
    ctx: RunContext,
    registry: PolicyRegistry,
    timeout: Option<Duration>,
}

impl Harness {
    pub fn new(ctx: RunContext, registry: PolicyRegistry) -> Self {
        Self {
            ctx,
            registry,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// One task per (policy, episode), each with a private environment.
    ///
    /// On deadline every outstanding task is aborted and its episode recorded
    /// as skipped with reason `timeout`. Tasks already running on the blocking
    /// pool cannot be aborted; they see a shared cancel flag and stop before
    /// their next step. A non-skippable episode error aborts the whole run.
    pub async fn evaluate(&self, set: &EpisodeSet) -> Result<HarnessRun> {
        let policies = self.registry.policies();
        info!(
            policies = policies.len(),
            episodes = set.len(),
            timeout_secs = self.timeout.map(|t| t.as_secs()),
            "Evaluation started"
        );

        let cancel = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();
        for (p, policy) in policies.iter().enumerate() {
            for (e, episode) in set.iter().enumerate() {
                let ctx = self.ctx.clone();
                let policy = Arc::clone(policy);
                let episode = episode.clone();
                let cancel = Arc::clone(&cancel);
                tasks.spawn_blocking(move || {
                    let mut env = ctx.environment();
                    (p, e, evaluate_episode(&mut env, policy.as_ref(), &episode, &cancel))
                });
            }
        }

        let mut slots: Vec<Vec<Option<EpisodeOutcome>>> =
            vec![vec![None; set.len()]; policies.len()];
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut timed_out = false;

        loop {
            let next = match deadline {
                Some(deadline) => match timeout_at(deadline, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(outstanding = tasks.len(), "Run timeout reached, aborting outstanding episodes");
                        cancel.store(true, Ordering::Relaxed);
                        tasks.abort_all();
                        timed_out = true;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };
            let Some(joined) = next else { break };
            let (p, e, outcome) =
                joined.map_err(|err| Error::Other(format!("episode task failed: {err}")))?;
            match outcome {
                Ok(outcome) => slots[p][e] = Some(outcome),
                Err(err) => {
                    cancel.store(true, Ordering::Relaxed);
                    tasks.abort_all();
                    return Err(err);
                }
            }
        }

        let runs: Vec<PolicyRun> = policies
            .iter()
            .zip(slots)
            .map(|(policy, row)| PolicyRun {
                policy: policy.name().to_string(),
                outcomes: row
                    .into_iter()
                    .zip(set.iter())
                    .map(|(slot, episode)| {
                        slot.unwrap_or_else(|| {
                            EpisodeOutcome::Skipped(SkippedEpisode::new(
                                episode,
                                policy.name(),
                                TIMEOUT_REASON,
                            ))
                        })
                    })
                    .collect(),
            })
            .collect();

        for run in &runs {
            info!(
                policy = %run.policy,
                completed = run.completed().count(),
                skipped = run.skipped().count(),
                "Policy evaluated"
            );
        }

        Ok(HarnessRun {
            episode_set: set.clone(),
            runs,
            timed_out,
        })
    }
}
