//! Matched-episode evaluation: every policy runs on the same frozen episode
//! set, and results are compared pairwise per episode.

pub mod aggregate;
pub mod episodes;
pub mod export;
pub mod runner;
pub mod universe;

pub use aggregate::{aggregate, Aggregate, BaselineOutcome, PairedDelta, PairedEpisode, PolicySummary, Roles, SymbolComparison};
pub use episodes::{build_matched_episode_set, build_stratified_episode_set, derive_seed, DateRange, EpisodeSet};
pub use export::{export_run, write_csv, RunMetrics};
pub use runner::{
    run_episode, run_policy, EpisodeOutcome, Harness, HarnessRun, PolicyRun, RunContext, SkippedEpisode,
    TIMEOUT_REASON,
};
pub use universe::{split_universe, UniverseSplit};
