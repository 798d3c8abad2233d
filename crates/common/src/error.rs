use chrono::NaiveDate;
use thiserror::Error;

use crate::EnvPhase;

#[derive(Debug, Error)]
pub enum Error {
    /// The (symbol, anchor date) pair cannot host a full episode.
    #[error("Invalid episode {symbol}@{anchor_date}: {reason}")]
    InvalidEpisode {
        symbol: String,
        anchor_date: NaiveDate,
        reason: String,
    },

    /// `step` called before `reset` or after the episode finished.
    #[error("Environment state error: cannot {operation} while {state}")]
    EnvironmentState {
        state: EnvPhase,
        operation: &'static str,
    },

    #[error("Action {action} outside legal exposure range [{min}, {max}]")]
    ActionOutOfRange { action: f64, min: f64, max: f64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid_episode(
        symbol: impl Into<String>,
        anchor_date: NaiveDate,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidEpisode {
            symbol: symbol.into(),
            anchor_date,
            reason: reason.into(),
        }
    }

    /// Errors the harness records as a skipped episode instead of aborting the run.
    /// A rejected action only condemns the episode it occurred in.
    pub fn is_episode_skippable(&self) -> bool {
        matches!(
            self,
            Error::InvalidEpisode { .. } | Error::ActionOutOfRange { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
