use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;

use crate::{Error, Result};

/// Run-level settings loaded from environment variables at startup.
///
/// Simulation, policy and analyzer parameters live in the experiment TOML
/// file pointed to by `experiment_config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    // Panel inputs
    pub prices_path: PathBuf,
    pub earnings_path: PathBuf,

    // Experiment file ([env], [features], [analyzer], [[policy]])
    pub experiment_config_path: PathBuf,

    // Artifacts
    pub output_dir: PathBuf,

    // Episode sampling
    pub n_episodes: usize,
    /// When set, draw exactly this many episodes per symbol instead of `n_episodes` overall.
    pub episodes_per_symbol: Option<usize>,
    pub seed: u64,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    /// When set, evaluate only on the held-out share of the universe.
    pub test_fraction: Option<f64>,

    // Execution
    pub run_timeout: Duration,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let test_fraction = parse_optional::<f64>("TEST_FRACTION")?;
        if let Some(frac) = test_fraction {
            if !(frac > 0.0 && frac < 1.0) {
                return Err(Error::Config(format!(
                    "TEST_FRACTION must be in (0, 1), got {frac}"
                )));
            }
        }

        let n_episodes = parse_optional("N_EPISODES")?.unwrap_or(50);
        let episodes_per_symbol = parse_optional("EPISODES_PER_SYMBOL")?;
        if n_episodes == 0 && episodes_per_symbol.is_none() {
            return Err(Error::Config("N_EPISODES must be positive".into()));
        }

        let config = Config {
            prices_path: required_env("PRICES_PATH")?.into(),
            earnings_path: required_env("EARNINGS_PATH")?.into(),
            experiment_config_path: optional_env("EXPERIMENT_CONFIG_PATH")
                .unwrap_or_else(|| "config/experiment.toml".to_string())
                .into(),
            output_dir: optional_env("OUTPUT_DIR")
                .unwrap_or_else(|| "runs/latest".to_string())
                .into(),
            n_episodes,
            episodes_per_symbol,
            seed: parse_optional("SEED")?.unwrap_or(42),
            date_start: parse_optional_date("DATE_START")?,
            date_end: parse_optional_date("DATE_END")?,
            test_fraction,
            run_timeout: Duration::from_secs(parse_optional("RUN_TIMEOUT_SECS")?.unwrap_or(600)),
        };

        if let (Some(start), Some(end)) = (config.date_start, config.date_end) {
            if start > end {
                return Err(Error::Config(format!(
                    "DATE_START ({start}) is after DATE_END ({end})"
                )));
            }
        }
        Ok(config)
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    optional_env(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'")))
        })
        .transpose()
}

fn parse_optional_date(key: &str) -> Result<Option<NaiveDate>> {
    optional_env(key)
        .map(|raw| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| Error::Config(format!("{key} must be YYYY-MM-DD, got '{raw}'")))
        })
        .transpose()
}
