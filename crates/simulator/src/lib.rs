pub mod config;
pub mod env;

pub use config::{ActionMode, EnvConfig};
pub use env::{anchor_range, validate_episode, EpisodeSpec, TradingEnv};
