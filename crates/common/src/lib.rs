pub mod config;
pub mod error;
pub mod panel;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use panel::{Bar, Panel, SymbolSeries};
pub use types::*;
