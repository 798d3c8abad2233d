pub mod analyzer;
pub mod config;
pub mod flags;
pub mod report;
pub mod rules;

pub use analyzer::{FailureAnalyzer, SymbolFailureRecord};
pub use config::{AnalyzerConfig, FailureCriterion};
pub use flags::{format_flags, parse_flags, FlagSet};
pub use report::{read_failure_summary, write_failure_summary, SymbolFailureRow, FAILURE_SUMMARY_FILE};
pub use rules::{FlagRule, HardDrawdown, LateCrash, LowEdge};
