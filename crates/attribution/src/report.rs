use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use common::Result;
use harness::write_csv;

use crate::analyzer::SymbolFailureRecord;
use crate::flags::{format_flags, parse_flags, FlagSet};

pub const FAILURE_SUMMARY_FILE: &str = "symbol_failure_summary.csv";

pub const FAILURE_SUMMARY_HEADERS: [&str; 11] = [
    "symbol",
    "n_pairs",
    "fail_rate",
    "failures",
    "reason",
    "primary_flag",
    "failure_flags",
    "mean_delta_eq_vs_buyhold",
    "mean_dd_improve_vs_buyhold",
    "mean_delta_eq_vs_avoid",
    "mean_dd_improve_vs_avoid",
];

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    symbol: &'a str,
    n_pairs: usize,
    fail_rate: f64,
    failures: usize,
    reason: Option<&'a str>,
    primary_flag: Option<&'a str>,
    failure_flags: String,
    mean_delta_eq_vs_buyhold: Option<f64>,
    mean_dd_improve_vs_buyhold: Option<f64>,
    mean_delta_eq_vs_avoid: Option<f64>,
    mean_dd_improve_vs_avoid: Option<f64>,
}

impl<'a> From<&'a SymbolFailureRecord> for CsvRow<'a> {
    fn from(r: &'a SymbolFailureRecord) -> Self {
        Self {
            symbol: &r.symbol,
            n_pairs: r.n_pairs,
            fail_rate: r.fail_rate,
            failures: r.failures,
            reason: r.reason.as_deref(),
            primary_flag: r.primary_flag.as_deref(),
            failure_flags: format_flags(&r.flags),
            mean_delta_eq_vs_buyhold: r.vs_buy_hold.map(|d| d.mean_delta_eq),
            mean_dd_improve_vs_buyhold: r.vs_buy_hold.map(|d| d.mean_dd_improve),
            mean_delta_eq_vs_avoid: r.vs_avoid.map(|d| d.mean_delta_eq),
            mean_dd_improve_vs_avoid: r.vs_avoid.map(|d| d.mean_dd_improve),
        }
    }
}

pub fn write_failure_summary(path: &Path, records: &[SymbolFailureRecord]) -> Result<()> {
    write_csv(path, &FAILURE_SUMMARY_HEADERS, records.iter().map(CsvRow::from))?;
    info!(path = %path.display(), rows = records.len(), "Failure summary written");
    Ok(())
}

/// One row of a failure summary read back from disk. Every column other than
/// `symbol` may be missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymbolFailureRow {
    pub symbol: String,
    pub n_pairs: Option<usize>,
    pub fail_rate: Option<f64>,
    pub failures: Option<usize>,
    pub reason: Option<String>,
    pub primary_flag: Option<String>,
    pub flags: FlagSet,
    pub mean_delta_eq_vs_buyhold: Option<f64>,
    pub mean_dd_improve_vs_buyhold: Option<f64>,
    pub mean_delta_eq_vs_avoid: Option<f64>,
    pub mean_dd_improve_vs_avoid: Option<f64>,
}

/// Read a failure summary, tolerating missing optional columns, the legacy
/// `flags` column name and either flag grammar. Rows without a symbol are
/// dropped. A missing `failures` count is derived from `fail_rate · n_pairs`.
pub fn read_failure_summary(path: &Path) -> Result<Vec<SymbolFailureRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let columns: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.to_ascii_lowercase(), i))
        .collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let text = |name: &str| {
            columns
                .get(name)
                .and_then(|&i| record.get(i))
                .filter(|s| !s.is_empty())
        };
        let number = |name: &str| {
            text(name)
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };
        let count = |name: &str| {
            text(name).and_then(|s| {
                s.parse::<usize>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|v| *v >= 0.0 && v.fract() == 0.0).map(|v| v as usize))
            })
        };

        let Some(symbol) = text("symbol") else {
            warn!(line = line + 2, "Failure summary row without symbol skipped");
            continue;
        };
        let n_pairs = count("n_pairs");
        let fail_rate = number("fail_rate");
        let failures = count("failures").or_else(|| match (fail_rate, n_pairs) {
            (Some(rate), Some(n)) => Some((rate * n as f64).round() as usize),
            _ => None,
        });
        let flags = text("failure_flags")
            .or_else(|| text("flags"))
            .map(parse_flags)
            .unwrap_or_default();

        rows.push(SymbolFailureRow {
            symbol: symbol.to_string(),
            n_pairs,
            fail_rate,
            failures,
            reason: text("reason").map(str::to_string),
            primary_flag: text("primary_flag").map(str::to_string),
            flags,
            mean_delta_eq_vs_buyhold: number("mean_delta_eq_vs_buyhold"),
            mean_dd_improve_vs_buyhold: number("mean_dd_improve_vs_buyhold"),
            mean_delta_eq_vs_avoid: number("mean_delta_eq_vs_avoid"),
            mean_dd_improve_vs_avoid: number("mean_dd_improve_vs_avoid"),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn empty_summary_has_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FAILURE_SUMMARY_FILE);
        write_failure_summary(&path, &[]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), FAILURE_SUMMARY_HEADERS.join(","));
        assert!(read_failure_summary(&path).unwrap().is_empty());
    }

    #[test]
    fn reads_legacy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        fs::write(
            &path,
            "symbol,n_pairs,fail_rate,flags,mean_delta_eq_vs_buyhold\n\
             AAPL,4,0.5,\"['HARD_DRAWDOWN', 'LOW_EDGE']\",-0.02\n\
             ,3,0.1,,\n\
             MSFT,2,nan,garbage flags!,\n",
        )
        .unwrap();
        let rows = read_failure_summary(&path).unwrap();
        assert_eq!(rows.len(), 2);

        let aapl = &rows[0];
        assert_eq!(aapl.failures, Some(2));
        assert_eq!(aapl.flags.len(), 2);
        assert!(aapl.flags.contains("HARD_DRAWDOWN"));
        assert_eq!(aapl.mean_delta_eq_vs_buyhold, Some(-0.02));
        assert_eq!(aapl.mean_delta_eq_vs_avoid, None);

        let msft = &rows[1];
        assert_eq!(msft.fail_rate, None);
        assert_eq!(msft.failures, None);
        assert!(msft.flags.is_empty());
    }
}
