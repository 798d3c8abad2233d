use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// One daily OHLCV row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Split/dividend adjusted close. All returns are computed from this column.
    pub adj_close: f64,
    pub volume: f64,
}

impl Bar {
    /// A bar where every price field equals `price`.
    pub fn flat(date: NaiveDate, price: f64, volume: f64) -> Self {
        Self {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            adj_close: price,
            volume,
        }
    }
}

/// Date-sorted bars and earnings dates for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSeries {
    pub symbol: String,
    bars: Vec<Bar>,
    earnings: Vec<NaiveDate>,
}

impl SymbolSeries {
    /// Sorts bars and earnings by date. A repeated bar date keeps the last row seen.
    pub fn new(symbol: impl Into<String>, mut bars: Vec<Bar>, mut earnings: Vec<NaiveDate>) -> Self {
        bars.reverse();
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        earnings.sort_unstable();
        earnings.dedup();
        Self {
            symbol: symbol.into(),
            bars,
            earnings,
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn earnings_dates(&self) -> &[NaiveDate] {
        &self.earnings
    }

    /// Index of the bar dated exactly `date`.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by_key(&date, |b| b.date).ok()
    }

    /// Trading-day index of every earnings event: the first bar on or after the
    /// announcement date. Events past the last bar are dropped.
    pub fn earnings_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .earnings
            .iter()
            .map(|&date| self.bars.partition_point(|b| b.date < date))
            .filter(|&idx| idx < self.bars.len())
            .collect();
        indices.dedup();
        indices
    }
}

/// Read-only per-symbol price and earnings table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    series: BTreeMap<String, SymbolSeries>,
}

impl Panel {
    pub fn from_series(series: impl IntoIterator<Item = SymbolSeries>) -> Self {
        Self {
            series: series
                .into_iter()
                .map(|s| (s.symbol.clone(), s))
                .collect(),
        }
    }

    /// Load the cleaned price table and the earnings calendar from CSV files.
    pub fn from_csv(prices_path: impl AsRef<Path>, earnings_path: impl AsRef<Path>) -> Result<Self> {
        let bars = load_prices(prices_path.as_ref())?;
        let mut earnings = load_earnings(earnings_path.as_ref())?;

        let panel = Self::from_series(bars.into_iter().map(|(symbol, bars)| {
            let dates = earnings.remove(&symbol).unwrap_or_default();
            SymbolSeries::new(symbol, bars, dates)
        }));
        if !earnings.is_empty() {
            debug!(symbols = earnings.len(), "Earnings rows without price history ignored");
        }
        info!(symbols = panel.series.len(), "Panel loaded");
        Ok(panel)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn series(&self, symbol: &str) -> Option<&SymbolSeries> {
        self.series.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

// ─── CSV loading ──────────────────────────────────────────────────────────────

fn load_prices(path: &Path) -> Result<HashMap<String, Vec<Bar>>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = HeaderIndex::new(reader.headers()?);

    let symbol_col = headers.require(&["symbol"], path)?;
    let date_col = headers.require(&["date"], path)?;
    let adj_col = headers.require(&["adj_close", "close_adjusted", "close"], path)?;
    let open_col = headers.find(&["open"]);
    let high_col = headers.find(&["high"]);
    let low_col = headers.find(&["low"]);
    let close_col = headers.find(&["close"]);
    let volume_col = headers.find(&["volume"]);

    let mut out: HashMap<String, Vec<Bar>> = HashMap::new();
    let mut dropped = 0usize;
    for row in reader.records() {
        let row = row?;
        let symbol = row.get(symbol_col).map(str::trim).unwrap_or_default();
        let date = row.get(date_col).and_then(parse_date);
        let adj = row
            .get(adj_col)
            .and_then(parse_finite)
            .filter(|v| *v > 0.0);
        let (Some(date), Some(adj_close)) = (date, adj) else {
            dropped += 1;
            continue;
        };
        if symbol.is_empty() {
            dropped += 1;
            continue;
        }
        let field = |col: Option<usize>| col.and_then(|c| row.get(c)).and_then(parse_finite);
        out.entry(symbol.to_string()).or_default().push(Bar {
            date,
            open: field(open_col).unwrap_or(adj_close),
            high: field(high_col).unwrap_or(adj_close),
            low: field(low_col).unwrap_or(adj_close),
            close: field(close_col).unwrap_or(adj_close),
            adj_close,
            volume: field(volume_col).unwrap_or(0.0),
        });
    }
    if dropped > 0 {
        warn!(rows = dropped, path = %path.display(), "Dropped unparseable price rows");
    }
    Ok(out)
}

fn load_earnings(path: &Path) -> Result<HashMap<String, Vec<NaiveDate>>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = HeaderIndex::new(reader.headers()?);

    let symbol_col = headers.require(&["symbol"], path)?;
    let date_col = headers.require(&["date", "earnings_date", "reporteddate"], path)?;

    let mut out: HashMap<String, Vec<NaiveDate>> = HashMap::new();
    for row in reader.records() {
        let row = row?;
        let symbol = row.get(symbol_col).map(str::trim).unwrap_or_default();
        let Some(date) = row.get(date_col).and_then(parse_date) else {
            continue;
        };
        if !symbol.is_empty() {
            out.entry(symbol.to_string()).or_default().push(date);
        }
    }
    Ok(out)
}

/// Case-insensitive header lookup.
struct HeaderIndex(Vec<String>);

impl HeaderIndex {
    fn new(headers: &csv::StringRecord) -> Self {
        Self(headers.iter().map(|h| h.trim().to_lowercase()).collect())
    }

    fn find(&self, names: &[&str]) -> Option<usize> {
        names
            .iter()
            .find_map(|name| self.0.iter().position(|h| h == name))
    }

    fn require(&self, names: &[&str], path: &Path) -> Result<usize> {
        self.find(names).ok_or_else(|| {
            Error::Config(format!(
                "'{}' has none of the columns {names:?} (found {:?})",
                path.display(),
                self.0
            ))
        })
    }
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
