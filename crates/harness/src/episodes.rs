use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use common::{Episode, Panel};
use simulator::{anchor_range, validate_episode, EnvConfig};

/// Inclusive bounds on anchor dates. `None` leaves that side open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

/// Frozen, ordered list of episodes shared read-only by every policy in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSet {
    seed: u64,
    episodes: Arc<[Episode]>,
}

impl EpisodeSet {
    pub fn new(seed: u64, episodes: Vec<Episode>) -> Self {
        Self {
            seed,
            episodes: episodes.into(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Episode> {
        self.episodes.iter()
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn symbols(&self) -> BTreeSet<&str> {
        self.episodes.iter().map(|e| e.symbol.as_str()).collect()
    }
}

/// Valid anchor bar indices for one symbol.
struct Stratum<'a> {
    symbol: &'a str,
    dates: Vec<NaiveDate>,
}

fn strata<'a>(
    panel: &'a Panel,
    config: &EnvConfig,
    universe: &[String],
    range: DateRange,
) -> Vec<Stratum<'a>> {
    let requested: BTreeSet<&str> = universe.iter().map(String::as_str).collect();
    let mut out = Vec::with_capacity(requested.len());
    for symbol in requested {
        let Some(series) = panel.series(symbol) else {
            warn!(symbol, "Symbol not in panel, excluded from sampling");
            continue;
        };
        let Some(anchors) = anchor_range(series, config) else {
            debug!(symbol, bars = series.len(), "Not enough history for any episode");
            continue;
        };
        let dates: Vec<NaiveDate> = anchors
            .map(|i| series.bars()[i].date)
            .filter(|&d| range.contains(d))
            .filter(|&d| validate_episode(panel, config, symbol, d, config.horizon).is_ok())
            .collect();
        if !dates.is_empty() {
            out.push(Stratum {
                symbol: series.symbol.as_str(),
                dates,
            });
        }
    }
    out
}

/// Draw `n_episodes` distinct (symbol, anchor) pairs from `universe`.
///
/// Every candidate is one the environment would accept at reset. When fewer
/// candidates exist than requested, all of them are used.
pub fn build_matched_episode_set(
    panel: &Panel,
    config: &EnvConfig,
    n_episodes: usize,
    universe: &[String],
    range: DateRange,
    seed: u64,
) -> EpisodeSet {
    let strata = strata(panel, config, universe, range);
    let total: usize = strata.iter().map(|s| s.dates.len()).sum();
    let amount = n_episodes.min(total);
    if amount < n_episodes {
        warn!(requested = n_episodes, available = total, "Fewer valid anchors than requested episodes");
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let picks = rand::seq::index::sample(&mut rng, total, amount).into_vec();

    let episodes: Vec<Episode> = picks
        .into_iter()
        .enumerate()
        .map(|(id, flat)| {
            let (symbol, anchor_date) = locate(&strata, flat);
            Episode {
                id,
                symbol: symbol.to_string(),
                anchor_date,
                horizon: config.horizon,
                seed: derive_seed(seed, id as u64),
            }
        })
        .collect();

    info!(episodes = episodes.len(), symbols = strata.len(), seed, "Matched episode set built");
    EpisodeSet::new(seed, episodes)
}

/// Draw up to `per_symbol` episodes from every symbol in `universe`, each
/// symbol from its own sub-seed so adding a symbol never reshuffles the others.
pub fn build_stratified_episode_set(
    panel: &Panel,
    config: &EnvConfig,
    per_symbol: usize,
    universe: &[String],
    range: DateRange,
    seed: u64,
) -> EpisodeSet {
    let strata = strata(panel, config, universe, range);
    let mut episodes = Vec::with_capacity(strata.len() * per_symbol);

    for stratum in &strata {
        let sub_seed = derive_seed(seed, symbol_stream(stratum.symbol));
        let mut rng = ChaCha8Rng::seed_from_u64(sub_seed);
        let amount = per_symbol.min(stratum.dates.len());
        if amount < per_symbol {
            warn!(
                symbol = stratum.symbol,
                requested = per_symbol,
                available = stratum.dates.len(),
                "Symbol has fewer valid anchors than requested"
            );
        }
        let mut picks = rand::seq::index::sample(&mut rng, stratum.dates.len(), amount).into_vec();
        picks.sort_unstable();
        for pick in picks {
            let id = episodes.len();
            episodes.push(Episode {
                id,
                symbol: stratum.symbol.to_string(),
                anchor_date: stratum.dates[pick],
                horizon: config.horizon,
                seed: derive_seed(sub_seed, pick as u64),
            });
        }
    }

    info!(episodes = episodes.len(), symbols = strata.len(), per_symbol, seed, "Stratified episode set built");
    EpisodeSet::new(seed, episodes)
}

fn locate<'a>(strata: &[Stratum<'a>], mut flat: usize) -> (&'a str, NaiveDate) {
    for stratum in strata {
        if flat < stratum.dates.len() {
            return (stratum.symbol, stratum.dates[flat]);
        }
        flat -= stratum.dates.len();
    }
    unreachable!("sample index is below the candidate count")
}

/// SplitMix64 finaliser over `seed` and a stream id.
pub fn derive_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// FNV-1a hash of a symbol, stable across platforms and releases.
fn symbol_stream(symbol: &str) -> u64 {
    symbol.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}
