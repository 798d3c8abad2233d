use std::collections::BTreeSet;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Disjoint train/test symbol lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseSplit {
    pub train: Vec<String>,
    pub test: Vec<String>,
}

/// Deterministically split `symbols` into train and test sets.
///
/// Symbols are trimmed, deduplicated and sorted before the seeded shuffle, so
/// the split depends only on the symbol set and the seed. The test side gets
/// `round(n * test_fraction)` symbols, at least one.
pub fn split_universe(symbols: &[String], test_fraction: f64, seed: u64) -> Result<UniverseSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(Error::Config(format!(
            "test_fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    let unique: BTreeSet<&str> = symbols
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    let mut shuffled: Vec<String> = unique.into_iter().map(str::to_string).collect();
    if shuffled.is_empty() {
        return Ok(UniverseSplit {
            train: Vec::new(),
            test: Vec::new(),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let n_test = ((shuffled.len() as f64 * test_fraction).round() as usize).max(1);
    let mut train = shuffled.split_off(n_test.min(shuffled.len()));
    let mut test = shuffled;
    train.sort();
    test.sort();
    Ok(UniverseSplit { train, test })
}

impl UniverseSplit {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
