use common::{SymbolSeries, NO_EARNINGS_SENTINEL};

/// Distances from one trading day to the surrounding earnings events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarningsDistance {
    /// Trading days until the next event, `None` if there is none.
    pub days_to: Option<usize>,
    /// Trading days since the previous event, `None` if there is none.
    pub days_since: Option<usize>,
}

impl EarningsDistance {
    pub fn days_to_feature(&self) -> f64 {
        self.days_to.map_or(NO_EARNINGS_SENTINEL, |d| d as f64)
    }

    pub fn days_since_feature(&self) -> f64 {
        self.days_since.map_or(NO_EARNINGS_SENTINEL, |d| d as f64)
    }

    /// Signed distance to the nearest event: negative before it, positive after.
    /// An upcoming event wins a tie.
    pub fn signed_nearest(&self) -> f64 {
        match (self.days_to, self.days_since) {
            (Some(to), Some(since)) if since < to => since as f64,
            (Some(to), _) => -(to as f64),
            (None, Some(since)) => since as f64,
            (None, None) => NO_EARNINGS_SENTINEL,
        }
    }

    /// True when an event lies within `before` trading days ahead or `after` days behind.
    pub fn within(&self, before: usize, after: usize) -> bool {
        self.days_to.is_some_and(|d| d <= before) || self.days_since.is_some_and(|d| d <= after)
    }
}

/// Trading-day positions of a symbol's earnings events.
///
/// Announcement dates are scheduled ahead of time, so the calendar is
/// available at every point of an episode; only price history is restricted
/// to bars at or before the current day.
#[derive(Debug, Clone, Default)]
pub struct EarningsCalendar {
    event_indices: Vec<usize>,
}

impl EarningsCalendar {
    pub fn for_series(series: &SymbolSeries) -> Self {
        Self {
            event_indices: series.earnings_indices(),
        }
    }

    pub fn from_indices(mut event_indices: Vec<usize>) -> Self {
        event_indices.sort_unstable();
        event_indices.dedup();
        Self { event_indices }
    }

    pub fn distance(&self, idx: usize) -> EarningsDistance {
        let split = self.event_indices.partition_point(|&e| e < idx);
        let days_to = self.event_indices.get(split).map(|&e| e - idx);
        let days_since = self.event_indices[..split]
            .last()
            .map(|&e| idx - e)
            .or(if days_to == Some(0) { Some(0) } else { None });
        EarningsDistance { days_to, days_since }
    }
}
