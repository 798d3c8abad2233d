/// Simple return over a fixed number of trading days.
///
/// Returns `None` until at least `period + 1` closes are available or when the
/// reference close is not positive.
#[derive(Debug, Clone, Copy)]
pub struct TrailingReturn {
    pub period: usize,
}

impl TrailingReturn {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "return period must be >= 1");
        Self { period }
    }

    /// Compute the return ending at the last close (oldest first).
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.period + 1 {
            return None;
        }
        let last = closes[closes.len() - 1];
        let base = closes[closes.len() - 1 - self.period];
        if base <= 0.0 {
            return None;
        }
        Some(last / base - 1.0)
    }
}

/// Day-over-day simple returns of a close series.
pub fn daily_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| w[1] / (w[0] + 1e-12) - 1.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_needs_period_plus_one_closes() {
        let r5 = TrailingReturn::new(5);
        assert!(r5.compute(&[1.0; 5]).is_none());
        assert!(r5.compute(&[1.0; 6]).is_some());
    }

    #[test]
    fn return_uses_close_period_days_back() {
        let r1 = TrailingReturn::new(1);
        let r3 = TrailingReturn::new(3);
        let closes = [100.0, 50.0, 80.0, 110.0, 121.0];
        assert!((r1.compute(&closes).unwrap() - 0.1).abs() < 1e-12);
        assert!((r3.compute(&closes).unwrap() - 1.42).abs() < 1e-12);
    }

    #[test]
    fn non_positive_base_yields_none() {
        assert!(TrailingReturn::new(1).compute(&[0.0, 1.0]).is_none());
    }

    #[test]
    fn daily_returns_length() {
        assert_eq!(daily_returns(&[1.0, 2.0, 1.0]).len(), 2);
        assert!(daily_returns(&[1.0]).is_empty());
    }
}
