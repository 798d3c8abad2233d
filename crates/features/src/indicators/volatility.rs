/// Population standard deviation of the most recent `window` daily returns.
///
/// Reports 0.0 until `min_samples` returns exist, so early-history bars never
/// produce a noisy estimate.
#[derive(Debug, Clone, Copy)]
pub struct RollingVolatility {
    pub window: usize,
    pub min_samples: usize,
}

impl RollingVolatility {
    pub fn new(window: usize, min_samples: usize) -> Self {
        assert!(window >= 2, "volatility window must be >= 2");
        Self { window, min_samples }
    }

    pub fn compute(&self, returns: &[f64]) -> f64 {
        if returns.len() < self.min_samples.max(self.window) {
            return 0.0;
        }
        std_dev(&returns[returns.len() - self.window..])
    }
}

/// Z-score of the latest volume against a trailing window (latest included).
#[derive(Debug, Clone, Copy)]
pub struct VolumeZScore {
    pub min_samples: usize,
}

impl VolumeZScore {
    pub fn new(min_samples: usize) -> Self {
        Self { min_samples }
    }

    pub fn compute(&self, volumes: &[f64]) -> f64 {
        let Some(&latest) = volumes.last() else {
            return 0.0;
        };
        if volumes.len() < self.min_samples {
            return 0.0;
        }
        (latest - mean(volumes)) / (std_dev(volumes) + 1e-9)
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volatility_is_zero_before_min_samples() {
        let vol = RollingVolatility::new(10, 25);
        assert_eq!(vol.compute(&[0.01; 24]), 0.0);
    }

    #[test]
    fn volatility_only_looks_at_trailing_window() {
        let vol = RollingVolatility::new(2, 2);
        // Last two returns are +1% and -1% → population std = 1%.
        let v = vol.compute(&[0.5, -0.7, 0.01, -0.01]);
        assert!((v - 0.01).abs() < 1e-12, "got {v}");
    }

    #[test]
    fn constant_volume_scores_zero() {
        let z = VolumeZScore::new(10);
        assert!(z.compute(&[100.0; 12]).abs() < 1e-9);
    }

    #[test]
    fn volume_spike_scores_positive() {
        let z = VolumeZScore::new(3);
        assert!(z.compute(&[100.0, 100.0, 100.0, 400.0]) > 1.0);
    }
}
