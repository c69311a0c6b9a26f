//! Running and post-pass statistics over per-sample scalars

use serde::{Deserialize, Serialize};

/// Running arithmetic mean of a session's impedance magnitudes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// `sum / count`, or 0 before the first update
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

/// Extremes and consecutive-delta statistics of an ordered series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub min: f64,
    pub max: f64,
    pub range: f64,
    /// Mean of `|x[i] - x[i-1]|`
    pub mean_abs_delta: f64,
    /// Largest `|x[i] - x[i-1]|`
    pub max_abs_delta: f64,
    /// Number of consecutive deltas strictly above the threshold
    pub deltas_over_threshold: usize,
}

impl SeriesStats {
    /// Returns `None` for fewer than two values (no deltas to describe)
    pub fn calculate(values: &[f64], threshold: f64) -> Option<Self> {
        if values.len() < 2 {
            return None;
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let deltas: Vec<f64> = values.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
        let mean_abs_delta = deltas.iter().sum::<f64>() / deltas.len() as f64;
        let max_abs_delta = deltas.iter().copied().fold(0.0, f64::max);
        let deltas_over_threshold = deltas.iter().filter(|&&d| d > threshold).count();

        Some(Self {
            min,
            max,
            range: max - min,
            mean_abs_delta,
            max_abs_delta,
            deltas_over_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean() {
        let mut mean = RunningMean::new();
        assert_eq!(mean.mean(), 0.0);

        let values = [0.12, 0.11, 0.15, 0.09, 0.13];
        for v in values {
            mean.update(v);
        }
        let expected = values.iter().sum::<f64>() / values.len() as f64;
        assert!((mean.mean() - expected).abs() < 1e-12);
        assert_eq!(mean.count(), 5);

        mean.reset();
        assert_eq!(mean.count(), 0);
        assert_eq!(mean.mean(), 0.0);
    }

    #[test]
    fn test_series_stats() {
        let stats = SeriesStats::calculate(&[3.700, 3.702, 3.699, 3.699], 0.001).unwrap();
        assert!((stats.min - 3.699).abs() < 1e-12);
        assert!((stats.max - 3.702).abs() < 1e-12);
        assert!((stats.range - 0.003).abs() < 1e-9);
        assert!((stats.max_abs_delta - 0.003).abs() < 1e-9);
        assert!((stats.mean_abs_delta - 0.005 / 3.0).abs() < 1e-9);
        assert_eq!(stats.deltas_over_threshold, 2);
    }

    #[test]
    fn test_series_stats_requires_two_values() {
        assert!(SeriesStats::calculate(&[], 0.1).is_none());
        assert!(SeriesStats::calculate(&[1.0], 0.1).is_none());
    }
}
