//! Realized-period statistics.
//!
//! The whole point of the harness is to measure how far the sampler's actual
//! period drifts from the programmed one under different wake configurations.
//! This collector keeps a small ring buffer of observed periods and reports
//! drift in parts per million.

use std::time::Duration;

/// Observed sampler periods with ring buffer for recent history.
#[derive(Debug)]
pub struct PeriodStats {
    /// Ring buffer of periods in microseconds.
    samples: Box<[u64]>,
    /// Current write position in the ring buffer.
    write_pos: usize,
    /// Number of samples retained (saturates at buffer size).
    sample_count: usize,
    /// Total periods observed.
    total_periods: u64,
    /// Minimum observed period in microseconds.
    min_us: u64,
    /// Maximum observed period in microseconds.
    max_us: u64,
    /// Sum of all periods for mean calculation.
    sum_us: u64,
    /// Programmed period in microseconds, the drift baseline.
    expected_us: u64,
}

impl PeriodStats {
    /// Create a collector with the given history size.
    ///
    /// # Arguments
    ///
    /// * `history_size` - Number of periods to retain in the ring buffer.
    /// * `expected` - The programmed sampler period; drift is measured against it.
    #[must_use]
    pub fn new(history_size: usize, expected: Duration) -> Self {
        let size = history_size.max(1);
        Self {
            samples: vec![0u64; size].into_boxed_slice(),
            write_pos: 0,
            sample_count: 0,
            total_periods: 0,
            min_us: u64::MAX,
            max_us: 0,
            sum_us: 0,
            expected_us: (expected.as_micros() as u64).max(1),
        }
    }

    /// Record one observed period in microseconds.
    pub fn record_us(&mut self, us: u64) {
        self.samples[self.write_pos] = us;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.sample_count = self.sample_count.saturating_add(1).min(self.samples.len());

        self.total_periods += 1;
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
        self.sum_us = self.sum_us.wrapping_add(us);
    }

    /// Total periods observed since creation or the last reset.
    #[must_use]
    pub fn total_periods(&self) -> u64 {
        self.total_periods
    }

    /// Shortest observed period.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        if self.total_periods > 0 {
            Some(Duration::from_micros(self.min_us))
        } else {
            None
        }
    }

    /// Longest observed period.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        if self.total_periods > 0 {
            Some(Duration::from_micros(self.max_us))
        } else {
            None
        }
    }

    /// Mean observed period.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        if self.total_periods > 0 {
            Some(Duration::from_micros(self.sum_us / self.total_periods))
        } else {
            None
        }
    }

    /// Mean drift from the programmed period, in parts per million.
    ///
    /// Positive means the sampler runs slow (periods longer than programmed).
    #[must_use]
    pub fn drift_ppm(&self) -> Option<i64> {
        if self.total_periods == 0 {
            return None;
        }
        let mean = i128::from(self.sum_us / self.total_periods);
        let expected = i128::from(self.expected_us);
        Some(((mean - expected) * 1_000_000 / expected) as i64)
    }

    /// A percentile of the periods in the history window.
    ///
    /// Returns `None` when nothing has been recorded yet or `percentile`
    /// falls outside 0..=100.
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.sample_count == 0 || !(0.0..=100.0).contains(&percentile) {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples[..self.sample_count].to_vec();
        sorted.sort_unstable();

        let idx = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        Some(Duration::from_micros(sorted[idx.min(sorted.len() - 1)]))
    }

    /// Get a snapshot of current statistics.
    #[must_use]
    pub fn snapshot(&self) -> PeriodSnapshot {
        PeriodSnapshot {
            total_periods: self.total_periods,
            min_us: if self.total_periods > 0 {
                Some(self.min_us)
            } else {
                None
            },
            max_us: if self.total_periods > 0 {
                Some(self.max_us)
            } else {
                None
            },
            mean_us: if self.total_periods > 0 {
                Some(self.sum_us / self.total_periods)
            } else {
                None
            },
            drift_ppm: self.drift_ppm(),
            sample_count: self.sample_count,
        }
    }

    /// Reset all statistics, keeping the programmed period.
    pub fn reset(&mut self) {
        self.samples.fill(0);
        self.write_pos = 0;
        self.sample_count = 0;
        self.total_periods = 0;
        self.min_us = u64::MAX;
        self.max_us = 0;
        self.sum_us = 0;
    }
}

/// Immutable snapshot of period statistics for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PeriodSnapshot {
    /// Total periods observed.
    pub total_periods: u64,
    /// Shortest period in microseconds.
    pub min_us: Option<u64>,
    /// Longest period in microseconds.
    pub max_us: Option<u64>,
    /// Mean period in microseconds.
    pub mean_us: Option<u64>,
    /// Mean drift from the programmed period in parts per million.
    pub drift_ppm: Option<i64>,
    /// Number of periods in the ring buffer.
    pub sample_count: usize,
}

impl PeriodSnapshot {
    /// Spread between the longest and shortest period, in microseconds.
    #[must_use]
    pub fn jitter_us(&self) -> Option<u64> {
        match (self.min_us, self.max_us) {
            (Some(min), Some(max)) => Some(max - min),
            _ => None,
        }
    }
}
