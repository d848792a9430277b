//! Simulation metrics.

use std::collections::{BTreeMap, VecDeque};

/// Simulation metrics.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    /// Total trades submitted.
    pub total_trades: u64,
    /// Settled trades.
    pub settled_trades: u64,
    /// Rejected trades.
    pub rejected_trades: u64,
    /// Faulted trades.
    pub faulted_trades: u64,
    /// Failures by error code.
    pub failures_by_code: BTreeMap<String, u64>,
    /// Latency samples (µs).
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_trades: 0,
            settled_trades: 0,
            rejected_trades: 0,
            faulted_trades: 0,
            failures_by_code: BTreeMap::new(),
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record a settled trade.
    pub fn record_settled(&mut self, latency_us: u64) {
        self.total_trades += 1;
        self.settled_trades += 1;
        self.push_sample(latency_us);
    }

    /// Record a trade that failed with `code`.
    pub fn record_failure(&mut self, code: &str, faulted: bool, latency_us: u64) {
        self.total_trades += 1;
        if faulted {
            self.faulted_trades += 1;
        } else {
            self.rejected_trades += 1;
        }
        *self.failures_by_code.entry(code.to_string()).or_insert(0) += 1;
        self.push_sample(latency_us);
    }

    fn push_sample(&mut self, latency_us: u64) {
        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);
    }

    /// Get average latency in µs.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p50 latency.
    pub fn p50_latency_us(&self) -> u64 {
        self.percentile_latency(50)
    }

    /// Get p99 latency.
    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Get settle rate.
    pub fn settle_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }

        self.settled_trades as f64 / self.total_trades as f64
    }

    /// Get throughput (trades per second).
    pub fn throughput(&self, elapsed: std::time::Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }

        self.total_trades as f64 / secs
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
