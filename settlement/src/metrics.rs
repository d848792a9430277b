//! Metrics collection for settler monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Settler metrics.
pub struct Metrics {
    /// Total trades submitted.
    pub trades_submitted: AtomicU64,
    /// Trades settled.
    pub trades_settled: AtomicU64,
    /// Trades rejected during validation.
    pub trades_rejected: AtomicU64,
    /// Trades faulted while applying.
    pub trades_faulted: AtomicU64,
    /// Trades in progress.
    pub trades_active: AtomicU64,
    /// Total entity locks acquired.
    pub locks_acquired: AtomicU64,
    /// Lock acquisitions that timed out.
    pub lock_conflicts: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            trades_submitted: AtomicU64::new(0),
            trades_settled: AtomicU64::new(0),
            trades_rejected: AtomicU64::new(0),
            trades_faulted: AtomicU64::new(0),
            trades_active: AtomicU64::new(0),
            locks_acquired: AtomicU64::new(0),
            lock_conflicts: AtomicU64::new(0),
        }
    }

    /// Record a trade entering processing.
    pub fn trade_submitted(&self) {
        self.trades_submitted.fetch_add(1, Ordering::Relaxed);
        self.trades_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a settled trade.
    pub fn trade_settled(&self) {
        self.trades_settled.fetch_add(1, Ordering::Relaxed);
        self.trades_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a rejected trade.
    pub fn trade_rejected(&self) {
        self.trades_rejected.fetch_add(1, Ordering::Relaxed);
        self.trades_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a faulted trade.
    pub fn trade_faulted(&self) {
        self.trades_faulted.fetch_add(1, Ordering::Relaxed);
        self.trades_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record `count` locks taken.
    pub fn record_locks_acquired(&self, count: usize) {
        self.locks_acquired.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record a lock acquisition timeout.
    pub fn lock_conflict(&self) {
        self.lock_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            trades_submitted: self.trades_submitted.load(Ordering::Relaxed),
            trades_settled: self.trades_settled.load(Ordering::Relaxed),
            trades_rejected: self.trades_rejected.load(Ordering::Relaxed),
            trades_faulted: self.trades_faulted.load(Ordering::Relaxed),
            trades_active: self.trades_active.load(Ordering::Relaxed),
            locks_acquired: self.locks_acquired.load(Ordering::Relaxed),
            lock_conflicts: self.lock_conflicts.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP marketsettle_trades_submitted Total number of trades submitted
# TYPE marketsettle_trades_submitted counter
marketsettle_trades_submitted {}

# HELP marketsettle_trades_settled Total settled trades
# TYPE marketsettle_trades_settled counter
marketsettle_trades_settled {}

# HELP marketsettle_trades_rejected Total rejected trades
# TYPE marketsettle_trades_rejected counter
marketsettle_trades_rejected {}

# HELP marketsettle_trades_faulted Total faulted trades
# TYPE marketsettle_trades_faulted counter
marketsettle_trades_faulted {}

# HELP marketsettle_trades_active Current trades in progress
# TYPE marketsettle_trades_active gauge
marketsettle_trades_active {}

# HELP marketsettle_locks_acquired Total entity locks acquired
# TYPE marketsettle_locks_acquired counter
marketsettle_locks_acquired {}

# HELP marketsettle_lock_conflicts Total lock acquisition timeouts
# TYPE marketsettle_lock_conflicts counter
marketsettle_lock_conflicts {}
"#,
            snapshot.trades_submitted,
            snapshot.trades_settled,
            snapshot.trades_rejected,
            snapshot.trades_faulted,
            snapshot.trades_active,
            snapshot.locks_acquired,
            snapshot.lock_conflicts,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub trades_submitted: u64,
    pub trades_settled: u64,
    pub trades_rejected: u64,
    pub trades_faulted: u64,
    pub trades_active: u64,
    pub locks_acquired: u64,
    pub lock_conflicts: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.trade_submitted();
        metrics.trade_submitted();
        metrics.trade_submitted();
        metrics.trade_settled();
        metrics.trade_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.trades_submitted, 3);
        assert_eq!(snapshot.trades_settled, 1);
        assert_eq!(snapshot.trades_rejected, 1);
        assert_eq!(snapshot.trades_active, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.trade_submitted();
        metrics.record_locks_acquired(3);

        let output = metrics.to_prometheus();
        assert!(output.contains("marketsettle_trades_submitted 1"));
        assert!(output.contains("marketsettle_locks_acquired 3"));
    }
}
