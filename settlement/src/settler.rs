//! Core settler implementation.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, instrument, warn};

use marketsettle_common::{
    MarketError, Result, SettlementReceipt, Trade, TradeId, TradeRecord, TradeStatus,
};
use marketsettle_registry::Registries;

use crate::config::SettlerConfig;
use crate::lock_manager::LockManager;
use crate::metrics::{Metrics, MetricsSnapshot, SharedMetrics};
use crate::processor::{TradeBook, TradeProcessor};
use crate::state::SettlerState;

/// The service trades are submitted to.
///
/// Keeps the record of every trade it has seen. Submitting a trade id
/// that already reached a terminal state returns the recorded outcome
/// again without touching the registries.
pub struct Settler {
    /// Configuration.
    config: SettlerConfig,
    /// Node ID for this settler instance.
    node_id: String,
    /// Current settler state.
    state: Arc<RwLock<SettlerState>>,
    /// Trade records indexed by ID.
    trades: TradeBook,
    /// Entity locks.
    lock_manager: Arc<LockManager>,
    /// Trade lifecycle driver.
    processor: Arc<TradeProcessor>,
    /// Counters.
    metrics: SharedMetrics,
    /// Expired-lock sweeper, running while the settler is.
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl Settler {
    /// Create a new settler over the given registries.
    pub fn new(config: SettlerConfig, node_id: String, registries: Registries) -> Self {
        let trades: TradeBook = Arc::new(DashMap::new());
        let metrics: SharedMetrics = Arc::new(Metrics::new());
        let lock_manager = Arc::new(LockManager::new(config.lock_config.clone()));
        let processor = Arc::new(TradeProcessor::new(
            registries,
            lock_manager.clone(),
            metrics.clone(),
            trades.clone(),
            &config.settlement_config,
        ));

        Self {
            config,
            node_id,
            state: Arc::new(RwLock::new(SettlerState::Starting)),
            trades,
            lock_manager,
            processor,
            metrics,
            cleanup_task: Mutex::new(None),
        }
    }

    /// Start the settler.
    #[instrument(skip(self), fields(node_id = %self.node_id))]
    pub async fn start(&self) -> Result<()> {
        info!(node_id = %self.node_id, "Starting settler");

        *self.state.write() = SettlerState::Running;

        let lock_manager = self.lock_manager.clone();
        let handle = tokio::spawn(async move {
            lock_manager.run_cleanup_loop().await;
        });
        if let Some(previous) = self.cleanup_task.lock().replace(handle) {
            previous.abort();
        }

        info!(node_id = %self.node_id, "Settler started");
        Ok(())
    }

    /// Stop the settler gracefully.
    #[instrument(skip(self), fields(node_id = %self.node_id))]
    pub async fn stop(&self) -> Result<()> {
        info!(node_id = %self.node_id, "Stopping settler");

        *self.state.write() = SettlerState::ShuttingDown;

        self.drain_pending_trades().await;

        if let Some(handle) = self.cleanup_task.lock().take() {
            handle.abort();
        }

        *self.state.write() = SettlerState::Stopped;

        info!(node_id = %self.node_id, "Settler stopped");
        Ok(())
    }

    /// Settle a trade, or replay the outcome of one seen before.
    #[instrument(skip(self, trade), fields(trade_id = %trade.id))]
    pub async fn submit(&self, trade: Trade) -> Result<SettlementReceipt> {
        if !self.is_accepting_trades() {
            return Err(MarketError::SettlerUnavailable);
        }

        match self.trades.entry(trade.id) {
            Entry::Occupied(existing) => {
                return match existing.get().outcome() {
                    Some(outcome) => {
                        info!(
                            trade_id = %trade.id,
                            status = ?existing.get().status,
                            "Replaying recorded outcome"
                        );
                        outcome
                    }
                    None => Err(MarketError::DuplicateTrade(trade.id)),
                };
            }
            Entry::Vacant(slot) => {
                slot.insert(TradeRecord::new(trade.clone()));
            }
        }

        self.metrics.trade_submitted();
        info!(
            trade_id = %trade.id,
            product = %trade.product,
            buyer = %trade.buyer,
            seller = %trade.seller,
            bank = %trade.bank,
            "Trade submitted"
        );

        // Processing runs to completion even if the caller stops waiting
        let trade_id = trade.id;
        let processor = self.processor.clone();
        match tokio::spawn(async move { processor.process(trade).await }).await {
            Ok(outcome) => outcome,
            Err(join_error) => self.abandon(trade_id, join_error),
        }
    }

    /// Fault a trade whose processing task died before recording an outcome.
    fn abandon(&self, trade_id: TradeId, join_error: JoinError) -> Result<SettlementReceipt> {
        let error = MarketError::Internal(format!("trade processing aborted: {join_error}"));
        let mut record = self
            .trades
            .get_mut(&trade_id)
            .ok_or_else(|| MarketError::Internal(format!("no record for trade {trade_id}")))?;

        if record.abandon(error.clone()).is_ok() {
            self.metrics.trade_faulted();
            error!(trade_id = %trade_id, error = %error, "Trade processing aborted");
        }

        record.outcome().unwrap_or(Err(error))
    }

    /// Get the current status of a trade.
    pub fn trade_status(&self, trade_id: TradeId) -> Option<TradeStatus> {
        self.trades.get(&trade_id).map(|r| r.status)
    }

    /// Get a trade record by ID.
    pub fn get_trade(&self, trade_id: TradeId) -> Option<TradeRecord> {
        self.trades.get(&trade_id).map(|r| r.clone())
    }

    /// All trade records, oldest submission first.
    pub fn trades(&self) -> Vec<TradeRecord> {
        let mut records: Vec<TradeRecord> = self.trades.iter().map(|r| r.clone()).collect();
        records.sort_by_key(|r| (r.timing.submitted_at, r.id()));
        records
    }

    /// Check if the settler is accepting trades.
    pub fn is_accepting_trades(&self) -> bool {
        self.state.read().accepts_trades()
    }

    /// Get the current settler state.
    pub fn state(&self) -> SettlerState {
        *self.state.read()
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &SettlerConfig {
        &self.config
    }

    /// Get the number of trades in progress.
    pub fn active_trade_count(&self) -> usize {
        self.trades
            .iter()
            .filter(|r| r.status.is_in_progress())
            .count()
    }

    /// Get current metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Metrics in Prometheus text format.
    pub fn prometheus(&self) -> String {
        self.metrics.to_prometheus()
    }

    async fn drain_pending_trades(&self) {
        use tokio::time::{timeout, Duration};

        let drain_timeout = self.config.settlement_config.drain_timeout;

        let drained = timeout(drain_timeout, async {
            loop {
                let pending_count = self.active_trade_count();
                if pending_count == 0 {
                    break;
                }
                info!(pending_count, "Waiting for pending trades to complete");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                pending_count = self.active_trade_count(),
                "Drain timeout reached with trades still in flight"
            );
        }
    }
}
