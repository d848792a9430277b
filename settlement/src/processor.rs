//! Trade processing: drives one trade through its lifecycle.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, info, instrument, warn};

use marketsettle_common::{
    EntityRef, InvalidTransition, MarketError, Result, SettlementReceipt, Trade, TradeFailure,
    TradeId, TradeRecord, TradeStatus,
};
use marketsettle_registry::Registries;

use crate::applier::{SettlementApplier, SettlementPlan};
use crate::config::SettlementConfig;
use crate::lock_manager::{LockGuard, LockManager};
use crate::metrics::SharedMetrics;
use crate::validator::{TradeSnapshot, TradeValidator};

/// Trade records by ID.
pub type TradeBook = Arc<DashMap<TradeId, TradeRecord>>;

/// Trade processor handles the trade lifecycle.
///
/// `Submitted → Validating → {Rejected | Validated} → Applying →
/// {Settled | Faulted}`. The trade's entities stay locked from before the
/// snapshot is read until the outcome is recorded.
pub struct TradeProcessor {
    registries: Registries,
    lock_manager: Arc<LockManager>,
    metrics: SharedMetrics,
    trades: TradeBook,
    validator: TradeValidator,
    applier: SettlementApplier,
    record_ownership_history: bool,
}

impl TradeProcessor {
    /// Create a new trade processor.
    pub fn new(
        registries: Registries,
        lock_manager: Arc<LockManager>,
        metrics: SharedMetrics,
        trades: TradeBook,
        config: &SettlementConfig,
    ) -> Self {
        Self {
            applier: SettlementApplier::new(registries.clone()),
            validator: TradeValidator::new(config),
            record_ownership_history: config.record_ownership_history,
            registries,
            lock_manager,
            metrics,
            trades,
        }
    }

    /// Process a trade whose record is already in the book as `Submitted`.
    #[instrument(skip(self, trade), fields(trade_id = %trade.id))]
    pub async fn process(&self, trade: Trade) -> Result<SettlementReceipt> {
        let trade_id = trade.id;
        self.update_record(trade_id, |r| r.transition_to(TradeStatus::Validating))?;

        let entities = [
            EntityRef::product(&trade.product),
            EntityRef::participant(&trade.buyer),
            EntityRef::participant(&trade.seller),
        ];

        let guard = match self.lock_manager.lock(trade_id, &entities).await {
            Ok(guard) => {
                self.metrics.record_locks_acquired(guard.locks().len());
                guard
            }
            Err(e) => {
                self.metrics.lock_conflict();
                return self.reject(trade_id, e);
            }
        };

        self.settle_locked(&trade, &guard).await
    }

    async fn settle_locked(&self, trade: &Trade, guard: &LockGuard) -> Result<SettlementReceipt> {
        let plan = match self.prepare(trade).await {
            Ok(plan) => plan,
            Err(e) => return self.reject(trade.id, e),
        };

        // Locks that expired while preparing may belong to another trade now
        if let Err(entity) = guard.renew() {
            self.metrics.lock_conflict();
            return self.reject(
                trade.id,
                MarketError::LockConflict {
                    trade_id: trade.id,
                    entity,
                },
            );
        }

        self.update_record(trade.id, |r| r.transition_to(TradeStatus::Validated))?;
        self.update_record(trade.id, |r| r.transition_to(TradeStatus::Applying))?;
        info!(trade_id = %trade.id, price = %plan.price, "Applying settlement");

        match self.applier.apply(plan).await {
            Ok(receipt) => {
                self.update_record(trade.id, |r| r.settle(receipt.clone()))?;
                self.metrics.trade_settled();
                info!(
                    trade_id = %trade.id,
                    product = %receipt.product,
                    new_owner = %receipt.new_owner,
                    "Trade settled"
                );
                Ok(receipt)
            }
            Err(commit) => {
                if commit.is_clean() {
                    error!(trade_id = %trade.id, error = %commit, "Trade faulted, host rolled back");
                } else {
                    error!(
                        trade_id = %trade.id,
                        error = %commit,
                        unrestored = ?commit.rollback_failed,
                        "Trade faulted, rollback incomplete"
                    );
                }
                let rolled_back = commit.rolled_back.clone();
                let error = MarketError::from(commit);
                let failure = TradeFailure::new(error.clone()).with_rolled_back(rolled_back);
                self.update_record(trade.id, |r| r.fault(failure))?;
                self.metrics.trade_faulted();
                Err(error)
            }
        }
    }

    /// Read the snapshot, validate and plan. Nothing is written.
    async fn prepare(&self, trade: &Trade) -> Result<SettlementPlan> {
        let snapshot = self.load_snapshot(trade).await?;
        let resolved = self.validator.validate(trade, &snapshot)?;

        let participants = if self.record_ownership_history {
            let buyer = self.registries.participants.get(&trade.buyer).await?;
            let seller = self.registries.participants.get(&trade.seller).await?;
            Some((buyer, seller))
        } else {
            None
        };

        SettlementApplier::plan(&resolved, participants)
    }

    async fn load_snapshot(&self, trade: &Trade) -> Result<TradeSnapshot> {
        let bank = self.registries.banks.get(&trade.bank).await?;
        let product = self.registries.products.get(&trade.product).await?;

        let mut accounts = Vec::with_capacity(bank.accounts.len());
        for account_id in &bank.accounts {
            accounts.push(self.registries.accounts.get(account_id).await?);
        }

        Ok(TradeSnapshot {
            bank,
            accounts,
            product,
        })
    }

    fn reject(&self, trade_id: TradeId, error: MarketError) -> Result<SettlementReceipt> {
        warn!(
            trade_id = %trade_id,
            code = error.error_code(),
            error = %error,
            "Trade rejected"
        );
        self.update_record(trade_id, |r| r.reject(error.clone()))?;
        self.metrics.trade_rejected();
        Err(error)
    }

    fn update_record(
        &self,
        trade_id: TradeId,
        update: impl FnOnce(&mut TradeRecord) -> std::result::Result<(), InvalidTransition>,
    ) -> Result<()> {
        let mut record = self
            .trades
            .get_mut(&trade_id)
            .ok_or_else(|| MarketError::Internal(format!("no record for trade {trade_id}")))?;
        update(&mut *record)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockConfig;
    use crate::metrics::Metrics;
    use crate::testing::{marketplace, usd};
    use async_trait::async_trait;
    use marketsettle_common::{AccountId, ParticipantId, ProductId};
    use marketsettle_ledger::Product;
    use marketsettle_registry::{
        InMemoryLedger, InMemoryRegistry, Registry, RegistryResult,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Harness {
        ledger: InMemoryLedger,
        trades: TradeBook,
        metrics: SharedMetrics,
        locks: Arc<LockManager>,
        processor: TradeProcessor,
    }

    async fn harness(config: SettlementConfig) -> Harness {
        harness_with(config, LockConfig::default()).await
    }

    async fn harness_with(config: SettlementConfig, lock_config: LockConfig) -> Harness {
        let ledger = loaded_ledger().await;
        let registries = ledger.registries();
        harness_over(ledger, registries, Arc::new(LockManager::new(lock_config)), config)
    }

    async fn loaded_ledger() -> InMemoryLedger {
        let ledger = InMemoryLedger::new();
        marketplace(dec!(1000)).load_into(&ledger.registries()).await.unwrap();
        ledger
    }

    fn harness_over(
        ledger: InMemoryLedger,
        registries: Registries,
        locks: Arc<LockManager>,
        config: SettlementConfig,
    ) -> Harness {
        let trades: TradeBook = Arc::new(DashMap::new());
        let metrics: SharedMetrics = Arc::new(Metrics::new());
        let processor = TradeProcessor::new(
            registries,
            locks.clone(),
            metrics.clone(),
            trades.clone(),
            &config,
        );

        Harness {
            ledger,
            trades,
            metrics,
            locks,
            processor,
        }
    }

    /// Product store that is slow enough for the trade's locks to lapse,
    /// during which another trade takes the product.
    struct ContendedProducts {
        inner: Arc<InMemoryRegistry<Product>>,
        locks: Arc<LockManager>,
    }

    #[async_trait]
    impl Registry<Product> for ContendedProducts {
        async fn get(&self, id: &ProductId) -> RegistryResult<Product> {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.locks
                .try_acquire(TradeId::new(), &[EntityRef::product(id)])
                .expect("product lock lapsed");
            self.inner.get(id).await
        }

        async fn get_all(&self) -> RegistryResult<Vec<Product>> {
            self.inner.get_all().await
        }

        async fn exists(&self, id: &ProductId) -> RegistryResult<bool> {
            self.inner.exists(id).await
        }

        async fn update(&self, entity: Product) -> RegistryResult<()> {
            self.inner.update(entity).await
        }

        async fn add(&self, entity: Product) -> RegistryResult<()> {
            self.inner.add(entity).await
        }
    }

    impl Harness {
        async fn run(&self, trade: Trade) -> Result<SettlementReceipt> {
            self.trades.insert(trade.id, TradeRecord::new(trade.clone()));
            self.metrics.trade_submitted();
            self.processor.process(trade).await
        }

        fn status(&self, trade_id: TradeId) -> TradeStatus {
            self.trades.get(&trade_id).map(|r| r.status).unwrap()
        }
    }

    #[tokio::test]
    async fn test_settles_and_releases_locks() {
        let h = harness(SettlementConfig::default()).await;
        let trade = Trade::new("product1", "alice", "bob", "bank");

        let receipt = h.run(trade.clone()).await.unwrap();

        assert_eq!(receipt.new_owner.as_str(), "alice");
        assert_eq!(h.status(trade.id), TradeStatus::Settled);
        assert_eq!(h.locks.active_lock_count(), 0);

        let record = h.trades.get(&trade.id).unwrap().clone();
        assert!(record.timing.validated_at.is_some());
        assert!(record.timing.settled_at.is_some());

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.trades_settled, 1);
        assert_eq!(snapshot.locks_acquired, 3);
        assert_eq!(snapshot.trades_active, 0);
    }

    #[tokio::test]
    async fn test_missing_product_is_rejected() {
        let h = harness(SettlementConfig::default()).await;
        let trade = Trade::new("product9", "alice", "bob", "bank");

        let err = h.run(trade.clone()).await.unwrap_err();

        assert_eq!(err.error_code(), "NOT_FOUND");
        assert_eq!(h.status(trade.id), TradeStatus::Rejected);
        assert_eq!(h.ledger.write_count(), 0);
        assert_eq!(h.locks.active_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_persistence_fault_is_faulted() {
        let h = harness(SettlementConfig::default()).await;
        h.ledger
            .accounts
            .fail_updates_for(AccountId::new("bob_account"), "storage offline");
        let trade = Trade::new("product1", "alice", "bob", "bank");

        let err = h.run(trade.clone()).await.unwrap_err();

        assert_eq!(err.error_code(), "PERSISTENCE_ERROR");
        assert_eq!(h.status(trade.id), TradeStatus::Faulted);

        let record = h.trades.get(&trade.id).unwrap().clone();
        assert_eq!(record.failure.unwrap().rolled_back.len(), 2);
        assert_eq!(h.metrics.snapshot().trades_faulted, 1);

        let alice = h.ledger.accounts.get(&AccountId::new("alice_account")).await.unwrap();
        assert_eq!(alice.balance, usd(dec!(1000)));
    }

    #[tokio::test]
    async fn test_ownership_history_persisted() {
        let h = harness(SettlementConfig {
            record_ownership_history: true,
            ..SettlementConfig::default()
        })
        .await;

        let receipt = h
            .run(Trade::new("product1", "alice", "bob", "bank"))
            .await
            .unwrap();
        assert_eq!(receipt.updated.len(), 5);

        let alice = h.ledger.participants.get(&ParticipantId::new("alice")).await.unwrap();
        let bob = h.ledger.participants.get(&ParticipantId::new("bob")).await.unwrap();
        assert_eq!(alice.acquired, vec![ProductId::new("product1")]);
        assert_eq!(bob.sold, vec![ProductId::new("product1")]);
        assert!(!bob.listed.contains(&ProductId::new("product1")));
    }

    #[tokio::test]
    async fn test_lock_conflict_rejects() {
        let h = harness_with(
            SettlementConfig::default(),
            LockConfig {
                acquisition_timeout: std::time::Duration::from_millis(20),
                ..LockConfig::default()
            },
        )
        .await;
        h.locks
            .try_acquire(
                TradeId::new(),
                &[EntityRef::participant(&ParticipantId::new("alice"))],
            )
            .unwrap();

        let trade = Trade::new("product1", "alice", "bob", "bank");
        let err = h.run(trade.clone()).await.unwrap_err();

        assert_eq!(err.error_code(), "LOCK_CONFLICT");
        assert_eq!(h.status(trade.id), TradeStatus::Rejected);
        assert_eq!(h.metrics.snapshot().lock_conflicts, 1);
        assert_eq!(h.ledger.write_count(), 0);
    }

    #[tokio::test]
    async fn test_seller_balance_overflow_is_rejected() {
        let h = harness(SettlementConfig::default()).await;
        let mut bob = h.ledger.accounts.get(&AccountId::new("bob_account")).await.unwrap();
        bob.balance = usd(Decimal::MAX);
        h.ledger.accounts.update(bob).await.unwrap();
        let writes = h.ledger.write_count();

        let trade = Trade::new("product1", "alice", "bob", "bank");
        let err = h.run(trade.clone()).await.unwrap_err();

        assert_eq!(err.error_code(), "AMOUNT_OVERFLOW");
        assert!(!err.is_retryable());
        assert_eq!(h.status(trade.id), TradeStatus::Rejected);
        assert_eq!(h.ledger.write_count(), writes);
        assert_eq!(h.locks.active_lock_count(), 0);

        let alice = h.ledger.accounts.get(&AccountId::new("alice_account")).await.unwrap();
        assert_eq!(alice.balance, usd(dec!(1000)));
    }

    #[tokio::test]
    async fn test_locks_lost_before_apply_reject() {
        let ledger = loaded_ledger().await;
        let locks = Arc::new(LockManager::new(LockConfig {
            default_duration: std::time::Duration::ZERO,
            ..LockConfig::default()
        }));
        let registries = Registries {
            products: Arc::new(ContendedProducts {
                inner: ledger.products.clone(),
                locks: locks.clone(),
            }),
            ..ledger.registries()
        };
        let h = harness_over(ledger, registries, locks, SettlementConfig::default());

        let trade = Trade::new("product1", "alice", "bob", "bank");
        let err = h.run(trade.clone()).await.unwrap_err();

        assert_eq!(
            err,
            MarketError::LockConflict {
                trade_id: trade.id,
                entity: EntityRef::product(&ProductId::new("product1")),
            }
        );
        assert_eq!(h.status(trade.id), TradeStatus::Rejected);
        assert_eq!(h.metrics.snapshot().lock_conflicts, 1);
        assert_eq!(h.ledger.write_count(), 0);
    }
}
