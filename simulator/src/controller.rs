//! Simulation controller.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use marketsettle_common::{
    AccountId, BankId, MarketError, Money, ParticipantId, ProductId, SettlementReceipt, Trade,
    TradeStatus,
};
use marketsettle_registry::fixture::total_money;
use marketsettle_registry::{Fixture, InMemoryLedger, Registry};
use marketsettle_settlement::{Settler, SettlerConfig};

use crate::market::{pick_counterparty, MarketFactory, MarketShape};
use crate::metrics::SimulationMetrics;
use crate::scenario::{AssertCondition, Scenario, ScenarioStep, ScenarioTrade};

/// Random workload parameters.
#[derive(Debug, Clone)]
pub struct Workload {
    pub shape: MarketShape,
    /// Trades to submit.
    pub trades: usize,
    /// Trades submitted together per batch.
    pub concurrency: usize,
    /// Probability that a batch runs with one account failing its updates.
    pub fault_rate: f64,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            shape: MarketShape::default(),
            trades: 200,
            concurrency: 8,
            fault_rate: 0.0,
        }
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub name: String,
    pub assertions: usize,
    pub failures: Vec<String>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Controls the simulation.
pub struct SimulationController {
    /// Settler under test.
    settler: Settler,
    /// Ledger the settler writes to.
    ledger: InMemoryLedger,
    /// Random number generator.
    rng: StdRng,
    /// Simulation metrics.
    metrics: SimulationMetrics,
    /// Scenario trades by label.
    labels: HashMap<String, Trade>,
    /// Money per currency when the market was loaded.
    opening_totals: HashMap<String, Money>,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(config: SettlerConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let node_id = config
            .node_id
            .clone()
            .unwrap_or_else(|| "simulator".to_string());
        let ledger = InMemoryLedger::new();
        let settler = Settler::new(config, node_id, ledger.registries());

        Self {
            settler,
            ledger,
            rng,
            metrics: SimulationMetrics::new(),
            labels: HashMap::new(),
            opening_totals: HashMap::new(),
        }
    }

    /// Load the market and start the settler.
    pub async fn initialize(&mut self, market: &Fixture) -> anyhow::Result<()> {
        info!(
            participants = market.participants.len(),
            products = market.products.len(),
            "Initializing simulation"
        );

        market.load_into(&self.ledger.registries()).await?;
        self.opening_totals = market.total_money()?;
        self.settler.start().await?;

        for (currency, total) in &self.opening_totals {
            info!(currency = %currency, total = %total, "Opening money supply");
        }
        Ok(())
    }

    /// Run a scenario against its own market.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> anyhow::Result<ScenarioReport> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        self.initialize(&scenario.market).await?;

        let mut report = ScenarioReport {
            name: scenario.name.clone(),
            ..ScenarioReport::default()
        };

        for step in &scenario.steps {
            if let ScenarioStep::Assert(condition) = step {
                report.assertions += 1;
                if let Err(failure) = self.check(condition).await {
                    warn!(scenario = %scenario.name, failure = %failure, "Assertion failed");
                    report.failures.push(failure);
                }
            } else {
                self.execute_step(step).await?;
            }
        }

        Ok(report)
    }

    /// Generate a random market and push a concurrent workload through it.
    pub async fn run_workload(&mut self, workload: &Workload) -> anyhow::Result<Duration> {
        let market = MarketFactory::generate(&workload.shape, &mut self.rng);
        self.initialize(&market).await?;

        let participants: Vec<ParticipantId> =
            market.participants.iter().map(|p| p.id.clone()).collect();
        let banks: Vec<BankId> = market.banks.iter().map(|b| b.id.clone()).collect();
        let accounts: Vec<AccountId> = market.accounts.iter().map(|a| a.id.clone()).collect();

        info!(
            trades = workload.trades,
            concurrency = workload.concurrency,
            "Running workload"
        );

        let start = Instant::now();
        let mut remaining = workload.trades;

        while remaining > 0 {
            let size = remaining.min(workload.concurrency.max(1));
            remaining -= size;

            let faulty = if self.rng.gen_bool(workload.fault_rate.clamp(0.0, 1.0)) {
                accounts.choose(&mut self.rng).cloned()
            } else {
                None
            };
            if let Some(account) = &faulty {
                self.ledger
                    .accounts
                    .fail_updates_for(account.clone(), "simulated storage fault");
            }

            let mut batch = Vec::with_capacity(size);
            for _ in 0..size {
                if let Some(trade) = self.random_trade(&participants, &banks).await? {
                    batch.push(trade);
                }
            }
            self.submit_all(batch).await;

            if faulty.is_some() {
                self.ledger.clear_faults();
            }
        }

        let elapsed = start.elapsed();
        self.verify_conservation().await?;
        Ok(elapsed)
    }

    /// Build a trade for a random product, sold by its current owner.
    async fn random_trade(
        &mut self,
        participants: &[ParticipantId],
        banks: &[BankId],
    ) -> anyhow::Result<Option<Trade>> {
        let mut products = self.ledger.products.get_all().await?;
        products.sort_by(|a, b| a.id.cmp(&b.id));
        let Some(product) = products.choose(&mut self.rng) else {
            return Ok(None);
        };
        let Some(buyer) = pick_counterparty(participants, &product.owner, &mut self.rng) else {
            return Ok(None);
        };
        let Some(bank) = banks.choose(&mut self.rng) else {
            return Ok(None);
        };

        Ok(Some(Trade::new(
            product.id.clone(),
            buyer.clone(),
            product.owner.clone(),
            bank.clone(),
        )))
    }

    /// Execute a single scenario step.
    async fn execute_step(&mut self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Submit(entry) => {
                let trade = self.label(entry);
                self.submit_all(vec![trade]).await;
            }
            ScenarioStep::SubmitConcurrent { trades } => {
                let batch = trades.iter().map(|entry| self.label(entry)).collect();
                self.submit_all(batch).await;
            }
            ScenarioStep::Resubmit { label } => {
                let trade = self
                    .labels
                    .get(label)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("No trade labelled {}", label))?;
                match self.settler.submit(trade).await {
                    Ok(_) => info!(label = %label, "Resubmission replayed settlement"),
                    Err(e) => info!(label = %label, code = e.error_code(), "Resubmission replayed failure"),
                }
            }
            ScenarioStep::InjectFault { account, cause } => {
                info!("Injecting fault on {}: {}", account, cause);
                self.ledger
                    .accounts
                    .fail_updates_for(AccountId::new(account.as_str()), cause.as_str());
            }
            ScenarioStep::ClearFaults => {
                info!("Clearing faults");
                self.ledger.clear_faults();
            }
            ScenarioStep::Assert(condition) => {
                self.check(condition).await.map_err(|e| anyhow::anyhow!(e))?;
            }
        }

        Ok(())
    }

    fn label(&mut self, entry: &ScenarioTrade) -> Trade {
        let trade = entry.to_trade();
        self.labels.insert(entry.label.clone(), trade.clone());
        trade
    }

    /// Submit trades together and record each outcome.
    async fn submit_all(&mut self, trades: Vec<Trade>) {
        let settler = &self.settler;
        let outcomes = join_all(trades.into_iter().map(|trade| async move {
            let started = Instant::now();
            let trade_id = trade.id;
            let outcome = settler.submit(trade).await;
            (trade_id, outcome, started.elapsed())
        }))
        .await;

        for (trade_id, outcome, elapsed) in outcomes {
            let latency_us = elapsed.as_micros() as u64;
            match outcome {
                Ok(_) => self.metrics.record_settled(latency_us),
                Err(e) => {
                    let faulted = self.settler.trade_status(trade_id) == Some(TradeStatus::Faulted);
                    self.metrics.record_failure(e.error_code(), faulted, latency_us);
                }
            }
        }
    }

    async fn check(&self, condition: &AssertCondition) -> Result<(), String> {
        match condition {
            AssertCondition::Settled { label } => self.expect_status(label, TradeStatus::Settled),
            AssertCondition::Faulted { label } => self.expect_status(label, TradeStatus::Faulted),
            AssertCondition::Rejected { label, code } => {
                self.expect_status(label, TradeStatus::Rejected)?;
                let actual = self.outcome(label)?.err().map(|e| e.error_code());
                if actual != Some(code.as_str()) {
                    return Err(format!("{label}: expected {code}, got {actual:?}"));
                }
                Ok(())
            }
            AssertCondition::SettledCount { labels, count } => {
                let mut settled = 0;
                for label in labels {
                    if self.status(label)? == TradeStatus::Settled {
                        settled += 1;
                    }
                }
                if settled != *count {
                    return Err(format!("expected {count} settled, got {settled}"));
                }
                Ok(())
            }
            AssertCondition::BalanceEquals { account, amount } => {
                let record = self
                    .ledger
                    .accounts
                    .get(&AccountId::new(account.as_str()))
                    .await
                    .map_err(|e| e.to_string())?;
                if record.balance.value != *amount {
                    return Err(format!("{account}: expected {amount}, got {}", record.balance));
                }
                Ok(())
            }
            AssertCondition::OwnerEquals { product, owner } => {
                let record = self
                    .ledger
                    .products
                    .get(&ProductId::new(product.as_str()))
                    .await
                    .map_err(|e| e.to_string())?;
                if record.owner.as_str() != owner {
                    return Err(format!("{product}: expected owner {owner}, got {}", record.owner));
                }
                Ok(())
            }
            AssertCondition::MoneyConserved => {
                self.verify_conservation().await.map_err(|e| e.to_string())
            }
        }
    }

    fn status(&self, label: &str) -> Result<TradeStatus, String> {
        let trade = self
            .labels
            .get(label)
            .ok_or_else(|| format!("no trade labelled {label}"))?;
        self.settler
            .trade_status(trade.id)
            .ok_or_else(|| format!("{label} was never submitted"))
    }

    fn expect_status(&self, label: &str, expected: TradeStatus) -> Result<(), String> {
        let actual = self.status(label)?;
        if actual != expected {
            return Err(format!("{label}: expected {expected:?}, got {actual:?}"));
        }
        Ok(())
    }

    fn outcome(&self, label: &str) -> Result<Result<SettlementReceipt, MarketError>, String> {
        let trade = self
            .labels
            .get(label)
            .ok_or_else(|| format!("no trade labelled {label}"))?;
        self.settler
            .get_trade(trade.id)
            .and_then(|record| record.outcome())
            .ok_or_else(|| format!("{label} has no outcome"))
    }

    /// Check no balance is negative and money per currency is unchanged.
    pub async fn verify_conservation(&self) -> anyhow::Result<()> {
        let accounts = self.ledger.registries().accounts.get_all().await?;

        if let Some(negative) = accounts.iter().find(|a| a.balance.is_negative()) {
            return Err(anyhow::anyhow!(
                "Account {} has negative balance {}",
                negative.id,
                negative.balance
            ));
        }

        let totals = total_money(&accounts)?;
        if totals != self.opening_totals {
            return Err(anyhow::anyhow!(
                "Money not conserved: opened with {:?}, now {:?}",
                self.opening_totals,
                totals
            ));
        }
        Ok(())
    }

    /// Get simulation metrics.
    pub fn get_metrics(&self) -> &SimulationMetrics {
        &self.metrics
    }

    /// Settler under test.
    pub fn settler(&self) -> &Settler {
        &self.settler
    }

    /// Stop the simulation.
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.settler.stop().await?;
        Ok(())
    }
}
