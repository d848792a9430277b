//! MarketSettle Settler Binary
//!
//! Loads a marketplace, submits its trades and prints one JSON report per
//! trade on stdout. Logs go to stderr.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketsettle_common::{Currency, Money, SettlementReceipt, Trade, TradeId, TradeStatus};
use marketsettle_ledger::{Bank, BankAccount, Participant, Product};
use marketsettle_registry::{Fixture, InMemoryLedger};
use marketsettle_settlement::{Settler, SettlerConfig};

#[derive(Parser, Debug)]
#[command(name = "settler")]
#[command(about = "Settle marketplace trades against an in-memory ledger")]
struct Args {
    /// JSON file with participants, banks, accounts, products and trades.
    /// Runs the built-in demo marketplace when omitted.
    session: Option<PathBuf>,

    /// Print Prometheus metrics after the trades.
    #[arg(long)]
    metrics: bool,
}

#[derive(Debug, Deserialize)]
struct Session {
    #[serde(flatten)]
    fixture: Fixture,
    #[serde(default)]
    trades: Vec<Trade>,
}

#[derive(Debug, Serialize)]
struct TradeReport {
    trade_id: TradeId,
    status: TradeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    receipt: Option<SettlementReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorReport>,
}

#[derive(Debug, Serialize)]
struct ErrorReport {
    code: &'static str,
    message: String,
    retryable: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = SettlerConfig::from_env()?;
    init_logging(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let session = match &args.session {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
            serde_json::from_str(&json)?
        }
        None => demo_session(),
    };

    let node_id = config
        .node_id
        .clone()
        .unwrap_or_else(|| format!("settler-{}", uuid::Uuid::new_v4()));
    info!(node_id = %node_id, "Node ID assigned");

    let ledger = InMemoryLedger::new();
    session.fixture.load_into(&ledger.registries()).await?;

    let settler = Settler::new(config, node_id, ledger.registries());
    settler.start().await?;

    for trade in session.trades {
        let trade_id = trade.id;
        let outcome = settler.submit(trade).await;
        let status = settler
            .trade_status(trade_id)
            .unwrap_or(TradeStatus::Rejected);

        let report = match outcome {
            Ok(receipt) => TradeReport {
                trade_id,
                status,
                receipt: Some(receipt),
                error: None,
            },
            Err(e) => TradeReport {
                trade_id,
                status,
                receipt: None,
                error: Some(ErrorReport {
                    code: e.error_code(),
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                }),
            },
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    settler.stop().await?;

    if args.metrics {
        print!("{}", settler.prometheus());
    }

    let metrics = settler.metrics();
    info!(
        settled = metrics.trades_settled,
        rejected = metrics.trades_rejected,
        faulted = metrics.trades_faulted,
        "Settler finished"
    );
    Ok(())
}

fn init_logging(config: &SettlerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    let json = config
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
    let plain = (!config.log_json)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .init();
}

/// Alice buys Bob's product for 500.
fn demo_session() -> Session {
    let usd = |value: i64| Money::new(value.into(), Currency::usd());

    let mut bob = Participant::seller("bob", "Bob", "Seller");
    bob.list_product(&"product1".into());

    let accounts = vec![
        BankAccount::new("alice_account", "alice", "bank", usd(1000)),
        BankAccount::new("bob_account", "bob", "bank", usd(0)),
    ];

    Session {
        fixture: Fixture {
            participants: vec![Participant::buyer("alice", "Alice", "Buyer"), bob],
            banks: vec![Bank::new("bank", "bank").with_accounts(accounts.iter().map(|a| a.id.clone()))],
            accounts,
            products: vec![Product::listed("product1", "product 1 name", usd(500), "bob")],
        },
        trades: vec![Trade::new("product1", "alice", "bob", "bank")],
    }
}
