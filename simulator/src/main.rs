//! MarketSettle Simulator
//!
//! Plays scenarios or random concurrent workloads against a settler and
//! checks that money is conserved.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod market;
mod scenario;
mod controller;
mod metrics;

use controller::{SimulationController, Workload};
use market::MarketShape;
use marketsettle_settlement::SettlerConfig;
use scenario::Scenario;

/// MarketSettle Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "MarketSettle scenario runner and load simulation")]
struct Args {
    /// Built-in scenario name or path to a scenario JSON file
    #[arg(short, long)]
    scenario: Option<String>,

    /// List the built-in scenarios and exit
    #[arg(long)]
    list: bool,

    /// Number of random trades when no scenario is given
    #[arg(short, long, default_value = "200")]
    trades: usize,

    /// Trades submitted together
    #[arg(short, long, default_value = "8")]
    concurrency: usize,

    /// Number of buyers in the generated market
    #[arg(long, default_value = "6")]
    buyers: usize,

    /// Number of sellers in the generated market
    #[arg(long, default_value = "3")]
    sellers: usize,

    /// Number of banks in the generated market
    #[arg(long, default_value = "2")]
    banks: usize,

    /// Probability that a batch runs with a failing account
    #[arg(long, default_value = "0.0")]
    fault_rate: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.list {
        for name in Scenario::builtin() {
            println!("{}", name);
        }
        return Ok(());
    }

    if !(0.0..=1.0).contains(&args.fault_rate) {
        return Err(anyhow::anyhow!("--fault-rate must be between 0 and 1"));
    }

    let config = SettlerConfig::from_env()?;
    config.validate()?;

    info!("Starting MarketSettle Simulator");

    let mut controller = SimulationController::new(config, args.seed);

    if let Some(name) = &args.scenario {
        let scenario = Scenario::load(name)?;
        let report = controller.run_scenario(&scenario).await?;
        controller.stop().await?;

        print_metrics(&controller, None);

        if !report.passed() {
            for failure in &report.failures {
                error!("Assertion failed: {}", failure);
            }
            return Err(anyhow::anyhow!(
                "Scenario {} failed {} of {} assertions",
                report.name,
                report.failures.len(),
                report.assertions
            ));
        }
        info!(
            "Scenario {} passed {} assertions",
            report.name, report.assertions
        );
    } else {
        let workload = Workload {
            shape: MarketShape {
                buyers: args.buyers,
                sellers: args.sellers,
                banks: args.banks,
                ..MarketShape::default()
            },
            trades: args.trades,
            concurrency: args.concurrency,
            fault_rate: args.fault_rate,
        };

        let elapsed = controller.run_workload(&workload).await?;
        controller.stop().await?;

        print_metrics(&controller, Some(elapsed));
        info!("Money conserved across {} trades", workload.trades);
    }

    Ok(())
}

fn print_metrics(controller: &SimulationController, elapsed: Option<std::time::Duration>) {
    let metrics = controller.get_metrics();
    info!("Simulation complete");
    info!("Total trades: {}", metrics.total_trades);
    info!("Settled: {}", metrics.settled_trades);
    info!("Rejected: {}", metrics.rejected_trades);
    info!("Faulted: {}", metrics.faulted_trades);
    for (code, count) in &metrics.failures_by_code {
        info!("  {}: {}", code, count);
    }
    info!("Settle rate: {:.1}%", metrics.settle_rate() * 100.0);
    info!(
        "Latency: avg {}µs, p50 {}µs, p99 {}µs",
        metrics.average_latency_us(),
        metrics.p50_latency_us(),
        metrics.p99_latency_us()
    );
    if let Some(elapsed) = elapsed {
        info!("Throughput: {:.0} trades/s", metrics.throughput(elapsed));
    }

    let settler = controller.settler().metrics();
    info!(
        locks_acquired = settler.locks_acquired,
        lock_conflicts = settler.lock_conflicts,
        "Settler counters"
    );
}
