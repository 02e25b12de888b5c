//! Pedalock ride simulator.
//!
//! # Usage
//!
//! ```bash
//! # Ten one-second ticks, 100 m apart
//! pedalock-sim
//!
//! # Faster, longer ride with debug output
//! pedalock-sim --ticks 60 --interval-ms 100 --step-meters 50 --log-level debug
//! ```

use std::time::Duration;

use clap::Parser;
use pedalock_harness::{ScenarioConfig, run_scenario};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Pedalock ride simulator
#[derive(Parser, Debug)]
#[command(name = "pedalock-sim")]
#[command(about = "Simulate one bike ride against an in-memory backend")]
#[command(version)]
struct Args {
    /// RNG seed for tokens and nonces
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Number of GPS fixes before locking
    #[arg(long, default_value = "10")]
    ticks: u32,

    /// Telemetry period in milliseconds
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Distance between fixes in metres
    #[arg(long, default_value = "100")]
    step_meters: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(seed = args.seed, ticks = args.ticks, "Pedalock simulator starting");

    let config = ScenarioConfig {
        seed: args.seed,
        ticks: args.ticks,
        interval: Duration::from_millis(args.interval_ms.max(1)),
        step_meters: args.step_meters,
        ..ScenarioConfig::default()
    };

    let report = run_scenario(config).await?;

    tracing::info!(
        bike_id = report.bike.id(),
        status = ?report.bike.status(),
        mileage_km = report.mileage,
        accepted = report.accepted_updates,
        failed = report.failed_updates,
        requests = report.exchanges,
        elapsed = %report.receipt.elapsed_time,
        charge = %report.receipt.charge,
        record_id = report.receipt.record_id,
        "ride settled"
    );

    Ok(())
}
