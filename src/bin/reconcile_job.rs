//! Reconciliation Job Binary
//!
//! Runs one reconciliation pass over a ledger snapshot and prints the report
//! as JSON on stdout.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `LEDGER_SNAPSHOT`: path of the snapshot JSON to reconcile (required)
//! - `RECONCILE_APPLY`: "true" to correct drifting stocks (default: false)
//! - `LEDGER_SNAPSHOT_OUT`: where to write the corrected snapshot (optional)
//! - `LEDGER_BATCH_SIZE`, `LEDGER_DRIFT_TOLERANCE`: see `EngineConfig`
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! LEDGER_SNAPSHOT=ledger.json RECONCILE_APPLY=true cargo run --bin reconcile_job --features job
//! ```

use std::sync::Arc;
use std::time::Instant;

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lot_ledger_kernel::{
    EngineConfig, InMemoryLedgerStore, LedgerSnapshot, ReconcileOptions, Reconciler,
};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "reconcile_job=info,lot_ledger_kernel=info".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    let build_sha = option_env!("BUILD_SHA").unwrap_or("dev");
    info!(version = version, build_sha = build_sha, "Starting reconciliation job");

    let path = std::env::var("LEDGER_SNAPSHOT").map_err(|_| "LEDGER_SNAPSHOT is required")?;
    let apply = std::env::var("RECONCILE_APPLY")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);
    let config = EngineConfig::from_env();

    let load_start = Instant::now();
    let snapshot: LedgerSnapshot = serde_json::from_slice(&std::fs::read(&path)?)?;
    info!(
        path = %path,
        lots = snapshot.lots.len(),
        stocks = snapshot.stocks.len(),
        transformations = snapshot.transformations.len(),
        latency_ms = load_start.elapsed().as_millis() as u64,
        "Snapshot loaded"
    );

    let store = Arc::new(InMemoryLedgerStore::from_snapshot(snapshot));
    let report = Reconciler::new(store.clone())
        .reconcile(ReconcileOptions::from_config(&config, apply))
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Ok(out) = std::env::var("LEDGER_SNAPSHOT_OUT") {
        std::fs::write(&out, serde_json::to_vec_pretty(&store.snapshot())?)?;
        info!(path = %out, "Corrected snapshot written");
    }

    if !report.failed_pages.is_empty() {
        return Err(format!("{} reconciliation pages failed", report.failed_pages.len()).into());
    }
    Ok(())
}
