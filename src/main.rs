//! referral-sync
//!
//! Keeps a local ledger in step with the membership contract and exposes the
//! chain access layer used to submit paid actions.
//!
//! # Architecture Overview
//!
//! ```text
//!   presentation layer ──▶ TransactionOrchestrator ──▶ QueryService ──▶ TtlCache
//!                                   │                        │
//!                                   ▼                        ▼
//!                               ChainClient ◀── RateLimiter ─┘
//!                                   │  (ordered failover pool)
//!                                   ▼
//!                              JSON-RPC nodes
//!                                   ▲
//!   EventSyncEngine ──── logs ──────┘
//!         │
//!         ▼
//!      Ledger ──▶ ActionNotifier ──▶ notification layer
//! ```

use clap::Parser;
use std::path::PathBuf;

use referral_sync::config::load_config;
use referral_sync::lifecycle::{self, signals::wait_for_signal};
use referral_sync::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "referral-sync")]
#[command(about = "Chain access and event synchronization engine", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", cli.config.display(), e);
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "referral-sync starting");

    tracing::info!(
        endpoints = config.chain.endpoints.len(),
        chain_id = config.chain.chain_id,
        window_blocks = config.sync.window_blocks,
        interval_ms = config.sync.interval_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let services = lifecycle::start(config).await?;

    wait_for_signal().await;
    tracing::info!("Shutdown signal received");

    services.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
