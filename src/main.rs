//! Lending-protocol liquidation agent
//!
//! Keeps one lending account balanced in a reference currency and
//! liquidates unhealthy accounts with it:
//! - Startup sweep of wallet tokens into the lending account
//! - Three-stage rebalancing whenever non-reference positions exist
//! - Randomized scan for the first profitable liquidation
//!
//! Runs against the paper ledger loaded from `LEDGER_SNAPSHOT`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidator_api::BankMetadataClient;
use liquidator_chain::{LedgerSnapshot, SimulatedLedger};
use liquidator_core::{
    reporter_from_env, AgentContext, BankMetadataCache, BotConfig, Liquidator,
    DEFAULT_REPORT_COOLDOWN,
};

/// Environment variable names.
mod env {
    pub const LEDGER_SNAPSHOT: &str = "LEDGER_SNAPSHOT";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

const DEFAULT_SNAPSHOT: &str = "fixtures/paper-ledger.json";

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    dotenvy::dotenv().ok();
    init_tracing();

    // BOT_PROFILE or LIQUIDATOR_CONFIG, then env overrides
    let config = BotConfig::from_env()?;
    config.log_config();

    let snapshot_path =
        std::env::var(env::LEDGER_SNAPSHOT).unwrap_or_else(|_| DEFAULT_SNAPSHOT.to_string());
    let snapshot = LedgerSnapshot::load(&snapshot_path)?;
    info!(path = %snapshot_path, banks = snapshot.banks.len(), accounts = snapshot.accounts.len(), "Paper ledger loaded");

    let metadata = Arc::new(BankMetadataCache::with_metadata(snapshot.metadata()));
    let liquidator_account = snapshot.liquidator;
    let ledger = Arc::new(SimulatedLedger::from_snapshot(snapshot));

    // Remote metadata replaces the snapshot's on each refresh
    let _refresh = config.metadata.url.as_ref().map(|url| {
        info!(url = %url, "Bank metadata refresh enabled");
        metadata.spawn_refresh(BankMetadataClient::new(url.clone()), config.metadata.refresh_interval())
    });

    let reporter = reporter_from_env(DEFAULT_REPORT_COOLDOWN, Some(liquidator_account));

    let ctx = AgentContext::from_provider(ledger, &config).with_metadata(metadata);
    let mut liquidator = Liquidator::new(ctx, &config, reporter);

    info!("Starting liquidator");
    liquidator.start().await.context("Liquidator stopped")?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,liquidator_core=debug,liquidator_chain=debug"));

    let json = std::env::var(env::LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    ╦  ┬┌─┐ ┬ ┬┬┌┬┐┌─┐┌┬┐┌─┐┬─┐
    ║  ││─┼┐│ ││ ││├─┤ │ │ │├┬┘
    ╩═╝┴└─┘└└─┘┴─┴┘┴ ┴ ┴ └─┘┴└─
    Lending Liquidator v0.1.0
    "#
    );
}
