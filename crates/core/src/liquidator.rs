//! Main loop.
//!
//! Each iteration either rebalances the agent or runs one liquidation
//! scan. Errors abort the iteration, are reported, and the loop sleeps
//! before starting over from fresh state.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use crate::collateral_converter::{CollateralConverter, SweepReport};
use crate::config::BotConfig;
use crate::context::AgentContext;
use crate::executor::{LiquidationExecutor, LiquidationResult};
use crate::rebalancer::Rebalancer;
use crate::reporter::ErrorReporter;
use crate::target_selector::{AccountFilter, SelectionParams, TargetSelector};

/// What a single loop iteration did.
#[derive(Debug, Clone)]
pub enum IterationOutcome {
    /// Ran all three rebalancing stages
    Rebalanced,
    /// Executed one liquidation
    Liquidated(LiquidationResult),
    /// Nothing to do
    Idle,
    /// The iteration raised an error
    Failed,
}

impl IterationOutcome {
    /// Whether the loop waits before the next iteration.
    pub fn sleeps(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed)
    }
}

/// Counters for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub rebalances: u64,
    pub liquidations: u64,
    pub idle: u64,
    pub failures: u64,
}

impl LoopStats {
    fn record(&mut self, outcome: &IterationOutcome) {
        self.iterations += 1;
        match outcome {
            IterationOutcome::Rebalanced => self.rebalances += 1,
            IterationOutcome::Liquidated(_) => self.liquidations += 1,
            IterationOutcome::Idle => self.idle += 1,
            IterationOutcome::Failed => self.failures += 1,
        }
    }
}

/// The liquidation agent.
pub struct Liquidator {
    ctx: AgentContext,
    selector: TargetSelector,
    reporter: Arc<dyn ErrorReporter>,
    sleep_interval: Duration,
    whitelist: Option<Vec<Address>>,
    blacklist: Option<Vec<Address>>,
}

impl Liquidator {
    pub fn new(ctx: AgentContext, config: &BotConfig, reporter: Arc<dyn ErrorReporter>) -> Self {
        let selector = TargetSelector::new(
            AccountFilter::from_config(&config.accounts),
            SelectionParams::from_config(config),
        );

        Self {
            ctx,
            selector,
            reporter,
            sleep_interval: config.liquidator.sleep_interval(),
            whitelist: config.accounts.whitelist.clone(),
            blacklist: config.accounts.blacklist.clone(),
        }
    }

    /// Replace the target selector (seeded scan order in tests).
    pub fn with_selector(mut self, selector: TargetSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    /// Sweep the wallet once, then loop forever. Startup failures are
    /// reported and left for the loop to recover from.
    pub async fn start(&mut self) -> Result<()> {
        if let Err(e) = self.ctx.reload().await {
            error!(error = %format!("{e:#}"), "Initial state load failed");
            self.reporter.report_error(&e).await;
        }
        self.log_startup();

        self.initial_sweep().await;
        self.run(None).await?;
        Ok(())
    }

    fn log_startup(&self) {
        info!("Liquidator account loaded");
        info!(wallet = %self.ctx.wallet_owner(), "Wallet");
        info!(account = %self.ctx.account().address, "Liquidator account");
        info!(mint = %self.ctx.reference_mint(), "Reference currency");

        match (&self.whitelist, &self.blacklist) {
            (Some(whitelist), _) => info!(accounts = ?whitelist, "Whitelist"),
            (None, Some(blacklist)) => info!(accounts = ?blacklist, "Blacklist"),
            (None, None) => info!("Monitoring all accounts"),
        }

        let params = self.selector.params();
        info!(
            banks = self.ctx.group().len(),
            min_usd = params.min_liquidation_amount_usd,
            exclude_isolated = params.exclude_isolated_banks,
            "Liquidating on banks"
        );
    }

    /// Run the wallet sweep. A failure is reported and otherwise ignored.
    pub async fn initial_sweep(&mut self) -> Option<SweepReport> {
        match CollateralConverter::sweep(&mut self.ctx).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Initial wallet sweep failed");
                self.reporter.report_error(&e).await;
                None
            }
        }
    }

    /// Run the loop. `None` runs until the process exits.
    pub async fn run(&mut self, max_iterations: Option<u64>) -> Result<LoopStats> {
        let mut stats = LoopStats::default();

        while max_iterations.map_or(true, |max| stats.iterations < max) {
            let outcome = match self.iteration().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %format!("{e:#}"), "Iteration failed");
                    self.reporter.report_error(&e).await;
                    IterationOutcome::Failed
                }
            };
            stats.record(&outcome);

            if outcome.sleeps() {
                debug!(ms = self.sleep_interval.as_millis() as u64, "Sleeping");
                tokio::time::sleep(self.sleep_interval).await;
            }
        }

        Ok(stats)
    }

    /// One pass: rebalance if needed, otherwise try one liquidation.
    pub async fn iteration(&mut self) -> Result<IterationOutcome> {
        if Rebalancer::needs_rebalance(&mut self.ctx).await? {
            self.reporter.report_message("Starting rebalancing stage").await;
            Rebalancer::rebalance(&mut self.ctx).await?;
            return Ok(IterationOutcome::Rebalanced);
        }

        Ok(match self.liquidation_stage().await? {
            Some(result) => IterationOutcome::Liquidated(result),
            None => IterationOutcome::Idle,
        })
    }

    #[instrument(skip_all, fields(stage = "liquidation-stage"))]
    async fn liquidation_stage(&mut self) -> Result<Option<LiquidationResult>> {
        debug!("Started liquidation stage");
        self.ctx.reload().await?;

        let accounts = self
            .ctx
            .ledger()
            .all_accounts()
            .await
            .context("Failed to load accounts")?;

        let Some(candidate) = self
            .selector
            .select(self.ctx.account(), accounts, self.ctx.group())
        else {
            debug!("No liquidatable accounts");
            return Ok(None);
        };

        self.reporter
            .report_message(&format!("Liquidating account {}", candidate.account))
            .await;

        let result = LiquidationExecutor::execute(&self.ctx, &candidate).await?;
        Ok(Some(result))
    }
}
