//! Liquidation executor.
//!
//! Submits one liquidation instruction for a selected candidate. There is
//! no retry: the next loop iteration re-evaluates from fresh state.

use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{info, instrument};

use crate::context::AgentContext;
use crate::target_selector::LiquidationCandidate;

/// Result of a submitted liquidation.
#[derive(Debug, Clone)]
pub struct LiquidationResult {
    /// Liquidated account
    pub account: Address,
    /// Seized collateral bank
    pub collateral_bank: Address,
    /// Repaid liability bank
    pub liability_bank: Address,
    /// Seized collateral (UI units)
    pub seized: f64,
    /// Liquidation transaction
    pub signature: B256,
    /// Submission time (ms)
    pub elapsed_ms: u128,
}

pub struct LiquidationExecutor;

impl LiquidationExecutor {
    #[instrument(skip_all, fields(account = %candidate.account))]
    pub async fn execute(
        ctx: &AgentContext,
        candidate: &LiquidationCandidate,
    ) -> Result<LiquidationResult> {
        let (collateral, _) = ctx.priced_bank(&candidate.collateral_bank)?;
        let (liability, _) = ctx.priced_bank(&candidate.liability_bank)?;

        info!(
            amount = candidate.seize_amount,
            usd = format!("${:.2}", candidate.seize_usd),
            collateral = %ctx.symbol(&collateral),
            liability = %ctx.symbol(&liability),
            "Liquidating"
        );

        let start = Instant::now();
        let signature = ctx
            .actions()
            .liquidate(
                candidate.account,
                candidate.collateral_bank,
                candidate.seize_amount,
                candidate.liability_bank,
            )
            .await
            .with_context(|| format!("Liquidation of {} failed", candidate.account))?;
        let elapsed_ms = start.elapsed().as_millis();

        info!(tx = %signature, elapsed_ms, "Liquidation tx");

        Ok(LiquidationResult {
            account: candidate.account,
            collateral_bank: candidate.collateral_bank,
            liability_bank: candidate.liability_bank,
            seized: candidate.seize_amount,
            signature,
            elapsed_ms,
        })
    }
}
