//! Startup sweep of the wallet into the reference currency.
//!
//! Every token the wallet holds outside the lending account (except the
//! reference and native currencies) first pays down a matching liability,
//! then is sold for the reference currency. All reference currency is then
//! deposited into the lending account.

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::context::AgentContext;
use liquidator_chain::NativeReserve;

/// Wallet and lending balances at or below this many UI units are dust.
///
/// Measured in token units, not USD: for a high-priced token up to 0.1
/// units (thousands of dollars of BTC) stay as non-reference collateral
/// and are never sold.
pub const DUST_THRESHOLD_UI: f64 = 0.1;

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Banks whose wallet tokens repaid a liability
    pub repaid: usize,
    /// Banks whose wallet tokens were sold
    pub swapped: usize,
    /// Reference currency deposited at the end (UI units)
    pub deposited: f64,
}

pub struct CollateralConverter;

impl CollateralConverter {
    #[instrument(skip_all, fields(stage = "swap-non-reference-in-wallet"))]
    pub async fn sweep(ctx: &mut AgentContext) -> Result<SweepReport> {
        debug!("Swapping any remaining non-reference tokens to the reference currency");
        ctx.reload().await?;

        let mut report = SweepReport::default();
        let reference_bank = ctx.reference_bank()?;
        let banks: Vec<_> = ctx.group().banks().cloned().collect();

        for bank in banks {
            if ctx.is_reference(&bank) || Some(bank.mint) == ctx.native_mint() {
                continue;
            }

            let mut amount = ctx.token_balance(bank.mint, NativeReserve::Full).await?;
            if amount <= DUST_THRESHOLD_UI {
                continue;
            }

            let liabilities = ctx
                .account()
                .balance(&bank.address)
                .map(|b| b.compute_quantity_ui(&bank).liabilities)
                .unwrap_or(0.0);

            if liabilities > 0.0 {
                let symbol = ctx.symbol(&bank);
                let repay = amount.min(liabilities);
                debug!(liabilities, amount = repay, symbol = %symbol, "Paying off liabilities");
                ctx.actions()
                    .repay(repay, bank.address, amount >= liabilities)
                    .await?;
                ctx.reload_account().await?;
                report.repaid += 1;

                amount = ctx.token_balance(bank.mint, NativeReserve::Full).await?;
                // Everything went into the repayment
                if amount <= 0.0 {
                    continue;
                }
            }

            debug!(amount, symbol = %ctx.symbol(&bank), "Swapping to reference currency");
            ctx.swap(bank.mint, ctx.reference_mint(), amount).await?;
            report.swapped += 1;
        }

        let reference_balance = ctx
            .token_balance(ctx.reference_mint(), NativeReserve::Full)
            .await?;
        if reference_balance <= 0.0 {
            debug!("No reference currency to deposit");
            return Ok(report);
        }

        debug!(amount = reference_balance, "Depositing reference currency");
        let signature = ctx
            .actions()
            .deposit(reference_balance, reference_bank.address)
            .await?;
        debug!(tx = %signature, "Deposit tx");
        report.deposited = reference_balance;

        info!(
            repaid = report.repaid,
            swapped = report.swapped,
            deposited = report.deposited,
            "Wallet sweep complete"
        );
        Ok(report)
    }
}
