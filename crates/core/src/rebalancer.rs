//! Rebalancing of the liquidator's own account.
//!
//! The agent wants its lending account to hold only reference-currency
//! collateral and no debt, so all of it is available as buying power for
//! the next liquidation. Rebalancing runs three stages in order, always
//! from the top and always on freshly loaded state:
//!
//! 1. sell non-reference deposits (as far as free collateral allows)
//! 2. buy back and repay non-reference liabilities
//! 3. deposit the remaining reference currency
//!
//! Collateral that stays tied up after one pass is released by the next.

use alloy::primitives::Address;
use anyhow::{bail, Result};
use tracing::{debug, info, instrument};

use crate::collateral_converter::DUST_THRESHOLD_UI;
use crate::context::AgentContext;
use liquidator_chain::{Bank, MarginRequirement, NativeReserve, PriceBias};

/// Smallest USD value bought to repay a liability. Tiny debts in
/// low-priced tokens cannot be bought exactly, so a little more is bought
/// and the excess repaid.
pub const MIN_LIABILITY_PURCHASE_USD: f64 = 1.0;

pub struct Rebalancer;

impl Rebalancer {
    /// Whether the account holds non-dust non-reference collateral or any
    /// debt. Reloads the group and the account first.
    #[instrument(skip_all, fields(stage = "rebalance-check"))]
    pub async fn needs_rebalance(ctx: &mut AgentContext) -> Result<bool> {
        debug!("Checking if liquidator needs to be rebalanced");
        ctx.reload().await?;

        let mut needed = false;
        for balance in ctx.account().active_balances() {
            let Some(bank) = ctx.group().bank(&balance.bank) else {
                continue;
            };
            let quantity = balance.compute_quantity_ui(bank);
            let foreign_collateral = quantity.assets > DUST_THRESHOLD_UI && !ctx.is_reference(bank);

            if foreign_collateral || quantity.liabilities > 0.0 {
                debug!(
                    bank = %ctx.symbol(bank),
                    assets = quantity.assets,
                    liabilities = quantity.liabilities,
                    "Lending account to rebalance"
                );
                needed = true;
            }
        }

        debug!(needed, "Liquidator account needs to be rebalanced");
        Ok(needed)
    }

    /// Run all three stages.
    pub async fn rebalance(ctx: &mut AgentContext) -> Result<()> {
        info!("Starting rebalancing stage");
        Self::sell_non_reference_deposits(ctx).await?;
        Self::repay_all_debt(ctx).await?;
        Self::deposit_remaining_reference(ctx).await?;
        Ok(())
    }

    /// Stage 1: withdraw every untied non-reference deposit and sell it.
    #[instrument(skip_all, fields(stage = "sell-non-reference-deposits"))]
    pub async fn sell_non_reference_deposits(ctx: &mut AgentContext) -> Result<()> {
        debug!("Starting non-reference deposit sell step (1/3)");
        ctx.reload().await?;

        let targets: Vec<(Bank, f64)> = ctx
            .account()
            .active_balances()
            .filter_map(|balance| {
                let bank = ctx.group().bank(&balance.bank)?;
                let assets = balance.compute_quantity_ui(bank).assets;
                (assets > DUST_THRESHOLD_UI && !ctx.is_reference(bank)).then(|| (bank.clone(), assets))
            })
            .collect();

        for (bank, assets) in targets {
            let symbol = ctx.symbol(&bank);
            let max_withdraw = ctx
                .account()
                .compute_max_withdraw_for_bank(ctx.group(), &bank.address);

            // Less than one native unit cannot be withdrawn
            if bank.ui_to_native(max_withdraw) < 1.0 {
                debug!(symbol = %symbol, "No untied collateral to withdraw");
                continue;
            }

            let withdraw_all = max_withdraw >= assets;
            debug!(amount = max_withdraw, symbol = %symbol, withdraw_all, "Withdrawing");
            let signature = ctx
                .actions()
                .withdraw(max_withdraw, bank.address, withdraw_all)
                .await?;
            debug!(tx = %signature, "Withdraw tx");

            ctx.reload_account().await?;

            let balance = ctx.token_balance(bank.mint, NativeReserve::Full).await?;
            if balance <= 0.0 {
                debug!(symbol = %symbol, "Nothing spendable to swap after withdrawal");
                continue;
            }

            debug!(amount = balance, symbol = %symbol, "Swapping to reference currency");
            ctx.swap(bank.mint, ctx.reference_mint(), balance).await?;
        }

        Ok(())
    }

    /// Stage 2: buy each non-reference liability with reference currency,
    /// withdrawing any shortfall from the reference bank, and repay it.
    #[instrument(skip_all, fields(stage = "repay-all-debt"))]
    pub async fn repay_all_debt(ctx: &mut AgentContext) -> Result<()> {
        debug!("Starting debt repayment step (2/3)");
        ctx.reload().await?;

        let debts: Vec<(Address, f64)> = ctx
            .account()
            .active_balances()
            .filter_map(|balance| {
                let bank = ctx.group().bank(&balance.bank)?;
                let liabilities = balance.compute_quantity(bank).liabilities;
                (liabilities > 0.0 && !ctx.is_reference(bank)).then_some((bank.address, liabilities))
            })
            .collect();

        for (bank_address, liabilities) in debts {
            Self::repay_liability(ctx, bank_address, liabilities).await?;
        }

        Ok(())
    }

    async fn repay_liability(ctx: &mut AgentContext, bank: Address, liabilities: f64) -> Result<()> {
        let reference_mint = ctx.reference_mint();
        let mut available = ctx.token_balance(reference_mint, NativeReserve::Full).await?;

        ctx.reload_group().await?;
        let reference_bank = ctx.reference_bank()?;
        let (bank, price) = ctx.priced_bank(&bank)?;
        let symbol = ctx.symbol(&bank);
        let liabilities_ui = bank.native_to_ui(liabilities);
        debug!(amount = liabilities_ui, symbol = %symbol, "Repaying");

        let withdraw_capacity = ctx
            .account()
            .compute_max_withdraw_for_bank(ctx.group(), &reference_bank.address);

        let base_value = bank.compute_liability_usd_value(
            &price,
            liabilities,
            MarginRequirement::Equity,
            PriceBias::None,
        );
        let liability_value = base_value.max(MIN_LIABILITY_PURCHASE_USD);
        debug!(usd = liability_value, "Liability value");

        let missing = liability_value - available.min(liability_value);
        if missing > 0.0 {
            let to_withdraw = missing.min(withdraw_capacity);
            if to_withdraw > 0.0 {
                debug!(amount = to_withdraw, "Withdrawing reference currency");
                let signature = ctx
                    .actions()
                    .withdraw(to_withdraw, reference_bank.address, false)
                    .await?;
                debug!(tx = %signature, "Withdraw tx");
                ctx.reload_account().await?;
            }
            available = ctx.token_balance(reference_mint, NativeReserve::Full).await?;
        }

        let buying_power = available.min(liability_value);
        if buying_power <= 0.0 {
            bail!("no reference currency available to buy back {symbol} liability");
        }

        debug!(amount = buying_power, symbol = %symbol, "Buying liability with reference currency");
        ctx.swap(reference_mint, bank.mint, buying_power).await?;

        let purchased = ctx.token_balance(bank.mint, NativeReserve::Half).await?;
        let repay_amount = purchased.min(liabilities_ui);
        if repay_amount <= 0.0 {
            bail!("swap into {symbol} delivered nothing to repay with");
        }

        let repay_all = purchased >= liabilities_ui;
        debug!(amount = repay_amount, symbol = %symbol, repay_all, "Repaying liability");
        let signature = ctx.actions().repay(repay_amount, bank.address, repay_all).await?;
        debug!(tx = %signature, "Repay tx");

        ctx.reload_account().await?;
        Ok(())
    }

    /// Stage 3: deposit whatever reference currency the wallet holds.
    #[instrument(skip_all, fields(stage = "deposit-remaining-reference"))]
    pub async fn deposit_remaining_reference(ctx: &mut AgentContext) -> Result<()> {
        debug!("Starting remaining reference deposit step (3/3)");

        let balance = ctx
            .token_balance(ctx.reference_mint(), NativeReserve::Full)
            .await?;
        if balance <= 0.0 {
            debug!("No reference currency to deposit");
            return Ok(());
        }

        let reference_bank = ctx.reference_bank()?;
        let signature = ctx.actions().deposit(balance, reference_bank.address).await?;
        debug!(amount = balance, tx = %signature, "Deposit tx");

        ctx.reload_account().await?;
        Ok(())
    }
}
