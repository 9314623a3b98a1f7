//! Agent context: the capabilities the agent drives plus its latest view
//! of its own account and of the lending group.
//!
//! Every stage works on a single `AgentContext` and reloads it after each
//! state-changing action, so each decision is made on fresh state.

use alloy::primitives::Address;
use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use tracing::debug;

use crate::bank_metadata::BankMetadataCache;
use crate::config::BotConfig;
use liquidator_api::{SwapExecution, SwapParams, SwapRouter};
use liquidator_chain::u256_math::ui_to_native;
use liquidator_chain::{
    Account, AccountActions, Bank, GroupSnapshot, LedgerQuery, NativeReserve, PriceInfo,
    TokenWallet,
};

/// Everything the agent needs to observe and act.
pub struct AgentContext {
    ledger: Arc<dyn LedgerQuery>,
    actions: Arc<dyn AccountActions>,
    wallet: Arc<dyn TokenWallet>,
    swapper: Arc<dyn SwapRouter>,
    metadata: Arc<BankMetadataCache>,

    /// Mint everything is converted into
    reference_mint: Address,
    /// Native fee currency, if any
    native_mint: Option<Address>,
    /// Native tokens kept in the wallet for fees (UI units)
    native_buffer: f64,
    /// Slippage tolerance for rebalancing swaps
    slippage_bps: u16,

    account: Account,
    group: GroupSnapshot,
}

impl AgentContext {
    /// Create a context from separate capability providers. Call
    /// [`AgentContext::reload`] before first use.
    pub fn new(
        ledger: Arc<dyn LedgerQuery>,
        actions: Arc<dyn AccountActions>,
        wallet: Arc<dyn TokenWallet>,
        swapper: Arc<dyn SwapRouter>,
        reference_mint: Address,
    ) -> Self {
        let account = Account::new(actions.account_address(), wallet.owner());
        Self {
            ledger,
            actions,
            wallet,
            swapper,
            metadata: Arc::new(BankMetadataCache::new()),
            reference_mint,
            native_mint: None,
            native_buffer: 0.0,
            slippage_bps: 10_000,
            account,
            group: GroupSnapshot::new(),
        }
    }

    /// Create a context from one provider implementing every capability.
    pub fn from_provider<P>(provider: Arc<P>, config: &BotConfig) -> Self
    where
        P: LedgerQuery + AccountActions + TokenWallet + SwapRouter + 'static,
    {
        Self::new(
            provider.clone(),
            provider.clone(),
            provider.clone(),
            provider,
            config.assets.reference_mint,
        )
        .with_native_mint(config.assets.native_mint)
        .with_native_buffer(config.liquidator.min_native_balance)
        .with_slippage_bps(config.liquidator.swap_slippage_bps)
    }

    pub fn with_native_mint(mut self, native_mint: Option<Address>) -> Self {
        self.native_mint = native_mint;
        self
    }

    pub fn with_native_buffer(mut self, buffer: f64) -> Self {
        self.native_buffer = buffer.max(0.0);
        self
    }

    pub fn with_slippage_bps(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = slippage_bps;
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<BankMetadataCache>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn group(&self) -> &GroupSnapshot {
        &self.group
    }

    pub fn reference_mint(&self) -> Address {
        self.reference_mint
    }

    pub fn native_mint(&self) -> Option<Address> {
        self.native_mint
    }

    pub fn actions(&self) -> &dyn AccountActions {
        self.actions.as_ref()
    }

    pub fn ledger(&self) -> &dyn LedgerQuery {
        self.ledger.as_ref()
    }

    pub fn wallet_owner(&self) -> Address {
        self.wallet.owner()
    }

    pub fn metadata(&self) -> &BankMetadataCache {
        &self.metadata
    }

    /// Refetch banks and prices.
    pub async fn reload_group(&mut self) -> Result<()> {
        self.group = self.ledger.load_group().await.context("Failed to load group")?;
        Ok(())
    }

    /// Refetch the agent's own account.
    pub async fn reload_account(&mut self) -> Result<()> {
        let address = self.actions.account_address();
        self.account = self
            .ledger
            .load_account(address)
            .await
            .with_context(|| format!("Failed to load liquidator account {address}"))?;
        Ok(())
    }

    pub async fn reload(&mut self) -> Result<()> {
        self.reload_group().await?;
        self.reload_account().await
    }

    /// The bank holding the reference currency.
    pub fn reference_bank(&self) -> Result<Bank> {
        self.group
            .bank_by_mint(&self.reference_mint)
            .cloned()
            .ok_or_else(|| anyhow!("no bank for reference mint {}", self.reference_mint))
    }

    pub fn is_reference(&self, bank: &Bank) -> bool {
        bank.mint == self.reference_mint
    }

    /// Bank and oracle price, owned so the context can be reloaded meanwhile.
    pub fn priced_bank(&self, bank: &Address) -> Result<(Bank, PriceInfo)> {
        self.group
            .bank_with_price(bank)
            .map(|(bank, price)| (bank.clone(), *price))
            .ok_or_else(|| anyhow!("bank {bank} or its price is unknown"))
    }

    /// Display symbol of a bank's token.
    pub fn symbol(&self, bank: &Bank) -> String {
        self.metadata.symbol_for(&bank.address, &bank.mint)
    }

    /// Spendable wallet balance of a mint (UI units). The native
    /// currency keeps `reserve` of the fee buffer back.
    pub async fn token_balance(&self, mint: Address, reserve: NativeReserve) -> Result<f64> {
        let balance = self
            .wallet
            .token_balance(mint)
            .await
            .with_context(|| format!("Failed to read wallet balance of {mint}"))?;

        if self.native_mint == Some(mint) {
            return Ok(reserve.spendable(balance, self.native_buffer));
        }
        Ok(balance)
    }

    /// Swap `amount` (UI units) of `mint_in` into `mint_out` through the
    /// first route the router returns.
    pub async fn swap(&self, mint_in: Address, mint_out: Address, amount: f64) -> Result<SwapExecution> {
        let decimals = self
            .group
            .bank_by_mint(&mint_in)
            .map(|b| b.mint_decimals)
            .ok_or_else(|| anyhow!("no bank for swap input {mint_in}"))?;

        let amount_in = ui_to_native(amount, decimals);
        if amount_in.is_zero() {
            bail!("swap amount {amount} of {mint_in} rounds to zero");
        }

        debug!(mint_in = %mint_in, mint_out = %mint_out, amount, "Swapping");

        let params = SwapParams::new(mint_in, mint_out, amount_in, decimals)
            .with_slippage_bps(self.slippage_bps);
        let route = self
            .swapper
            .get_route(params)
            .await
            .with_context(|| format!("No route from {mint_in} to {mint_out}"))?;
        if route.is_empty() {
            bail!("empty route from {mint_in} to {mint_out}");
        }

        let execution = self.swapper.execute(&route).await.context("Swap failed")?;
        debug!(signature = %execution.signature, router = %route.router, "Trade successful");
        Ok(execution)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for the stage tests.

    use super::*;
    use liquidator_chain::{BankConfig, RiskTier, SimulatedLedger};

    pub const LIQUIDATOR: Address = Address::repeat_byte(0xf0);
    pub const OWNER: Address = Address::repeat_byte(0xf1);

    pub const USDC_BANK: Address = Address::repeat_byte(0x01);
    pub const SOL_BANK: Address = Address::repeat_byte(0x02);
    pub const BONK_BANK: Address = Address::repeat_byte(0x03);

    pub const USDC: Address = Address::repeat_byte(0xa1);
    pub const SOL: Address = Address::repeat_byte(0xa2);
    pub const BONK: Address = Address::repeat_byte(0xa3);

    pub fn weights(asset_init: f64, asset_maint: f64) -> BankConfig {
        BankConfig {
            asset_weight_init: asset_init,
            asset_weight_maint: asset_maint,
            liability_weight_init: 1.0,
            liability_weight_maint: 1.0,
            risk_tier: RiskTier::Collateral,
        }
    }

    /// USDC at $1, SOL at $100, BONK at $0.00002.
    pub fn ledger() -> SimulatedLedger {
        SimulatedLedger::new(LIQUIDATOR, OWNER)
            .with_bank(Bank::new(USDC_BANK, USDC, 6, weights(1.0, 1.0)), PriceInfo::new(1.0, 0.0))
            .with_bank(Bank::new(SOL_BANK, SOL, 9, weights(0.5, 0.6)), PriceInfo::new(100.0, 0.0))
            .with_bank(Bank::new(BONK_BANK, BONK, 5, weights(0.3, 0.4)), PriceInfo::new(0.00002, 0.0))
    }

    pub fn config() -> BotConfig {
        let mut config = BotConfig::default();
        config.assets.reference_mint = USDC;
        config.liquidator.swap_slippage_bps = 50;
        config
    }

    pub async fn context(ledger: &Arc<SimulatedLedger>) -> AgentContext {
        let mut ctx = AgentContext::from_provider(ledger.clone(), &config());
        ctx.reload().await.unwrap();
        ctx
    }

    /// (assets, liabilities) of an account in a bank, UI units.
    pub fn position(ledger: &SimulatedLedger, account: &Address, bank: &Bank) -> (f64, f64) {
        ledger
            .account(account)
            .and_then(|a| a.balance(&bank.address).map(|b| b.compute_quantity_ui(bank)))
            .map(|q| (q.assets, q.liabilities))
            .unwrap_or((0.0, 0.0))
    }
}
