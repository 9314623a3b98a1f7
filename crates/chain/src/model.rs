//! Lending protocol data model as observed by the liquidator.
//!
//! Banks hold the static and dynamic metadata of a supported asset,
//! balances record an account's shares in a bank, and the group snapshot
//! ties banks to their latest oracle prices.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Share count below which a balance side is considered empty (1 native unit).
pub const EMPTY_BALANCE_THRESHOLD: f64 = 1.0;

/// Valuation mode selecting which weight applies to a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarginRequirement {
    /// Weights used when opening new positions
    Initial,
    /// Weights used for the liquidation test
    Maintenance,
    /// Unweighted (weight = 1)
    Equity,
}

/// Oracle price adjustment used for conservative valuations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceBias {
    /// Raw oracle price
    None,
    /// Price minus confidence interval
    Lowest,
    /// Price plus confidence interval
    Highest,
}

/// Point-in-time oracle snapshot for a bank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceInfo {
    /// USD price per UI unit
    pub price: f64,
    /// Confidence interval (USD)
    #[serde(default)]
    pub confidence: f64,
}

impl PriceInfo {
    pub fn new(price: f64, confidence: f64) -> Self {
        Self { price, confidence }
    }

    /// Price adjusted by the requested bias, never negative.
    pub fn biased(&self, bias: PriceBias) -> f64 {
        match bias {
            PriceBias::None => self.price,
            PriceBias::Lowest => (self.price - self.confidence).max(0.0),
            PriceBias::Highest => self.price + self.confidence,
        }
    }
}

/// Risk classification of a bank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    #[default]
    Collateral,
    /// Borrowing this asset prevents borrowing anything else
    Isolated,
}

/// Weight configuration of a bank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BankConfig {
    pub asset_weight_init: f64,
    pub asset_weight_maint: f64,
    pub liability_weight_init: f64,
    pub liability_weight_maint: f64,
    #[serde(default)]
    pub risk_tier: RiskTier,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            asset_weight_init: 1.0,
            asset_weight_maint: 1.0,
            liability_weight_init: 1.0,
            liability_weight_maint: 1.0,
            risk_tier: RiskTier::Collateral,
        }
    }
}

/// A supported asset of the lending group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bank {
    pub address: Address,
    pub mint: Address,
    pub mint_decimals: u8,
    /// Native units per asset share
    #[serde(default = "default_share_value")]
    pub asset_share_value: f64,
    /// Native units per liability share
    #[serde(default = "default_share_value")]
    pub liability_share_value: f64,
    #[serde(default)]
    pub config: BankConfig,
}

fn default_share_value() -> f64 {
    1.0
}

impl Bank {
    pub fn new(address: Address, mint: Address, mint_decimals: u8, config: BankConfig) -> Self {
        Self {
            address,
            mint,
            mint_decimals,
            asset_share_value: 1.0,
            liability_share_value: 1.0,
            config,
        }
    }

    /// Isolated banks are excluded from collateral (zero initial asset weight)
    /// or explicitly flagged.
    pub fn is_isolated(&self) -> bool {
        self.config.risk_tier == RiskTier::Isolated || self.config.asset_weight_init == 0.0
    }

    pub fn asset_weight(&self, requirement: MarginRequirement) -> f64 {
        match requirement {
            MarginRequirement::Initial => self.config.asset_weight_init,
            MarginRequirement::Maintenance => self.config.asset_weight_maint,
            MarginRequirement::Equity => 1.0,
        }
    }

    pub fn liability_weight(&self, requirement: MarginRequirement) -> f64 {
        match requirement {
            MarginRequirement::Initial => self.config.liability_weight_init,
            MarginRequirement::Maintenance => self.config.liability_weight_maint,
            MarginRequirement::Equity => 1.0,
        }
    }

    /// Scale a native quantity down to UI units.
    pub fn native_to_ui(&self, native: f64) -> f64 {
        native / 10f64.powi(self.mint_decimals as i32)
    }

    /// Scale a UI quantity up to native units.
    pub fn ui_to_native(&self, ui: f64) -> f64 {
        ui * 10f64.powi(self.mint_decimals as i32)
    }

    /// Unweighted USD value of a UI quantity.
    pub fn compute_usd_value(&self, price: &PriceInfo, quantity_ui: f64, bias: PriceBias) -> f64 {
        quantity_ui * price.biased(bias)
    }

    /// Weighted USD value of a native asset quantity.
    pub fn compute_asset_usd_value(
        &self,
        price: &PriceInfo,
        quantity_native: f64,
        requirement: MarginRequirement,
        bias: PriceBias,
    ) -> f64 {
        self.compute_usd_value(price, self.native_to_ui(quantity_native), bias)
            * self.asset_weight(requirement)
    }

    /// Weighted USD value of a native liability quantity.
    pub fn compute_liability_usd_value(
        &self,
        price: &PriceInfo,
        quantity_native: f64,
        requirement: MarginRequirement,
        bias: PriceBias,
    ) -> f64 {
        self.compute_usd_value(price, self.native_to_ui(quantity_native), bias)
            * self.liability_weight(requirement)
    }

    /// UI quantity of this bank's asset worth `usd_value` at the biased price.
    pub fn compute_quantity_from_usd_value(
        &self,
        price: &PriceInfo,
        usd_value: f64,
        bias: PriceBias,
    ) -> f64 {
        let price = price.biased(bias);
        if price <= 0.0 {
            return 0.0;
        }
        usd_value / price
    }
}

/// Asset and liability quantities of a balance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quantity {
    pub assets: f64,
    pub liabilities: f64,
}

/// Asset and liability USD values of a balance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsdValue {
    pub assets: f64,
    pub liabilities: f64,
}

/// Per-bank position of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub bank: Address,
    #[serde(default)]
    pub asset_shares: f64,
    #[serde(default)]
    pub liability_shares: f64,
}

impl Balance {
    pub fn new(bank: Address) -> Self {
        Self {
            bank,
            asset_shares: 0.0,
            liability_shares: 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.asset_shares >= EMPTY_BALANCE_THRESHOLD
            || self.liability_shares >= EMPTY_BALANCE_THRESHOLD
    }

    /// Native quantities.
    pub fn compute_quantity(&self, bank: &Bank) -> Quantity {
        Quantity {
            assets: self.asset_shares * bank.asset_share_value,
            liabilities: self.liability_shares * bank.liability_share_value,
        }
    }

    /// UI-scaled quantities.
    pub fn compute_quantity_ui(&self, bank: &Bank) -> Quantity {
        let native = self.compute_quantity(bank);
        Quantity {
            assets: bank.native_to_ui(native.assets),
            liabilities: bank.native_to_ui(native.liabilities),
        }
    }

    /// USD value with conservative prices: assets at the lowest and
    /// liabilities at the highest end of the confidence interval.
    pub fn compute_usd_value(
        &self,
        bank: &Bank,
        price: &PriceInfo,
        requirement: MarginRequirement,
    ) -> UsdValue {
        let quantity = self.compute_quantity(bank);
        UsdValue {
            assets: bank.compute_asset_usd_value(
                price,
                quantity.assets,
                requirement,
                PriceBias::Lowest,
            ),
            liabilities: bank.compute_liability_usd_value(
                price,
                quantity.liabilities,
                requirement,
                PriceBias::Highest,
            ),
        }
    }
}

/// A participant's lending account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub authority: Address,
    #[serde(default)]
    pub balances: Vec<Balance>,
}

impl Account {
    pub fn new(address: Address, authority: Address) -> Self {
        Self {
            address,
            authority,
            balances: Vec::new(),
        }
    }

    pub fn active_balances(&self) -> impl Iterator<Item = &Balance> {
        self.balances.iter().filter(|b| b.is_active())
    }

    /// Active balance for a bank, if any.
    pub fn balance(&self, bank: &Address) -> Option<&Balance> {
        self.active_balances().find(|b| &b.bank == bank)
    }

    /// Balance for a bank, created empty when missing.
    pub fn balance_mut(&mut self, bank: Address) -> &mut Balance {
        if let Some(idx) = self.balances.iter().position(|b| b.bank == bank) {
            &mut self.balances[idx]
        } else {
            self.balances.push(Balance::new(bank));
            let last = self.balances.len() - 1;
            &mut self.balances[last]
        }
    }
}

/// Banks and oracle prices of a lending group at one point in time.
#[derive(Debug, Clone, Default)]
pub struct GroupSnapshot {
    banks: HashMap<Address, Bank>,
    prices: HashMap<Address, PriceInfo>,
}

impl GroupSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bank(mut self, bank: Bank, price: PriceInfo) -> Self {
        self.insert(bank, price);
        self
    }

    pub fn insert(&mut self, bank: Bank, price: PriceInfo) {
        self.prices.insert(bank.address, price);
        self.banks.insert(bank.address, bank);
    }

    pub fn bank(&self, address: &Address) -> Option<&Bank> {
        self.banks.get(address)
    }

    pub fn bank_by_mint(&self, mint: &Address) -> Option<&Bank> {
        self.banks.values().find(|b| &b.mint == mint)
    }

    pub fn price(&self, bank: &Address) -> Option<&PriceInfo> {
        self.prices.get(bank)
    }

    /// Bank and price together, the pair every valuation needs.
    pub fn bank_with_price(&self, address: &Address) -> Option<(&Bank, &PriceInfo)> {
        Some((self.banks.get(address)?, self.prices.get(address)?))
    }

    pub fn banks(&self) -> impl Iterator<Item = &Bank> {
        self.banks.values()
    }

    pub fn len(&self) -> usize {
        self.banks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sol_bank() -> Bank {
        Bank::new(
            Address::repeat_byte(0x11),
            Address::repeat_byte(0x21),
            9,
            BankConfig {
                asset_weight_init: 0.8,
                asset_weight_maint: 0.9,
                liability_weight_init: 1.25,
                liability_weight_maint: 1.1,
                risk_tier: RiskTier::Collateral,
            },
        )
    }

    #[test]
    fn test_price_bias() {
        let price = PriceInfo::new(100.0, 2.0);
        assert_eq!(price.biased(PriceBias::None), 100.0);
        assert_eq!(price.biased(PriceBias::Lowest), 98.0);
        assert_eq!(price.biased(PriceBias::Highest), 102.0);

        let thin = PriceInfo::new(1.0, 5.0);
        assert_eq!(thin.biased(PriceBias::Lowest), 0.0);
    }

    #[test]
    fn test_balance_quantity_and_activity() {
        let mut bank = sol_bank();
        bank.asset_share_value = 1.5;

        let mut balance = Balance::new(bank.address);
        assert!(!balance.is_active());

        balance.asset_shares = 2_000_000_000.0;
        assert!(balance.is_active());

        let quantity = balance.compute_quantity(&bank);
        assert_eq!(quantity.assets, 3_000_000_000.0);
        assert_eq!(balance.compute_quantity_ui(&bank).assets, 3.0);

        balance.asset_shares = 0.5;
        assert!(!balance.is_active());
    }

    #[test]
    fn test_weighted_usd_values() {
        let bank = sol_bank();
        let price = PriceInfo::new(100.0, 1.0);
        let mut balance = Balance::new(bank.address);
        balance.asset_shares = 1_000_000_000.0; // 1 SOL

        let equity = balance.compute_usd_value(&bank, &price, MarginRequirement::Equity);
        assert!((equity.assets - 99.0).abs() < 1e-9);

        let init = balance.compute_usd_value(&bank, &price, MarginRequirement::Initial);
        assert!((init.assets - 99.0 * 0.8).abs() < 1e-9);

        let liab = bank.compute_liability_usd_value(
            &price,
            1_000_000_000.0,
            MarginRequirement::Initial,
            PriceBias::None,
        );
        assert!((liab - 125.0).abs() < 1e-9);
    }

    #[test]
    fn test_quantity_from_usd_value() {
        let bank = sol_bank();
        let price = PriceInfo::new(50.0, 0.0);
        assert_eq!(bank.compute_quantity_from_usd_value(&price, 100.0, PriceBias::None), 2.0);
        assert_eq!(
            bank.compute_quantity_from_usd_value(&PriceInfo::new(0.0, 0.0), 100.0, PriceBias::None),
            0.0
        );
    }

    #[test]
    fn test_isolated_detection() {
        let mut bank = sol_bank();
        assert!(!bank.is_isolated());
        bank.config.asset_weight_init = 0.0;
        assert!(bank.is_isolated());
        bank.config.asset_weight_init = 0.5;
        bank.config.risk_tier = RiskTier::Isolated;
        assert!(bank.is_isolated());
    }

    #[test]
    fn test_group_lookup_by_mint() {
        let bank = sol_bank();
        let group = GroupSnapshot::new().with_bank(bank.clone(), PriceInfo::new(100.0, 0.0));
        assert_eq!(group.bank_by_mint(&bank.mint).map(|b| b.address), Some(bank.address));
        assert!(group.bank_with_price(&Address::ZERO).is_none());
        assert_eq!(group.len(), 1);
    }
}
