//! Account-level risk math: health components, free collateral and the
//! withdraw/borrow/liquidation capacities derived from them.
//!
//! All capacities are returned in UI units of the bank in question.

use alloy::primitives::Address;

use crate::model::{Account, GroupSnapshot, MarginRequirement, PriceBias};

/// Share of seized collateral value credited to the liquidatee.
pub const LIQUIDATION_DISCOUNT: f64 = 0.95;

/// Share of seized collateral value the liquidator pays for it.
pub const LIQUIDATOR_PAYMENT_RATIO: f64 = 0.975;

/// Weighted asset and liability totals of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthComponents {
    pub assets: f64,
    pub liabilities: f64,
}

impl HealthComponents {
    pub fn health(&self) -> f64 {
        self.assets - self.liabilities
    }
}

impl Account {
    /// Sum of weighted asset and liability values over active balances.
    /// Balances whose bank or price is unknown are ignored.
    pub fn compute_health_components(
        &self,
        group: &GroupSnapshot,
        requirement: MarginRequirement,
    ) -> HealthComponents {
        self.active_balances()
            .filter_map(|balance| {
                let (bank, price) = group.bank_with_price(&balance.bank)?;
                Some(balance.compute_usd_value(bank, price, requirement))
            })
            .fold(HealthComponents::default(), |acc, value| HealthComponents {
                assets: acc.assets + value.assets,
                liabilities: acc.liabilities + value.liabilities,
            })
    }

    /// Maintenance-margin liquidation test.
    pub fn can_be_liquidated(&self, group: &GroupSnapshot) -> bool {
        let components = self.compute_health_components(group, MarginRequirement::Maintenance);
        components.assets < components.liabilities
    }

    /// Initial-margin collateral not backing any liability (USD).
    pub fn compute_free_collateral(&self, group: &GroupSnapshot) -> f64 {
        self.compute_health_components(group, MarginRequirement::Initial)
            .health()
            .max(0.0)
    }

    /// Largest amount of `bank` that can be withdrawn without breaking the
    /// initial margin requirement.
    pub fn compute_max_withdraw_for_bank(&self, group: &GroupSnapshot, bank: &Address) -> f64 {
        let Some((bank, price)) = group.bank_with_price(bank) else {
            return 0.0;
        };
        let Some(balance) = self.balance(&bank.address) else {
            return 0.0;
        };

        let assets = balance.compute_quantity_ui(bank).assets;
        let weighted_price = price.biased(PriceBias::Lowest) * bank.config.asset_weight_init;

        // Assets that do not count as collateral are always free
        if weighted_price <= 0.0 {
            return assets;
        }

        let untied = self.compute_free_collateral(group) / weighted_price;
        assets.min(untied)
    }

    /// Largest amount of `bank` the account can take out: free deposits
    /// first, then borrowing against the remaining free collateral.
    pub fn compute_max_borrow_for_bank(&self, group: &GroupSnapshot, bank: &Address) -> f64 {
        let Some((bank, price)) = group.bank_with_price(bank) else {
            return 0.0;
        };

        let free_collateral = self.compute_free_collateral(group);
        let liability_price = price.biased(PriceBias::Highest) * bank.config.liability_weight_init;
        let borrow_capacity = if liability_price > 0.0 {
            free_collateral / liability_price
        } else {
            0.0
        };

        let assets = self
            .balance(&bank.address)
            .map(|b| b.compute_quantity_ui(bank).assets)
            .unwrap_or(0.0);

        if assets <= 0.0 {
            return borrow_capacity;
        }

        let asset_price = price.biased(PriceBias::Lowest) * bank.config.asset_weight_init;
        if asset_price <= 0.0 {
            return assets + borrow_capacity;
        }

        let untied = free_collateral / asset_price;
        if untied <= assets {
            untied
        } else {
            let remaining_collateral = free_collateral - assets * asset_price;
            let extra = if liability_price > 0.0 {
                remaining_collateral / liability_price
            } else {
                0.0
            };
            assets + extra
        }
    }

    /// Largest amount of `asset_bank` collateral a liquidator may seize while
    /// repaying `liability_bank`, bounded by the collateral held, the value
    /// needed to restore maintenance health and the outstanding liability.
    pub fn compute_max_liquidatable_asset_amount(
        &self,
        group: &GroupSnapshot,
        asset_bank: &Address,
        liability_bank: &Address,
    ) -> f64 {
        let (Some((asset_bank, asset_price)), Some((liab_bank, liab_price))) = (
            group.bank_with_price(asset_bank),
            group.bank_with_price(liability_bank),
        ) else {
            return 0.0;
        };

        let asset_price_low = asset_price.biased(PriceBias::Lowest);
        if asset_price_low <= 0.0 {
            return 0.0;
        }
        let liab_price_high = liab_price.biased(PriceBias::Highest);

        let current_health = self
            .compute_health_components(group, MarginRequirement::Maintenance)
            .health();

        let weight_delta = asset_bank.config.asset_weight_maint
            - liab_bank.config.liability_weight_maint * LIQUIDATION_DISCOUNT;
        let underwater_usd = if weight_delta == 0.0 {
            f64::INFINITY
        } else {
            (current_health / weight_delta).abs()
        };

        let assets_usd = self
            .balance(&asset_bank.address)
            .map(|b| b.compute_quantity_ui(asset_bank).assets * asset_price_low)
            .unwrap_or(0.0);
        let liabs_usd = self
            .balance(&liab_bank.address)
            .map(|b| b.compute_quantity_ui(liab_bank).liabilities * liab_price_high)
            .unwrap_or(0.0);

        let max_usd = assets_usd
            .min(underwater_usd)
            .min(liabs_usd / LIQUIDATION_DISCOUNT);

        max_usd / asset_price_low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bank, BankConfig, PriceInfo, RiskTier};

    const USDC_BANK: Address = Address::repeat_byte(0x01);
    const SOL_BANK: Address = Address::repeat_byte(0x02);

    fn group() -> GroupSnapshot {
        let usdc = Bank::new(
            USDC_BANK,
            Address::repeat_byte(0xa1),
            6,
            BankConfig {
                asset_weight_init: 1.0,
                asset_weight_maint: 1.0,
                liability_weight_init: 1.0,
                liability_weight_maint: 1.0,
                risk_tier: RiskTier::Collateral,
            },
        );
        let sol = Bank::new(
            SOL_BANK,
            Address::repeat_byte(0xa2),
            9,
            BankConfig {
                asset_weight_init: 0.5,
                asset_weight_maint: 0.6,
                liability_weight_init: 1.0,
                liability_weight_maint: 1.0,
                risk_tier: RiskTier::Collateral,
            },
        );
        GroupSnapshot::new()
            .with_bank(usdc, PriceInfo::new(1.0, 0.0))
            .with_bank(sol, PriceInfo::new(100.0, 0.0))
    }

    fn account(usdc_assets: f64, sol_assets: f64, usdc_liabs: f64, sol_liabs: f64) -> Account {
        let mut account = Account::new(Address::repeat_byte(0x99), Address::repeat_byte(0x98));
        let usdc = account.balance_mut(USDC_BANK);
        usdc.asset_shares = usdc_assets * 1e6;
        usdc.liability_shares = usdc_liabs * 1e6;
        let sol = account.balance_mut(SOL_BANK);
        sol.asset_shares = sol_assets * 1e9;
        sol.liability_shares = sol_liabs * 1e9;
        account
    }

    #[test]
    fn test_health_components() {
        let group = group();
        let acc = account(100.0, 1.0, 0.0, 0.0);
        let init = acc.compute_health_components(&group, MarginRequirement::Initial);
        assert!((init.assets - 150.0).abs() < 1e-6);
        let equity = acc.compute_health_components(&group, MarginRequirement::Equity);
        assert!((equity.assets - 200.0).abs() < 1e-6);
        assert!(!acc.can_be_liquidated(&group));
    }

    #[test]
    fn test_max_withdraw_limited_by_free_collateral() {
        let group = group();
        // 2 SOL deposited (init value 100), 60 USDC borrowed -> 40 free
        let acc = account(0.0, 2.0, 60.0, 0.0);
        let max = acc.compute_max_withdraw_for_bank(&group, &SOL_BANK);
        assert!((max - 0.8).abs() < 1e-9);

        // Unencumbered deposit is fully withdrawable
        let acc = account(0.0, 2.0, 0.0, 0.0);
        assert!((acc.compute_max_withdraw_for_bank(&group, &SOL_BANK) - 2.0).abs() < 1e-9);

        // No balance, nothing to withdraw
        assert_eq!(acc.compute_max_withdraw_for_bank(&group, &USDC_BANK), 0.0);
    }

    #[test]
    fn test_max_borrow_includes_own_deposit() {
        let group = group();
        let acc = account(100.0, 0.0, 0.0, 0.0);
        // 100 USDC withdrawable, nothing left to borrow on
        assert!((acc.compute_max_borrow_for_bank(&group, &USDC_BANK) - 100.0).abs() < 1e-9);
        // 100 USD of free collateral buys 1 SOL of borrowing
        assert!((acc.compute_max_borrow_for_bank(&group, &SOL_BANK) - 1.0).abs() < 1e-9);

        // Deposit plus borrowing capacity from other collateral
        let acc = account(100.0, 1.0, 0.0, 0.0);
        assert!((acc.compute_max_borrow_for_bank(&group, &USDC_BANK) - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_liquidation_eligibility_and_limit() {
        let group = group();
        // 1 SOL (maint 60) against 80 USDC debt
        let acc = account(0.0, 1.0, 80.0, 0.0);
        assert!(acc.can_be_liquidated(&group));

        // health = -20, delta = 0.6 - 0.95 = -0.35 -> 57.14 USD
        let max = acc.compute_max_liquidatable_asset_amount(&group, &SOL_BANK, &USDC_BANK);
        assert!((max - (20.0 / 0.35) / 100.0).abs() < 1e-9);

        // Bounded by the collateral actually held
        let acc = account(0.0, 0.1, 80.0, 0.0);
        let max = acc.compute_max_liquidatable_asset_amount(&group, &SOL_BANK, &USDC_BANK);
        assert!(max <= 0.1 + 1e-12);
    }
}
