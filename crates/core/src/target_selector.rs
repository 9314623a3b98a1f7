//! Liquidation target selection.
//!
//! Candidates are scanned in a fresh random order every time so no account
//! is starved by sort order. For each liquidatable account the largest
//! liability is paired with the largest collateral, and the seize amount is
//! clamped by both the protocol limit and what the agent can afford, then
//! discounted by a fixed safety margin. The first account that still clears
//! the minimum size is selected.

use alloy::primitives::Address;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use tracing::{debug, instrument};

use crate::config::{AccountListConfig, BotConfig};
use liquidator_chain::{Account, Bank, GroupSnapshot, MarginRequirement, PriceBias, PriceInfo};

/// Share of the computed seize amount actually liquidated, absorbing
/// slippage and price moves before execution.
pub const SAFETY_DISCOUNT: f64 = 0.75;

/// Allow-list / deny-list over candidate accounts.
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    whitelist: Option<HashSet<Address>>,
    blacklist: Option<HashSet<Address>>,
}

impl AccountFilter {
    pub fn new(whitelist: Option<Vec<Address>>, blacklist: Option<Vec<Address>>) -> Self {
        Self {
            whitelist: whitelist.map(|v| v.into_iter().collect()),
            blacklist: blacklist.map(|v| v.into_iter().collect()),
        }
    }

    pub fn from_config(config: &AccountListConfig) -> Self {
        Self::new(config.whitelist.clone(), config.blacklist.clone())
    }

    /// The allow-list, when set, decides alone.
    pub fn allows(&self, account: &Address) -> bool {
        match (&self.whitelist, &self.blacklist) {
            (Some(whitelist), _) => whitelist.contains(account),
            (None, Some(blacklist)) => !blacklist.contains(account),
            (None, None) => true,
        }
    }
}

/// Thresholds applied while evaluating candidates.
#[derive(Debug, Clone, Copy)]
pub struct SelectionParams {
    /// Smallest liability and seize value worth liquidating (USD)
    pub min_liquidation_amount_usd: f64,
    /// Ignore balances in isolated banks
    pub exclude_isolated_banks: bool,
}

impl SelectionParams {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            min_liquidation_amount_usd: config.liquidator.min_liquidation_amount_usd,
            exclude_isolated_banks: config.liquidator.exclude_isolated_banks,
        }
    }
}

/// A selected liquidation.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationCandidate {
    /// Account to liquidate
    pub account: Address,
    /// Bank whose collateral is seized
    pub collateral_bank: Address,
    /// Bank whose liability the agent takes over
    pub liability_bank: Address,
    /// Collateral to seize (UI units of the collateral bank)
    pub seize_amount: f64,
    /// USD value of the seize amount
    pub seize_usd: f64,
    /// USD value of the chosen liability
    pub liability_usd: f64,
}

#[derive(Debug)]
pub struct TargetSelector {
    filter: AccountFilter,
    params: SelectionParams,
    rng: StdRng,
}

impl TargetSelector {
    pub fn new(filter: AccountFilter, params: SelectionParams) -> Self {
        Self {
            filter,
            params,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic scan order, for tests and replays.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn params(&self) -> &SelectionParams {
        &self.params
    }

    /// Scan `accounts` in random order and return the first executable
    /// liquidation.
    #[instrument(skip_all)]
    pub fn select(
        &mut self,
        liquidator: &Account,
        mut accounts: Vec<Account>,
        group: &GroupSnapshot,
    ) -> Option<LiquidationCandidate> {
        let total = accounts.len();
        accounts.retain(|account| self.filter.allows(&account.address));
        accounts.shuffle(&mut self.rng);

        debug!(total, monitored = accounts.len(), "Scanning accounts");

        accounts
            .iter()
            .find_map(|account| self.evaluate(liquidator, account, group))
    }

    /// Evaluate one account. `None` means no profitable liquidation.
    #[instrument(skip_all, fields(account = %candidate.address))]
    pub fn evaluate(
        &self,
        liquidator: &Account,
        candidate: &Account,
        group: &GroupSnapshot,
    ) -> Option<LiquidationCandidate> {
        if candidate.address == liquidator.address {
            return None;
        }

        if !candidate.can_be_liquidated(group) {
            debug!("Account cannot be liquidated");
            return None;
        }
        let health = candidate
            .compute_health_components(group, MarginRequirement::Maintenance)
            .health();
        debug!(health, "Account can be liquidated");

        let balances: Vec<_> = candidate
            .active_balances()
            .filter_map(|balance| {
                let (bank, price) = group.bank_with_price(&balance.bank)?;
                if self.params.exclude_isolated_banks && bank.is_isolated() {
                    debug!(bank = %bank.address, "Skipping isolated bank");
                    return None;
                }
                let value = balance.compute_usd_value(bank, price, MarginRequirement::Equity);
                Some((bank, price, value))
            })
            .collect();

        // Largest liability, first seen wins ties
        let mut liability: Option<(&Bank, &PriceInfo, f64)> = None;
        for &(bank, price, value) in &balances {
            if value.liabilities > liability.map_or(0.0, |(_, _, v)| v) {
                liability = Some((bank, price, value.liabilities));
            }
        }
        let Some((liab_bank, liab_price, liability_usd)) = liability else {
            debug!("No liability to liquidate");
            return None;
        };
        debug!(usd = liability_usd, bank = %liab_bank.address, "Biggest liability");

        if liability_usd < self.params.min_liquidation_amount_usd {
            debug!("Liability below minimum liquidation size");
            return None;
        }

        let mut collateral: Option<(&Bank, &PriceInfo, f64)> = None;
        for &(bank, price, value) in &balances {
            if value.assets > collateral.map_or(0.0, |(_, _, v)| v) {
                collateral = Some((bank, price, value.assets));
            }
        }
        let Some((coll_bank, coll_price, collateral_usd)) = collateral else {
            debug!("No collateral to seize");
            return None;
        };
        debug!(usd = collateral_usd, bank = %coll_bank.address, "Biggest collateral");

        let protocol_limit = candidate.compute_max_liquidatable_asset_amount(
            group,
            &coll_bank.address,
            &liab_bank.address,
        );

        let capacity_liab = liquidator.compute_max_borrow_for_bank(group, &liab_bank.address);
        let capacity_usd = liab_bank.compute_usd_value(liab_price, capacity_liab, PriceBias::None);
        let capacity_collateral =
            coll_bank.compute_quantity_from_usd_value(coll_price, capacity_usd, PriceBias::None);

        debug!(
            protocol_limit,
            capacity_liab,
            capacity_usd,
            capacity_collateral,
            "Liquidation limits"
        );

        let seize_amount = protocol_limit.min(capacity_collateral) * SAFETY_DISCOUNT;
        let seize_usd = coll_bank.compute_usd_value(coll_price, seize_amount, PriceBias::None);

        if seize_amount <= 0.0 || seize_usd < self.params.min_liquidation_amount_usd {
            debug!(seize_amount, seize_usd, "No collateral to liquidate");
            return None;
        }

        Some(LiquidationCandidate {
            account: candidate.address,
            collateral_bank: coll_bank.address,
            liability_bank: liab_bank.address,
            seize_amount,
            seize_usd,
            liability_usd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidator_chain::{BankConfig, RiskTier};

    const LIQUIDATOR: Address = Address::repeat_byte(0xf0);
    const USDC_BANK: Address = Address::repeat_byte(0x01);
    const SOL_BANK: Address = Address::repeat_byte(0x02);
    const ISO_BANK: Address = Address::repeat_byte(0x05);

    fn config(asset_init: f64, asset_maint: f64) -> BankConfig {
        BankConfig {
            asset_weight_init: asset_init,
            asset_weight_maint: asset_maint,
            liability_weight_init: 1.0,
            liability_weight_maint: 1.0,
            risk_tier: RiskTier::Collateral,
        }
    }

    /// USDC at $1, SOL at $100 with a low maintenance weight so
    /// undercollateralized accounts are deeply underwater.
    fn group() -> GroupSnapshot {
        GroupSnapshot::new()
            .with_bank(
                Bank::new(USDC_BANK, Address::repeat_byte(0xa1), 6, config(1.0, 1.0)),
                PriceInfo::new(1.0, 0.0),
            )
            .with_bank(
                Bank::new(SOL_BANK, Address::repeat_byte(0xa2), 9, config(0.1, 0.1)),
                PriceInfo::new(100.0, 0.0),
            )
            .with_bank(
                Bank::new(ISO_BANK, Address::repeat_byte(0xa5), 6, config(0.0, 0.0)),
                PriceInfo::new(1.0, 0.0),
            )
    }

    fn params(min: f64) -> SelectionParams {
        SelectionParams {
            min_liquidation_amount_usd: min,
            exclude_isolated_banks: false,
        }
    }

    /// Liquidator with `usdc` deposited and nothing else.
    fn liquidator(usdc: f64) -> Account {
        let mut account = Account::new(LIQUIDATOR, Address::repeat_byte(0xf1));
        account.balance_mut(USDC_BANK).asset_shares = usdc * 1e6;
        account
    }

    /// `sol` SOL of collateral against `usdc_debt` USDC.
    fn borrower(byte: u8, sol: f64, usdc_debt: f64) -> Account {
        let mut account = Account::new(Address::repeat_byte(byte), Address::repeat_byte(byte + 1));
        account.balance_mut(SOL_BANK).asset_shares = sol * 1e9;
        account.balance_mut(USDC_BANK).liability_shares = usdc_debt * 1e6;
        account
    }

    fn selector(min: f64) -> TargetSelector {
        TargetSelector::new(AccountFilter::default(), params(min)).with_seed(7)
    }

    #[test]
    fn test_seize_clamped_by_agent_capacity() {
        // $1,500 of SOL against $1,000 of USDC; agent can cover $600
        let group = group();
        let target = borrower(0x10, 15.0, 1_000.0);
        let candidate = selector(1.0)
            .evaluate(&liquidator(600.0), &target, &group)
            .unwrap();

        assert_eq!(candidate.account, target.address);
        assert_eq!(candidate.collateral_bank, SOL_BANK);
        assert_eq!(candidate.liability_bank, USDC_BANK);
        assert!((candidate.seize_usd - 450.0).abs() < 1e-6);
        assert!((candidate.seize_amount - 4.5).abs() < 1e-9);
        assert!((candidate.liability_usd - 1_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_seize_clamped_by_protocol_limit() {
        let group = group();
        let target = borrower(0x10, 15.0, 1_000.0);
        let limit = target.compute_max_liquidatable_asset_amount(&group, &SOL_BANK, &USDC_BANK);

        let candidate = selector(1.0)
            .evaluate(&liquidator(1_000_000.0), &target, &group)
            .unwrap();
        assert!((candidate.seize_amount - limit * SAFETY_DISCOUNT).abs() < 1e-9);
    }

    #[test]
    fn test_never_selects_own_account() {
        let group = group();
        let mut own = borrower(0x10, 15.0, 1_000.0);
        own.address = LIQUIDATOR;
        assert!(own.can_be_liquidated(&group));

        let mut selector = selector(1.0);
        assert!(selector.evaluate(&own, &own, &group).is_none());
        assert!(selector.select(&own, vec![own.clone()], &group).is_none());
    }

    #[test]
    fn test_skips_healthy_and_small_accounts() {
        let group = group();
        let mut selector = selector(5.0);
        let agent = liquidator(1_000.0);

        // Healthy: 10 SOL maint value 100 against 50 USDC
        let healthy = borrower(0x10, 10.0, 50.0);
        assert!(selector.evaluate(&agent, &healthy, &group).is_none());

        // Liquidatable but the liability is under the minimum
        let small = borrower(0x12, 0.01, 4.0);
        assert!(small.can_be_liquidated(&group));
        assert!(selector.evaluate(&agent, &small, &group).is_none());

        // Liability is large enough, but the agent cannot afford a
        // seize worth the minimum
        let target = borrower(0x14, 15.0, 1_000.0);
        assert!(selector.evaluate(&liquidator(4.0), &target, &group).is_none());

        assert!(selector
            .select(&agent, vec![healthy, small], &group)
            .is_none());
    }

    #[test]
    fn test_seize_never_exceeds_discounted_limits() {
        let group = group();
        let selector = selector(0.0);
        for (sol, debt, usdc) in [(15.0, 1_000.0, 600.0), (2.0, 150.0, 10_000.0), (40.0, 3_900.0, 50.0)] {
            let target = borrower(0x10, sol, debt);
            let agent = liquidator(usdc);
            let Some(candidate) = selector.evaluate(&agent, &target, &group) else {
                continue;
            };
            let protocol = target.compute_max_liquidatable_asset_amount(&group, &SOL_BANK, &USDC_BANK);
            let capacity = agent.compute_max_borrow_for_bank(&group, &USDC_BANK) / 100.0;
            assert!(candidate.seize_amount <= SAFETY_DISCOUNT * protocol.min(capacity) + 1e-9);
            assert!(candidate.seize_usd >= 0.0);
        }
    }

    #[test]
    fn test_whitelist_takes_precedence() {
        let a = Address::repeat_byte(0x10);
        let b = Address::repeat_byte(0x12);

        let filter = AccountFilter::new(Some(vec![a]), Some(vec![a, b]));
        assert!(filter.allows(&a));
        assert!(!filter.allows(&b));

        let filter = AccountFilter::new(None, Some(vec![b]));
        assert!(filter.allows(&a));
        assert!(!filter.allows(&b));

        assert!(AccountFilter::default().allows(&b));
    }

    #[test]
    fn test_select_respects_filter() {
        let group = group();
        let agent = liquidator(600.0);
        let a = borrower(0x10, 15.0, 1_000.0);
        let b = borrower(0x12, 15.0, 1_000.0);

        let mut selector = TargetSelector::new(AccountFilter::new(None, Some(vec![a.address])), params(1.0))
            .with_seed(1);
        for _ in 0..10 {
            let picked = selector.select(&agent, vec![a.clone(), b.clone()], &group).unwrap();
            assert_eq!(picked.account, b.address);
        }
    }

    #[test]
    fn test_scan_order_is_randomized() {
        let group = group();
        let agent = liquidator(600.0);
        let accounts = vec![borrower(0x10, 15.0, 1_000.0), borrower(0x12, 15.0, 1_000.0)];

        let picked: HashSet<Address> = (0..32)
            .filter_map(|seed| {
                TargetSelector::new(AccountFilter::default(), params(1.0))
                    .with_seed(seed)
                    .select(&agent, accounts.clone(), &group)
                    .map(|c| c.account)
            })
            .collect();
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_exclude_isolated_banks() {
        let group = group();
        let agent = liquidator(10_000.0);

        // Largest liability sits in an isolated bank
        let mut target = borrower(0x10, 15.0, 1_000.0);
        target.balance_mut(ISO_BANK).liability_shares = 2_000.0 * 1e6;

        let included = selector(1.0).evaluate(&agent, &target, &group).unwrap();
        assert_eq!(included.liability_bank, ISO_BANK);

        let mut excluding = selector(1.0);
        excluding.params.exclude_isolated_banks = true;
        let excluded = excluding.evaluate(&agent, &target, &group).unwrap();
        assert_eq!(excluded.liability_bank, USDC_BANK);
    }
}
