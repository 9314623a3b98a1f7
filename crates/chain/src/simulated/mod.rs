//! In-memory lending group, wallet and swap venue.
//!
//! `SimulatedLedger` implements every capability the liquidator consumes,
//! so the agent can run end to end without a chain: paper trading from a
//! JSON snapshot, and scenario tests. It enforces the same limits the
//! protocol does (free collateral on withdraw/borrow, liquidation
//! eligibility and size) so that the agent's decisions are checked, not
//! just recorded.

mod snapshot;

pub use snapshot::{BankEntry, LedgerSnapshot};

use alloy::primitives::{Address, B256, U256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::client::{AccountActions, LedgerQuery, TokenWallet};
use crate::error::{LedgerError, LedgerResult};
use crate::model::{Account, Balance, Bank, GroupSnapshot, MarginRequirement, PriceBias, PriceInfo};
use crate::u256_math::{native_to_ui, ui_to_native};
use crate::valuation::{LIQUIDATION_DISCOUNT, LIQUIDATOR_PAYMENT_RATIO};
use liquidator_api::{apply_slippage, SwapExecution, SwapParams, SwapRoute, SwapRouter};

/// Tolerance for float comparisons on UI amounts and USD values.
const EPSILON: f64 = 1e-9;

/// Ledger operations that can be made to fail in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LoadGroup,
    LoadAccount,
    AllAccounts,
    Deposit,
    Withdraw,
    Repay,
    Borrow,
    Liquidate,
    Swap,
    TokenBalance,
}

/// Record of a state-changing action, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerAction {
    Deposit {
        bank: Address,
        amount: f64,
    },
    Withdraw {
        bank: Address,
        amount: f64,
        withdraw_all: bool,
    },
    Repay {
        bank: Address,
        amount: f64,
        repay_all: bool,
    },
    Borrow {
        bank: Address,
        amount: f64,
    },
    Liquidate {
        target: Address,
        asset_bank: Address,
        asset_amount: f64,
        liability_bank: Address,
    },
    Swap {
        mint_in: Address,
        mint_out: Address,
        amount_in: f64,
        amount_out: f64,
    },
}

#[derive(Debug)]
struct LedgerState {
    group: GroupSnapshot,
    accounts: BTreeMap<Address, Account>,
    wallet: HashMap<Address, f64>,
    swap_fee_bps: u16,
    actions: Vec<LedgerAction>,
}

/// Paper ledger backing the liquidator's capabilities.
#[derive(Debug)]
pub struct SimulatedLedger {
    liquidator: Address,
    owner: Address,
    state: RwLock<LedgerState>,
    failures: DashMap<Operation, LedgerError>,
    tx_counter: AtomicU64,
}

impl SimulatedLedger {
    /// Create an empty ledger with an empty liquidator account.
    pub fn new(liquidator: Address, owner: Address) -> Self {
        let mut accounts = BTreeMap::new();
        accounts.insert(liquidator, Account::new(liquidator, owner));

        Self {
            liquidator,
            owner,
            state: RwLock::new(LedgerState {
                group: GroupSnapshot::new(),
                accounts,
                wallet: HashMap::new(),
                swap_fee_bps: 0,
                actions: Vec::new(),
            }),
            failures: DashMap::new(),
            tx_counter: AtomicU64::new(0),
        }
    }

    /// Build a ledger from a snapshot document.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        let mut ledger = Self::new(snapshot.liquidator, snapshot.owner)
            .with_swap_fee_bps(snapshot.swap_fee_bps);
        for entry in snapshot.banks {
            ledger = ledger.with_bank(entry.bank, entry.price);
        }
        for account in snapshot.accounts {
            ledger = ledger.with_account(account);
        }
        for (mint, amount) in snapshot.wallet {
            ledger = ledger.with_wallet_balance(mint, amount);
        }
        ledger
    }

    pub fn with_bank(mut self, bank: Bank, price: PriceInfo) -> Self {
        self.state.get_mut().group.insert(bank, price);
        self
    }

    /// Add or replace an account. The liquidator's account keeps its owner.
    pub fn with_account(mut self, mut account: Account) -> Self {
        if account.address == self.liquidator {
            account.authority = self.owner;
        }
        self.state.get_mut().accounts.insert(account.address, account);
        self
    }

    pub fn with_wallet_balance(mut self, mint: Address, amount: f64) -> Self {
        self.state.get_mut().wallet.insert(mint, amount);
        self
    }

    pub fn with_swap_fee_bps(mut self, fee_bps: u16) -> Self {
        self.state.get_mut().swap_fee_bps = fee_bps.min(10_000);
        self
    }

    /// Make the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, error: LedgerError) {
        self.failures.insert(operation, error);
    }

    /// Move an oracle price.
    pub fn set_price(&self, bank: Address, price: PriceInfo) -> LedgerResult<()> {
        let mut state = self.state.write();
        let bank = state
            .group
            .bank(&bank)
            .cloned()
            .ok_or(LedgerError::BankNotFound(bank))?;
        state.group.insert(bank, price);
        Ok(())
    }

    pub fn set_wallet_balance(&self, mint: Address, amount: f64) {
        self.state.write().wallet.insert(mint, amount);
    }

    /// Wallet balance of a mint.
    pub fn wallet_balance(&self, mint: &Address) -> f64 {
        self.state.read().wallet.get(mint).copied().unwrap_or(0.0)
    }

    /// Current state of an account.
    pub fn account(&self, address: &Address) -> Option<Account> {
        self.state.read().accounts.get(address).cloned()
    }

    /// All state-changing actions so far.
    pub fn actions(&self) -> Vec<LedgerAction> {
        self.state.read().actions.clone()
    }

    pub fn clear_actions(&self) {
        self.state.write().actions.clear();
    }

    fn check_failure(&self, operation: Operation) -> LedgerResult<()> {
        match self.failures.remove(&operation) {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }

    fn next_signature(&self) -> B256 {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        B256::from(U256::from(n))
    }

    /// Apply `f` to a copy of the liquidator account and commit it only if
    /// `f` succeeds and the result still meets the initial margin.
    fn mutate_liquidator<F>(&self, state: &mut LedgerState, bank: Address, f: F) -> LedgerResult<()>
    where
        F: FnOnce(&mut Account, &GroupSnapshot, &mut HashMap<Address, f64>) -> LedgerResult<()>,
    {
        let mut account = state
            .accounts
            .get(&self.liquidator)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(self.liquidator))?;
        let mut wallet = state.wallet.clone();
        let before = account
            .compute_health_components(&state.group, MarginRequirement::Initial)
            .health();

        f(&mut account, &state.group, &mut wallet)?;

        // Actions that leave the account below the initial requirement are
        // only allowed when they improve it
        let after = account
            .compute_health_components(&state.group, MarginRequirement::Initial);
        let tolerance = EPSILON * after.liabilities.max(1.0);
        if after.health() < -tolerance && after.health() < before - tolerance {
            return Err(LedgerError::ExceedsFreeCollateral(bank));
        }

        state.accounts.insert(self.liquidator, account);
        state.wallet = wallet;
        Ok(())
    }
}

fn bank_of<'a>(group: &'a GroupSnapshot, bank: &Address) -> LedgerResult<&'a Bank> {
    group.bank(bank).ok_or(LedgerError::BankNotFound(*bank))
}

fn check_amount(amount: f64) -> LedgerResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

fn debit_wallet(wallet: &mut HashMap<Address, f64>, mint: Address, amount: f64) -> LedgerResult<()> {
    let available = wallet.get(&mint).copied().unwrap_or(0.0);
    if available + EPSILON < amount {
        return Err(LedgerError::InsufficientFunds {
            mint,
            available,
            required: amount,
        });
    }
    wallet.insert(mint, (available - amount).max(0.0));
    Ok(())
}

fn credit_wallet(wallet: &mut HashMap<Address, f64>, mint: Address, amount: f64) {
    *wallet.entry(mint).or_insert(0.0) += amount;
}

/// Add `native` units to a balance: pay down liabilities, then deposit.
fn credit_balance(balance: &mut Balance, bank: &Bank, native: f64) {
    let liabilities = balance.liability_shares * bank.liability_share_value;
    let repaid = native.min(liabilities);
    balance.liability_shares -= repaid / bank.liability_share_value;
    balance.asset_shares += (native - repaid) / bank.asset_share_value;
    clear_dust_shares(balance);
}

/// Take `native` units from a balance: draw down deposits, then borrow.
fn debit_balance(balance: &mut Balance, bank: &Bank, native: f64) {
    let assets = balance.asset_shares * bank.asset_share_value;
    let withdrawn = native.min(assets);
    balance.asset_shares -= withdrawn / bank.asset_share_value;
    balance.liability_shares += (native - withdrawn) / bank.liability_share_value;
    clear_dust_shares(balance);
}

fn clear_dust_shares(balance: &mut Balance) {
    if balance.asset_shares < 1e-6 {
        balance.asset_shares = 0.0;
    }
    if balance.liability_shares < 1e-6 {
        balance.liability_shares = 0.0;
    }
}

#[async_trait]
impl LedgerQuery for SimulatedLedger {
    async fn load_group(&self) -> LedgerResult<GroupSnapshot> {
        self.check_failure(Operation::LoadGroup)?;
        Ok(self.state.read().group.clone())
    }

    async fn load_account(&self, address: Address) -> LedgerResult<Account> {
        self.check_failure(Operation::LoadAccount)?;
        self.state
            .read()
            .accounts
            .get(&address)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(address))
    }

    async fn all_accounts(&self) -> LedgerResult<Vec<Account>> {
        self.check_failure(Operation::AllAccounts)?;
        Ok(self.state.read().accounts.values().cloned().collect())
    }
}

#[async_trait]
impl AccountActions for SimulatedLedger {
    fn account_address(&self) -> Address {
        self.liquidator
    }

    async fn deposit(&self, amount: f64, bank: Address) -> LedgerResult<B256> {
        self.check_failure(Operation::Deposit)?;
        check_amount(amount)?;

        let mut state = self.state.write();
        self.mutate_liquidator(&mut state, bank, |account, group, wallet| {
            let bank = bank_of(group, &bank)?;
            debit_wallet(wallet, bank.mint, amount)?;
            credit_balance(account.balance_mut(bank.address), bank, bank.ui_to_native(amount));
            Ok(())
        })?;
        state.actions.push(LedgerAction::Deposit { bank, amount });

        debug!(bank = %bank, amount, "Simulated deposit");
        Ok(self.next_signature())
    }

    async fn withdraw(&self, amount: f64, bank: Address, withdraw_all: bool) -> LedgerResult<B256> {
        self.check_failure(Operation::Withdraw)?;
        check_amount(amount)?;

        let mut state = self.state.write();
        self.mutate_liquidator(&mut state, bank, |account, group, wallet| {
            let bank = bank_of(group, &bank)?;
            let balance = account.balance_mut(bank.address);
            let available = balance.compute_quantity_ui(bank).assets;
            let amount = if withdraw_all { available } else { amount };
            if amount > available * (1.0 + EPSILON) + EPSILON {
                return Err(LedgerError::InsufficientFunds {
                    mint: bank.mint,
                    available,
                    required: amount,
                });
            }
            let native = bank.ui_to_native(amount.min(available));
            debit_balance(balance, bank, native);
            if withdraw_all {
                balance.asset_shares = 0.0;
            }
            credit_wallet(wallet, bank.mint, amount.min(available));
            Ok(())
        })?;
        state.actions.push(LedgerAction::Withdraw {
            bank,
            amount,
            withdraw_all,
        });

        debug!(bank = %bank, amount, withdraw_all, "Simulated withdraw");
        Ok(self.next_signature())
    }

    async fn repay(&self, amount: f64, bank: Address, repay_all: bool) -> LedgerResult<B256> {
        self.check_failure(Operation::Repay)?;
        check_amount(amount)?;

        let mut state = self.state.write();
        self.mutate_liquidator(&mut state, bank, |account, group, wallet| {
            let bank = bank_of(group, &bank)?;
            let balance = account.balance_mut(bank.address);
            let owed = balance.compute_quantity_ui(bank).liabilities;
            let repaid = if repay_all { owed } else { amount.min(owed) };
            debit_wallet(wallet, bank.mint, repaid)?;
            balance.liability_shares -= bank.ui_to_native(repaid) / bank.liability_share_value;
            if repay_all {
                balance.liability_shares = 0.0;
            }
            clear_dust_shares(balance);
            Ok(())
        })?;
        state.actions.push(LedgerAction::Repay {
            bank,
            amount,
            repay_all,
        });

        debug!(bank = %bank, amount, repay_all, "Simulated repay");
        Ok(self.next_signature())
    }

    async fn borrow(&self, amount: f64, bank: Address) -> LedgerResult<B256> {
        self.check_failure(Operation::Borrow)?;
        check_amount(amount)?;

        let mut state = self.state.write();
        self.mutate_liquidator(&mut state, bank, |account, group, wallet| {
            let bank = bank_of(group, &bank)?;
            debit_balance(account.balance_mut(bank.address), bank, bank.ui_to_native(amount));
            credit_wallet(wallet, bank.mint, amount);
            Ok(())
        })?;
        state.actions.push(LedgerAction::Borrow { bank, amount });

        debug!(bank = %bank, amount, "Simulated borrow");
        Ok(self.next_signature())
    }

    async fn liquidate(
        &self,
        target: Address,
        asset_bank: Address,
        asset_amount: f64,
        liability_bank: Address,
    ) -> LedgerResult<B256> {
        self.check_failure(Operation::Liquidate)?;
        check_amount(asset_amount)?;
        if target == self.liquidator {
            return Err(LedgerError::UnauthorizedAccount(target));
        }

        let mut state = self.state.write();
        let mut liquidatee = state
            .accounts
            .get(&target)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(target))?;

        let group = state.group.clone();
        if !liquidatee.can_be_liquidated(&group) {
            return Err(LedgerError::NotLiquidatable(target));
        }

        let max = liquidatee.compute_max_liquidatable_asset_amount(&group, &asset_bank, &liability_bank);
        if asset_amount > max * (1.0 + EPSILON) + EPSILON {
            return Err(LedgerError::ExceedsLiquidatableAmount {
                requested: asset_amount,
                max,
            });
        }

        let (asset, asset_price) = group
            .bank_with_price(&asset_bank)
            .ok_or(LedgerError::BankNotFound(asset_bank))?;
        let (liab, liab_price) = group
            .bank_with_price(&liability_bank)
            .ok_or(LedgerError::BankNotFound(liability_bank))?;
        let liab_price = liab_price.biased(PriceBias::None);
        if liab_price <= 0.0 {
            return Err(LedgerError::PriceUnavailable(liability_bank));
        }

        let seized_usd = asset_amount * asset_price.biased(PriceBias::None);
        let paid_ui = seized_usd * LIQUIDATOR_PAYMENT_RATIO / liab_price;
        let credited_ui = seized_usd * LIQUIDATION_DISCOUNT / liab_price;

        let seized_native = asset.ui_to_native(asset_amount);
        debit_balance(liquidatee.balance_mut(asset_bank), asset, seized_native);
        credit_balance(liquidatee.balance_mut(liability_bank), liab, liab.ui_to_native(credited_ui));

        let (asset, liab) = (asset.clone(), liab.clone());
        self.mutate_liquidator(&mut state, liability_bank, |account, _, _| {
            credit_balance(account.balance_mut(asset_bank), &asset, seized_native);
            debit_balance(account.balance_mut(liability_bank), &liab, liab.ui_to_native(paid_ui));
            Ok(())
        })?;

        state.accounts.insert(target, liquidatee);
        state.actions.push(LedgerAction::Liquidate {
            target,
            asset_bank,
            asset_amount,
            liability_bank,
        });

        debug!(target = %target, asset_amount, seized_usd, "Simulated liquidation");
        Ok(self.next_signature())
    }
}

#[async_trait]
impl TokenWallet for SimulatedLedger {
    fn owner(&self) -> Address {
        self.owner
    }

    async fn token_balance(&self, mint: Address) -> LedgerResult<f64> {
        self.check_failure(Operation::TokenBalance)?;
        Ok(self.wallet_balance(&mint))
    }
}

#[async_trait]
impl SwapRouter for SimulatedLedger {
    fn router_id(&self) -> &str {
        "paper"
    }

    async fn get_route(&self, params: SwapParams) -> Result<SwapRoute> {
        let state = self.state.read();
        let (bank_in, price_in) = state
            .group
            .bank_by_mint(&params.token_in)
            .and_then(|b| state.group.bank_with_price(&b.address))
            .ok_or_else(|| anyhow!("no market for input token {}", params.token_in))?;
        let (bank_out, price_out) = state
            .group
            .bank_by_mint(&params.token_out)
            .and_then(|b| state.group.bank_with_price(&b.address))
            .ok_or_else(|| anyhow!("no market for output token {}", params.token_out))?;

        if price_out.price <= 0.0 {
            anyhow::bail!("output token {} has no price", params.token_out);
        }

        let amount_in_ui = native_to_ui(params.amount_in, bank_in.mint_decimals);
        let fee = 1.0 - state.swap_fee_bps as f64 / 10_000.0;
        let amount_out_ui = amount_in_ui * price_in.price / price_out.price * fee;
        let expected_output = ui_to_native(amount_out_ui, bank_out.mint_decimals);

        Ok(SwapRoute {
            router: self.router_id().to_string(),
            token_in: params.token_in,
            token_out: params.token_out,
            amount_in: params.amount_in,
            expected_output,
            min_output: apply_slippage(expected_output, params.slippage_bps),
            price_impact: Some(state.swap_fee_bps as f64 / 100.0),
        })
    }

    async fn execute(&self, route: &SwapRoute) -> Result<SwapExecution> {
        self.check_failure(Operation::Swap)?;

        let mut state = self.state.write();
        let decimals_in = state
            .group
            .bank_by_mint(&route.token_in)
            .map(|b| b.mint_decimals)
            .ok_or_else(|| anyhow!("no market for input token {}", route.token_in))?;
        let decimals_out = state
            .group
            .bank_by_mint(&route.token_out)
            .map(|b| b.mint_decimals)
            .ok_or_else(|| anyhow!("no market for output token {}", route.token_out))?;

        let amount_in = native_to_ui(route.amount_in, decimals_in);
        let amount_out = native_to_ui(route.expected_output, decimals_out);

        debit_wallet(&mut state.wallet, route.token_in, amount_in)?;
        credit_wallet(&mut state.wallet, route.token_out, amount_out);
        state.actions.push(LedgerAction::Swap {
            mint_in: route.token_in,
            mint_out: route.token_out,
            amount_in,
            amount_out,
        });

        debug!(mint_in = %route.token_in, mint_out = %route.token_out, amount_in, amount_out, "Simulated swap");
        Ok(SwapExecution {
            signature: self.next_signature(),
            amount_in: route.amount_in,
            amount_out: route.expected_output,
        })
    }
}
