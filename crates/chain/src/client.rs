//! Capability interfaces the liquidator consumes from the ledger.
//!
//! Queries are side-effect free and may be called at any time. Account
//! actions always operate on the liquidator's own account and must be
//! awaited one at a time: each action changes the state the next one is
//! computed from.

use alloy::primitives::{Address, B256};
use async_trait::async_trait;

use crate::error::LedgerResult;
use crate::model::{Account, GroupSnapshot};

/// Read access to protocol state.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Fetch all banks with their current oracle prices.
    async fn load_group(&self) -> LedgerResult<GroupSnapshot>;

    /// Fetch the latest state of one account.
    async fn load_account(&self, address: Address) -> LedgerResult<Account>;

    /// Fetch every account of the group.
    async fn all_accounts(&self) -> LedgerResult<Vec<Account>>;
}

/// Mutating actions on the liquidator's own account.
///
/// Amounts are UI units of the bank's token. Every call returns the
/// transaction signature once the action landed.
#[async_trait]
pub trait AccountActions: Send + Sync {
    /// Address of the account these actions mutate.
    fn account_address(&self) -> Address;

    async fn deposit(&self, amount: f64, bank: Address) -> LedgerResult<B256>;

    async fn withdraw(&self, amount: f64, bank: Address, withdraw_all: bool) -> LedgerResult<B256>;

    async fn repay(&self, amount: f64, bank: Address, repay_all: bool) -> LedgerResult<B256>;

    async fn borrow(&self, amount: f64, bank: Address) -> LedgerResult<B256>;

    async fn liquidate(
        &self,
        target: Address,
        asset_bank: Address,
        asset_amount: f64,
        liability_bank: Address,
    ) -> LedgerResult<B256>;
}

/// How much of the native fee currency to hold back when reporting a
/// spendable balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeReserve {
    /// Keep the full configured fee buffer
    Full,
    /// Keep half the buffer (reading tokens just bought)
    Half,
}

impl NativeReserve {
    /// Part of a native `balance` left after holding back this share of
    /// `buffer`. Never negative.
    pub fn spendable(self, balance: f64, buffer: f64) -> f64 {
        let held_back = match self {
            Self::Full => buffer,
            Self::Half => buffer / 2.0,
        };
        (balance - held_back).max(0.0)
    }
}

/// Token balances of the liquidator's wallet, outside the lending account.
#[async_trait]
pub trait TokenWallet: Send + Sync {
    /// Wallet owner.
    fn owner(&self) -> Address;

    /// UI balance of `mint`. Missing token accounts read as zero.
    async fn token_balance(&self, mint: Address) -> LedgerResult<f64>;
}
