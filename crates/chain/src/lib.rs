//! Liquidator ledger layer.
//!
//! This crate provides:
//! - The lending protocol model: banks, balances, accounts, group snapshots
//! - Risk valuation (health, free collateral, withdraw/borrow/liquidation limits)
//! - Capability traits the liquidator consumes (queries, account actions, wallet)
//! - An in-memory simulated ledger for paper trading and tests
//! - UI/native amount conversion helpers
//!
//! Live chain adapters implement the traits in [`client`] outside this crate.

mod client;
mod error;
mod model;
mod simulated;
pub mod u256_math;
mod valuation;

pub use client::{AccountActions, LedgerQuery, NativeReserve, TokenWallet};
pub use error::{LedgerError, LedgerResult};
pub use model::{
    Account, Balance, Bank, BankConfig, GroupSnapshot, MarginRequirement, PriceBias, PriceInfo,
    Quantity, RiskTier, UsdValue, EMPTY_BALANCE_THRESHOLD,
};
pub use simulated::{BankEntry, LedgerAction, LedgerSnapshot, Operation, SimulatedLedger};
pub use valuation::{HealthComponents, LIQUIDATION_DISCOUNT, LIQUIDATOR_PAYMENT_RATIO};
