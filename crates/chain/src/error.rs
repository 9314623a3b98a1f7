//! Errors raised by ledger collaborators.

use alloy::primitives::Address;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("account {0} not found")]
    AccountNotFound(Address),

    #[error("bank {0} not found")]
    BankNotFound(Address),

    #[error("no oracle price for bank {0}")]
    PriceUnavailable(Address),

    #[error("insufficient funds for {mint}: have {available}, need {required}")]
    InsufficientFunds {
        mint: Address,
        available: f64,
        required: f64,
    },

    #[error("action on bank {0} would exceed free collateral")]
    ExceedsFreeCollateral(Address),

    #[error("account {0} is healthy and cannot be liquidated")]
    NotLiquidatable(Address),

    #[error("seizing {requested} exceeds liquidatable amount {max}")]
    ExceedsLiquidatableAmount { requested: f64, max: f64 },

    #[error("account {0} is not controlled by this signer")]
    UnauthorizedAccount(Address),

    #[error("invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("rpc error: {0}")]
    Rpc(String),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
