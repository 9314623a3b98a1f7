//! Liquidator core logic.
//!
//! This crate drives a single lending account as a liquidation agent:
//! - Configuration profiles with environment overrides
//! - Bank metadata cache refreshed in the background
//! - Startup wallet sweep into the reference currency
//! - Three-stage rebalancer (sell deposits, repay debt, deposit reference)
//! - Randomized target selection with a safety discount on seize size
//! - Main loop with per-iteration error reporting and retry
//!
//! Ledger, wallet and swap access go through the capability traits of
//! `liquidator-chain` and `liquidator-api`.

mod bank_metadata;
mod collateral_converter;
pub mod config;
mod context;
mod executor;
mod liquidator;
mod rebalancer;
mod reporter;
mod target_selector;

pub use bank_metadata::BankMetadataCache;
pub use collateral_converter::{CollateralConverter, SweepReport, DUST_THRESHOLD_UI};
pub use config::{AccountListConfig, AssetsConfig, BotConfig, LiquidatorSettings, MetadataConfig};
pub use context::AgentContext;
pub use executor::{LiquidationExecutor, LiquidationResult};
pub use liquidator::{IterationOutcome, Liquidator, LoopStats};
pub use rebalancer::{Rebalancer, MIN_LIABILITY_PURCHASE_USD};
pub use reporter::{
    reporter_from_env, ErrorReporter, TracingReporter, WebhookReporter, DEFAULT_REPORT_COOLDOWN,
};
pub use target_selector::{
    AccountFilter, LiquidationCandidate, SelectionParams, TargetSelector, SAFETY_DISCOUNT,
};
