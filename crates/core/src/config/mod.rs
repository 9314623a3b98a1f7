//! Configuration for the liquidation agent.
//!
//! This module provides:
//! - Runtime parameters (loop timing, liquidation thresholds, slippage)
//! - Candidate account filters (allow-list, deny-list)
//! - Reference and native currency settings
//! - Bank metadata source

mod bot;

pub use bot::{AccountListConfig, AssetsConfig, BotConfig, LiquidatorSettings, MetadataConfig};
