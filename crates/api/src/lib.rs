//! API clients and routing abstractions for external services.
//!
//! This crate provides:
//! - Swap routing: the interface rebalancing uses to convert tokens
//! - Bank metadata: token symbols for human-readable logs

mod metadata;
pub mod swap;

pub use metadata::{parse_metadata, BankMetadata, BankMetadataClient, BankMetadataMap};
pub use swap::{apply_slippage, SwapExecution, SwapParams, SwapRoute, SwapRouter};
