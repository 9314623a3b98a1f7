//! Swap routing abstractions for rebalancing.
//!
//! The liquidator converts between the reference currency and every other
//! asset through a [`SwapRouter`]: it asks for a route, then executes the
//! first route it gets. Routing itself is the router's business.
//!
//! # Example
//!
//! ```rust,ignore
//! let params = SwapParams::new(token_in, token_out, amount_in, 9).with_slippage_bps(50);
//! let route = router.get_route(params).await?;
//! let execution = router.execute(&route).await?;
//! ```

use alloy::primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Parameters for requesting a swap route.
#[derive(Debug, Clone)]
pub struct SwapParams {
    /// Input token mint
    pub token_in: Address,
    /// Output token mint
    pub token_out: Address,
    /// Input amount (native units)
    pub amount_in: U256,
    /// Decimals of input token
    pub decimals_in: u8,
    /// Slippage tolerance in basis points (e.g., 50 = 0.5%)
    pub slippage_bps: u16,
}

impl SwapParams {
    /// Create new swap parameters with defaults.
    pub fn new(token_in: Address, token_out: Address, amount_in: U256, decimals_in: u8) -> Self {
        Self {
            token_in,
            token_out,
            amount_in,
            decimals_in,
            slippage_bps: 50,
        }
    }

    /// Set slippage tolerance.
    pub fn with_slippage_bps(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = slippage_bps.min(BPS_DENOMINATOR as u16);
        self
    }
}

/// Executable route returned by a router.
#[derive(Debug, Clone, Default)]
pub struct SwapRoute {
    /// Router that produced the route
    pub router: String,
    /// Input token
    pub token_in: Address,
    /// Output token
    pub token_out: Address,
    /// Input amount
    pub amount_in: U256,
    /// Expected output amount
    pub expected_output: U256,
    /// Minimum output amount (after slippage)
    pub min_output: U256,
    /// Price impact percentage (if available)
    pub price_impact: Option<f64>,
}

impl SwapRoute {
    /// Check if the route would deliver anything at all.
    pub fn is_empty(&self) -> bool {
        self.amount_in.is_zero() || self.expected_output.is_zero()
    }
}

/// Outcome of an executed swap.
#[derive(Debug, Clone)]
pub struct SwapExecution {
    /// Transaction signature
    pub signature: B256,
    /// Input actually spent
    pub amount_in: U256,
    /// Output actually received
    pub amount_out: U256,
}

/// Reduce `amount` by `slippage_bps`.
#[inline]
pub fn apply_slippage(amount: U256, slippage_bps: u16) -> U256 {
    let keep = BPS_DENOMINATOR.saturating_sub(slippage_bps as u64);
    amount * U256::from(keep) / U256::from(BPS_DENOMINATOR)
}

/// Trait for swap routing providers.
///
/// Implement this trait to add support for a new DEX aggregator or venue.
#[async_trait]
pub trait SwapRouter: Send + Sync + Debug {
    /// Get the router identifier (e.g., "paper", "jupiter").
    fn router_id(&self) -> &str;

    /// Get a swap route for the given parameters.
    async fn get_route(&self, params: SwapParams) -> Result<SwapRoute>;

    /// Execute a previously computed route.
    async fn execute(&self, route: &SwapRoute) -> Result<SwapExecution>;
}
