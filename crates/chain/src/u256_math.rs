//! Conversions between UI-scaled decimal amounts and native U256 amounts.
//!
//! Lending actions take UI amounts, swaps take native amounts. These
//! helpers are the only place the two meet.

use alloy::primitives::U256;

/// Scale a UI amount to native units, rounding down.
/// Negative, NaN and infinite inputs map to zero.
#[inline]
pub fn ui_to_native(amount: f64, decimals: u8) -> U256 {
    if !amount.is_finite() || amount <= 0.0 {
        return U256::ZERO;
    }
    let scaled = (amount * 10f64.powi(decimals as i32)).floor();
    if scaled >= u128::MAX as f64 {
        return U256::from(u128::MAX);
    }
    U256::from(scaled as u128)
}

/// Scale a native amount to UI units.
/// Amounts beyond u128 saturate (precision is lost there anyway).
#[inline]
pub fn native_to_ui(amount: U256, decimals: u8) -> f64 {
    let raw = u128::try_from(amount).unwrap_or(u128::MAX) as f64;
    raw / 10f64.powi(decimals as i32)
}
