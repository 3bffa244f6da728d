//! Fee and loss arithmetic.
//!
//! Raw on-chain integers are converted to [`Decimal`] once, here, at the
//! token's precision. Everything above this module works in decimal units.

use alloy::primitives::U256;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal precision of the native currency (Wei per ether/BNB).
pub const NATIVE_DECIMALS: u32 = 18;

/// Largest integer `Decimal` can hold in its 96-bit mantissa.
const MAX_MANTISSA: u128 = (1u128 << 96) - 1;

/// Largest scale `Decimal` supports.
const MAX_SCALE: u32 = 28;

/// Converts a raw token amount to decimal units at `decimals` precision,
/// without trailing zeros.
///
/// Amounts too wide for the 96-bit mantissa drop their least significant
/// digits; whole units are never lost below ~7.9e28 / 10^decimals.
pub fn scale_units(raw: U256, decimals: u32) -> Decimal {
    let mut value = raw;
    let mut scale = decimals;
    let ten = U256::from(10u8);

    while scale > MAX_SCALE || value > U256::from(MAX_MANTISSA) {
        if scale == 0 {
            // integer part alone exceeds the mantissa
            return Decimal::MAX;
        }
        value /= ten;
        scale -= 1;
    }

    let mantissa: u128 = value.to::<u128>();
    Decimal::from_i128_with_scale(mantissa as i128, scale).normalize()
}

/// Transaction fee in native units: `gas_used × effective_gas_price`.
pub fn fee_native(gas_used: u64, effective_gas_price: u128) -> Decimal {
    let wei = U256::from(gas_used).saturating_mul(U256::from(effective_gas_price));
    scale_units(wei, NATIVE_DECIMALS)
}

/// Loss realized by a sell relative to the buy that opened the cycle.
///
/// Negative values are gains. `None` when no buy was observed in this run.
/// Saturates at the `Decimal` bounds.
pub fn realized_loss(last_buy_amount: Option<Decimal>, sell_amount: Decimal) -> Option<Decimal> {
    last_buy_amount.map(|buy| buy.saturating_sub(sell_amount))
}

/// Formats an amount with at most two decimals and no trailing zeros.
///
/// Examples: `100.00` → `"100"`, `12.50` → `"12.5"`, `0.004` → `"0"`.
pub fn format_amount(value: Decimal) -> String {
    value
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

/// Formats an amount with exactly two decimals.
pub fn format_fixed2(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        return "0.00".to_string();
    }
    format!("{rounded:.2}")
}

/// Formats a duration as `"{m} m {s} s"`.
pub fn format_duration(secs: u64) -> String {
    format!("{} m {} s", secs / 60, secs % 60)
}
