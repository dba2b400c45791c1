//! Fixed-point price conversion.
//!
//! Prices are carried as `u64` ticks with two implied decimals; decimal
//! text from files and the command line goes through `rust_decimal`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Number of implied decimal places in a tick price
pub const PRICE_DECIMALS: u32 = 2;

/// Ticks per whole currency unit
pub const TICKS_PER_UNIT: u64 = 100;

/// Convert a decimal price to ticks, rounding to the nearest tick.
///
/// Returns `None` for negative prices or values that do not fit in `u64`.
pub fn to_ticks(price: Decimal) -> Option<u64> {
    price
        .checked_mul(Decimal::from(TICKS_PER_UNIT))?
        .round()
        .to_u64()
}

/// Convert ticks back to a decimal with exactly two decimal places.
#[inline]
pub fn from_ticks(ticks: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(ticks), PRICE_DECIMALS)
}

/// Render ticks as `123.45`
#[inline]
pub fn format_ticks(ticks: u64) -> String {
    from_ticks(ticks).to_string()
}
