//! Fixed-precision decimal helpers.
//!
//! Amounts are `rust_decimal::Decimal` values carried at the scale of the token they
//! denominate. `to_fixed` rounds half away from zero and pins the scale so amounts print
//! as `"20.00000000"`; `to_fixed_down` truncates toward zero and is used wherever an
//! amount must not exceed what is held in escrow.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Parses a decimal amount as sent in a payload. Accepts plain and scientific notation.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Number of significant decimal places (`"1.50"` has one).
pub fn count_decimals(value: Decimal) -> u32 {
    value.normalize().scale()
}

/// Rounds half away from zero to `dp` places and pins the scale to `dp`.
pub fn to_fixed(value: Decimal, dp: u32) -> Decimal {
    with_scale(
        value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
        dp,
    )
}

/// Truncates toward zero to `dp` places and pins the scale to `dp`.
pub fn to_fixed_down(value: Decimal, dp: u32) -> Decimal {
    with_scale(value.round_dp_with_strategy(dp, RoundingStrategy::ToZero), dp)
}

/// Exact `price * quantity`, or `None` on overflow.
pub fn notional(price: Decimal, quantity: Decimal) -> Option<Decimal> {
    price.checked_mul(quantity)
}

/// Settlement owed for `quantity` at `price`, never more than `escrow`.
///
/// Rounded to nearest first; if that overdraws the escrow the truncated value is used,
/// and the result is clamped to `escrow` when truncation alone is not enough.
pub fn capped_amount(price: Decimal, quantity: Decimal, escrow: Decimal, dp: u32) -> Decimal {
    let exact = price * quantity;
    let amount = to_fixed(exact, dp);
    if amount <= escrow {
        return amount;
    }
    to_fixed_down(exact, dp).min(to_fixed(escrow, dp))
}

fn with_scale(mut value: Decimal, dp: u32) -> Decimal {
    value.rescale(dp);
    value
}
