//! Quantity precision helpers.
//!
//! Order quantities are never rounded up: a sell must not ask for more
//! than the wallet holds and a precision retry must not grow the order.

use anyhow::{Context, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Number of digits after the decimal point in a plain decimal string.
///
/// `"0.00123"` → 5, `"12"` → 0, `"3."` → 0.
pub fn fractional_digits(raw: &str) -> u32 {
    raw.trim()
        .split_once('.')
        .map(|(_, frac)| frac.chars().take_while(|c| c.is_ascii_digit()).count() as u32)
        .unwrap_or(0)
}

/// Drop every digit past `decimals` places. Quantities are positive, so
/// truncating toward zero is the floor.
pub fn truncate(quantity: Decimal, decimals: u32) -> Decimal {
    quantity.round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}

/// Sell quantity for a raw wallet balance string.
///
/// Keeps `min(fractional_digits(raw), max_decimals)` decimals so the order
/// never carries more precision than the wallet reports. An empty balance
/// string means nothing to sell.
pub fn sell_quantity(raw: &str, max_decimals: u32) -> Result<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let balance = Decimal::from_str(raw)
        .with_context(|| format!("Wallet balance '{raw}' is not a decimal number"))?;
    let decimals = fractional_digits(raw).min(max_decimals);
    Ok(truncate(balance, decimals))
}
