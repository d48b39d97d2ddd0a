//! Human-facing amounts. Truncation only; a displayed amount is never
//! larger than the minor units backing it.

use poolbatch_types::{PoolbatchError, Result, constants};
use rust_decimal::Decimal;

/// `minor / 10^decimals`, truncated to `digits` decimal places.
pub fn truncate_display(minor: u64, decimals: u32, digits: u32) -> Result<Decimal> {
    let value = Decimal::try_from_i128_with_scale(i128::from(minor), decimals).map_err(|e| {
        PoolbatchError::InvalidAmount {
            reason: format!("{minor} at {decimals} decimals: {e}"),
        }
    })?;
    Ok(value.trunc_with_scale(digits).normalize())
}

/// Token per native unit for a batch, truncated to display precision.
pub fn observation_price(
    base_amount: u64,
    quote_amount: u64,
    token_decimals: u32,
) -> Result<Decimal> {
    if base_amount == 0 {
        return Err(PoolbatchError::InvalidAmount {
            reason: "price of a zero native amount".to_string(),
        });
    }
    let native = truncate_display(
        base_amount,
        constants::DISPLAY_DIGITS,
        constants::DISPLAY_DIGITS,
    )?;
    let token = Decimal::try_from_i128_with_scale(i128::from(quote_amount), token_decimals)
        .map_err(|e| PoolbatchError::InvalidAmount {
            reason: e.to_string(),
        })?;
    let price = token
        .checked_div(native)
        .ok_or(PoolbatchError::PricingOverflow)?;
    Ok(price.trunc_with_scale(constants::DISPLAY_DIGITS).normalize())
}
