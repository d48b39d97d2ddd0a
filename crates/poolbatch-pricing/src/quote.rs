//! Constant-product quote math.
//!
//! For an exact-in swap of `amount_in` against reserves `(r_in, r_out)`:
//!
//! ```text
//! effective = amount_in × (fee_factor − service_fee − lp_fee) / fee_factor
//! new_in    = r_in + effective
//! new_out   = floor(r_in × r_out / new_in)
//! out       = r_out − new_out
//! ```
//!
//! Intermediates are `u128`; both floors favour the pool.

use poolbatch_types::{FeeSchedule, PoolbatchError, Reserves, Result};

/// Tendered amount after the in-pool fee take.
pub fn effective_in(amount_in: u64, fees: &FeeSchedule) -> Result<u64> {
    if fees.fee_factor == 0 || fees.pool_take() > fees.fee_factor {
        return Err(PoolbatchError::InvalidAmount {
            reason: format!(
                "fee take {} exceeds fee factor {}",
                fees.pool_take(),
                fees.fee_factor
            ),
        });
    }
    let kept = u128::from(fees.fee_factor - fees.pool_take());
    let effective = u128::from(amount_in) * kept / u128::from(fees.fee_factor);
    u64::try_from(effective).map_err(|_| PoolbatchError::PricingOverflow)
}

/// `amount` net of the backend trade fee: `amount × (fee_factor − trade_fee) / fee_factor`.
///
/// Buy tenders pass through this at ingestion; sell proceeds before the
/// pro-rata split.
pub fn after_trade_fee(amount: u64, fees: &FeeSchedule) -> Result<u64> {
    if fees.fee_factor == 0 || fees.trade_fee > fees.fee_factor {
        return Err(PoolbatchError::InvalidAmount {
            reason: format!(
                "trade fee {} exceeds fee factor {}",
                fees.trade_fee, fees.fee_factor
            ),
        });
    }
    let kept = u128::from(fees.fee_factor - fees.trade_fee);
    let net = u128::from(amount) * kept / u128::from(fees.fee_factor);
    u64::try_from(net).map_err(|_| PoolbatchError::PricingOverflow)
}

/// Output of an exact-in swap from the `reserve_in` side to `reserve_out`.
pub fn swap_out(
    reserve_in: u64,
    reserve_out: u64,
    amount_in: u64,
    fees: &FeeSchedule,
) -> Result<u64> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(PoolbatchError::EmptyReserves);
    }
    let effective = u128::from(effective_in(amount_in, fees)?);
    let k = u128::from(reserve_in) * u128::from(reserve_out);
    let new_in = u128::from(reserve_in) + effective;
    let new_out = k / new_in;
    let out = u128::from(reserve_out) - new_out;
    u64::try_from(out).map_err(|_| PoolbatchError::PricingOverflow)
}

/// Token received for tendering `base_in` native units.
pub fn quote_base_to_quote(reserves: &Reserves, base_in: u64, fees: &FeeSchedule) -> Result<u64> {
    swap_out(reserves.base, reserves.quote, base_in, fees)
}

/// Native coin received for tendering `quote_in` token units.
pub fn quote_quote_to_base(reserves: &Reserves, quote_in: u64, fees: &FeeSchedule) -> Result<u64> {
    swap_out(reserves.quote, reserves.base, quote_in, fees)
}

fn div_ceil(n: u128, d: u128) -> u128 {
    n / d + u128::from(n % d != 0)
}

/// Smallest tender on the `reserve_in` side that yields at least `amount_out`.
///
/// Fails with `ReserveExhausted` when `amount_out` would drain `reserve_out`.
pub fn required_in_for_out(
    reserve_in: u64,
    reserve_out: u64,
    amount_out: u64,
    fees: &FeeSchedule,
) -> Result<u64> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(PoolbatchError::EmptyReserves);
    }
    if amount_out >= reserve_out {
        return Err(PoolbatchError::ReserveExhausted {
            requested: amount_out,
            reserve: reserve_out,
        });
    }
    if amount_out == 0 {
        return Ok(0);
    }
    let kept = u128::from(fees.fee_factor.saturating_sub(fees.pool_take()));
    if kept == 0 {
        return Err(PoolbatchError::InvalidAmount {
            reason: "fee take consumes the whole tender".to_string(),
        });
    }
    let k = u128::from(reserve_in) * u128::from(reserve_out);
    let new_out = u128::from(reserve_out - amount_out);
    // Smallest new_in with floor(k / new_in) <= new_out.
    let new_in = k / (new_out + 1) + 1;
    let effective = new_in.saturating_sub(u128::from(reserve_in));
    let gross = div_ceil(effective * u128::from(fees.fee_factor), kept);
    u64::try_from(gross).map_err(|_| PoolbatchError::PricingOverflow)
}
