//! Liquidity-provider claims.

use poolbatch_types::{PoolbatchError, Result};
use serde::{Deserialize, Serialize};

/// Pool balances together with the outstanding LP token supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpPool {
    pub base: u64,
    pub quote: u64,
    pub lp_supply: u64,
}

/// What redeeming an LP amount would return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LpClaim {
    pub base: u64,
    pub quote: u64,
    pub lp: u64,
}

/// Proportional base / quote claim of `lp_amount` LP tokens, floored.
pub fn lp_share(lp_amount: u64, pool: &LpPool) -> Result<LpClaim> {
    if lp_amount == 0 {
        return Ok(LpClaim::default());
    }
    if lp_amount > pool.lp_supply {
        return Err(PoolbatchError::InvalidAmount {
            reason: format!("lp amount {lp_amount} exceeds supply {}", pool.lp_supply),
        });
    }
    let claim = |reserve: u64| {
        let v = u128::from(reserve) * u128::from(lp_amount) / u128::from(pool.lp_supply);
        u64::try_from(v).map_err(|_| PoolbatchError::PricingOverflow)
    };
    Ok(LpClaim {
        base: claim(pool.base)?,
        quote: claim(pool.quote)?,
        lp: lp_amount,
    })
}
