//! Pool contract state, read fresh from the Gateway every tick.

use serde::{Deserialize, Serialize};

use crate::{PoolbatchError, Result, constants};

/// Liquidity held by the pool contract, in minor units of each asset.
/// `base` is the native coin, `quote` the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserves {
    pub base: u64,
    pub quote: u64,
}

impl Reserves {
    #[must_use]
    pub fn new(base: u64, quote: u64) -> Self {
        Self { base, quote }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base == 0 || self.quote == 0
    }
}

/// Fee parameters, all expressed against `fee_factor` (per-mille by default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub fee_factor: u64,
    /// Taken by the operator inside the pool contract.
    pub service_fee: u64,
    /// Retained by liquidity providers inside the pool contract.
    pub lp_fee: u64,
    /// Taken by this backend on the tendered (buy) or proceeds (sell) side.
    pub trade_fee: u64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            fee_factor: constants::DEFAULT_FEE_FACTOR,
            service_fee: 0,
            lp_fee: 0,
            trade_fee: 0,
        }
    }
}

impl FeeSchedule {
    /// Combined in-pool fee take.
    #[must_use]
    pub fn pool_take(&self) -> u64 {
        self.service_fee + self.lp_fee
    }

    /// Reject schedules whose fees reach or exceed the fee factor.
    pub fn validate(&self) -> Result<()> {
        if self.fee_factor == 0 {
            return Err(PoolbatchError::Configuration(
                "fee_factor must be positive".to_string(),
            ));
        }
        if self.pool_take() >= self.fee_factor || self.trade_fee >= self.fee_factor {
            return Err(PoolbatchError::Configuration(format!(
                "fee take (service {} + lp {}, trade {}) must stay below fee_factor {}",
                self.service_fee, self.lp_fee, self.trade_fee, self.fee_factor
            )));
        }
        Ok(())
    }
}

/// Pool contract generation. Selects the quoting / settlement behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ContractVersion {
    /// Fee-less constant product.
    V1,
    /// Constant product with in-pool service and LP fees.
    #[default]
    V2,
}

impl std::fmt::Display for ContractVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2 => write!(f, "v2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_schedule_validation() {
        let ok = FeeSchedule {
            fee_factor: 1000,
            service_fee: 1,
            lp_fee: 2,
            trade_fee: 3,
        };
        assert!(ok.validate().is_ok());
        assert_eq!(ok.pool_take(), 3);

        let bad = FeeSchedule {
            service_fee: 600,
            lp_fee: 400,
            ..ok
        };
        assert!(bad.validate().is_err());

        let zero = FeeSchedule {
            fee_factor: 0,
            ..FeeSchedule::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn empty_reserves() {
        assert!(Reserves::new(0, 5).is_empty());
        assert!(!Reserves::new(1, 5).is_empty());
    }
}
