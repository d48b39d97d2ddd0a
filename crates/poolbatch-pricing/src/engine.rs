//! Direction-aware quoting bound to a fee schedule.

use poolbatch_types::{FeeSchedule, Reserves, Result, Side};

use crate::quote::{required_in_for_out, swap_out};

/// Quotes a [`Side`] against reserves with a fixed fee schedule.
///
/// `Buy` tenders native (base) for token (quote); `Sell` the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingEngine {
    fees: FeeSchedule,
}

impl PricingEngine {
    #[must_use]
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    /// An engine with no in-pool fee take.
    #[must_use]
    pub fn fee_less(fee_factor: u64) -> Self {
        Self::new(FeeSchedule {
            fee_factor,
            service_fee: 0,
            lp_fee: 0,
            trade_fee: 0,
        })
    }

    #[must_use]
    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    fn orient(side: Side, reserves: &Reserves) -> (u64, u64) {
        match side {
            Side::Buy => (reserves.base, reserves.quote),
            Side::Sell => (reserves.quote, reserves.base),
        }
    }

    /// Counter-amount for tendering `amount` on `side`.
    pub fn quote(&self, side: Side, reserves: &Reserves, amount: u64) -> Result<u64> {
        let (r_in, r_out) = Self::orient(side, reserves);
        swap_out(r_in, r_out, amount, &self.fees)
    }

    /// Tender needed on `side` to receive at least `amount_out`.
    pub fn required_in(&self, side: Side, reserves: &Reserves, amount_out: u64) -> Result<u64> {
        let (r_in, r_out) = Self::orient(side, reserves);
        required_in_for_out(r_in, r_out, amount_out, &self.fees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sides_pick_direction() {
        let engine = PricingEngine::new(FeeSchedule {
            fee_factor: 1000,
            service_fee: 1,
            lp_fee: 2,
            trade_fee: 0,
        });
        let reserves = Reserves::new(1_000_000, 2_000_000);
        assert_eq!(engine.quote(Side::Buy, &reserves, 10_000).unwrap(), 19_744);
        // 19_940 effective; floor(2e12 / 2_019_940) = 990_128
        assert_eq!(engine.quote(Side::Sell, &reserves, 20_000).unwrap(), 9_872);
    }

    #[test]
    fn fee_less_engine_has_no_take() {
        let engine = PricingEngine::fee_less(1000);
        assert_eq!(engine.fees().pool_take(), 0);
    }
}
