//! Slippage filtering and pro-rata payouts for one batch.
//!
//! Each order's share of the batch counter-amount is
//! `floor(tendered × counter / aggregate)`. An order whose share falls below
//! its slippage floor is refunded instead of settled, so price drift since
//! submission is borne pro-rata by the orders that accept it.

use poolbatch_pricing::pro_rata_share;
use poolbatch_types::PendingOrder;

/// Orders of one snapshot, partitioned by the slippage check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlippageSplit {
    pub accepted: Vec<PendingOrder>,
    pub refunded: Vec<PendingOrder>,
}

/// Sum of the tendered amounts.
#[must_use]
pub fn aggregate_tendered(orders: &[PendingOrder]) -> u64 {
    orders.iter().map(|o| o.tendered).sum()
}

/// Floor pro-rata share of `total` for every order, in order.
///
/// The shares never sum to more than `total`.
#[must_use]
pub fn pro_rata_payouts(orders: &[PendingOrder], total: u64) -> Vec<u64> {
    let aggregate = aggregate_tendered(orders);
    orders
        .iter()
        .map(|o| pro_rata_share(o.tendered, aggregate, total))
        .collect()
}

/// Partition `orders` by whether their share of `counter` meets their
/// slippage floor. Relative order is kept on both sides.
///
/// An order with 0% slippage is refunded whenever it shares a batch with
/// other orders: the combined trade has more price impact than its solo
/// quote, so its share always falls short. An order whose share rounds to
/// zero is refunded whatever its tolerance.
#[must_use]
pub fn split_by_slippage(orders: Vec<PendingOrder>, counter: u64) -> SlippageSplit {
    let shares = pro_rata_payouts(&orders, counter);
    let mut split = SlippageSplit::default();
    for (order, share) in orders.into_iter().zip(shares) {
        if share > 0 && order.accepts(share) {
            split.accepted.push(order);
        } else {
            split.refunded.push(order);
        }
    }
    split
}

/// Cap a payout list so its running total never exceeds `available`.
/// Earlier orders are paid in full first.
#[must_use]
pub fn cap_payouts(payouts: Vec<u64>, available: u64) -> Vec<u64> {
    let mut remaining = available;
    payouts
        .into_iter()
        .map(|p| {
            let paid = p.min(remaining);
            remaining -= paid;
            paid
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::Rng;
    use rust_decimal::Decimal;

    use super::*;
    use poolbatch_types::Side;

    fn order(tendered: u64, quote: u64, slippage: i64) -> PendingOrder {
        PendingOrder::dummy(Side::Buy, tendered, quote, Decimal::new(slippage, 0))
    }

    #[test]
    fn drift_is_shared_pro_rata() {
        // Alone at submission: 6_000 -> 11_893, 4_000 -> 7_945.
        // Together they get 19_744: shares 11_846 and 7_897.
        let orders = vec![order(6_000, 11_893, 1), order(4_000, 7_945, 1)];
        assert_eq!(pro_rata_payouts(&orders, 19_744), vec![11_846, 7_897]);

        let split = split_by_slippage(orders, 19_744);
        assert_eq!(split.accepted.len(), 2);
        assert!(split.refunded.is_empty());
    }

    #[test]
    fn zero_tolerance_rejects_any_drift() {
        let orders = vec![order(6_000, 11_893, 0), order(4_000, 7_945, 1)];
        let split = split_by_slippage(orders, 19_744);
        assert_eq!(split.refunded.len(), 1);
        assert_eq!(split.refunded[0].tendered, 6_000);
        assert_eq!(split.accepted[0].tendered, 4_000);
    }

    #[test]
    fn zero_share_is_refunded() {
        // A fully tolerant order still cannot settle for nothing.
        let dust = order(1, 0, 100);
        assert!(dust.accepts(0));
        let split = split_by_slippage(vec![dust], 0);
        assert!(split.accepted.is_empty());
        assert_eq!(split.refunded.len(), 1);

        let orders = vec![order(1, 0, 100), order(9_999, 4_000, 1)];
        let split = split_by_slippage(orders, 5_000);
        assert_eq!(split.refunded.len(), 1);
        assert_eq!(split.refunded[0].tendered, 1);
        assert_eq!(split.accepted[0].tendered, 9_999);
    }

    #[test]
    fn accepted_orders_meet_their_floor() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let orders: Vec<PendingOrder> = (0..rng.gen_range(1..12))
                .map(|_| {
                    let tendered = rng.gen_range(1..1_000_000);
                    let quote = rng.gen_range(1..2_000_000);
                    order(tendered, quote, rng.gen_range(0..30))
                })
                .collect();
            let counter = rng.gen_range(0..20_000_000);
            let split = split_by_slippage(orders, counter);
            let all: Vec<PendingOrder> = split
                .accepted
                .iter()
                .chain(split.refunded.iter())
                .cloned()
                .collect();
            let shares = pro_rata_payouts(&all, counter);
            for (order, share) in split.accepted.iter().zip(&shares) {
                assert!(Decimal::from(*share) >= order.slippage_floor());
            }
        }
    }

    #[test]
    fn payouts_never_exceed_total() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let orders: Vec<PendingOrder> = (0..rng.gen_range(1..20))
                .map(|_| order(rng.gen_range(1..10_000_000), 1, 0))
                .collect();
            let total = rng.gen_range(0..u64::from(u32::MAX));
            let payouts = pro_rata_payouts(&orders, total);
            let paid: u64 = payouts.iter().sum();
            assert!(paid <= total);
            // Each floor loses less than one unit.
            assert!(total - paid < orders.len() as u64);
        }
    }

    #[test]
    fn cap_pays_earlier_orders_first() {
        assert_eq!(cap_payouts(vec![5, 5, 5], 12), vec![5, 5, 2]);
        assert_eq!(cap_payouts(vec![5, 5], 0), vec![0, 0]);
        assert_eq!(cap_payouts(vec![5, 5], 100), vec![5, 5]);
    }
}
