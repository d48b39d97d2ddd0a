//! Cross-module pricing properties.

use poolbatch_pricing::{
    PricingEngine, effective_in, pro_rata_share, quote_base_to_quote, quote_quote_to_base,
};
use poolbatch_types::{FeeSchedule, PendingOrder, Reserves, Side};
use rand::Rng;
use rust_decimal::Decimal;

fn v2_fees() -> FeeSchedule {
    FeeSchedule {
        fee_factor: 1000,
        service_fee: 1,
        lp_fee: 2,
        trade_fee: 0,
    }
}

#[test]
fn one_percent_slippage_scenario() {
    let reserves = Reserves::new(1_000_000, 2_000_000);
    let engine = PricingEngine::new(v2_fees());
    let at_submission = engine.quote(Side::Buy, &reserves, 10_000).unwrap();
    assert_eq!(at_submission, 19_744);

    let order = PendingOrder::dummy(Side::Buy, 10_000, at_submission, Decimal::ONE);
    // Floor is 19_744 × 0.99 = 19_546.56.
    assert!(order.accepts(19_547));
    assert!(!order.accepts(19_546));

    // Alone in the batch on unchanged reserves: realised == quoted.
    let realised = pro_rata_share(10_000, 10_000, at_submission);
    assert!(order.accepts(realised));

    // Another buyer got in first and moved the pool by more than 1%.
    let moved = Reserves::new(1_200_000, 1_666_667);
    let realised = engine.quote(Side::Buy, &moved, 10_000).unwrap();
    assert!(!order.accepts(realised));
}

#[test]
fn round_trip_never_returns_more_than_tendered_minus_fees() {
    let mut rng = rand::thread_rng();
    for _ in 0..1_000 {
        let reserves = Reserves::new(
            rng.gen_range(1_000..1_000_000_000_000),
            rng.gen_range(1_000..1_000_000_000_000),
        );
        let take = rng.gen_range(0..30);
        let fees = FeeSchedule {
            fee_factor: 1000,
            service_fee: take / 2,
            lp_fee: take - take / 2,
            trade_fee: 0,
        };
        let tendered = rng.gen_range(1..reserves.base);

        let quote_out = quote_base_to_quote(&reserves, tendered, &fees).unwrap();
        let back = quote_quote_to_base(&reserves, quote_out, &fees).unwrap();

        // Flooring the post-swap reserve can overpay by one quote unit,
        // which is worth at most ceil(base / quote) native units.
        let after_one_take = effective_in(tendered, &fees).unwrap();
        let rounding = reserves.base.div_ceil(reserves.quote);
        assert!(
            back <= after_one_take + rounding,
            "reserves {reserves:?}, take {take}: tendered {tendered}, got back {back}"
        );
    }
}

#[test]
fn round_trip_on_scenario_pool_loses_value() {
    let reserves = Reserves::new(1_000_000, 2_000_000);
    let fees = v2_fees();
    let quote_out = quote_base_to_quote(&reserves, 10_000, &fees).unwrap();
    let back = quote_quote_to_base(&reserves, quote_out, &fees).unwrap();
    assert!(back < effective_in(10_000, &fees).unwrap());
}

#[test]
fn batch_shares_sum_within_settled_amount() {
    let mut rng = rand::thread_rng();
    let engine = PricingEngine::new(v2_fees());
    let reserves = Reserves::new(50_000_000, 80_000_000);
    for _ in 0..200 {
        let tenders: Vec<u64> = (0..rng.gen_range(1..12))
            .map(|_| rng.gen_range(1_000..500_000))
            .collect();
        let aggregate: u64 = tenders.iter().sum();
        let counter = engine.quote(Side::Buy, &reserves, aggregate).unwrap();
        let paid: u64 = tenders
            .iter()
            .map(|t| pro_rata_share(*t, aggregate, counter))
            .sum();
        assert!(paid <= counter);
        assert!(counter - paid < tenders.len() as u64);
    }
}
