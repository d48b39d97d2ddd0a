//! # poolbatch-aggregator
//!
//! **Per-pair order batching for PoolBatch.**
//!
//! Swap requests for one pair are collected, priced together and settled as
//! a single contract transaction:
//!
//! - **Book**: [`PendingBook`] keeps the buy and sell orders waiting for
//!   the next tick
//! - **Filter**: [`split_by_slippage`] refunds orders whose pro-rata share
//!   misses their floor; [`pro_rata_payouts`] and [`cap_payouts`] split the
//!   proceeds
//! - **Behaviour**: [`PoolBehavior`] holds what differs between contract
//!   versions ([`ConstantProductV1`], [`ConstantProductV2`])
//! - **Aggregator**: [`PairAggregator`] runs the tick: quote, filter,
//!   refund, settle with recovery, distribute. Its phase is a
//!   [`BatchPhase`] and each tick yields a [`TickOutcome`]
//! - **Registry**: [`PoolRegistry`] maps pairs to their aggregator

pub mod aggregator;
pub mod behavior;
pub mod book;
pub mod filter;
pub mod phase;
pub mod registry;

pub use aggregator::{AggregatorDeps, BatchReport, PairAggregator, TickOutcome};
pub use behavior::{ConstantProductV1, ConstantProductV2, PoolBehavior, behavior_for};
pub use book::PendingBook;
pub use filter::{
    SlippageSplit, aggregate_tendered, cap_payouts, pro_rata_payouts, split_by_slippage,
};
pub use phase::BatchPhase;
pub use registry::PoolRegistry;
