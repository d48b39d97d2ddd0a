//! # poolbatch-pricing
//!
//! **Constant-product pricing for PoolBatch.**
//!
//! Everything here is pure integer arithmetic on minor units:
//!
//! - **Quotes**: exact-in ([`quote_base_to_quote`], [`quote_quote_to_base`])
//!   and exact-out ([`required_in_for_out`]) against a [`Reserves`] snapshot
//! - **Engine**: [`PricingEngine`] binds a fee schedule and picks the
//!   direction from a [`Side`]
//! - **Shares**: [`pro_rata_share`] for batch distribution
//! - **Display**: [`truncate_display`] and [`observation_price`], never
//!   rounding up
//! - **History**: [`candles`] (OHLC with forward-filled gaps) and
//!   [`lp_share`]
//!
//! [`Reserves`]: poolbatch_types::Reserves
//! [`Side`]: poolbatch_types::Side

pub mod candles;
pub mod display;
pub mod engine;
pub mod lp;
pub mod quote;
pub mod share;

pub use candles::{Candle, candles};
pub use display::{observation_price, truncate_display};
pub use engine::PricingEngine;
pub use lp::{LpClaim, LpPool, lp_share};
pub use quote::{
    after_trade_fee, effective_in, quote_base_to_quote, quote_quote_to_base, required_in_for_out,
    swap_out,
};
pub use share::pro_rata_share;
