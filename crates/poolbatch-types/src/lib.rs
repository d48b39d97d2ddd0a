//! # poolbatch-types
//!
//! Shared types, errors, configuration and collaborator ports for the
//! **PoolBatch** swap backend.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`Address`], [`PairId`], [`TxId`], [`KeyRef`], [`CorrelationId`], [`Asset`], [`ResourceId`], [`HolderId`], [`TradeRecordId`]
//! - **Resource model**: [`Resource`], [`Bucket`]
//! - **Order model**: [`Side`], [`SwapRequest`], [`PendingOrder`]
//! - **Pool model**: [`Reserves`], [`FeeSchedule`], [`ContractVersion`]
//! - **Trade model**: [`PriceObservation`], [`TradeRecord`], [`TradeLine`], [`TradeStatus`], [`TradeUpdate`], [`OrderFill`]
//! - **Gateway payloads**: [`PaymentRequest`], [`PaymentReceipt`], [`Recipient`], [`SettlementRequest`], [`TokenTransfer`]
//! - **Ports**: [`Gateway`], [`Ledger`], [`Notifier`]
//! - **Configuration**: [`ServiceConfig`], [`PairConfig`], [`ResourcePoolConfig`], [`AggregatorConfig`], [`FundingAccount`]
//! - **Errors**: [`PoolbatchError`] with `PB_ERR_` prefix codes
//! - **Constants**: system-wide thresholds and defaults
//!
//! With the `test-helpers` feature, [`testkit`] provides in-memory fakes.

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod order;
pub mod payment;
pub mod pool;
pub mod ports;
pub mod resource;
pub mod trade;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testkit;

pub use config::*;
pub use error::*;
pub use ids::*;
pub use order::*;
pub use payment::*;
pub use pool::*;
pub use ports::*;
pub use resource::*;
pub use trade::*;

// Constants are accessed via `poolbatch_types::constants::FOO`
// (not re-exported to avoid name collisions).
