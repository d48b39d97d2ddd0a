//! Error types for the PoolBatch swap backend.
//!
//! All errors use the `PB_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Input validation
//! - 2xx: Resource pool errors
//! - 3xx: Pricing errors
//! - 4xx: Gateway-reported shortfalls
//! - 5xx: Settlement / distribution errors
//! - 6xx: External service errors
//! - 9xx: General / internal errors
//!
//! Lock contention is deliberately absent: a lease that cannot be acquired
//! is a `false` return and the candidate is skipped.

use thiserror::Error;

use crate::{Bucket, CorrelationId, PairId};

/// Central error enum for all PoolBatch operations.
#[derive(Debug, Clone, Error)]
pub enum PoolbatchError {
    // =================================================================
    // Input Validation (1xx)
    // =================================================================
    /// The order failed validation.
    #[error("PB_ERR_100: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// No aggregator is registered for this pair.
    #[error("PB_ERR_101: Unknown pair: {0}")]
    UnknownPair(PairId),

    /// An amount was zero, negative or otherwise unusable.
    #[error("PB_ERR_102: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    // =================================================================
    // Resource Pool (2xx)
    // =================================================================
    /// The pool could not lease enough resources to meet the target.
    #[error("PB_ERR_200: Insufficient resources in {bucket}: need {needed}, leased {available}")]
    InsufficientResources {
        bucket: Bucket,
        needed: u64,
        available: u64,
    },

    // =================================================================
    // Pricing (3xx)
    // =================================================================
    /// Fixed-point arithmetic overflowed.
    #[error("PB_ERR_300: Pricing arithmetic overflow")]
    PricingOverflow,

    /// One side of the pool has no reserve.
    #[error("PB_ERR_301: Pool reserves are empty")]
    EmptyReserves,

    /// An exact-out request would drain the reserve.
    #[error("PB_ERR_302: Requested {requested} exhausts reserve {reserve}")]
    ReserveExhausted { requested: u64, reserve: u64 },

    // =================================================================
    // Gateway-reported shortfalls (4xx)
    // =================================================================
    /// The pool contract holds too little liquidity in consolidated form.
    #[error("PB_ERR_400: Insufficient pool liquidity: {reason}")]
    InsufficientPoolLiquidity { reason: String },

    /// The funding inputs could not cover the transaction.
    #[error("PB_ERR_401: Insufficient funding: {reason}")]
    InsufficientFunding { reason: String },

    // =================================================================
    // Settlement / Distribution (5xx)
    // =================================================================
    /// Settlement retries exhausted. The trade record stays incomplete.
    #[error("PB_ERR_500: Settlement timed out after {attempts} attempt(s): {last_error}")]
    SettlementTimeout { attempts: u32, last_error: String },

    /// Refunding slippage-rejected orders failed. `orders` lists the
    /// orders still owed their tendered amount.
    #[error("PB_ERR_501: Refund of {} order(s) failed: {reason}", orders.len())]
    RefundFailed {
        reason: String,
        orders: Vec<CorrelationId>,
    },

    /// Paying out a settled batch failed part-way.
    #[error("PB_ERR_502: Distribution failed: {reason}")]
    DistributionFailed { reason: String },

    // =================================================================
    // External services (6xx)
    // =================================================================
    /// Transient failure of the Gateway or Ledger.
    #[error("PB_ERR_600: External service {service} failed: {reason}")]
    ExternalService {
        service: &'static str,
        reason: String,
    },

    /// Alert delivery failed.
    #[error("PB_ERR_601: Notification failed: {reason}")]
    Notification { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("PB_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("PB_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("PB_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl PoolbatchError {
    /// Shortfalls and transient failures that a bounded retry may clear.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientPoolLiquidity { .. }
                | Self::InsufficientFunding { .. }
                | Self::InsufficientResources { .. }
                | Self::ExternalService { .. }
        )
    }

    /// Errors that end a batch and require out-of-band reconciliation.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SettlementTimeout { .. })
    }

    /// Shorthand for a Gateway failure.
    pub fn gateway(reason: impl Into<String>) -> Self {
        Self::ExternalService {
            service: "gateway",
            reason: reason.into(),
        }
    }

    /// Shorthand for a Ledger failure.
    pub fn ledger(reason: impl Into<String>) -> Self {
        Self::ExternalService {
            service: "ledger",
            reason: reason.into(),
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, PoolbatchError>;

impl From<serde_json::Error> for PoolbatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
