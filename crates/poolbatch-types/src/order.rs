//! Swap orders waiting for the next batch.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, CorrelationId, PoolbatchError, Result};

/// Trade direction. `Buy` tenders native coin for token; `Sell` tenders
/// token for native coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Ledger kind code (`1` = buy, `2` = sell).
    #[must_use]
    pub fn kind_code(self) -> u8 {
        match self {
            Self::Buy => 1,
            Self::Sell => 2,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Inbound swap request, before a submission-time quote is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    pub correlation_id: CorrelationId,
    pub side: Side,
    /// Where proceeds (or a refund) are paid.
    pub address: Address,
    /// Amount received from the client, in the tendered asset's minor units.
    pub amount: u64,
    /// Maximum acceptable adverse movement, in percent.
    pub slippage_percent: Decimal,
}

impl SwapRequest {
    /// Reject requests that could never be settled.
    pub fn validate(&self) -> Result<()> {
        if self.amount == 0 {
            return Err(PoolbatchError::InvalidOrder {
                reason: "amount must be positive".to_string(),
            });
        }
        if self.slippage_percent < Decimal::ZERO || self.slippage_percent > Decimal::ONE_HUNDRED {
            return Err(PoolbatchError::InvalidOrder {
                reason: format!("slippage {}% outside [0, 100]", self.slippage_percent),
            });
        }
        if self.address.as_str().is_empty() {
            return Err(PoolbatchError::InvalidOrder {
                reason: "empty payout address".to_string(),
            });
        }
        Ok(())
    }
}

/// An order buffered for the next tick of its pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub correlation_id: CorrelationId,
    pub side: Side,
    pub address: Address,
    /// Amount entering the pool, net of any trade fee taken at ingestion.
    pub tendered: u64,
    pub slippage_percent: Decimal,
    /// Counter-amount this order alone would have received at submission.
    pub quote_at_submission: u64,
    pub submitted_at: DateTime<Utc>,
}

impl PendingOrder {
    /// The lowest pro-rata share this order accepts:
    /// `quote_at_submission × (1 − slippage/100)`.
    #[must_use]
    pub fn slippage_floor(&self) -> Decimal {
        let keep = Decimal::ONE - self.slippage_percent / Decimal::ONE_HUNDRED;
        Decimal::from(self.quote_at_submission) * keep
    }

    /// Whether `share` satisfies this order's slippage floor.
    #[must_use]
    pub fn accepts(&self, share: u64) -> bool {
        Decimal::from(share) >= self.slippage_floor()
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl PendingOrder {
    pub fn dummy(side: Side, tendered: u64, quote_at_submission: u64, slippage: Decimal) -> Self {
        let tag = uuid::Uuid::now_v7().simple().to_string();
        Self {
            correlation_id: CorrelationId(format!("corr-{tag}")),
            side,
            address: Address(format!("client-{tag}")),
            tendered,
            slippage_percent: slippage,
            quote_at_submission,
            submitted_at: Utc::now(),
        }
    }
}
