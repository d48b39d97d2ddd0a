//! Records written to the Ledger for every settled batch.
//!
//! A [`TradeRecord`] is created `Pending` before settlement, gains its
//! settlement reference once the swap broadcasts, and collects one
//! [`OrderFill`] per paid order during distribution.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, CorrelationId, PairId, PendingOrder, Side, TradeRecordId, TxId};

/// Aggregate price of one batch, appended to the price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub pair: PairId,
    pub kind: Side,
    /// Native amount of the batch, in minor units.
    pub base_amount: u64,
    /// Token amount of the batch, in minor units.
    pub quote_amount: u64,
    /// Token per native unit, truncated for display.
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Lifecycle of a trade record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    /// Written before settlement; no settlement reference yet.
    Pending,
    /// Settlement broadcast; payouts outstanding.
    Settled,
    /// Every accepted order has been paid.
    Distributed,
    /// Settlement or distribution gave up. Needs manual reconciliation.
    Failed { reason: String },
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Distributed => write!(f, "DISTRIBUTED"),
            Self::Failed { reason } => write!(f, "FAILED({reason})"),
        }
    }
}

/// One accepted order inside a trade record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLine {
    pub correlation_id: CorrelationId,
    pub address: Address,
    pub tendered: u64,
    pub quote_at_submission: u64,
    pub slippage_percent: Decimal,
    /// Amount actually paid, once distributed.
    pub payout: Option<u64>,
    pub payout_tx: Option<TxId>,
}

impl From<&PendingOrder> for TradeLine {
    fn from(order: &PendingOrder) -> Self {
        Self {
            correlation_id: order.correlation_id.clone(),
            address: order.address.clone(),
            tendered: order.tendered,
            quote_at_submission: order.quote_at_submission,
            slippage_percent: order.slippage_percent,
            payout: None,
            payout_tx: None,
        }
    }
}

/// A persisted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: TradeRecordId,
    pub pair: PairId,
    pub side: Side,
    pub lines: Vec<TradeLine>,
    pub total_in: u64,
    pub total_out: u64,
    pub settlement_ref: Option<TxId>,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
}

impl TradeRecord {
    /// A fresh `Pending` record for the accepted orders of one batch.
    #[must_use]
    pub fn pending(
        id: TradeRecordId,
        pair: PairId,
        side: Side,
        orders: &[PendingOrder],
        total_in: u64,
        total_out: u64,
    ) -> Self {
        Self {
            id,
            pair,
            side,
            lines: orders.iter().map(TradeLine::from).collect(),
            total_in,
            total_out,
            settlement_ref: None,
            status: TradeStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Apply an update in place. Fills are matched by correlation id;
    /// unknown ids are ignored.
    pub fn apply(&mut self, update: &TradeUpdate) {
        if let Some(tx) = &update.settlement_ref {
            self.settlement_ref = Some(tx.clone());
        }
        for fill in &update.fills {
            if let Some(line) = self
                .lines
                .iter_mut()
                .find(|l| l.correlation_id == fill.correlation_id)
            {
                line.payout = Some(fill.payout);
                line.payout_tx = Some(fill.payout_tx.clone());
            }
        }
        if let Some(status) = &update.status {
            self.status = status.clone();
        }
    }

    /// Sum of payouts recorded so far.
    #[must_use]
    pub fn distributed_total(&self) -> u64 {
        self.lines.iter().filter_map(|l| l.payout).sum()
    }
}

/// Payout of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFill {
    pub correlation_id: CorrelationId,
    pub payout: u64,
    pub payout_tx: TxId,
}

/// Partial update of a trade record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeUpdate {
    pub settlement_ref: Option<TxId>,
    pub fills: Vec<OrderFill>,
    pub status: Option<TradeStatus>,
}

impl TradeUpdate {
    #[must_use]
    pub fn settled(tx: TxId) -> Self {
        Self {
            settlement_ref: Some(tx),
            fills: Vec::new(),
            status: Some(TradeStatus::Settled),
        }
    }

    #[must_use]
    pub fn status(status: TradeStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}
