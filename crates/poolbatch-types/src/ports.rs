//! Ports to the external collaborators: the chain Gateway, the Ledger,
//! and the alert Notifier.
//!
//! Every method is a suspension point for the caller's tick loop; a slow
//! collaborator stalls only the pair that is waiting on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Address, Asset, CorrelationId, KeyRef, PairId, PaymentReceipt, PaymentRequest,
    PriceObservation, Reserves, Resource, Result, SettlementRequest, TokenTransfer, TradeRecord,
    TradeRecordId, TradeUpdate, TxId,
};

/// Chain access: discovery, construction and broadcast.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Current reserves of a pool contract.
    async fn fetch_reserves(&self, pair: &PairId) -> Result<Reserves>;

    /// Every unspent resource owned by `address`.
    async fn fetch_spendable_resources(&self, address: &Address) -> Result<Vec<Resource>>;

    /// Balance of `asset` held by `address`, in minor units.
    async fn fetch_balance(&self, asset: &Asset, address: &Address) -> Result<u64>;

    /// Build, sign and broadcast a native payment.
    ///
    /// Fails with `InsufficientFunding` when the inputs cannot cover the
    /// recipients plus the network fee.
    async fn build_and_broadcast_payment(&self, request: PaymentRequest) -> Result<PaymentReceipt>;

    /// Build, sign and broadcast a swap against the pool contract.
    ///
    /// `Ok(None)` is an empty result (nothing was broadcast). Fails with
    /// `InsufficientPoolLiquidity` or `InsufficientFunding`.
    async fn build_and_broadcast_settlement(&self, request: SettlementRequest)
    -> Result<Option<TxId>>;

    /// One round of pool-side consolidation. `Ok(None)` when nothing is left
    /// to consolidate.
    async fn consolidate_pool(
        &self,
        pair: &PairId,
        signer: &KeyRef,
        funding: Vec<Resource>,
    ) -> Result<Option<TxId>>;

    /// Transfer a token to one or more recipients.
    async fn transfer_token(&self, transfer: TokenTransfer) -> Result<PaymentReceipt>;
}

/// Append-only trade and price history.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn record_price_observation(&self, observation: PriceObservation) -> Result<()>;

    async fn create_trade_record(&self, record: TradeRecord) -> Result<()>;

    async fn update_trade_record(&self, id: TradeRecordId, update: TradeUpdate) -> Result<()>;

    /// The trade record containing the order with this correlation id.
    async fn find_by_correlation(&self, id: &CorrelationId) -> Result<Option<TradeRecord>>;

    /// Observations for `pair` with `from <= observed_at < to`, oldest first.
    async fn price_observations(
        &self,
        pair: &PairId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PriceObservation>>;
}

/// Operator alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(&self, subject: &str, body: &str) -> Result<()>;
}

/// Send an alert, logging (never propagating) a delivery failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, subject: &str, body: &str) {
    if let Err(e) = notifier.send_alert(subject, body).await {
        tracing::error!(subject, error = %e, "alert delivery failed");
    }
}
