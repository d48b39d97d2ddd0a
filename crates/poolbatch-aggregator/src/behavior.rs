//! Contract-version specific behaviour of a pool.
//!
//! A [`PoolBehavior`] is picked once per pair from its
//! [`ContractVersion`] and decides how the pair quotes, settles and splits
//! proceeds. The aggregator drives the batch; the behaviour supplies the
//! version-dependent pieces.

use std::sync::Arc;

use async_trait::async_trait;
use poolbatch_pricing::PricingEngine;
use poolbatch_types::{
    ContractVersion, FeeSchedule, Gateway, PendingOrder, PoolbatchError, Reserves, Result,
    SettlementRequest, Side, TxId,
};

use crate::filter::{cap_payouts, pro_rata_payouts};

#[async_trait]
pub trait PoolBehavior: Send + Sync {
    fn version(&self) -> ContractVersion;

    /// Counter-amount for tendering `amount` on `side`.
    fn quote(&self, side: Side, reserves: &Reserves, amount: u64) -> Result<u64>;

    /// Broadcast one batched swap. `Ok(None)` is an empty Gateway result.
    async fn settle(
        &self,
        gateway: &dyn Gateway,
        request: SettlementRequest,
    ) -> Result<Option<TxId>> {
        let mut request = request;
        request.version = self.version();
        gateway.build_and_broadcast_settlement(request).await
    }

    /// Per-order payouts of `proceeds`, never more than `available` in total.
    fn distribute(&self, orders: &[PendingOrder], proceeds: u64, available: u64) -> Vec<u64> {
        cap_payouts(pro_rata_payouts(orders, proceeds), available)
    }
}

/// First-generation pool: constant product with no in-pool fee.
#[derive(Debug, Clone, Copy)]
pub struct ConstantProductV1 {
    engine: PricingEngine,
}

impl ConstantProductV1 {
    #[must_use]
    pub fn new(fee_factor: u64) -> Self {
        Self {
            engine: PricingEngine::fee_less(fee_factor),
        }
    }
}

#[async_trait]
impl PoolBehavior for ConstantProductV1 {
    fn version(&self) -> ContractVersion {
        ContractVersion::V1
    }

    fn quote(&self, side: Side, reserves: &Reserves, amount: u64) -> Result<u64> {
        let reserve_in = match side {
            Side::Buy => reserves.base,
            Side::Sell => reserves.quote,
        };
        // V1 contracts refuse a tender larger than the reserve it enters.
        if amount > reserve_in {
            return Err(PoolbatchError::InvalidAmount {
                reason: format!("tender {amount} exceeds {side} reserve {reserve_in}"),
            });
        }
        self.engine.quote(side, reserves, amount)
    }
}

/// Second-generation pool: service and LP fees are taken in the contract.
#[derive(Debug, Clone, Copy)]
pub struct ConstantProductV2 {
    engine: PricingEngine,
}

impl ConstantProductV2 {
    #[must_use]
    pub fn new(fees: FeeSchedule) -> Self {
        Self {
            engine: PricingEngine::new(fees),
        }
    }
}

#[async_trait]
impl PoolBehavior for ConstantProductV2 {
    fn version(&self) -> ContractVersion {
        ContractVersion::V2
    }

    fn quote(&self, side: Side, reserves: &Reserves, amount: u64) -> Result<u64> {
        self.engine.quote(side, reserves, amount)
    }
}

/// Behaviour for a contract version.
#[must_use]
pub fn behavior_for(version: ContractVersion, fees: FeeSchedule) -> Arc<dyn PoolBehavior> {
    match version {
        ContractVersion::V1 => Arc::new(ConstantProductV1::new(fees.fee_factor)),
        ContractVersion::V2 => Arc::new(ConstantProductV2::new(fees)),
    }
}
