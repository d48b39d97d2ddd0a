//! Spendable balance units ("resources") and their amount buckets.
//!
//! A resource is a discrete unspent output owned by one of our funding
//! addresses. Its bucket is a pure function of its amount; the lease state
//! lives in the lock store, never on the resource itself.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Address, ResourceId, constants};

/// Amount-based classification of resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Bucket {
    /// Below 0.01 unit. Consolidated once enough accumulate.
    SmallChange,
    /// Exactly 0.01 unit. Funds a single token transfer.
    TransferFee,
    /// In `[0.01, 1)` (excluding exactly 0.01). Fee-bearing leftovers.
    AggregateFee,
    /// At least 1 unit. Source of transfer-fee replenishment.
    ReserveFee,
}

impl Bucket {
    /// All buckets, in ascending amount order.
    pub const ALL: [Bucket; 4] = [
        Bucket::SmallChange,
        Bucket::TransferFee,
        Bucket::AggregateFee,
        Bucket::ReserveFee,
    ];

    /// Classify an amount (in minor units).
    #[must_use]
    pub fn classify(amount: u64) -> Self {
        if amount < constants::TRANSFER_FEE_AMOUNT {
            Self::SmallChange
        } else if amount == constants::TRANSFER_FEE_AMOUNT {
            Self::TransferFee
        } else if amount < constants::RESERVE_FEE_FLOOR {
            Self::AggregateFee
        } else {
            Self::ReserveFee
        }
    }

    /// Whether a periodic refresh replaces this bucket wholesale.
    ///
    /// The other buckets are authoritative only at cold start and are then
    /// maintained by the operations that consume or produce their entries.
    #[must_use]
    pub fn refreshed_every_cycle(self) -> bool {
        matches!(self, Self::SmallChange | Self::TransferFee)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SmallChange => write!(f, "SMALL_CHANGE"),
            Self::TransferFee => write!(f, "TRANSFER_FEE"),
            Self::AggregateFee => write!(f, "AGGREGATE_FEE"),
            Self::ReserveFee => write!(f, "RESERVE_FEE"),
        }
    }
}

/// A discrete spendable balance unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    /// Amount in native minor units.
    pub amount: u64,
    /// Opaque locking script / payload, passed back to the Gateway verbatim.
    pub payload: String,
    pub address: Address,
}

impl Resource {
    #[must_use]
    pub fn bucket(&self) -> Bucket {
        Bucket::classify(self.amount)
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Resource {
    pub fn dummy(address: &Address, tx: &str, index: u32, amount: u64) -> Self {
        Self {
            id: ResourceId::new(tx, index),
            amount,
            payload: format!("script:{tx}:{index}"),
            address: address.clone(),
        }
    }
}

/// Total amount of a slice of resources.
#[must_use]
pub fn total_amount(resources: &[Resource]) -> u64 {
    resources.iter().map(|r| r.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_thresholds() {
        assert_eq!(Bucket::classify(0), Bucket::SmallChange);
        assert_eq!(Bucket::classify(9_999), Bucket::SmallChange);
        assert_eq!(Bucket::classify(10_000), Bucket::TransferFee);
        assert_eq!(Bucket::classify(10_001), Bucket::AggregateFee);
        assert_eq!(Bucket::classify(999_999), Bucket::AggregateFee);
        assert_eq!(Bucket::classify(1_000_000), Bucket::ReserveFee);
        assert_eq!(Bucket::classify(u64::MAX), Bucket::ReserveFee);
    }

    #[test]
    fn only_small_change_and_transfer_fee_refresh_every_cycle() {
        assert!(Bucket::SmallChange.refreshed_every_cycle());
        assert!(Bucket::TransferFee.refreshed_every_cycle());
        assert!(!Bucket::AggregateFee.refreshed_every_cycle());
        assert!(!Bucket::ReserveFee.refreshed_every_cycle());
    }

    #[test]
    fn bucket_display() {
        assert_eq!(Bucket::ReserveFee.to_string(), "RESERVE_FEE");
    }

    #[test]
    fn total_amount_sums() {
        let addr = Address::new("a");
        let rs = vec![Resource::dummy(&addr, "t", 0, 5), Resource::dummy(&addr, "t", 1, 7)];
        assert_eq!(total_amount(&rs), 12);
        assert_eq!(rs[0].bucket(), Bucket::SmallChange);
    }
}
