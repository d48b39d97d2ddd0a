//! Identifiers used throughout PoolBatch.
//!
//! Chain-facing identifiers (`Address`, `TxId`, `PairId`) are opaque strings
//! owned by the Gateway. Internal identifiers use UUIDv7 for time-ordered
//! sorting, except `TradeRecordId` which is derived deterministically.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// A chain address that owns resources or receives payments.
    Address
);

string_id!(
    /// A traded pair, keyed by the pool contract id.
    PairId
);

string_id!(
    /// A transaction id as reported by the Gateway.
    TxId
);

string_id!(
    /// Opaque handle to a signing key. The Gateway resolves it; the core
    /// never sees key material.
    KeyRef
);

string_id!(
    /// Client-supplied correlation hash (the funding transfer's tx hash).
    CorrelationId
);

string_id!(
    /// Asset identifier. Native coin uses [`Asset::native`].
    Asset
);

impl Asset {
    /// The chain's native coin.
    #[must_use]
    pub fn native() -> Self {
        Self("native".to_string())
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        self.0 == "native"
    }
}

// ---------------------------------------------------------------------------
// ResourceId
// ---------------------------------------------------------------------------

/// Identifies a resource by its originating transaction and output index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ResourceId {
    pub tx_id: TxId,
    pub output_index: u32,
}

impl ResourceId {
    #[must_use]
    pub fn new(tx_id: impl Into<String>, output_index: u32) -> Self {
        Self {
            tx_id: TxId(tx_id.into()),
            output_index,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.output_index)
    }
}

// ---------------------------------------------------------------------------
// HolderId
// ---------------------------------------------------------------------------

/// Identity of a lease holder (one per in-flight operation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct HolderId(pub Uuid);

impl HolderId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for HolderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "holder:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TradeRecordId
// ---------------------------------------------------------------------------

/// Identifier of a persisted trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TradeRecordId(pub Uuid);

impl TradeRecordId {
    /// Deterministic id from the pair and the pair-local batch sequence.
    ///
    /// Re-running the same batch after a crash yields the same id, so the
    /// ledger can recognise the incomplete record.
    #[must_use]
    pub fn deterministic(pair: &PairId, batch_sequence: u64) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"poolbatch:trade_record:v1:");
        hasher.update(pair.0.as_bytes());
        hasher.update(batch_sequence.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }

    /// Short hex prefix for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0.as_bytes()[..4])
    }
}

impl fmt::Display for TradeRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_display() {
        let id = ResourceId::new("abcd", 3);
        assert_eq!(id.to_string(), "abcd:3");
    }

    #[test]
    fn holder_ids_are_unique() {
        assert_ne!(HolderId::new(), HolderId::new());
    }

    #[test]
    fn trade_record_id_deterministic() {
        let pair = PairId::new("pool-1");
        let a = TradeRecordId::deterministic(&pair, 7);
        let b = TradeRecordId::deterministic(&pair, 7);
        assert_eq!(a, b);
        assert_ne!(a, TradeRecordId::deterministic(&pair, 8));
        assert_ne!(a, TradeRecordId::deterministic(&PairId::new("pool-2"), 7));
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn string_ids_serialize_transparently() {
        let addr = Address::new("1abc");
        assert_eq!(serde_json::to_string(&addr).unwrap(), "\"1abc\"");
    }

    #[test]
    fn native_asset() {
        assert!(Asset::native().is_native());
        assert!(!Asset::new("token-x").is_native());
    }
}
