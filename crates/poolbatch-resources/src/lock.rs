//! Lease locks over resources.
//!
//! A lock is a lease: it expires on its own after the configured duration,
//! so a crashed holder never strands a resource. Acquisition is atomic
//! create-if-absent; an expired entry counts as absent.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use poolbatch_types::{Address, HolderId, ResourceId};

/// Lock namespace key: one resource of one address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub address: Address,
    pub resource: ResourceId,
}

impl LockKey {
    #[must_use]
    pub fn new(address: &Address, resource: &ResourceId) -> Self {
        Self {
            address: address.clone(),
            resource: resource.clone(),
        }
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.resource)
    }
}

/// Shared lease store. Implementations must make `try_acquire` atomic.
pub trait LockStore: Send + Sync {
    /// Take the lease if nobody holds a live one. Returns `false` on contention.
    fn try_acquire(&self, key: &LockKey, holder: HolderId, now: DateTime<Utc>) -> bool;

    /// Drop the lease if `holder` owns it. A non-holder release is a no-op.
    fn release(&self, key: &LockKey, holder: HolderId);

    fn is_locked(&self, key: &LockKey, now: DateTime<Utc>) -> bool;

    /// Drop leases that expired by `now`. Returns how many were removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct LeaseEntry {
    holder: HolderId,
    expires_at: DateTime<Utc>,
}

/// In-process [`LockStore`] on a sharded concurrent map.
#[derive(Debug)]
pub struct MemoryLockStore {
    lease: Duration,
    leases: DashMap<LockKey, LeaseEntry>,
}

impl MemoryLockStore {
    #[must_use]
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            leases: DashMap::new(),
        }
    }

    /// Current holder of a live lease.
    #[must_use]
    pub fn holder(&self, key: &LockKey, now: DateTime<Utc>) -> Option<HolderId> {
        self.leases
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.holder)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

impl LockStore for MemoryLockStore {
    fn try_acquire(&self, key: &LockKey, holder: HolderId, now: DateTime<Utc>) -> bool {
        let fresh = LeaseEntry {
            holder,
            expires_at: now + self.lease,
        };
        match self.leases.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                true
            }
            Entry::Occupied(mut slot) if slot.get().expires_at <= now => {
                slot.insert(fresh);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    fn release(&self, key: &LockKey, holder: HolderId) {
        self.leases.remove_if(key, |_, e| e.holder == holder);
    }

    fn is_locked(&self, key: &LockKey, now: DateTime<Utc>) -> bool {
        self.holder(key, now).is_some()
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.leases.len();
        self.leases.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.leases.len())
    }
}
