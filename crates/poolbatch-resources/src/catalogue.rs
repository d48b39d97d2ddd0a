//! Per-address, per-bucket catalogue of known resources.
//!
//! SmallChange and TransferFee are replaced wholesale by every refresh.
//! AggregateFee and ReserveFee are replaced only by the cold-start refresh
//! of an address; afterwards they change only through [`insert_classified`]
//! and [`remove`] by the operations that spend or create their entries.
//!
//! [`insert_classified`]: ResourceCatalogue::insert_classified
//! [`remove`]: ResourceCatalogue::remove

use std::collections::HashMap;

use dashmap::{DashMap, DashSet};
use poolbatch_types::{Address, Bucket, Resource, ResourceId};

/// Resource catalogue shared by every operation on the pool.
#[derive(Debug, Default)]
pub struct ResourceCatalogue {
    buckets: DashMap<(Address, Bucket), HashMap<ResourceId, Resource>>,
    cold_started: DashSet<Address>,
}

impl ResourceCatalogue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace one bucket of `address` with `resources`.
    pub fn replace_bucket(&self, address: &Address, bucket: Bucket, resources: Vec<Resource>) {
        let entries = resources.into_iter().map(|r| (r.id.clone(), r)).collect();
        self.buckets.insert((address.clone(), bucket), entries);
    }

    /// File a resource under the bucket its amount selects.
    pub fn insert_classified(&self, resource: Resource) {
        let key = (resource.address.clone(), resource.bucket());
        self.buckets
            .entry(key)
            .or_default()
            .insert(resource.id.clone(), resource);
    }

    /// Remove a resource from whichever bucket holds it.
    pub fn remove(&self, address: &Address, id: &ResourceId) -> Option<Resource> {
        Bucket::ALL.iter().find_map(|bucket| {
            self.buckets
                .get_mut(&(address.clone(), *bucket))
                .and_then(|mut entries| entries.remove(id))
        })
    }

    /// Entries of one bucket, in no particular order.
    #[must_use]
    pub fn snapshot(&self, address: &Address, bucket: Bucket) -> Vec<Resource> {
        self.buckets
            .get(&(address.clone(), bucket))
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self, address: &Address, bucket: Bucket) -> usize {
        self.buckets
            .get(&(address.clone(), bucket))
            .map_or(0, |entries| entries.len())
    }

    #[must_use]
    pub fn contains(&self, address: &Address, id: &ResourceId) -> bool {
        Bucket::ALL.iter().any(|bucket| {
            self.buckets
                .get(&(address.clone(), *bucket))
                .is_some_and(|entries| entries.contains_key(id))
        })
    }

    /// Whether the cold-start refresh of `address` has happened.
    #[must_use]
    pub fn cold_started(&self, address: &Address) -> bool {
        self.cold_started.contains(address)
    }

    /// Apply a full discovery of `address`.
    ///
    /// Returns `true` when this was the cold-start refresh.
    pub fn apply_discovery(&self, address: &Address, resources: Vec<Resource>) -> bool {
        let cold = !self.cold_started(address);
        let mut grouped: HashMap<Bucket, Vec<Resource>> = HashMap::new();
        for resource in resources {
            grouped.entry(resource.bucket()).or_default().push(resource);
        }
        for bucket in Bucket::ALL {
            if cold || bucket.refreshed_every_cycle() {
                let entries = grouped.remove(&bucket).unwrap_or_default();
                self.replace_bucket(address, bucket, entries);
            }
        }
        if cold {
            self.cold_started.insert(address.clone());
        }
        cold
    }
}
