//! The resource pool: discovery, leasing and selection.

use std::sync::Arc;

use chrono::Utc;
use poolbatch_types::{
    Address, Bucket, Gateway, HolderId, Notifier, PaymentReceipt, PoolbatchError, Resource,
    ResourcePoolConfig, Result, constants,
};
use tracing::{debug, info, warn};

use crate::{Lease, LockKey, LockStore, ResourceCatalogue};

/// Classifies, leases and maintains the resources of our funding addresses.
///
/// The lock store and catalogue are injected so several pools (one per
/// process, or one per test) can share or isolate them as needed.
pub struct ResourcePool {
    pub(crate) config: ResourcePoolConfig,
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) locks: Arc<dyn LockStore>,
    pub(crate) catalogue: Arc<ResourceCatalogue>,
    pub(crate) notifier: Arc<dyn Notifier>,
}

fn descending(mut resources: Vec<Resource>) -> Vec<Resource> {
    resources.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.id.cmp(&b.id)));
    resources
}

impl ResourcePool {
    #[must_use]
    pub fn new(
        config: ResourcePoolConfig,
        gateway: Arc<dyn Gateway>,
        locks: Arc<dyn LockStore>,
        catalogue: Arc<ResourceCatalogue>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            gateway,
            locks,
            catalogue,
            notifier,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ResourcePoolConfig {
        &self.config
    }

    #[must_use]
    pub fn catalogue(&self) -> &ResourceCatalogue {
        &self.catalogue
    }

    // =================================================================
    // Discovery
    // =================================================================

    /// Fetch every spendable resource of `address`, retrying transient
    /// Gateway failures.
    pub(crate) async fn discover(&self, address: &Address) -> Result<Vec<Resource>> {
        let mut last_error = String::new();
        for attempt in 1..=constants::REFRESH_FETCH_ATTEMPTS {
            match self.gateway.fetch_spendable_resources(address).await {
                Ok(resources) => return Ok(resources),
                Err(e) => {
                    warn!(address = %address, attempt, error = %e, "resource discovery failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(PoolbatchError::ExternalService {
            service: "gateway",
            reason: format!(
                "discovery of {address} failed after {} attempts: {last_error}",
                constants::REFRESH_FETCH_ATTEMPTS
            ),
        })
    }

    /// Re-discover `address` and update the catalogue.
    ///
    /// SmallChange and TransferFee are replaced; the incremental buckets
    /// are replaced only on the first (cold-start) refresh. Returns whether
    /// this was the cold start.
    pub async fn refresh(&self, address: &Address) -> Result<bool> {
        let resources = self.discover(address).await?;
        let discovered = resources.len();
        let cold = self.catalogue.apply_discovery(address, resources);
        info!(
            address = %address,
            cold,
            discovered,
            small_change = self.catalogue.len(address, Bucket::SmallChange),
            transfer_fee = self.catalogue.len(address, Bucket::TransferFee),
            aggregate_fee = self.catalogue.len(address, Bucket::AggregateFee),
            reserve_fee = self.catalogue.len(address, Bucket::ReserveFee),
            "catalogue refreshed"
        );
        Ok(cold)
    }

    // =================================================================
    // Leases
    // =================================================================

    /// Try to lease one resource. `false` means someone else holds it.
    pub fn lock(&self, resource: &Resource, holder: HolderId) -> bool {
        let key = LockKey::new(&resource.address, &resource.id);
        let acquired = self.locks.try_acquire(&key, holder, Utc::now());
        if !acquired {
            debug!(resource = %key, "resource already leased, skipping");
        }
        acquired
    }

    pub fn unlock(&self, resource: &Resource, holder: HolderId) {
        self.locks
            .release(&LockKey::new(&resource.address, &resource.id), holder);
    }

    pub fn unlock_all(&self, resources: &[Resource], holder: HolderId) {
        for resource in resources {
            self.unlock(resource, holder);
        }
    }

    #[must_use]
    pub fn is_locked(&self, resource: &Resource) -> bool {
        self.locks
            .is_locked(&LockKey::new(&resource.address, &resource.id), Utc::now())
    }

    /// End a lease without spending it.
    pub fn release(&self, lease: Lease) {
        self.unlock_all(&lease.resources, lease.holder);
    }

    /// End a lease whose resources were spent by `receipt`'s transaction:
    /// drop the inputs from the catalogue, file the outputs by amount, then
    /// unlock.
    pub fn consume(&self, lease: Lease, receipt: &PaymentReceipt) {
        for input in &lease.resources {
            self.catalogue.remove(&lease.address, &input.id);
        }
        for output in &receipt.outputs {
            debug!(
                resource = %output.id,
                amount = output.amount,
                bucket = %output.bucket(),
                "filing transaction output"
            );
            self.catalogue.insert_classified(output.clone());
        }
        self.unlock_all(&lease.resources, lease.holder);
    }

    // =================================================================
    // Selection
    // =================================================================

    /// Lease candidates largest first until `target` is covered.
    fn accumulate(
        &self,
        address: &Address,
        holder: HolderId,
        candidates: Vec<Resource>,
        target: u64,
    ) -> Lease {
        let mut lease = Lease::new(address.clone(), holder);
        for candidate in descending(candidates) {
            if lease.total >= target {
                break;
            }
            if self.lock(&candidate, holder) {
                lease.push(candidate);
            }
        }
        lease
    }

    /// Lease every candidate that is not already held.
    pub(crate) fn lease_available(
        &self,
        address: &Address,
        holder: HolderId,
        candidates: Vec<Resource>,
    ) -> Lease {
        let mut lease = Lease::new(address.clone(), holder);
        for candidate in candidates {
            if self.lock(&candidate, holder) {
                lease.push(candidate);
            }
        }
        lease
    }

    /// Lease catalogue entries of `bucket`, largest first, until their total
    /// reaches `target`. On shortfall every lease taken is released.
    pub fn select_for_amount(
        &self,
        address: &Address,
        bucket: Bucket,
        target: u64,
        holder: HolderId,
    ) -> Result<Lease> {
        let candidates = self.catalogue.snapshot(address, bucket);
        let lease = self.accumulate(address, holder, candidates, target);
        if lease.total < target {
            let available = lease.total;
            self.release(lease);
            return Err(PoolbatchError::InsufficientResources {
                bucket,
                needed: target,
                available,
            });
        }
        debug!(
            address = %address,
            bucket = %bucket,
            target,
            leased = lease.total,
            count = lease.len(),
            "selected resources"
        );
        Ok(lease)
    }

    /// Same scan as [`select_for_amount`](Self::select_for_amount) over
    /// resources fetched fresh from the Gateway instead of the catalogue.
    ///
    /// Fails with `InsufficientFunding` on shortfall.
    pub async fn select_live(
        &self,
        address: &Address,
        target: u64,
        holder: HolderId,
    ) -> Result<Lease> {
        let candidates = self.discover(address).await?;
        let lease = self.accumulate(address, holder, candidates, target);
        if lease.total < target {
            let leased = lease.total;
            self.release(lease);
            return Err(PoolbatchError::InsufficientFunding {
                reason: format!("{address}: need {target}, leased {leased}"),
            });
        }
        debug!(address = %address, target, leased = lease.total, "selected live resources");
        Ok(lease)
    }

    /// Lease exactly `count` entries of `bucket`.
    pub fn select_count(
        &self,
        address: &Address,
        bucket: Bucket,
        count: usize,
        holder: HolderId,
    ) -> Result<Lease> {
        let mut lease = Lease::new(address.clone(), holder);
        for candidate in self.catalogue.snapshot(address, bucket) {
            if lease.len() >= count {
                break;
            }
            if self.lock(&candidate, holder) {
                lease.push(candidate);
            }
        }
        if lease.len() < count {
            let available = lease.len() as u64;
            self.release(lease);
            return Err(PoolbatchError::InsufficientResources {
                bucket,
                needed: count as u64,
                available,
            });
        }
        Ok(lease)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use poolbatch_types::testkit::{FakeGateway, RecordingNotifier};

    use super::*;
    use crate::MemoryLockStore;

    struct Harness {
        pool: ResourcePool,
        gateway: Arc<FakeGateway>,
        locks: Arc<MemoryLockStore>,
        address: Address,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(FakeGateway::new());
        let locks = Arc::new(MemoryLockStore::new(Duration::seconds(300)));
        let pool = ResourcePool::new(
            ResourcePoolConfig::instant(),
            gateway.clone(),
            locks.clone(),
            Arc::new(ResourceCatalogue::new()),
            Arc::new(RecordingNotifier::default()),
        );
        Harness {
            pool,
            gateway,
            locks,
            address: Address::new("fund"),
        }
    }

    #[tokio::test]
    async fn select_for_amount_takes_largest_first() {
        let h = harness();
        h.gateway
            .fund(&h.address, &[1_000_000, 3_000_000, 2_000_000, 5_000_000]);
        h.pool.refresh(&h.address).await.unwrap();

        let lease = h
            .pool
            .select_for_amount(&h.address, Bucket::ReserveFee, 7_000_000, HolderId::new())
            .unwrap();
        let amounts: Vec<u64> = lease.resources.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![5_000_000, 3_000_000]);
        assert_eq!(lease.total, 8_000_000);
        assert!(lease.resources.iter().all(|r| h.pool.is_locked(r)));
    }

    #[tokio::test]
    async fn shortfall_releases_everything() {
        let h = harness();
        h.gateway.fund(&h.address, &[1_000_000, 2_000_000]);
        h.pool.refresh(&h.address).await.unwrap();

        let err = h
            .pool
            .select_for_amount(&h.address, Bucket::ReserveFee, 4_000_000, HolderId::new())
            .unwrap_err();
        assert!(matches!(
            err,
            PoolbatchError::InsufficientResources {
                bucket: Bucket::ReserveFee,
                needed: 4_000_000,
                available: 3_000_000
            }
        ));
        assert!(h.locks.is_empty());
    }

    #[tokio::test]
    async fn concurrent_selections_never_share_a_resource() {
        let h = harness();
        h.gateway.fund(&h.address, &[2_000_000, 2_000_000, 2_000_000]);
        h.pool.refresh(&h.address).await.unwrap();

        let first = h
            .pool
            .select_for_amount(&h.address, Bucket::ReserveFee, 3_000_000, HolderId::new())
            .unwrap();
        assert_eq!(first.len(), 2);
        // Only one unleased entry remains.
        let second = h
            .pool
            .select_for_amount(&h.address, Bucket::ReserveFee, 2_000_000, HolderId::new())
            .unwrap();
        assert_eq!(second.len(), 1);
        assert!(first.resources.iter().all(|r| !second.resources.contains(r)));
        assert!(
            h.pool
                .select_for_amount(&h.address, Bucket::ReserveFee, 1, HolderId::new())
                .is_err()
        );

        h.pool.release(first);
        assert!(
            h.pool
                .select_for_amount(&h.address, Bucket::ReserveFee, 4_000_000, HolderId::new())
                .is_ok()
        );
    }

    #[tokio::test]
    async fn expired_lease_becomes_selectable() {
        let h = harness();
        let funded = h.gateway.fund(&h.address, &[2_000_000]);
        h.pool.refresh(&h.address).await.unwrap();

        // A holder that stalled more than a lease ago.
        let stale = Utc::now() - Duration::seconds(301);
        let key = LockKey::new(&h.address, &funded[0].id);
        assert!(h.locks.try_acquire(&key, HolderId::new(), stale));

        let lease = h
            .pool
            .select_for_amount(&h.address, Bucket::ReserveFee, 1_000_000, HolderId::new())
            .unwrap();
        assert_eq!(lease.resources, funded);
    }

    #[tokio::test]
    async fn select_count_is_exact() {
        let h = harness();
        h.gateway.fund(&h.address, &[10_000, 10_000, 10_000]);
        h.pool.refresh(&h.address).await.unwrap();

        let lease = h
            .pool
            .select_count(&h.address, Bucket::TransferFee, 2, HolderId::new())
            .unwrap();
        assert_eq!(lease.len(), 2);
        let err = h
            .pool
            .select_count(&h.address, Bucket::TransferFee, 2, HolderId::new())
            .unwrap_err();
        assert!(matches!(
            err,
            PoolbatchError::InsufficientResources { needed: 2, available: 1, .. }
        ));
        // The failed attempt released its single lease.
        assert_eq!(h.locks.len(), 2);
    }

    #[tokio::test]
    async fn select_live_reads_the_chain() {
        let h = harness();
        // Never refreshed: the catalogue is empty but the chain is not.
        h.gateway.fund(&h.address, &[400_000, 700_000]);
        let lease = h
            .pool
            .select_live(&h.address, 500_000, HolderId::new())
            .await
            .unwrap();
        assert_eq!(lease.total, 700_000);
        let err = h
            .pool
            .select_live(&h.address, 500_000, HolderId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PoolbatchError::InsufficientFunding { .. }));
    }

    #[tokio::test]
    async fn consume_updates_catalogue_and_unlocks() {
        let h = harness();
        let funded = h.gateway.fund(&h.address, &[2_000_000]);
        h.pool.refresh(&h.address).await.unwrap();
        let lease = h
            .pool
            .select_for_amount(&h.address, Bucket::ReserveFee, 1, HolderId::new())
            .unwrap();
        let receipt = PaymentReceipt {
            tx_id: poolbatch_types::TxId::new("spend"),
            outputs: vec![
                Resource::dummy(&h.address, "spend", 0, 10_000),
                Resource::dummy(&h.address, "spend", 1, 1_989_000),
            ],
        };
        h.pool.consume(lease, &receipt);
        let cat = h.pool.catalogue();
        assert!(!cat.contains(&h.address, &funded[0].id));
        assert_eq!(cat.len(&h.address, Bucket::TransferFee), 1);
        assert_eq!(cat.snapshot(&h.address, Bucket::ReserveFee)[0].amount, 1_989_000);
        assert!(h.locks.is_empty());
    }

    #[tokio::test]
    async fn refresh_retries_then_fails() {
        let h = harness();
        h.gateway.fund(&h.address, &[5]);
        h.gateway.fail_fetches(2);
        assert!(h.pool.refresh(&h.address).await.unwrap());

        h.gateway.fail_fetches(3);
        let err = h.pool.refresh(&h.address).await.unwrap_err();
        assert!(matches!(err, PoolbatchError::ExternalService { service: "gateway", .. }));
    }
}
