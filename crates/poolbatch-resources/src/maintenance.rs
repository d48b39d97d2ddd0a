//! Periodic upkeep of the funding addresses.
//!
//! Every cycle, per address: refresh, merge small change, replenish
//! transfer-fee outputs, merge fee outputs, check the reserve, then drop
//! expired leases. Each step logs its own failure and the cycle carries on.

use std::sync::Arc;

use chrono::Utc;
use poolbatch_types::{
    Address, Bucket, FundingAccount, HolderId, PaymentRequest, PoolbatchError, Recipient, Result,
    TxId, constants, notify_best_effort, total_amount,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{Lease, ResourcePool};

/// Outcome of one maintenance cycle for one address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub refreshed: bool,
    pub small_change_merge: Option<TxId>,
    pub transfer_fee_replenish: Option<TxId>,
    pub fee_merge: Option<TxId>,
    pub reserve_alert: bool,
    /// Expired leases dropped from the lock store.
    pub purged_leases: usize,
}

impl ResourcePool {
    /// Pay `lease` back to its own address as `recipients`, wait for the
    /// chain to catch up, then consume the lease.
    async fn self_payment(
        &self,
        account: &FundingAccount,
        lease: Lease,
        recipients: Vec<Recipient>,
    ) -> Result<TxId> {
        let request = PaymentRequest {
            signer: account.signer.clone(),
            inputs: lease.inputs(),
            recipients,
            change_address: account.address.clone(),
        };
        let receipt = match self.gateway.build_and_broadcast_payment(request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.release(lease);
                return Err(e);
            }
        };
        tokio::time::sleep(self.config.settle_wait()).await;
        let tx = receipt.tx_id.clone();
        self.consume(lease, &receipt);
        Ok(tx)
    }

    /// Consolidate the SmallChange bucket into one output.
    ///
    /// Fires only when at least `merge_threshold` entries can be leased and
    /// either the merged output (total minus the flat fee) reaches one
    /// transfer-fee amount or the count reaches `merge_unconditional_count`.
    pub async fn merge_small_change(&self, account: &FundingAccount) -> Result<Option<TxId>> {
        let address = &account.address;
        let candidates = self.catalogue.snapshot(address, Bucket::SmallChange);
        if candidates.len() < self.config.merge_threshold {
            return Ok(None);
        }
        let lease = self.lease_available(address, HolderId::new(), candidates);
        let count = lease.len();
        let merged = lease.total.saturating_sub(self.config.flat_fee);
        let worth_it = merged >= self.config.transfer_fee_amount
            || count >= self.config.merge_unconditional_count;
        if count < self.config.merge_threshold || !worth_it || merged == 0 {
            info!(address = %address, count, merged, "small change not worth merging yet");
            self.release(lease);
            return Ok(None);
        }

        let tx = self
            .self_payment(account, lease, vec![Recipient::new(address.clone(), merged)])
            .await?;
        info!(address = %address, tx = %tx, count, merged, "merged small change");
        Ok(Some(tx))
    }

    /// Top the TransferFee bucket up to `transfer_fee_target` entries,
    /// funded from ReserveFee. A reserve shortfall is a no-op.
    pub async fn replenish_transfer_fee(&self, account: &FundingAccount) -> Result<Option<TxId>> {
        let address = &account.address;
        let current = self.catalogue.len(address, Bucket::TransferFee);
        let target = self.config.transfer_fee_target;
        if current >= target {
            return Ok(None);
        }
        let needed = target - current;
        let unit = self.config.transfer_fee_amount;
        let total = unit * needed as u64 + self.config.network_fee;

        let holder = HolderId::new();
        let lease = match self.select_for_amount(address, Bucket::ReserveFee, total, holder) {
            Ok(lease) => lease,
            Err(PoolbatchError::InsufficientResources { available, .. }) => {
                warn!(
                    address = %address,
                    needed = total,
                    available,
                    "reserve cannot fund transfer-fee replenishment"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let recipients = (0..needed)
            .map(|_| Recipient::new(address.clone(), unit))
            .collect();
        let tx = self.self_payment(account, lease, recipients).await?;
        info!(address = %address, tx = %tx, created = needed, "replenished transfer-fee outputs");
        Ok(Some(tx))
    }

    /// Consolidate AggregateFee entries (plus ReserveFee entries once that
    /// bucket exceeds `reserve_fold_count`) into one output.
    ///
    /// Requires `merge_threshold` entries and a merged output of at least one
    /// unit, unless more than `reserve_fold_count` entries are merged.
    pub async fn merge_fee_outputs(&self, account: &FundingAccount) -> Result<Option<TxId>> {
        let address = &account.address;
        let mut candidates = self.catalogue.snapshot(address, Bucket::AggregateFee);
        let reserve = self.catalogue.snapshot(address, Bucket::ReserveFee);
        let fold_reserve = reserve.len() > self.config.reserve_fold_count;
        if fold_reserve {
            candidates.extend(reserve);
        }
        if candidates.len() < self.config.merge_threshold {
            return Ok(None);
        }

        let lease = self.lease_available(address, HolderId::new(), candidates);
        let count = lease.len();
        let merged = lease.total.saturating_sub(self.config.flat_fee);
        let worth_it =
            merged >= constants::RESERVE_FEE_FLOOR || count > self.config.reserve_fold_count;
        if count < self.config.merge_threshold || !worth_it || merged == 0 {
            info!(address = %address, count, merged, "fee outputs not worth merging yet");
            self.release(lease);
            return Ok(None);
        }

        let tx = self
            .self_payment(account, lease, vec![Recipient::new(address.clone(), merged)])
            .await?;
        info!(address = %address, tx = %tx, count, merged, fold_reserve, "merged fee outputs");
        Ok(Some(tx))
    }

    /// Alert when the reserve can no longer fund replenishment: the bucket
    /// is empty or its largest entry is below one unit. Returns whether an
    /// alert was raised.
    pub async fn warn_if_reserve_low(&self, address: &Address) -> bool {
        let reserve = self.catalogue.snapshot(address, Bucket::ReserveFee);
        let largest = reserve.iter().max_by_key(|r| r.amount);
        let (subject, body) = match largest {
            None => (
                "Reserve empty".to_string(),
                format!("address: {address}\nreserve entries: 0"),
            ),
            Some(r) if r.amount < constants::RESERVE_FEE_FLOOR => (
                "Reserve low".to_string(),
                format!(
                    "address: {address}\nlargest reserve entry: {} ({})",
                    r.amount, r.id
                ),
            ),
            Some(_) => return false,
        };
        warn!(address = %address, total = total_amount(&reserve), "{subject}");
        notify_best_effort(self.notifier.as_ref(), &subject, &body).await;
        true
    }

    /// File the outputs of a fee-bearing transaction under the buckets their
    /// amounts select. Returns how many outputs were found.
    pub async fn mark_aggregate_fee(&self, address: &Address, tx: &TxId) -> Result<usize> {
        let outputs: Vec<_> = self
            .discover(address)
            .await?
            .into_iter()
            .filter(|r| &r.id.tx_id == tx)
            .collect();
        if outputs.is_empty() {
            warn!(address = %address, tx = %tx, "fee-bearing transaction has no visible outputs");
        }
        let found = outputs.len();
        for output in outputs {
            self.catalogue.insert_classified(output);
        }
        Ok(found)
    }

    /// One maintenance cycle for `account`.
    pub async fn maintain(&self, account: &FundingAccount) -> MaintenanceReport {
        let address = &account.address;
        let mut report = MaintenanceReport::default();
        match self.refresh(address).await {
            Ok(_) => report.refreshed = true,
            Err(e) => error!(address = %address, error = %e, "refresh failed, catalogue is stale"),
        }
        match self.merge_small_change(account).await {
            Ok(tx) => report.small_change_merge = tx,
            Err(e) => error!(address = %address, error = %e, "small-change merge failed"),
        }
        match self.replenish_transfer_fee(account).await {
            Ok(tx) => report.transfer_fee_replenish = tx,
            Err(e) => error!(address = %address, error = %e, "transfer-fee replenishment failed"),
        }
        match self.merge_fee_outputs(account).await {
            Ok(tx) => report.fee_merge = tx,
            Err(e) => error!(address = %address, error = %e, "fee-output merge failed"),
        }
        report.reserve_alert = self.warn_if_reserve_low(address).await;
        report.purged_leases = self.locks.purge_expired(Utc::now());
        if report.purged_leases > 0 {
            debug!(purged = report.purged_leases, "expired leases dropped");
        }
        report
    }

    /// Cold-start every account, then run [`maintain`](Self::maintain) for
    /// each every `refresh_interval` until `shutdown` turns `true`.
    pub fn spawn_maintenance(
        self: Arc<Self>,
        accounts: Vec<FundingAccount>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let span = info_span!("maintenance", accounts = accounts.len());
        tokio::spawn(
            async move {
                for account in &accounts {
                    if let Err(e) = self.refresh(&account.address).await {
                        error!(address = %account.address, error = %e, "cold-start refresh failed");
                    }
                }
                let period = self
                    .config
                    .refresh_interval()
                    .max(std::time::Duration::from_millis(1));
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // The first tick completes immediately; cold start already ran.
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            for account in &accounts {
                                let report = self.maintain(account).await;
                                info!(address = %account.address, ?report, "maintenance done");
                            }
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                info!("maintenance stopping");
                                break;
                            }
                        }
                    }
                }
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use poolbatch_types::testkit::{FakeGateway, RecordingNotifier};
    use poolbatch_types::{ResourcePoolConfig, total_amount};

    use super::*;
    use crate::{LockKey, LockStore, MemoryLockStore, ResourceCatalogue};

    struct Harness {
        pool: Arc<ResourcePool>,
        gateway: Arc<FakeGateway>,
        locks: Arc<MemoryLockStore>,
        notifier: Arc<RecordingNotifier>,
        account: FundingAccount,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(FakeGateway::new());
        let locks = Arc::new(MemoryLockStore::new(Duration::seconds(300)));
        let notifier = Arc::new(RecordingNotifier::default());
        let pool = Arc::new(ResourcePool::new(
            ResourcePoolConfig::instant(),
            gateway.clone(),
            locks.clone(),
            Arc::new(ResourceCatalogue::new()),
            notifier.clone(),
        ));
        Harness {
            pool,
            gateway,
            locks,
            notifier,
            account: FundingAccount::new("fund", "key"),
        }
    }

    #[tokio::test]
    async fn small_change_below_threshold_is_left_alone() {
        let h = harness();
        h.gateway.fund(&h.account.address, &[9_000; 4]);
        h.pool.refresh(&h.account.address).await.unwrap();
        assert_eq!(h.pool.merge_small_change(&h.account).await.unwrap(), None);
        assert!(h.gateway.payments().is_empty());
    }

    #[tokio::test]
    async fn small_change_merges_into_one_output() {
        let h = harness();
        let a = &h.account.address;
        h.gateway.fund(a, &[3_000, 2_500, 4_000, 1_000, 1_500]);
        h.pool.refresh(a).await.unwrap();

        let tx = h.pool.merge_small_change(&h.account).await.unwrap().unwrap();
        let payments = h.gateway.payments();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].inputs.len(), 5);
        assert_eq!(payments[0].recipients, vec![Recipient::new(a.clone(), 11_000)]);

        let cat = h.pool.catalogue();
        assert_eq!(cat.len(a, Bucket::SmallChange), 0);
        let merged = cat.snapshot(a, Bucket::AggregateFee);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id.tx_id, tx);
        assert!(h.locks.is_empty());
    }

    #[tokio::test]
    async fn small_change_worth_less_than_a_transfer_fee_waits() {
        let h = harness();
        let a = &h.account.address;
        // 10 × 1_000 − 1_000 flat fee = 9_000 < 10_000
        h.gateway.fund(a, &[1_000; 10]);
        h.pool.refresh(a).await.unwrap();
        assert_eq!(h.pool.merge_small_change(&h.account).await.unwrap(), None);
        assert!(h.locks.is_empty());
    }

    #[tokio::test]
    async fn small_change_merges_unconditionally_at_count() {
        let h = harness();
        let a = &h.account.address;
        h.gateway.fund(a, &[2; 1000]);
        h.pool.refresh(a).await.unwrap();
        // 2_000 − 1_000 = 1_000: well below a transfer fee, merged anyway.
        assert!(h.pool.merge_small_change(&h.account).await.unwrap().is_some());
        assert_eq!(h.gateway.payments()[0].recipients[0].amount, 1_000);
    }

    #[tokio::test]
    async fn leased_small_change_is_not_merged() {
        let h = harness();
        let a = &h.account.address;
        let funded = h.gateway.fund(a, &[5_000; 5]);
        h.pool.refresh(a).await.unwrap();
        let other = HolderId::new();
        assert!(h.locks.try_acquire(&LockKey::new(a, &funded[0].id), other, chrono::Utc::now()));

        // Only four can be leased: below the threshold.
        assert_eq!(h.pool.merge_small_change(&h.account).await.unwrap(), None);
        assert_eq!(h.locks.len(), 1);
    }

    #[tokio::test]
    async fn replenish_noop_at_target() {
        let h = harness();
        let a = &h.account.address;
        let mut amounts = vec![10_000; 15];
        amounts.push(5_000_000);
        h.gateway.fund(a, &amounts);
        h.pool.refresh(a).await.unwrap();
        assert_eq!(h.pool.replenish_transfer_fee(&h.account).await.unwrap(), None);
    }

    #[tokio::test]
    async fn replenish_with_empty_reserve_is_noop() {
        let h = harness();
        let a = &h.account.address;
        h.gateway.fund(a, &[10_000; 3]);
        h.pool.refresh(a).await.unwrap();
        assert_eq!(h.pool.replenish_transfer_fee(&h.account).await.unwrap(), None);
        assert!(h.gateway.payments().is_empty());
    }

    #[tokio::test]
    async fn replenish_shortfall_unlocks_candidates() {
        let h = harness();
        let a = &h.account.address;
        // Needs 15 × 10_000 + 1_000 = 151_000; the reserve has one 1.0 entry
        // but it is leased elsewhere.
        let funded = h.gateway.fund(a, &[1_000_000]);
        h.pool.refresh(a).await.unwrap();
        let other = HolderId::new();
        let key = LockKey::new(a, &funded[0].id);
        assert!(h.locks.try_acquire(&key, other, chrono::Utc::now()));
        assert_eq!(h.pool.replenish_transfer_fee(&h.account).await.unwrap(), None);
        assert_eq!(h.locks.holder(&key, chrono::Utc::now()), Some(other));
    }

    #[tokio::test]
    async fn failed_broadcast_releases_lease() {
        let h = harness();
        let a = &h.account.address;
        h.gateway.fund(a, &[3_000_000]);
        h.pool.refresh(a).await.unwrap();
        h.gateway.fail_next_payment(PoolbatchError::gateway("mempool full"));
        assert!(h.pool.replenish_transfer_fee(&h.account).await.is_err());
        assert!(h.locks.is_empty());
        assert_eq!(h.pool.catalogue().len(a, Bucket::ReserveFee), 1);
    }

    #[tokio::test]
    async fn fee_merge_needs_a_unit_unless_many() {
        let h = harness();
        let a = &h.account.address;
        h.gateway.fund(a, &[100_000; 6]);
        h.pool.refresh(a).await.unwrap();
        // 600_000 − 1_000 < 1 unit, only six entries.
        assert_eq!(h.pool.merge_fee_outputs(&h.account).await.unwrap(), None);

        h.gateway.fund(a, &[500_000]);
        // AggregateFee is incremental after cold start: file the new output.
        let fund_tx = h.gateway.unspent(a).last().unwrap().id.tx_id.clone();
        assert_eq!(h.pool.mark_aggregate_fee(a, &fund_tx).await.unwrap(), 1);

        let tx = h.pool.merge_fee_outputs(&h.account).await.unwrap().unwrap();
        assert_eq!(h.gateway.payments()[0].recipients[0].amount, 1_099_000);
        let cat = h.pool.catalogue();
        assert_eq!(cat.len(a, Bucket::AggregateFee), 0);
        let reserve = cat.snapshot(a, Bucket::ReserveFee);
        assert_eq!(reserve.len(), 1);
        assert_eq!(reserve[0].id.tx_id, tx);
    }

    #[tokio::test]
    async fn fee_merge_folds_reserve_when_crowded() {
        let h = harness();
        let a = &h.account.address;
        h.gateway.fund(a, &[1_000_000; 101]);
        h.gateway.fund(a, &[20_000; 2]);
        h.pool.refresh(a).await.unwrap();
        assert!(h.pool.merge_fee_outputs(&h.account).await.unwrap().is_some());
        let payment = &h.gateway.payments()[0];
        assert_eq!(payment.inputs.len(), 103);
        assert_eq!(total_amount(&payment.inputs), 101_040_000);
        assert_eq!(h.pool.catalogue().len(a, Bucket::ReserveFee), 1);
    }

    #[tokio::test]
    async fn reserve_alerts() {
        let h = harness();
        let a = &h.account.address;
        h.pool.refresh(a).await.unwrap();
        assert!(h.pool.warn_if_reserve_low(a).await);
        assert_eq!(h.notifier.alerts()[0].0, "Reserve empty");

        h.gateway.fund(a, &[2_000_000]);
        let tx = h.gateway.unspent(a)[0].id.tx_id.clone();
        h.pool.mark_aggregate_fee(a, &tx).await.unwrap();
        assert!(!h.pool.warn_if_reserve_low(a).await);
        assert_eq!(h.notifier.alerts().len(), 1);
    }

    #[tokio::test]
    async fn maintain_runs_every_step() {
        let h = harness();
        let a = &h.account.address;
        let mut amounts = vec![3_000; 5];
        amounts.push(2_000_000);
        h.gateway.fund(a, &amounts);
        // Cold start first, as the maintenance loop does.
        h.pool.refresh(a).await.unwrap();

        let report = h.pool.maintain(&h.account).await;
        assert!(report.refreshed);
        assert!(report.small_change_merge.is_some());
        assert!(report.transfer_fee_replenish.is_some());
        assert_eq!(report.fee_merge, None);
        assert!(!report.reserve_alert);
        assert_eq!(h.pool.catalogue().len(a, Bucket::TransferFee), 15);
    }

    #[tokio::test]
    async fn maintain_drops_expired_leases() {
        let h = harness();
        let a = &h.account.address;
        let stale = LockKey::new(a, &poolbatch_types::ResourceId::new("spent", 0));
        let live = LockKey::new(a, &poolbatch_types::ResourceId::new("spent", 1));
        let now = chrono::Utc::now();
        assert!(h.locks.try_acquire(&stale, HolderId::new(), now - Duration::seconds(600)));
        assert!(h.locks.try_acquire(&live, HolderId::new(), now));

        let report = h.pool.maintain(&h.account).await;
        assert_eq!(report.purged_leases, 1);
        assert_eq!(h.locks.len(), 1);
        assert!(h.locks.is_locked(&live, chrono::Utc::now()));
    }

    #[tokio::test]
    async fn maintain_survives_discovery_outage() {
        let h = harness();
        h.gateway.fail_fetches(u32::MAX);
        let report = h.pool.maintain(&h.account).await;
        assert!(!report.refreshed);
        assert!(report.reserve_alert);
    }

    #[tokio::test]
    async fn maintenance_loop_stops_on_shutdown() {
        let h = harness();
        h.gateway.fund(&h.account.address, &[2_000_000]);
        let (tx, rx) = watch::channel(false);
        let handle = h.pool.clone().spawn_maintenance(vec![h.account.clone()], rx);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(h.pool.catalogue().cold_started(&h.account.address));
        assert_eq!(h.pool.catalogue().len(&h.account.address, Bucket::TransferFee), 15);
    }
}
