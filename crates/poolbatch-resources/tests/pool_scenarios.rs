//! End-to-end resource pool scenarios against the in-memory gateway.

use std::collections::HashSet;
use std::sync::{Arc, Once};

use chrono::Duration;
use poolbatch_resources::{MemoryLockStore, ResourceCatalogue, ResourcePool};
use poolbatch_types::testkit::{FakeGateway, RecordingNotifier};
use poolbatch_types::{Bucket, FundingAccount, HolderId, ResourcePoolConfig, constants};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn setup() -> (Arc<ResourcePool>, Arc<FakeGateway>, FundingAccount) {
    init_tracing();
    let gateway = Arc::new(FakeGateway::new());
    let pool = Arc::new(ResourcePool::new(
        ResourcePoolConfig::instant(),
        gateway.clone(),
        Arc::new(MemoryLockStore::new(Duration::seconds(
            i64::try_from(constants::LOCK_LEASE_SECS).unwrap(),
        ))),
        Arc::new(ResourceCatalogue::new()),
        Arc::new(RecordingNotifier::default()),
    ));
    (pool, gateway, FundingAccount::new("fund", "key"))
}

#[tokio::test]
async fn replenish_from_single_two_unit_reserve() {
    let (pool, gateway, account) = setup();
    let a = &account.address;
    let mut amounts = vec![10_000; 10];
    amounts.push(2_000_000);
    let funded = gateway.fund(a, &amounts);
    let reserve_entry = funded.last().unwrap().id.clone();
    pool.refresh(a).await.unwrap();
    assert_eq!(pool.catalogue().len(a, Bucket::TransferFee), 10);

    let tx = pool.replenish_transfer_fee(&account).await.unwrap().unwrap();

    let payments = gateway.payments();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].inputs.len(), 1);
    assert_eq!(payments[0].inputs[0].id, reserve_entry);
    assert_eq!(payments[0].recipients.len(), 5);
    assert!(payments[0].recipients.iter().all(|r| r.amount == 10_000));

    let cat = pool.catalogue();
    assert_eq!(cat.len(a, Bucket::TransferFee), 15);
    let new_fee_outputs = cat
        .snapshot(a, Bucket::TransferFee)
        .into_iter()
        .filter(|r| r.id.tx_id == tx)
        .count();
    assert_eq!(new_fee_outputs, 5);

    // 2_000_000 − 5 × 10_000 − 1_000 network fee
    let reserve = cat.snapshot(a, Bucket::ReserveFee);
    assert_eq!(reserve.len(), 1);
    assert_eq!(reserve[0].amount, 1_949_000);
    assert_eq!(reserve[0].id.tx_id, tx);
    assert!(!cat.contains(a, &reserve_entry));
}

#[tokio::test]
async fn replenish_change_below_a_unit_lands_in_aggregate_fee() {
    let (pool, gateway, account) = setup();
    let a = &account.address;
    gateway.fund(a, &[1_100_000]);
    pool.refresh(a).await.unwrap();

    pool.replenish_transfer_fee(&account).await.unwrap().unwrap();
    let cat = pool.catalogue();
    assert_eq!(cat.len(a, Bucket::TransferFee), 15);
    assert_eq!(cat.len(a, Bucket::ReserveFee), 0);
    // 1_100_000 − 150_000 − 1_000
    assert_eq!(cat.snapshot(a, Bucket::AggregateFee)[0].amount, 949_000);
}

#[tokio::test]
async fn small_change_merge_fires_iff_conditions_hold() {
    let cases: &[(usize, u64, bool)] = &[
        (4, 9_000, false),     // below count threshold
        (5, 2_000, false),     // 10_000 − 1_000 < 10_000
        (5, 2_200, true),      // 11_000 − 1_000 = 10_000
        (6, 9_999, true),
        (999, 5, false),       // 4_995 − 1_000
        (1_000, 5, true),      // unconditional by count
    ];
    for &(count, each, fires) in cases {
        let (pool, gateway, account) = setup();
        gateway.fund(&account.address, &vec![each; count]);
        pool.refresh(&account.address).await.unwrap();
        let merged = pool.merge_small_change(&account).await.unwrap();
        assert_eq!(merged.is_some(), fires, "count {count} × {each}");
        assert_eq!(gateway.payments().is_empty(), !fires);
    }
}

#[tokio::test]
async fn concurrent_selection_never_double_leases() {
    let (pool, gateway, account) = setup();
    let a = account.address.clone();
    gateway.fund(&a, &[1_000_000; 40]);
    pool.refresh(&a).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let pool = Arc::clone(&pool);
        let a = a.clone();
        tasks.push(tokio::spawn(async move {
            pool.select_for_amount(&a, Bucket::ReserveFee, 3_000_000, HolderId::new())
        }));
    }
    let mut seen = HashSet::new();
    let mut granted = 0;
    for task in tasks {
        if let Ok(lease) = task.await.unwrap() {
            granted += 1;
            for r in &lease.resources {
                assert!(seen.insert(r.id.clone()), "{} leased twice", r.id);
            }
        }
    }
    // 40 entries, 3 per lease.
    assert_eq!(granted, 10);
    assert_eq!(seen.len(), 30);
}
