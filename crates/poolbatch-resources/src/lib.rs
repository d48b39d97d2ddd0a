//! # poolbatch-resources
//!
//! **Funding-resource pool for PoolBatch.**
//!
//! Our funding addresses hold many discrete spendable outputs. This crate
//! keeps them usable under concurrent access:
//!
//! - **Catalogue**: [`ResourceCatalogue`] files each resource into a
//!   [`Bucket`](poolbatch_types::Bucket) by amount
//! - **Leases**: [`LockStore`] hands out time-bound exclusive leases;
//!   selection never returns a resource someone else holds
//! - **Selection**: [`ResourcePool::select_for_amount`],
//!   [`ResourcePool::select_live`] and [`ResourcePool::select_count`]
//!   return a [`Lease`] that is later consumed or released
//! - **Maintenance**: small-change merge, transfer-fee replenishment,
//!   fee-output merge and a low-reserve alert, run periodically by
//!   [`ResourcePool::spawn_maintenance`]

pub mod catalogue;
pub mod lease;
pub mod lock;
pub mod maintenance;
pub mod pool;

pub use catalogue::ResourceCatalogue;
pub use lease::Lease;
pub use lock::{LockKey, LockStore, MemoryLockStore};
pub use maintenance::MaintenanceReport;
pub use pool::ResourcePool;
