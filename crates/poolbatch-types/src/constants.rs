//! System-wide constants for the PoolBatch swap backend.
//!
//! Native amounts are integer minor units; one whole unit is
//! [`NATIVE_PRECISION`] minor units.

/// Minor units per whole native unit (6 decimal places).
pub const NATIVE_PRECISION: u64 = 1_000_000;

/// Number of decimal digits shown for human-facing amounts.
pub const DISPLAY_DIGITS: u32 = 6;

/// Exact size of a transfer-fee resource (0.01 unit).
pub const TRANSFER_FEE_AMOUNT: u64 = NATIVE_PRECISION / 100;

/// Lower bound (inclusive) of the reserve-fee bucket (1 unit).
pub const RESERVE_FEE_FLOOR: u64 = NATIVE_PRECISION;

/// Flat fee deducted from consolidation outputs (0.001 unit).
pub const FLAT_MERGE_FEE: u64 = NATIVE_PRECISION / 1000;

/// Lease duration for a resource lock, in seconds.
pub const LOCK_LEASE_SECS: u64 = 300;

/// Minimum bucket size before a small-change merge is considered.
pub const MERGE_THRESHOLD: usize = 5;

/// Small-change count at which a merge fires regardless of value.
pub const MERGE_UNCONDITIONAL_COUNT: usize = 1000;

/// Target number of transfer-fee resources kept on hand.
pub const TRANSFER_FEE_TARGET: usize = 15;

/// Reserve-fee count above which reserve entries are folded into fee merges,
/// and fee-merge count above which the value floor is waived.
pub const RESERVE_FOLD_COUNT: usize = 100;

/// Catalogue refresh / maintenance interval in milliseconds.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;

/// Wait after a maintenance broadcast before updating the catalogue.
pub const DEFAULT_SETTLE_WAIT_MS: u64 = 5_000;

/// Delay between chain-affecting steps of a batch.
pub const DEFAULT_INTER_STEP_DELAY_MS: u64 = 5_000;

/// Delay before each settlement attempt (trade timeout).
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2_000;

/// Default tick period of a pair's aggregation loop.
pub const DEFAULT_TICK_PERIOD_MS: u64 = 3_000;

/// Total settlement attempts per batch (initial + 2 retries).
pub const MAX_SETTLE_ATTEMPTS: u32 = 3;

/// Upper bound on pool-side consolidation rounds per recovery.
pub const POOL_MERGE_ROUNDS: u32 = 10;

/// Gateway discovery attempts during a catalogue refresh.
pub const REFRESH_FETCH_ATTEMPTS: u32 = 3;

/// Default fee factor (fees are expressed per-mille of this).
pub const DEFAULT_FEE_FACTOR: u64 = 1000;

/// Default network fee reserved for a settlement or payment (0.001 unit).
pub const DEFAULT_NETWORK_FEE: u64 = NATIVE_PRECISION / 1000;
