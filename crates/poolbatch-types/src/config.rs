//! Configuration for the PoolBatch service, its pairs, and its subsystems.
//!
//! Durations are stored as integer milliseconds (or seconds for the lease)
//! so config files stay plain JSON; accessors hand out [`Duration`]s.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    Address, Asset, ContractVersion, FeeSchedule, KeyRef, PairId, PoolbatchError, Result,
    constants,
};

/// A funding address together with the signer handle that spends from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FundingAccount {
    pub address: Address,
    pub signer: KeyRef,
}

impl FundingAccount {
    #[must_use]
    pub fn new(address: impl Into<String>, signer: impl Into<String>) -> Self {
        Self {
            address: Address::new(address),
            signer: KeyRef::new(signer),
        }
    }
}

/// Resource pool tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcePoolConfig {
    /// Lease duration of a resource lock.
    pub lease_secs: u64,
    /// Minimum small-change count before a merge is considered.
    pub merge_threshold: usize,
    /// Small-change count at which a merge fires regardless of value.
    pub merge_unconditional_count: usize,
    /// Number of transfer-fee resources to keep on hand.
    pub transfer_fee_target: usize,
    /// Reserve-fee count above which reserve entries join a fee merge.
    pub reserve_fold_count: usize,
    /// Flat fee deducted from every consolidation output.
    pub flat_fee: u64,
    /// Size of one transfer-fee resource.
    pub transfer_fee_amount: u64,
    /// Network fee added on top of a replenishment.
    pub network_fee: u64,
    pub refresh_interval_ms: u64,
    /// Wait after a maintenance broadcast (read-after-write lag).
    pub settle_wait_ms: u64,
}

impl Default for ResourcePoolConfig {
    fn default() -> Self {
        Self {
            lease_secs: constants::LOCK_LEASE_SECS,
            merge_threshold: constants::MERGE_THRESHOLD,
            merge_unconditional_count: constants::MERGE_UNCONDITIONAL_COUNT,
            transfer_fee_target: constants::TRANSFER_FEE_TARGET,
            reserve_fold_count: constants::RESERVE_FOLD_COUNT,
            flat_fee: constants::FLAT_MERGE_FEE,
            transfer_fee_amount: constants::TRANSFER_FEE_AMOUNT,
            network_fee: constants::DEFAULT_NETWORK_FEE,
            refresh_interval_ms: constants::DEFAULT_REFRESH_INTERVAL_MS,
            settle_wait_ms: constants::DEFAULT_SETTLE_WAIT_MS,
        }
    }
}

impl ResourcePoolConfig {
    #[must_use]
    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.lease_secs).unwrap_or(i64::MAX))
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    #[must_use]
    pub fn settle_wait(&self) -> Duration {
        Duration::from_millis(self.settle_wait_ms)
    }

    /// Config for tests: no waits.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            refresh_interval_ms: 10,
            settle_wait_ms: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.lease_secs == 0 {
            return Err(PoolbatchError::Configuration(
                "lease_secs must be positive".to_string(),
            ));
        }
        if self.merge_threshold == 0 || self.transfer_fee_amount == 0 {
            return Err(PoolbatchError::Configuration(
                "merge_threshold and transfer_fee_amount must be positive".to_string(),
            ));
        }
        if self.refresh_interval_ms == 0 {
            return Err(PoolbatchError::Configuration(
                "refresh_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Order aggregator tuning, shared by every pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub tick_period_ms: u64,
    /// Delay between chain-affecting steps of one batch.
    pub inter_step_delay_ms: u64,
    /// Delay before each settlement attempt.
    pub settle_delay_ms: u64,
    pub max_settle_attempts: u32,
    pub pool_merge_rounds: u32,
    /// Network fee reserved on top of a funded amount.
    pub network_fee: u64,
    /// Native input funding one token transfer.
    pub transfer_fee_amount: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: constants::DEFAULT_TICK_PERIOD_MS,
            inter_step_delay_ms: constants::DEFAULT_INTER_STEP_DELAY_MS,
            settle_delay_ms: constants::DEFAULT_SETTLE_DELAY_MS,
            max_settle_attempts: constants::MAX_SETTLE_ATTEMPTS,
            pool_merge_rounds: constants::POOL_MERGE_ROUNDS,
            network_fee: constants::DEFAULT_NETWORK_FEE,
            transfer_fee_amount: constants::TRANSFER_FEE_AMOUNT,
        }
    }
}

impl AggregatorConfig {
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    #[must_use]
    pub fn inter_step_delay(&self) -> Duration {
        Duration::from_millis(self.inter_step_delay_ms)
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Config for tests: no delays.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            tick_period_ms: 10,
            inter_step_delay_ms: 0,
            settle_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_period_ms == 0 {
            return Err(PoolbatchError::Configuration(
                "tick_period_ms must be positive".to_string(),
            ));
        }
        if self.max_settle_attempts == 0 {
            return Err(PoolbatchError::Configuration(
                "max_settle_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One traded pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairConfig {
    /// Pool contract id.
    pub pair: PairId,
    #[serde(default)]
    pub contract_version: ContractVersion,
    /// Account funding settlements, refunds and distributions.
    pub funding: FundingAccount,
    pub token_asset: Asset,
    pub token_decimals: u32,
    /// LP plan passed through to the pool contract.
    #[serde(default)]
    pub lp_plan: u32,
    #[serde(default)]
    pub fees: FeeSchedule,
}

impl PairConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pair.as_str().is_empty() {
            return Err(PoolbatchError::Configuration("empty pair id".to_string()));
        }
        if self.funding.address.as_str().is_empty() || self.funding.signer.as_str().is_empty() {
            return Err(PoolbatchError::Configuration(format!(
                "pair {}: funding address and signer are required",
                self.pair
            )));
        }
        if self.token_asset.is_native() {
            return Err(PoolbatchError::Configuration(format!(
                "pair {}: token asset cannot be the native coin",
                self.pair
            )));
        }
        self.fees
            .validate()
            .map_err(|e| PoolbatchError::Configuration(format!("pair {}: {e}", self.pair)))
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Network name handed to the Gateway (e.g. "mainnet", "testnet").
    pub network: String,
    pub pairs: Vec<PairConfig>,
    #[serde(default)]
    pub resources: ResourcePoolConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
}

impl ServiceConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PoolbatchError::Configuration(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PoolbatchError::Configuration(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.resources.validate()?;
        self.aggregator.validate()?;
        let mut seen = std::collections::HashSet::new();
        for pair in &self.pairs {
            pair.validate()?;
            if !seen.insert(&pair.pair) {
                return Err(PoolbatchError::Configuration(format!(
                    "duplicate pair {}",
                    pair.pair
                )));
            }
        }
        Ok(())
    }

    /// Distinct funding accounts across all pairs, in first-seen order.
    #[must_use]
    pub fn funding_accounts(&self) -> Vec<FundingAccount> {
        let mut out: Vec<FundingAccount> = Vec::new();
        for pair in &self.pairs {
            if !out.iter().any(|a| a.address == pair.funding.address) {
                out.push(pair.funding.clone());
            }
        }
        out
    }
}
