//! Pair lookup for the request-handling layer.
//!
//! The registry is an explicit object handed to whoever routes requests.
//! It is unbounded and never evicts: a pair stays registered, with its
//! pending book, for the life of the process.

use std::sync::Arc;

use dashmap::DashMap;
use poolbatch_types::{
    AggregatorConfig, PairConfig, PairId, PendingOrder, PoolbatchError, Result, ServiceConfig,
    Side, SwapRequest,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{AggregatorDeps, PairAggregator, behavior_for};

#[derive(Default)]
pub struct PoolRegistry {
    pairs: DashMap<PairId, Arc<PairAggregator>>,
}

impl PoolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One aggregator per configured pair, with the behaviour its contract
    /// version selects.
    pub fn from_config(config: &ServiceConfig, deps: &AggregatorDeps) -> Result<Self> {
        config.validate()?;
        let registry = Self::new();
        for pair in &config.pairs {
            registry.register_pair(pair.clone(), deps.clone(), config.aggregator.clone());
        }
        Ok(registry)
    }

    /// Build an aggregator for `pair` and register it.
    pub fn register_pair(
        &self,
        pair: PairConfig,
        deps: AggregatorDeps,
        config: AggregatorConfig,
    ) -> Arc<PairAggregator> {
        let behavior = behavior_for(pair.contract_version, pair.fees);
        let aggregator = Arc::new(PairAggregator::new(pair, behavior, deps, config));
        self.register(Arc::clone(&aggregator));
        aggregator
    }

    /// Register `aggregator`, returning the one it replaced.
    pub fn register(&self, aggregator: Arc<PairAggregator>) -> Option<Arc<PairAggregator>> {
        let pair = aggregator.pair().clone();
        info!(pair = %pair, "pair registered");
        self.pairs.insert(pair, aggregator)
    }

    pub fn get(&self, pair: &PairId) -> Result<Arc<PairAggregator>> {
        self.pairs
            .get(pair)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PoolbatchError::UnknownPair(pair.clone()))
    }

    pub fn submit(&self, pair: &PairId, order: PendingOrder) -> Result<()> {
        self.get(pair)?.submit(order)
    }

    pub async fn submit_swap(&self, pair: &PairId, request: SwapRequest) -> Result<PendingOrder> {
        let aggregator = self.get(pair)?;
        aggregator.submit_swap(request).await
    }

    pub async fn get_quote(&self, pair: &PairId, side: Side, amount: u64) -> Result<u64> {
        let aggregator = self.get(pair)?;
        aggregator.get_quote(side, amount).await
    }

    #[must_use]
    pub fn pairs(&self) -> Vec<PairId> {
        let mut pairs: Vec<PairId> = self.pairs.iter().map(|e| e.key().clone()).collect();
        pairs.sort();
        pairs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Start every registered pair's tick loop.
    pub fn spawn_all(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let aggregators: Vec<Arc<PairAggregator>> =
            self.pairs.iter().map(|e| Arc::clone(e.value())).collect();
        aggregators
            .into_iter()
            .map(|aggregator| aggregator.spawn(shutdown.clone()))
            .collect()
    }
}
