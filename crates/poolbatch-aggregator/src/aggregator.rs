//! One pair's batching state machine.
//!
//! Each tick drains one side of the [`PendingBook`], quotes the batch in
//! aggregate, refunds the orders whose pro-rata share misses their slippage
//! floor, settles the survivors in one swap and pays out the proceeds.
//!
//! Buy batches receive token and pay each order with its own transfer.
//! Sell batches receive native coin and pay every order in one multi-output
//! payment.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use poolbatch_pricing::{Candle, after_trade_fee, candles, observation_price};
use poolbatch_resources::{Lease, ResourcePool};
use poolbatch_types::{
    AggregatorConfig, Asset, Bucket, CorrelationId, Gateway, HolderId, Ledger, OrderFill,
    PairConfig, PairId, PaymentReceipt, PaymentRequest, PendingOrder, PoolbatchError,
    PriceObservation, Recipient, Reserves, Result, SettlementRequest, Side, SwapRequest,
    TokenTransfer, TradeRecord, TradeRecordId, TradeStatus, TradeUpdate, TxId,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::behavior::PoolBehavior;
use crate::book::PendingBook;
use crate::filter::{SlippageSplit, aggregate_tendered, split_by_slippage};
use crate::phase::{BatchPhase, PhaseCell};

/// Collaborators shared by every pair of a process.
#[derive(Clone)]
pub struct AggregatorDeps {
    pub gateway: Arc<dyn Gateway>,
    pub ledger: Arc<dyn Ledger>,
    pub pool: Arc<ResourcePool>,
}

/// Summary of a settled batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub side: Side,
    pub accepted: usize,
    pub refunded: usize,
    /// Tendered amount of the accepted orders.
    pub total_in: u64,
    /// Counter-amount owed to the accepted orders, net of the sell-side
    /// trade fee.
    pub total_out: u64,
    pub settlement_ref: TxId,
    pub settle_attempts: u32,
    /// Amount actually paid out. Never more than `total_out`.
    pub distributed: u64,
    pub trade_record: TradeRecordId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was pending.
    Idle,
    /// Every order missed its slippage floor and was refunded.
    AllRefunded { side: Side, refunded: usize },
    Settled { report: BatchReport },
}

/// Trade opened in the Ledger for the surviving orders.
struct OpenTrade {
    record: TradeRecordId,
    total_in: u64,
    counter: u64,
    total_out: u64,
}

/// Batching engine for one pair.
pub struct PairAggregator {
    pair: PairConfig,
    behavior: Arc<dyn PoolBehavior>,
    deps: AggregatorDeps,
    config: AggregatorConfig,
    book: PendingBook,
    phase: PhaseCell,
    batch_sequence: AtomicU64,
    running: tokio::sync::Mutex<()>,
}

impl PairAggregator {
    #[must_use]
    pub fn new(
        pair: PairConfig,
        behavior: Arc<dyn PoolBehavior>,
        deps: AggregatorDeps,
        config: AggregatorConfig,
    ) -> Self {
        // Batch sequences continue across restarts so record ids stay unique.
        let seed = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        Self {
            pair,
            behavior,
            deps,
            config,
            book: PendingBook::new(),
            phase: PhaseCell::default(),
            batch_sequence: AtomicU64::new(seed),
            running: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn pair(&self) -> &PairId {
        &self.pair.pair
    }

    #[must_use]
    pub fn pair_config(&self) -> &PairConfig {
        &self.pair
    }

    #[must_use]
    pub fn phase(&self) -> BatchPhase {
        self.phase.get()
    }

    #[must_use]
    pub fn pending_len(&self, side: Side) -> usize {
        self.book.len(side)
    }

    // =================================================================
    // Ingestion
    // =================================================================

    /// Queue an order for the next tick.
    pub fn submit(&self, order: PendingOrder) -> Result<()> {
        if order.tendered == 0 {
            return Err(PoolbatchError::InvalidOrder {
                reason: format!("order {} tenders nothing", order.correlation_id),
            });
        }
        debug!(
            pair = %self.pair.pair,
            side = %order.side,
            correlation = %order.correlation_id,
            tendered = order.tendered,
            quote = order.quote_at_submission,
            "order queued"
        );
        self.book.push(order);
        self.phase.mark_collecting();
        Ok(())
    }

    /// Validate a client request, attach its submission-time quote and
    /// queue it. Buy tenders enter the book net of the trade fee.
    pub async fn submit_swap(&self, request: SwapRequest) -> Result<PendingOrder> {
        request.validate()?;
        let (tendered, quote) = self.submission_quote(request.side, request.amount).await?;
        if quote == 0 {
            return Err(PoolbatchError::InvalidOrder {
                reason: format!("{} of {} would receive nothing", request.side, request.amount),
            });
        }
        let order = PendingOrder {
            correlation_id: request.correlation_id,
            side: request.side,
            address: request.address,
            tendered,
            slippage_percent: request.slippage_percent,
            quote_at_submission: quote,
            submitted_at: Utc::now(),
        };
        self.submit(order.clone())?;
        Ok(order)
    }

    /// The counter-amount an order tendering `amount` on `side` would be
    /// quoted right now.
    pub async fn get_quote(&self, side: Side, amount: u64) -> Result<u64> {
        Ok(self.submission_quote(side, amount).await?.1)
    }

    async fn submission_quote(&self, side: Side, amount: u64) -> Result<(u64, u64)> {
        let tendered = match side {
            Side::Buy => after_trade_fee(amount, &self.pair.fees)?,
            Side::Sell => amount,
        };
        let quote = self.quote_batch(side, tendered).await?;
        Ok((tendered, quote))
    }

    async fn quote_batch(&self, side: Side, amount: u64) -> Result<u64> {
        let reserves = self.deps.gateway.fetch_reserves(&self.pair.pair).await?;
        self.behavior.quote(side, &reserves, amount)
    }

    // =================================================================
    // Tick
    // =================================================================

    /// Process one batch: all pending buys if any, otherwise all pending
    /// sells.
    ///
    /// Orders not yet on chain are requeued when a step before settlement
    /// fails. A failed refund surfaces as `RefundFailed`: the accepted
    /// orders are requeued, the refunded ones dropped. Once settlement
    /// starts the batch is never requeued: exhausted retries end in
    /// `SettlementTimeout`, a payout failure in `DistributionFailed`.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let _running = self.running.lock().await;
        let Some((side, orders)) = self.book.take_next() else {
            self.phase.set(BatchPhase::Idle);
            return Ok(TickOutcome::Idle);
        };
        self.phase.set(BatchPhase::Collecting);
        let span = info_span!("tick", pair = %self.pair.pair, side = %side, orders = orders.len());
        let outcome = self.process(side, orders).instrument(span).await;
        self.phase.set(if self.book.is_empty() {
            BatchPhase::Idle
        } else {
            BatchPhase::Collecting
        });
        outcome
    }

    async fn process(&self, side: Side, orders: Vec<PendingOrder>) -> Result<TickOutcome> {
        let holder = HolderId::new();

        self.phase.set(BatchPhase::Quoting);
        let aggregate = aggregate_tendered(&orders);
        let quoted = self
            .deps
            .gateway
            .fetch_reserves(&self.pair.pair)
            .await
            .and_then(|reserves| {
                let counter = self.behavior.quote(side, &reserves, aggregate)?;
                Ok((reserves, counter))
            });
        let (reserves, counter) = match quoted {
            Ok(quoted) => quoted,
            Err(e) => {
                warn!(error = %e, "batch quote failed; orders kept for the next tick");
                self.book.restore(side, orders);
                return Err(e);
            }
        };

        self.phase.set(BatchPhase::Filtering);
        let SlippageSplit { accepted, refunded } = split_by_slippage(orders, counter);
        info!(
            aggregate,
            counter,
            accepted = accepted.len(),
            refunded = refunded.len(),
            "batch filtered"
        );
        let refunded_count = refunded.len();
        if !refunded.is_empty() {
            if let Err(e) = self.refund(side, &refunded, holder).await {
                self.book.restore(side, accepted);
                return Err(e);
            }
            tokio::time::sleep(self.config.inter_step_delay()).await;
        }
        if accepted.is_empty() {
            return Ok(TickOutcome::AllRefunded {
                side,
                refunded: refunded_count,
            });
        }

        self.phase.set(BatchPhase::Quoting);
        let trade = match self.open_trade(side, &accepted, &reserves).await {
            Ok(trade) => trade,
            Err(e) => {
                warn!(error = %e, "opening trade failed; orders kept for the next tick");
                self.book.restore(side, accepted);
                return Err(e);
            }
        };

        let settled = self.settle(side, trade.total_in, holder).await;
        let (settlement_ref, settle_attempts) = match settled {
            Ok(settled) => settled,
            Err(e) => {
                error!(
                    record = %trade.record,
                    error = %e,
                    "settlement abandoned; trade record needs reconciliation"
                );
                self.fail_record(trade.record, &e).await;
                return Err(e);
            }
        };
        self.update_record(trade.record, TradeUpdate::settled(settlement_ref.clone()))
            .await;
        tokio::time::sleep(self.config.inter_step_delay()).await;

        self.phase.set(BatchPhase::Distributing);
        let distributed = match side {
            Side::Buy => {
                self.distribute_tokens(&accepted, trade.total_out, trade.record, holder)
                    .await
            }
            Side::Sell => {
                self.distribute_native(&accepted, trade.total_out, trade.record, holder)
                    .await
            }
        };
        let distributed = match distributed {
            Ok(distributed) => distributed,
            Err(e) => {
                error!(record = %trade.record, error = %e, "distribution stopped part-way");
                self.fail_record(trade.record, &e).await;
                return Err(e);
            }
        };
        self.update_record(trade.record, TradeUpdate::status(TradeStatus::Distributed))
            .await;

        let report = BatchReport {
            side,
            accepted: accepted.len(),
            refunded: refunded_count,
            total_in: trade.total_in,
            total_out: trade.total_out,
            settlement_ref,
            settle_attempts,
            distributed,
            trade_record: trade.record,
        };
        info!(
            record = %report.trade_record,
            tx = %report.settlement_ref,
            settled = trade.counter,
            distributed,
            "batch distributed"
        );
        Ok(TickOutcome::Settled { report })
    }

    // -----------------------------------------------------------------
    // Refunds
    // -----------------------------------------------------------------

    /// Pay rejected orders back their tendered amount in one transaction.
    async fn refund(&self, side: Side, orders: &[PendingOrder], holder: HolderId) -> Result<TxId> {
        let recipients: Vec<Recipient> = orders
            .iter()
            .map(|o| Recipient::new(o.address.clone(), o.tendered))
            .collect();
        let paid = match side {
            Side::Buy => self.pay_native(recipients, holder).await,
            Side::Sell => self.transfer_tokens(recipients, holder).await,
        };
        match paid {
            Ok(tx) => {
                info!(tx = %tx, refunded = orders.len(), "refunded orders outside slippage");
                Ok(tx)
            }
            Err(e) => {
                for order in orders {
                    error!(
                        correlation = %order.correlation_id,
                        address = %order.address,
                        amount = order.tendered,
                        error = %e,
                        "refund failed; order still owed"
                    );
                }
                Err(PoolbatchError::RefundFailed {
                    reason: e.to_string(),
                    orders: orders.iter().map(|o| o.correlation_id.clone()).collect(),
                })
            }
        }
    }

    // -----------------------------------------------------------------
    // Trade record
    // -----------------------------------------------------------------

    /// Requote the accepted orders against the reserves the filter saw, so
    /// every accepted share stays at or above its floor.
    async fn open_trade(
        &self,
        side: Side,
        accepted: &[PendingOrder],
        reserves: &Reserves,
    ) -> Result<OpenTrade> {
        let total_in = aggregate_tendered(accepted);
        let counter = self.behavior.quote(side, reserves, total_in)?;
        let total_out = match side {
            Side::Buy => counter,
            Side::Sell => after_trade_fee(counter, &self.pair.fees)?,
        };
        let (base_amount, quote_amount) = match side {
            Side::Buy => (total_in, counter),
            Side::Sell => (counter, total_in),
        };
        let observation = PriceObservation {
            pair: self.pair.pair.clone(),
            kind: side,
            base_amount,
            quote_amount,
            price: observation_price(base_amount, quote_amount, self.pair.token_decimals)?,
            observed_at: Utc::now(),
        };
        self.deps.ledger.record_price_observation(observation).await?;

        let sequence = self.batch_sequence.fetch_add(1, Ordering::Relaxed);
        let record = TradeRecordId::deterministic(&self.pair.pair, sequence);
        self.deps
            .ledger
            .create_trade_record(TradeRecord::pending(
                record,
                self.pair.pair.clone(),
                side,
                accepted,
                total_in,
                total_out,
            ))
            .await?;
        info!(record = %record, total_in, counter, total_out, "trade opened");
        Ok(OpenTrade {
            record,
            total_in,
            counter,
            total_out,
        })
    }

    /// Ledger writes after settlement never stop the batch.
    async fn update_record(&self, record: TradeRecordId, update: TradeUpdate) {
        if let Err(e) = self.deps.ledger.update_trade_record(record, update).await {
            error!(record = %record, error = %e, "trade record update failed");
        }
    }

    async fn fail_record(&self, record: TradeRecordId, cause: &PoolbatchError) {
        let status = TradeStatus::Failed {
            reason: cause.to_string(),
        };
        self.update_record(record, TradeUpdate::status(status)).await;
    }

    // -----------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------

    /// Broadcast the batch swap, retrying up to `max_settle_attempts` times
    /// with `settle_delay` before each attempt.
    ///
    /// Liquidity shortfalls trigger one round of pool consolidation and
    /// funding shortfalls one resource-pool maintenance cycle before the
    /// next attempt. Returns the settlement tx and the attempt that
    /// landed it.
    async fn settle(&self, side: Side, total_in: u64, holder: HolderId) -> Result<(TxId, u32)> {
        let max_attempts = self.config.max_settle_attempts;
        let mut consolidated = false;
        let mut maintained = false;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            self.phase.set(if attempt == 1 {
                BatchPhase::Settling
            } else {
                BatchPhase::Retrying
            });
            tokio::time::sleep(self.config.settle_delay()).await;

            match self.settle_once(side, total_in, holder).await {
                Ok(Some(tx)) => {
                    info!(tx = %tx, attempt, "settlement broadcast");
                    return Ok((tx, attempt));
                }
                Ok(None) => {
                    warn!(attempt, "settlement returned an empty result");
                    last_error = "empty settlement result".to_string();
                }
                Err(e @ PoolbatchError::InsufficientPoolLiquidity { .. }) => {
                    warn!(attempt, error = %e, "pool liquidity short");
                    last_error = e.to_string();
                    if !consolidated {
                        consolidated = true;
                        let rounds = self.consolidate_pool(holder).await;
                        info!(rounds, "pool consolidation done");
                    }
                }
                Err(
                    e @ (PoolbatchError::InsufficientFunding { .. }
                    | PoolbatchError::InsufficientResources { .. }),
                ) => {
                    warn!(attempt, error = %e, "settlement funding short");
                    last_error = e.to_string();
                    if !maintained {
                        maintained = true;
                        let report = self.deps.pool.maintain(&self.pair.funding).await;
                        info!(?report, "funding recovery done");
                    }
                }
                Err(e) if e.is_recoverable() => {
                    warn!(attempt, error = %e, "settlement attempt failed");
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }

        Err(PoolbatchError::SettlementTimeout {
            attempts: max_attempts,
            last_error,
        })
    }

    async fn settle_once(
        &self,
        side: Side,
        total_in: u64,
        holder: HolderId,
    ) -> Result<Option<TxId>> {
        let address = &self.pair.funding.address;
        let target = match side {
            Side::Buy => total_in.saturating_add(self.config.network_fee),
            Side::Sell => self.config.network_fee,
        };
        let lease = self.deps.pool.select_live(address, target, holder).await?;
        let request = SettlementRequest {
            pair: self.pair.pair.clone(),
            version: self.behavior.version(),
            side,
            signer: self.pair.funding.signer.clone(),
            address: address.clone(),
            amount_in: total_in,
            funding: lease.inputs(),
            lp_plan: self.pair.lp_plan,
        };
        match self.behavior.settle(self.deps.gateway.as_ref(), request).await {
            Ok(Some(tx)) => {
                self.deps.pool.consume(lease, &PaymentReceipt::new(tx.clone()));
                self.file_change(&tx).await;
                Ok(Some(tx))
            }
            other => {
                self.deps.pool.release(lease);
                other
            }
        }
    }

    /// Up to `pool_merge_rounds` rounds of pool-side consolidation, stopping
    /// early once the Gateway reports nothing left. Returns the rounds that
    /// broadcast.
    async fn consolidate_pool(&self, holder: HolderId) -> u32 {
        let address = &self.pair.funding.address;
        let rounds = self.config.pool_merge_rounds;
        let mut merged = 0;
        for round in 1..=rounds {
            let lease = match self
                .deps
                .pool
                .select_live(address, self.config.network_fee, holder)
                .await
            {
                Ok(lease) => lease,
                Err(e) => {
                    warn!(round, error = %e, "cannot fund pool consolidation");
                    break;
                }
            };
            match self
                .deps
                .gateway
                .consolidate_pool(&self.pair.pair, &self.pair.funding.signer, lease.inputs())
                .await
            {
                Ok(Some(tx)) => {
                    self.deps.pool.consume(lease, &PaymentReceipt::new(tx.clone()));
                    merged += 1;
                    debug!(round, tx = %tx, "pool consolidation round");
                    if round < rounds {
                        tokio::time::sleep(self.config.inter_step_delay()).await;
                    }
                }
                Ok(None) => {
                    self.deps.pool.release(lease);
                    break;
                }
                Err(e) => {
                    self.deps.pool.release(lease);
                    warn!(round, error = %e, "pool consolidation failed");
                    break;
                }
            }
        }
        merged
    }

    /// Catalogue the change of a transaction whose outputs the Gateway
    /// did not report.
    async fn file_change(&self, tx: &TxId) {
        let address = &self.pair.funding.address;
        if let Err(e) = self.deps.pool.mark_aggregate_fee(address, tx).await {
            warn!(tx = %tx, error = %e, "could not catalogue transaction change");
        }
    }

    // -----------------------------------------------------------------
    // Distribution
    // -----------------------------------------------------------------

    /// Buy side: one token transfer per order, capped at the token balance.
    async fn distribute_tokens(
        &self,
        orders: &[PendingOrder],
        proceeds: u64,
        record: TradeRecordId,
        holder: HolderId,
    ) -> Result<u64> {
        let available = self
            .deps
            .gateway
            .fetch_balance(&self.pair.token_asset, &self.pair.funding.address)
            .await
            .map_err(distribution_failed)?;
        if available < proceeds {
            warn!(available, proceeds, "token balance below proceeds; payouts capped");
        }
        let payouts = self.behavior.distribute(orders, proceeds, available);

        let mut distributed = 0;
        for (order, payout) in orders.iter().zip(payouts) {
            if payout == 0 {
                warn!(correlation = %order.correlation_id, "nothing left to pay this order");
                continue;
            }
            let recipient = vec![Recipient::new(order.address.clone(), payout)];
            let tx = self
                .transfer_tokens(recipient, holder)
                .await
                .map_err(|e| PoolbatchError::DistributionFailed {
                    reason: format!("paying {}: {e}", order.correlation_id),
                })?;
            distributed += payout;
            info!(correlation = %order.correlation_id, payout, tx = %tx, "order paid");
            self.update_record(record, fill_update(vec![fill(order, payout, &tx)]))
                .await;
            tokio::time::sleep(self.config.inter_step_delay()).await;
        }
        Ok(distributed)
    }

    /// Sell side: one native payment to every order, net of the trade fee
    /// and capped at the spendable balance.
    async fn distribute_native(
        &self,
        orders: &[PendingOrder],
        proceeds: u64,
        record: TradeRecordId,
        holder: HolderId,
    ) -> Result<u64> {
        let balance = self
            .deps
            .gateway
            .fetch_balance(&Asset::native(), &self.pair.funding.address)
            .await
            .map_err(distribution_failed)?;
        let available = balance.saturating_sub(self.config.network_fee);
        if available < proceeds {
            warn!(available, proceeds, "native balance below proceeds; payouts capped");
        }
        let payouts = self.behavior.distribute(orders, proceeds, available);

        let paid: Vec<(&PendingOrder, u64)> = orders
            .iter()
            .zip(payouts)
            .filter(|(_, payout)| *payout > 0)
            .collect();
        if paid.is_empty() {
            warn!("nothing left to pay this batch");
            return Ok(0);
        }
        let recipients = paid
            .iter()
            .map(|(order, payout)| Recipient::new(order.address.clone(), *payout))
            .collect();
        let tx = self
            .pay_native(recipients, holder)
            .await
            .map_err(distribution_failed)?;

        let fills: Vec<OrderFill> = paid.iter().map(|(o, p)| fill(o, *p, &tx)).collect();
        let distributed: u64 = fills.iter().map(|f| f.payout).sum();
        info!(tx = %tx, orders = fills.len(), distributed, "batch paid");
        self.update_record(record, fill_update(fills)).await;
        tokio::time::sleep(self.config.inter_step_delay()).await;
        Ok(distributed)
    }

    // -----------------------------------------------------------------
    // Funded payments
    // -----------------------------------------------------------------

    async fn pay_native(&self, recipients: Vec<Recipient>, holder: HolderId) -> Result<TxId> {
        let address = &self.pair.funding.address;
        let total: u64 = recipients.iter().map(|r| r.amount).sum();
        let lease = self
            .deps
            .pool
            .select_live(address, total.saturating_add(self.config.network_fee), holder)
            .await?;
        let request = PaymentRequest {
            signer: self.pair.funding.signer.clone(),
            inputs: lease.inputs(),
            recipients,
            change_address: address.clone(),
        };
        match self.deps.gateway.build_and_broadcast_payment(request).await {
            Ok(receipt) => {
                let tx = receipt.tx_id.clone();
                self.deps.pool.consume(lease, &receipt);
                Ok(tx)
            }
            Err(e) => {
                self.deps.pool.release(lease);
                Err(e)
            }
        }
    }

    async fn transfer_tokens(&self, recipients: Vec<Recipient>, holder: HolderId) -> Result<TxId> {
        let lease = self.fee_input(holder).await?;
        let transfer = TokenTransfer {
            asset: self.pair.token_asset.clone(),
            signer: self.pair.funding.signer.clone(),
            sender: self.pair.funding.address.clone(),
            recipients,
            fee_inputs: lease.inputs(),
        };
        match self.deps.gateway.transfer_token(transfer).await {
            Ok(receipt) => {
                let tx = receipt.tx_id.clone();
                self.deps.pool.consume(lease, &receipt);
                Ok(tx)
            }
            Err(e) => {
                self.deps.pool.release(lease);
                Err(e)
            }
        }
    }

    /// One transfer-fee output, or live resources worth as much when the
    /// bucket is empty.
    async fn fee_input(&self, holder: HolderId) -> Result<Lease> {
        let address = &self.pair.funding.address;
        match self
            .deps
            .pool
            .select_count(address, Bucket::TransferFee, 1, holder)
        {
            Ok(lease) => Ok(lease),
            Err(PoolbatchError::InsufficientResources { .. }) => {
                debug!(address = %address, "no transfer-fee output free; using live resources");
                self.deps
                    .pool
                    .select_live(address, self.config.transfer_fee_amount, holder)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    // =================================================================
    // Loop and queries
    // =================================================================

    /// Tick every `tick_period` until `shutdown` turns `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.tick_period().max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(pair = %self.pair.pair, period_ms = self.config.tick_period_ms, "aggregator started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(TickOutcome::Idle) => {}
                        Ok(outcome) => info!(pair = %self.pair.pair, ?outcome, "tick done"),
                        Err(e) if e.is_fatal() => {
                            error!(pair = %self.pair.pair, error = %e, "batch needs reconciliation");
                        }
                        Err(e) => error!(pair = %self.pair.pair, error = %e, "tick failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(pair = %self.pair.pair, "aggregator stopping");
    }

    /// Run the tick loop on its own task.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// OHLC candles of this pair's recorded batch prices.
    pub async fn price_history(
        &self,
        interval: chrono::Duration,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let observations = self
            .deps
            .ledger
            .price_observations(&self.pair.pair, from, to)
            .await?;
        candles(&observations, interval, to)
    }

    /// The trade that carried the order with this correlation id.
    pub async fn find_trade(&self, correlation: &CorrelationId) -> Result<Option<TradeRecord>> {
        self.deps.ledger.find_by_correlation(correlation).await
    }
}

fn distribution_failed(e: PoolbatchError) -> PoolbatchError {
    PoolbatchError::DistributionFailed {
        reason: e.to_string(),
    }
}

fn fill(order: &PendingOrder, payout: u64, tx: &TxId) -> OrderFill {
    OrderFill {
        correlation_id: order.correlation_id.clone(),
        payout,
        payout_tx: tx.clone(),
    }
}

fn fill_update(fills: Vec<OrderFill>) -> TradeUpdate {
    TradeUpdate {
        fills,
        ..TradeUpdate::default()
    }
}

#[cfg(test)]
mod tests {
    use poolbatch_resources::{MemoryLockStore, ResourceCatalogue};
    use poolbatch_types::testkit::{FakeGateway, MemoryLedger, RecordingNotifier};
    use poolbatch_types::{
        Address, ContractVersion, FeeSchedule, FundingAccount, Reserves, ResourcePoolConfig,
    };
    use rust_decimal::Decimal;

    use super::*;
    use crate::behavior_for;

    fn pair_config(trade_fee: u64) -> PairConfig {
        PairConfig {
            pair: PairId::new("pool-1"),
            contract_version: ContractVersion::V2,
            funding: FundingAccount::new("fund-1", "key-1"),
            token_asset: Asset::new("token-a"),
            token_decimals: 6,
            lp_plan: 1,
            fees: FeeSchedule {
                fee_factor: 1000,
                service_fee: 1,
                lp_fee: 2,
                trade_fee,
            },
        }
    }

    fn aggregator(trade_fee: u64) -> (PairAggregator, Arc<FakeGateway>, Arc<MemoryLedger>) {
        let gateway = Arc::new(FakeGateway::new());
        let ledger = Arc::new(MemoryLedger::default());
        let pool = Arc::new(ResourcePool::new(
            ResourcePoolConfig::instant(),
            gateway.clone(),
            Arc::new(MemoryLockStore::new(chrono::Duration::seconds(300))),
            Arc::new(ResourceCatalogue::new()),
            Arc::new(RecordingNotifier::default()),
        ));
        let cfg = pair_config(trade_fee);
        gateway.set_reserves(&cfg.pair, Reserves::new(1_000_000, 2_000_000));
        let behavior = behavior_for(cfg.contract_version, cfg.fees);
        let deps = AggregatorDeps {
            gateway: gateway.clone(),
            ledger: ledger.clone(),
            pool,
        };
        (
            PairAggregator::new(cfg, behavior, deps, AggregatorConfig::instant()),
            gateway,
            ledger,
        )
    }

    fn request(side: Side, amount: u64) -> SwapRequest {
        SwapRequest {
            correlation_id: CorrelationId::new(format!("hash-{amount}")),
            side,
            address: Address::new("client"),
            amount,
            slippage_percent: Decimal::ONE,
        }
    }

    #[tokio::test]
    async fn buy_tender_is_net_of_trade_fee() {
        let (agg, _, _) = aggregator(10);
        let order = agg.submit_swap(request(Side::Buy, 10_000)).await.unwrap();
        assert_eq!(order.tendered, 9_900);
        assert_eq!(
            order.quote_at_submission,
            agg.get_quote(Side::Buy, 10_000).await.unwrap()
        );
        assert_eq!(agg.pending_len(Side::Buy), 1);
        assert_eq!(agg.phase(), BatchPhase::Collecting);
    }

    #[tokio::test]
    async fn sell_tender_is_kept_whole() {
        let (agg, _, _) = aggregator(10);
        let order = agg.submit_swap(request(Side::Sell, 20_000)).await.unwrap();
        assert_eq!(order.tendered, 20_000);
        assert_eq!(order.quote_at_submission, 9_872);
    }

    #[tokio::test]
    async fn invalid_requests_are_not_queued() {
        let (agg, _, _) = aggregator(0);
        let mut bad = request(Side::Buy, 0);
        assert!(agg.submit_swap(bad.clone()).await.is_err());
        bad.amount = 10;
        bad.slippage_percent = Decimal::new(-1, 0);
        assert!(agg.submit_swap(bad).await.is_err());
        assert_eq!(agg.pending_len(Side::Buy), 0);
        assert_eq!(agg.phase(), BatchPhase::Idle);
    }

    #[tokio::test]
    async fn request_quoted_nothing_is_rejected() {
        let (agg, _, _) = aggregator(0);
        assert_eq!(agg.get_quote(Side::Sell, 1).await.unwrap(), 0);
        let err = agg.submit_swap(request(Side::Sell, 1)).await.unwrap_err();
        assert!(matches!(err, PoolbatchError::InvalidOrder { .. }));
        assert_eq!(agg.pending_len(Side::Sell), 0);
    }

    #[tokio::test]
    async fn empty_book_ticks_idle() {
        let (agg, gateway, _) = aggregator(0);
        assert_eq!(agg.tick().await.unwrap(), TickOutcome::Idle);
        assert!(gateway.settlements().is_empty());
    }

    #[tokio::test]
    async fn quote_failure_requeues_the_batch() {
        let (agg, gateway, _) = aggregator(0);
        agg.submit(PendingOrder::dummy(Side::Buy, 10_000, 19_744, Decimal::ONE))
            .unwrap();
        gateway.set_reserves(agg.pair(), Reserves::new(0, 0));
        assert!(matches!(agg.tick().await, Err(PoolbatchError::EmptyReserves)));
        assert_eq!(agg.pending_len(Side::Buy), 1);
        assert_eq!(agg.phase(), BatchPhase::Collecting);
    }

    #[tokio::test]
    async fn ledger_failure_before_settlement_requeues() {
        let (agg, gateway, ledger) = aggregator(0);
        agg.submit(PendingOrder::dummy(Side::Buy, 10_000, 19_744, Decimal::ONE))
            .unwrap();
        ledger.fail_writes(true);
        let err = agg.tick().await.unwrap_err();
        assert!(matches!(err, PoolbatchError::ExternalService { service: "ledger", .. }));
        assert!(gateway.settlements().is_empty());
        assert_eq!(agg.pending_len(Side::Buy), 1);
    }

    #[tokio::test]
    async fn price_history_reads_recorded_batches() {
        let (agg, gateway, ledger) = aggregator(0);
        let address = agg.pair_config().funding.address.clone();
        gateway.fund(&address, &[5_000_000]);
        gateway.set_balance(&agg.pair_config().token_asset, &address, 1_000_000);
        agg.submit(PendingOrder::dummy(Side::Buy, 10_000, 19_744, Decimal::ONE))
            .unwrap();
        agg.tick().await.unwrap();

        let observations = ledger.observations();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].kind, Side::Buy);
        assert_eq!(observations[0].base_amount, 10_000);
        assert_eq!(observations[0].quote_amount, 19_744);

        let now = Utc::now();
        let history = agg
            .price_history(
                chrono::Duration::minutes(1),
                now - chrono::Duration::hours(1),
                now + chrono::Duration::seconds(1),
            )
            .await
            .unwrap();
        assert!(!history.is_empty());
        assert_eq!(history.last().unwrap().close, observations[0].price);
    }
}
