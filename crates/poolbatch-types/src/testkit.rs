//! In-memory collaborators for tests.
//!
//! [`FakeGateway`] keeps a tiny chain model (unspent resources per address,
//! token balances, pool reserves) so payments, merges and settlements
//! change what later discovery calls observe. Failures are scripted.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ports::{Gateway, Ledger, Notifier};
use crate::{
    Address, Asset, CorrelationId, KeyRef, PairId, PaymentReceipt, PaymentRequest,
    PoolbatchError, PriceObservation, Recipient, Reserves, Resource, ResourceId, Result,
    SettlementRequest, Side, TokenTransfer, TradeRecord, TradeRecordId, TradeUpdate, TxId,
    constants, total_amount,
};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// FakeGateway
// ---------------------------------------------------------------------------

/// Scripted result of the next settlement broadcast.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// Broadcast succeeds.
    Broadcast,
    /// The Gateway returns an empty result.
    Empty,
    /// The Gateway raises this error.
    Fail(PoolbatchError),
}

#[derive(Default)]
struct Chain {
    reserves: HashMap<PairId, Reserves>,
    unspent: HashMap<Address, Vec<Resource>>,
    owned: HashSet<Address>,
    balances: HashMap<(Asset, Address), u64>,
    settlement_script: VecDeque<SettlementOutcome>,
    payment_failures: VecDeque<PoolbatchError>,
    fetch_failures: u32,
    pool_merge_rounds: u32,
    payments: Vec<PaymentRequest>,
    settlements: Vec<SettlementRequest>,
    transfers: Vec<TokenTransfer>,
    consolidations: u32,
}

impl Chain {
    fn spend(&mut self, inputs: &[Resource]) {
        for input in inputs {
            if let Some(list) = self.unspent.get_mut(&input.address) {
                list.retain(|r| r.id != input.id);
            }
        }
    }

    fn create(&mut self, tx: &TxId, index: u32, address: &Address, amount: u64) -> Resource {
        let resource = Resource {
            id: ResourceId {
                tx_id: tx.clone(),
                output_index: index,
            },
            amount,
            payload: format!("script:{tx}:{index}"),
            address: address.clone(),
        };
        self.unspent
            .entry(address.clone())
            .or_default()
            .push(resource.clone());
        resource
    }
}

/// In-memory Gateway.
pub struct FakeGateway {
    fee: u64,
    chain: Mutex<Chain>,
    tx_counter: AtomicU64,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGateway {
    /// A gateway charging the default network fee per transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fee(constants::DEFAULT_NETWORK_FEE)
    }

    #[must_use]
    pub fn with_fee(fee: u64) -> Self {
        Self {
            fee,
            chain: Mutex::new(Chain::default()),
            tx_counter: AtomicU64::new(1),
        }
    }

    fn next_tx(&self, prefix: &str) -> TxId {
        let n = self.tx_counter.fetch_add(1, Ordering::Relaxed);
        TxId(format!("{prefix}-{n:04}"))
    }

    pub fn set_reserves(&self, pair: &PairId, reserves: Reserves) {
        guard(&self.chain).reserves.insert(pair.clone(), reserves);
    }

    /// Put a resource on chain, owned by one of our addresses.
    pub fn add_resource(&self, resource: Resource) {
        let mut chain = guard(&self.chain);
        chain.owned.insert(resource.address.clone());
        chain
            .unspent
            .entry(resource.address.clone())
            .or_default()
            .push(resource);
    }

    /// Put `amounts.len()` fresh resources on chain for `address`.
    pub fn fund(&self, address: &Address, amounts: &[u64]) -> Vec<Resource> {
        let tx = self.next_tx("fund");
        let resources: Vec<Resource> = amounts
            .iter()
            .zip(0u32..)
            .map(|(amount, i)| Resource::dummy(address, tx.as_str(), i, *amount))
            .collect();
        for r in &resources {
            self.add_resource(r.clone());
        }
        resources
    }

    pub fn set_balance(&self, asset: &Asset, address: &Address, amount: u64) {
        guard(&self.chain)
            .balances
            .insert((asset.clone(), address.clone()), amount);
    }

    pub fn script_settlement(&self, outcome: SettlementOutcome) {
        guard(&self.chain).settlement_script.push_back(outcome);
    }

    pub fn fail_next_payment(&self, error: PoolbatchError) {
        guard(&self.chain).payment_failures.push_back(error);
    }

    /// Make the next `n` discovery calls fail.
    pub fn fail_fetches(&self, n: u32) {
        guard(&self.chain).fetch_failures = n;
    }

    /// Number of pool consolidation rounds that will report progress.
    pub fn set_pool_merge_rounds(&self, rounds: u32) {
        guard(&self.chain).pool_merge_rounds = rounds;
    }

    #[must_use]
    pub fn payments(&self) -> Vec<PaymentRequest> {
        guard(&self.chain).payments.clone()
    }

    #[must_use]
    pub fn settlements(&self) -> Vec<SettlementRequest> {
        guard(&self.chain).settlements.clone()
    }

    #[must_use]
    pub fn transfers(&self) -> Vec<TokenTransfer> {
        guard(&self.chain).transfers.clone()
    }

    #[must_use]
    pub fn consolidations(&self) -> u32 {
        guard(&self.chain).consolidations
    }

    #[must_use]
    pub fn unspent(&self, address: &Address) -> Vec<Resource> {
        guard(&self.chain)
            .unspent
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn balance(&self, asset: &Asset, address: &Address) -> u64 {
        guard(&self.chain)
            .balances
            .get(&(asset.clone(), address.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn pay(
        &self,
        chain: &mut Chain,
        tx: &TxId,
        inputs: &[Resource],
        recipients: &[Recipient],
        native_out: u64,
        change_address: &Address,
    ) -> Result<Vec<Resource>> {
        let total_in = total_amount(inputs);
        let needed = native_out + self.fee;
        if total_in < needed {
            return Err(PoolbatchError::InsufficientFunding {
                reason: format!("inputs {total_in} < outputs + fee {needed}"),
            });
        }
        chain.spend(inputs);
        let mut ours = Vec::new();
        let mut index = 0u32;
        for recipient in recipients {
            let out = chain.create(tx, index, &recipient.address, recipient.amount);
            if chain.owned.contains(&recipient.address) {
                ours.push(out);
            }
            index += 1;
        }
        let change = total_in - needed;
        if change > 0 {
            chain.owned.insert(change_address.clone());
            ours.push(chain.create(tx, index, change_address, change));
        }
        Ok(ours)
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn fetch_reserves(&self, pair: &PairId) -> Result<Reserves> {
        guard(&self.chain)
            .reserves
            .get(pair)
            .copied()
            .ok_or_else(|| PoolbatchError::gateway(format!("no pool {pair}")))
    }

    async fn fetch_spendable_resources(&self, address: &Address) -> Result<Vec<Resource>> {
        let mut chain = guard(&self.chain);
        if chain.fetch_failures > 0 {
            chain.fetch_failures -= 1;
            return Err(PoolbatchError::gateway("discovery unavailable"));
        }
        Ok(chain.unspent.get(address).cloned().unwrap_or_default())
    }

    async fn fetch_balance(&self, asset: &Asset, address: &Address) -> Result<u64> {
        let chain = guard(&self.chain);
        if asset.is_native() {
            return Ok(chain
                .unspent
                .get(address)
                .map_or(0, |list| total_amount(list)));
        }
        Ok(chain
            .balances
            .get(&(asset.clone(), address.clone()))
            .copied()
            .unwrap_or(0))
    }

    async fn build_and_broadcast_payment(&self, request: PaymentRequest) -> Result<PaymentReceipt> {
        let mut chain = guard(&self.chain);
        chain.payments.push(request.clone());
        if let Some(err) = chain.payment_failures.pop_front() {
            return Err(err);
        }
        let tx = self.next_tx("pay");
        let outputs = self.pay(
            &mut chain,
            &tx,
            &request.inputs,
            &request.recipients,
            request.total_out(),
            &request.change_address,
        )?;
        Ok(PaymentReceipt { tx_id: tx, outputs })
    }

    async fn build_and_broadcast_settlement(
        &self,
        request: SettlementRequest,
    ) -> Result<Option<TxId>> {
        let mut chain = guard(&self.chain);
        chain.settlements.push(request.clone());
        match chain
            .settlement_script
            .pop_front()
            .unwrap_or(SettlementOutcome::Broadcast)
        {
            SettlementOutcome::Empty => return Ok(None),
            SettlementOutcome::Fail(err) => return Err(err),
            SettlementOutcome::Broadcast => {}
        }
        let tx = self.next_tx("swap");
        let native_in = match request.side {
            Side::Buy => request.amount_in,
            Side::Sell => 0,
        };
        self.pay(&mut chain, &tx, &request.funding, &[], native_in, &request.address)?;
        Ok(Some(tx))
    }

    async fn consolidate_pool(
        &self,
        _pair: &PairId,
        _signer: &KeyRef,
        _funding: Vec<Resource>,
    ) -> Result<Option<TxId>> {
        let mut chain = guard(&self.chain);
        chain.consolidations += 1;
        if chain.pool_merge_rounds == 0 {
            return Ok(None);
        }
        chain.pool_merge_rounds -= 1;
        Ok(Some(self.next_tx("poolmerge")))
    }

    async fn transfer_token(&self, transfer: TokenTransfer) -> Result<PaymentReceipt> {
        let mut chain = guard(&self.chain);
        chain.transfers.push(transfer.clone());
        let key = (transfer.asset.clone(), transfer.sender.clone());
        let held = chain.balances.get(&key).copied().unwrap_or(0);
        let total = transfer.total_out();
        if held < total {
            return Err(PoolbatchError::InsufficientFunding {
                reason: format!("token balance {held} < {total}"),
            });
        }
        let tx = self.next_tx("token");
        let outputs = self.pay(
            &mut chain,
            &tx,
            &transfer.fee_inputs,
            &[],
            0,
            &transfer.sender,
        )?;
        chain.balances.insert(key, held - total);
        for r in &transfer.recipients {
            *chain
                .balances
                .entry((transfer.asset.clone(), r.address.clone()))
                .or_insert(0) += r.amount;
        }
        Ok(PaymentReceipt { tx_id: tx, outputs })
    }
}

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

/// In-memory Ledger.
#[derive(Default)]
pub struct MemoryLedger {
    observations: Mutex<Vec<PriceObservation>>,
    records: Mutex<Vec<TradeRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryLedger {
    /// Make every subsequent write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(PoolbatchError::ledger("writes disabled"));
        }
        Ok(())
    }

    #[must_use]
    pub fn observations(&self) -> Vec<PriceObservation> {
        guard(&self.observations).clone()
    }

    #[must_use]
    pub fn records(&self) -> Vec<TradeRecord> {
        guard(&self.records).clone()
    }

    #[must_use]
    pub fn record(&self, id: TradeRecordId) -> Option<TradeRecord> {
        guard(&self.records).iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn record_price_observation(&self, observation: PriceObservation) -> Result<()> {
        self.check_writable()?;
        guard(&self.observations).push(observation);
        Ok(())
    }

    async fn create_trade_record(&self, record: TradeRecord) -> Result<()> {
        self.check_writable()?;
        let mut records = guard(&self.records);
        records.retain(|r| r.id != record.id);
        records.push(record);
        Ok(())
    }

    async fn update_trade_record(&self, id: TradeRecordId, update: TradeUpdate) -> Result<()> {
        self.check_writable()?;
        let mut records = guard(&self.records);
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| PoolbatchError::ledger(format!("unknown trade record {id}")))?;
        record.apply(&update);
        Ok(())
    }

    async fn find_by_correlation(&self, id: &CorrelationId) -> Result<Option<TradeRecord>> {
        Ok(guard(&self.records)
            .iter()
            .find(|r| r.lines.iter().any(|l| &l.correlation_id == id))
            .cloned())
    }

    async fn price_observations(
        &self,
        pair: &PairId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PriceObservation>> {
        let mut out: Vec<PriceObservation> = guard(&self.observations)
            .iter()
            .filter(|o| &o.pair == pair && o.observed_at >= from && o.observed_at < to)
            .cloned()
            .collect();
        out.sort_by_key(|o| o.observed_at);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notifier that records every alert.
#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    /// A notifier whose every delivery fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    #[must_use]
    pub fn alerts(&self) -> Vec<(String, String)> {
        guard(&self.alerts).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_alert(&self, subject: &str, body: &str) -> Result<()> {
        if self.fail {
            return Err(PoolbatchError::Notification {
                reason: "smtp down".to_string(),
            });
        }
        guard(&self.alerts).push((subject.to_string(), body.to_string()));
        Ok(())
    }
}
