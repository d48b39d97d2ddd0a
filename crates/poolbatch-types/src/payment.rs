//! Request / receipt shapes exchanged with the Gateway.
//!
//! The Gateway builds, signs and broadcasts transactions. These structs are
//! the only view the core has of a transaction.

use serde::{Deserialize, Serialize};

use crate::{Address, Asset, ContractVersion, KeyRef, PairId, Resource, Side, TxId};

/// One payment output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: Address,
    pub amount: u64,
}

impl Recipient {
    #[must_use]
    pub fn new(address: Address, amount: u64) -> Self {
        Self { address, amount }
    }
}

/// A native-coin payment funded by explicit inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub signer: KeyRef,
    pub inputs: Vec<Resource>,
    pub recipients: Vec<Recipient>,
    pub change_address: Address,
}

impl PaymentRequest {
    #[must_use]
    pub fn total_out(&self) -> u64 {
        self.recipients.iter().map(|r| r.amount).sum()
    }
}

/// Result of a broadcast: the tx id plus every output the transaction
/// created for our own addresses (recipients we own and change).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub tx_id: TxId,
    pub outputs: Vec<Resource>,
}

impl PaymentReceipt {
    #[must_use]
    pub fn new(tx_id: TxId) -> Self {
        Self {
            tx_id,
            outputs: Vec::new(),
        }
    }
}

/// A swap against the pool contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub pair: PairId,
    pub version: ContractVersion,
    pub side: Side,
    pub signer: KeyRef,
    pub address: Address,
    /// Aggregate tendered amount, in the tendered asset's minor units.
    pub amount_in: u64,
    /// Native inputs leased to fund the swap (amount and/or network fee).
    pub funding: Vec<Resource>,
    pub lp_plan: u32,
}

/// A token transfer to one or more recipients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub asset: Asset,
    pub signer: KeyRef,
    pub sender: Address,
    pub recipients: Vec<Recipient>,
    /// Native inputs paying the transfer's network fee.
    pub fee_inputs: Vec<Resource>,
}

impl TokenTransfer {
    #[must_use]
    pub fn total_out(&self) -> u64 {
        self.recipients.iter().map(|r| r.amount).sum()
    }
}
