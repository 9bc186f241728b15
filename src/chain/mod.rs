//! Chain adapters.
//!
//! # Data Flow
//! ```text
//! Transaction (draft)
//!     → check_structure / estimate_work
//!     → materialize (nonce, chain ID, change) → Payload
//!     → serialize_unsigned → checksum identifier
//!     → sign (KeyRing) → SignedForm (wire bytes + coin txid)
//!     → parse_signed / reconcile on reopen
//! ```
//!
//! # Design Decisions
//! - One trait, two implementations: `account` (alloy legacy transactions)
//!   and `utxo` (bitcoin P2PKH)
//! - Payloads are a typed enum, one variant per family
//! - Only `materialize` touches the network; everything else is pure

pub mod account;
pub mod token;
pub mod utxo;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{IntegrityError, TxResult, ValidationError};
use crate::keys::{KeyRing, KeyResult, SecretKey};
use crate::rpc::NetworkRpc;
use crate::tx::types::{CallSpec, Output, Transaction};
use crate::units::{FeeQuote, WorkEstimate};

pub use account::{AccountAdapter, AccountPayload, TokenMeta};
pub use utxo::{UtxoAdapter, UtxoInput, UtxoOutput, UtxoPayload};

/// Ledger model of the target chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    #[default]
    Account,
    Utxo,
}

impl std::fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainFamily::Account => f.write_str("account"),
            ChainFamily::Utxo => f.write_str("utxo"),
        }
    }
}

/// Chain-specific transaction content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum Payload {
    Account(AccountPayload),
    Utxo(UtxoPayload),
}

impl Payload {
    pub fn family(&self) -> ChainFamily {
        match self {
            Payload::Account(_) => ChainFamily::Account,
            Payload::Utxo(_) => ChainFamily::Utxo,
        }
    }

    /// Who pays whom, as the payload itself states it.
    pub fn view(&self) -> Result<PayloadView, IntegrityError> {
        match self {
            Payload::Account(p) => p.view(),
            Payload::Utxo(p) => Ok(p.view()),
        }
    }

    /// Contract call, token and data fields against the record's call.
    pub fn check_call(&self, call: &CallSpec) -> Result<(), IntegrityError> {
        match self {
            Payload::Account(p) => p.check_call(call),
            Payload::Utxo(_) if matches!(call, CallSpec::None) => Ok(()),
            Payload::Utxo(_) => Err(IntegrityError::PayloadMismatch("UTXO payload with a contract call".into())),
        }
    }
}

/// Spending addresses and recipients read from a payload.
///
/// Token transfers list the token recipient and token amount. An empty
/// recipient address is a contract creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadView {
    /// Address per input, with the amount where the payload carries one.
    pub senders: Vec<(String, Option<U256>)>,
    pub recipients: Vec<(String, U256)>,
}

/// Result of signing: wire bytes plus what the chain will call them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedForm {
    pub bytes: Vec<u8>,
    pub txid: String,
    /// Addresses recovered from the signatures, one per input.
    pub senders: Vec<String>,
    pub created_contract: Option<String>,
}

/// A signed encoding decoded back into a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSigned {
    pub payload: Payload,
    pub txid: String,
    pub senders: Vec<String>,
}

/// What `materialize` computed for a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub payload: Payload,
    /// Outputs with change amounts filled in.
    pub outputs: Vec<Output>,
    /// Fee the payload actually pays.
    pub fee: U256,
}

/// Address rules for one chain.
pub trait AddressDeriver: Send + Sync {
    /// Address controlled by `secret`, in canonical display form.
    fn derive_address(&self, secret: &SecretKey) -> KeyResult<String>;

    /// Whether two address strings name the same account.
    fn same_address(&self, a: &str, b: &str) -> bool;

    /// Validate an address and return its canonical form.
    fn parse_address(&self, address: &str) -> Result<String, ValidationError>;
}

/// Everything the lifecycle engine needs from a chain family.
#[async_trait]
pub trait ChainAdapter: AddressDeriver {
    fn family(&self) -> ChainFamily;

    /// Input/output shape rules, checked before any network access.
    fn check_structure(&self, tx: &Transaction) -> TxResult<()>;

    /// Resource estimate the fee rate applies to.
    fn estimate_work(&self, tx: &Transaction) -> WorkEstimate;

    /// Transactions whose cost cannot be bounded up front skip the fee ceiling.
    fn fee_check_exempt(&self, tx: &Transaction) -> bool;

    /// Build the payload, querying the network for sequence numbers where needed.
    async fn materialize(
        &self,
        tx: &Transaction,
        quote: &FeeQuote,
        rpc: &dyn NetworkRpc,
    ) -> TxResult<Materialized>;

    /// Canonical bytes the draft checksum is computed over.
    fn serialize_unsigned(&self, payload: &Payload) -> TxResult<Vec<u8>>;

    fn sign(&self, payload: &Payload, keys: &KeyRing) -> TxResult<SignedForm>;

    /// Chain-native identifier of a signed encoding.
    fn compute_txid(&self, signed: &[u8]) -> TxResult<String>;

    fn parse_signed(&self, signed: &[u8]) -> TxResult<ParsedSigned>;

    /// Merge a parsed payload with the record it was loaded from, filling in
    /// whatever the wire format does not carry. Fails if the two disagree.
    fn reconcile(&self, recorded: &Payload, parsed: Payload) -> TxResult<Payload>;

    fn is_replaceable(&self, payload: &Payload) -> bool;

    fn fee_of(&self, payload: &Payload) -> TxResult<U256>;

    /// Sequence values a replacement must reuse: (nonce, chain ID).
    fn pinned_sequence(&self, payload: &Payload) -> (Option<u64>, Option<u64>);

    fn chain_id_of(&self, payload: &Payload) -> Option<u64>;
}
