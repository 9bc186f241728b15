//! Transaction data model.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::hex;
use alloy::primitives::{keccak256, Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::chain::{ChainFamily, Payload};
use crate::error::StateError;
use crate::keys::WalletId;
use crate::units::FeeSpec;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Draft,
    Unsigned,
    Signed,
    Sent,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Draft => "draft",
            TxStatus::Unsigned => "unsigned",
            TxStatus::Signed => "signed",
            TxStatus::Sent => "sent",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }

    /// States that carry a signed wire encoding.
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            TxStatus::Signed | TxStatus::Sent | TxStatus::Confirmed | TxStatus::Failed
        )
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content-derived transaction identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum TxIdentifier {
    /// Six hex digit checksum of the canonical unsigned payload.
    Draft(String),
    /// Hash of the signed wire encoding, as the chain reports it.
    Coin(String),
}

impl TxIdentifier {
    /// Checksum identifier for unsigned payload bytes.
    pub fn checksum(unsigned: &[u8]) -> Self {
        let digest = keccak256(unsigned);
        TxIdentifier::Draft(hex::encode_upper(&digest[..3]))
    }

    pub fn as_str(&self) -> &str {
        match self {
            TxIdentifier::Draft(s) | TxIdentifier::Coin(s) => s,
        }
    }
}

impl fmt::Display for TxIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Previous-output coordinates for UTXO spends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendRef {
    pub txid: String,
    pub vout: u32,
    /// Hex script of the output being spent; derived from the address when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_pubkey: Option<String>,
}

/// A funding source. For account chains, the single spending account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub address: String,
    pub amount: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<WalletId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spend: Option<SpendRef>,
}

impl Input {
    pub fn new(address: impl Into<String>, amount: U256) -> Self {
        Self {
            address: address.into(),
            amount,
            wallet_id: None,
            spend: None,
        }
    }

    pub fn with_wallet_id(mut self, id: WalletId) -> Self {
        self.wallet_id = Some(id);
        self
    }

    pub fn with_spend(mut self, txid: impl Into<String>, vout: u32) -> Self {
        self.spend = Some(SpendRef {
            txid: txid.into(),
            vout,
            script_pubkey: None,
        });
        self
    }
}

/// A payment destination. An empty address means contract creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub address: String,
    pub amount: U256,
    #[serde(default)]
    pub is_change: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<WalletId>,
}

impl Output {
    pub fn new(address: impl Into<String>, amount: U256) -> Self {
        Self {
            address: address.into(),
            amount,
            is_change: false,
            wallet_id: None,
        }
    }

    pub fn change(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            amount: U256::ZERO,
            is_change: true,
            wallet_id: None,
        }
    }

    pub fn with_wallet_id(mut self, id: WalletId) -> Self {
        self.wallet_id = Some(id);
        self
    }
}

/// Opaque contract payload carried by an account-model transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallSpec {
    #[default]
    None,
    /// User-supplied call data. An empty recipient makes it a contract creation.
    Data { data: Bytes },
    /// ERC-20 transfer of the output amount to the output address.
    Token { contract: Address, decimals: u8 },
}

/// Wall-clock bookkeeping, seconds since the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_block: Option<u64>,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Link from a fee-bump draft back to the transaction it replaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub original: String,
    pub original_fee: U256,
    pub minimum_fee: U256,
    /// Sequence number carried over from the original payload, never refetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

/// Contract execution outcome, for chains that report one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    Succeeded,
    Failed,
}

impl Execution {
    pub fn from_status(succeeded: bool) -> Self {
        if succeeded {
            Execution::Succeeded
        } else {
            Execution::Failed
        }
    }
}

/// The central aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<TxIdentifier>,
    pub family: ChainFamily,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    /// Absolute fee in base units.
    pub fee: U256,
    pub fee_spec: FeeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_rate: Option<U256>,
    #[serde(default)]
    pub call: CallSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed: Option<Bytes>,
    pub status: TxStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub timestamps: Timestamps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<Replacement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_contract: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
}

impl Transaction {
    pub(crate) fn draft(
        family: ChainFamily,
        inputs: Vec<Input>,
        outputs: Vec<Output>,
        fee_spec: FeeSpec,
    ) -> Self {
        Self {
            identifier: None,
            family,
            inputs,
            outputs,
            fee: U256::ZERO,
            fee_spec,
            fee_rate: None,
            call: CallSpec::None,
            payload: None,
            signed: None,
            status: TxStatus::Draft,
            comment: None,
            timestamps: Timestamps {
                created: unix_now(),
                ..Timestamps::default()
            },
            replaces: None,
            created_contract: None,
            execution: None,
        }
    }

    /// Attach contract data or a token transfer. Only meaningful on a draft.
    pub fn with_call(mut self, call: CallSpec) -> Self {
        self.call = call;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Identifier as a string, empty for drafts.
    pub fn id(&self) -> &str {
        self.identifier.as_ref().map(TxIdentifier::as_str).unwrap_or("")
    }

    pub fn payload(&self) -> Result<&Payload, StateError> {
        self.payload.as_ref().ok_or(StateError::Missing("payload"))
    }

    pub fn signed_bytes(&self) -> Result<&[u8], StateError> {
        self.signed
            .as_ref()
            .map(|b| b.as_ref())
            .ok_or(StateError::Missing("signed data"))
    }

    pub fn input_total(&self) -> U256 {
        self.inputs.iter().fold(U256::ZERO, |acc, i| acc + i.amount)
    }

    pub fn output_total(&self) -> U256 {
        self.outputs.iter().fold(U256::ZERO, |acc, o| acc + o.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_identifier() {
        let id = TxIdentifier::checksum(b"{\"from\":\"a\"}");
        assert_eq!(id.as_str().len(), 6);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(id, TxIdentifier::checksum(b"{\"from\":\"a\"}"));
        assert_ne!(id, TxIdentifier::checksum(b"{\"from\":\"b\"}"));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TxStatus::Unsigned.to_string(), "unsigned");
        assert!(TxStatus::Sent.is_signed());
        assert!(!TxStatus::Draft.is_signed());
    }

    #[test]
    fn test_draft_defaults() {
        let tx = Transaction::draft(
            ChainFamily::Account,
            vec![Input::new("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266", U256::from(100u64))],
            vec![Output::new("0x70997970C51812dc3A010C7d01b50e0d17dc79C8", U256::from(10u64))],
            FeeSpec::Network,
        )
        .with_comment("rent");
        assert_eq!(tx.status, TxStatus::Draft);
        assert_eq!(tx.id(), "");
        assert!(tx.payload().is_err());
        assert!(tx.timestamps.created > 0);
        assert_eq!(tx.comment.as_deref(), Some("rent"));
    }

    #[test]
    fn test_record_serde() {
        let tx = Transaction::draft(
            ChainFamily::Utxo,
            vec![Input::new("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH", U256::from(5_000u64))
                .with_spend("aa".repeat(32), 1)],
            vec![Output::change("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH")],
            FeeSpec::Rate(U256::from(2u64)),
        );
        let json = serde_json::to_string(&tx).unwrap();
        let decoded: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, tx);
    }
}
