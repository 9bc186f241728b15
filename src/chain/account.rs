//! Account-model adapter (Ethereum-style legacy transactions).
//!
//! # Encoding
//! - Unsigned: canonical JSON of the payload fields, never RLP, so nothing
//!   unauthenticated goes through a binary decoder
//! - Signed: EIP-155 legacy transaction, EIP-2718 encoded
//!
//! # Security
//! - The sender is recovered from the signature and returned to the caller
//! - Chain ID is always embedded (replay protection)

use std::collections::BTreeMap;
use std::str::FromStr;

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::{Decodable2718, Encodable2718};
use alloy::hex;
use alloy::primitives::{keccak256, Address, Bytes, Signature, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::token::{decode_transfer, encode_transfer};
use crate::chain::{
    AddressDeriver, ChainAdapter, ChainFamily, Materialized, ParsedSigned, Payload, PayloadView, SignedForm,
};
use crate::error::{IntegrityError, TxResult, ValidationError};
use crate::keys::{KeyError, KeyResult, KeyRing, SecretKey};
use crate::rpc::NetworkRpc;
use crate::tx::types::{CallSpec, Transaction};
use crate::units::{fee_from_rate, FeeQuote, UnitError, WorkEstimate};

/// Gas for a plain value transfer.
pub const TRANSFER_GAS: u64 = 21_000;
/// Gas estimate for an ERC-20 transfer.
pub const TOKEN_GAS: u64 = 52_000;
/// Upper bound used for user-supplied contract data.
pub const CONTRACT_GAS: u64 = 500_000;

/// Token details kept alongside the payload; the chain itself only sees call data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMeta {
    pub decimals: u8,
}

/// Fields of an account-model transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPayload {
    pub from: Address,
    /// `None` creates a contract. For token transfers this is the token contract.
    #[serde(default)]
    pub to: Option<Address>,
    pub amount: U256,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub nonce: u64,
    pub chain_id: u64,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenMeta>,
}

impl AccountPayload {
    pub fn fee(&self) -> Result<U256, UnitError> {
        fee_from_rate(self.gas_price, self.gas_limit)
    }

    /// Address a contract-creating transaction will deploy to.
    pub fn created_contract(&self) -> Option<Address> {
        match self.to {
            None => Some(self.from.create(self.nonce)),
            Some(_) => None,
        }
    }

    /// Sender and recipient; a token transfer pays the recipient named in its call data.
    pub fn view(&self) -> Result<PayloadView, IntegrityError> {
        let recipients = match (self.token, self.to) {
            (Some(_), _) => {
                let (recipient, amount) = decode_transfer(&self.data)
                    .ok_or_else(|| IntegrityError::Malformed("token transfer data".into()))?;
                vec![(recipient.to_checksum(None), amount)]
            }
            (None, Some(to)) => vec![(to.to_checksum(None), self.amount)],
            (None, None) if self.amount.is_zero() => Vec::new(),
            (None, None) => vec![(String::new(), self.amount)],
        };
        Ok(PayloadView {
            senders: vec![(self.from.to_checksum(None), None)],
            recipients,
        })
    }

    pub fn check_call(&self, call: &CallSpec) -> Result<(), IntegrityError> {
        let consistent = match call {
            CallSpec::None => self.data.is_empty() && self.token.is_none(),
            CallSpec::Token { contract, decimals } => {
                self.to == Some(*contract) && self.token == Some(TokenMeta { decimals: *decimals })
            }
            CallSpec::Data { data } => self.token.is_none() && self.data == *data,
        };
        if consistent {
            Ok(())
        } else {
            Err(IntegrityError::PayloadMismatch("call data differs from the recorded call".into()))
        }
    }

    fn to_legacy(&self) -> TxResult<TxLegacy> {
        let gas_price = u128::try_from(self.gas_price).map_err(|_| UnitError::Overflow)?;
        Ok(TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price,
            gas_limit: self.gas_limit,
            to: match self.to {
                Some(addr) => TxKind::Call(addr),
                None => TxKind::Create,
            },
            value: self.amount,
            input: self.data.clone(),
        })
    }
}

/// Adapter for Ethereum-compatible chains.
#[derive(Debug, Clone)]
pub struct AccountAdapter {
    pub transfer_gas: u64,
    pub token_gas: u64,
    pub contract_gas: u64,
}

impl Default for AccountAdapter {
    fn default() -> Self {
        Self {
            transfer_gas: TRANSFER_GAS,
            token_gas: TOKEN_GAS,
            contract_gas: CONTRACT_GAS,
        }
    }
}

fn account_payload(payload: &Payload) -> TxResult<&AccountPayload> {
    match payload {
        Payload::Account(p) => Ok(p),
        Payload::Utxo(_) => Err(IntegrityError::Malformed("expected an account-model payload".into()).into()),
    }
}

fn parse_eth_address(address: &str) -> Result<Address, ValidationError> {
    Address::from_str(address.trim()).map_err(|_| ValidationError::InvalidAddress(address.to_string()))
}

impl AccountAdapter {
    /// Native wire encoding of a payload under `signature`.
    pub fn serialize_signed(&self, payload: &Payload, signature: Signature) -> TxResult<Vec<u8>> {
        let tx = account_payload(payload)?.to_legacy()?;
        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        Ok(envelope.encoded_2718())
    }
}

impl AddressDeriver for AccountAdapter {
    fn derive_address(&self, secret: &SecretKey) -> KeyResult<String> {
        let signer = PrivateKeySigner::from_bytes(&secret.to_b256())
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        Ok(signer.address().to_checksum(None))
    }

    fn same_address(&self, a: &str, b: &str) -> bool {
        match (parse_eth_address(a), parse_eth_address(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    fn parse_address(&self, address: &str) -> Result<String, ValidationError> {
        parse_eth_address(address).map(|a| a.to_checksum(None))
    }
}

#[async_trait]
impl ChainAdapter for AccountAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Account
    }

    fn check_structure(&self, tx: &Transaction) -> TxResult<()> {
        if tx.inputs.len() != 1 {
            return Err(ValidationError::InvalidInputCount {
                expected: 1,
                actual: tx.inputs.len(),
            }
            .into());
        }
        parse_eth_address(&tx.inputs[0].address)?;

        let outputs = tx.outputs.len();
        match &tx.call {
            CallSpec::Data { data } => {
                if data.is_empty() {
                    return Err(ValidationError::InvalidData("contract data is empty".into()).into());
                }
                if outputs > 1 {
                    return Err(ValidationError::InvalidOutputCount {
                        expected: 1,
                        actual: outputs,
                    }
                    .into());
                }
            }
            CallSpec::None | CallSpec::Token { .. } => {
                if outputs != 1 {
                    return Err(ValidationError::InvalidOutputCount {
                        expected: 1,
                        actual: outputs,
                    }
                    .into());
                }
                if tx.outputs[0].address.trim().is_empty() {
                    return Err(ValidationError::InvalidAddress(String::new()).into());
                }
            }
        }
        for output in &tx.outputs {
            if !output.address.trim().is_empty() {
                parse_eth_address(&output.address)?;
            }
        }
        if matches!(tx.call, CallSpec::Token { .. }) && tx.outputs[0].is_change {
            return Err(ValidationError::InvalidAmount("token transfers cannot use a change output".into()).into());
        }
        Ok(())
    }

    fn estimate_work(&self, tx: &Transaction) -> WorkEstimate {
        match tx.call {
            CallSpec::None => self.transfer_gas,
            CallSpec::Token { .. } => self.token_gas,
            CallSpec::Data { .. } => self.contract_gas,
        }
    }

    fn fee_check_exempt(&self, tx: &Transaction) -> bool {
        matches!(tx.call, CallSpec::Data { .. })
    }

    async fn materialize(
        &self,
        tx: &Transaction,
        quote: &FeeQuote,
        rpc: &dyn NetworkRpc,
    ) -> TxResult<Materialized> {
        let input = &tx.inputs[0];
        let from = parse_eth_address(&input.address)?;
        let fee = fee_from_rate(quote.rate, quote.work)?;

        let mut outputs = tx.outputs.clone();
        let recipient = match outputs.first() {
            Some(o) if !o.address.trim().is_empty() => Some(parse_eth_address(&o.address)?),
            _ => None,
        };

        // a change output sweeps whatever the fee leaves behind
        if let Some(out) = outputs.first_mut().filter(|o| o.is_change) {
            out.amount = input.amount.checked_sub(fee).ok_or(ValidationError::InsufficientFunds {
                available: input.amount,
                required: fee,
            })?;
        }

        let (to, amount, data, token) = match &tx.call {
            CallSpec::None => (recipient, outputs[0].amount, Bytes::new(), None),
            CallSpec::Token { contract, decimals } => {
                let recipient = recipient.ok_or_else(|| ValidationError::InvalidAddress(String::new()))?;
                (
                    Some(*contract),
                    U256::ZERO,
                    encode_transfer(recipient, outputs[0].amount),
                    Some(TokenMeta { decimals: *decimals }),
                )
            }
            CallSpec::Data { data } => (
                recipient,
                outputs.first().map(|o| o.amount).unwrap_or(U256::ZERO),
                data.clone(),
                None,
            ),
        };

        let required = amount.checked_add(fee).ok_or(UnitError::Overflow)?;
        if required > input.amount {
            return Err(ValidationError::InsufficientFunds {
                available: input.amount,
                required,
            }
            .into());
        }

        let pinned = tx.replaces.as_ref();
        let from_str = from.to_checksum(None);
        let nonce = match pinned.and_then(|r| r.nonce) {
            Some(nonce) => nonce,
            None => rpc.get_next_nonce(&from_str).await?,
        };
        let chain_id = match pinned.and_then(|r| r.chain_id) {
            Some(id) => id,
            None => rpc.get_chain_id().await?,
        };

        tracing::debug!(
            from = %from_str,
            nonce,
            chain_id,
            gas_price = %quote.rate,
            gas_limit = quote.work,
            "Materialized account payload"
        );

        Ok(Materialized {
            payload: Payload::Account(AccountPayload {
                from,
                to,
                amount,
                gas_price: quote.rate,
                gas_limit: quote.work,
                nonce,
                chain_id,
                data,
                token,
            }),
            outputs,
            fee,
        })
    }

    fn serialize_unsigned(&self, payload: &Payload) -> TxResult<Vec<u8>> {
        let p = account_payload(payload)?;
        let mut fields = BTreeMap::new();
        fields.insert("from", p.from.to_checksum(None));
        fields.insert("to", p.to.map(|a| a.to_checksum(None)).unwrap_or_default());
        fields.insert("amount", p.amount.to_string());
        fields.insert("gas_price", p.gas_price.to_string());
        fields.insert("gas_limit", p.gas_limit.to_string());
        fields.insert("nonce", p.nonce.to_string());
        fields.insert("chain_id", p.chain_id.to_string());
        fields.insert("data", hex::encode(&p.data));
        serde_json::to_vec(&fields).map_err(|e| IntegrityError::Malformed(e.to_string()).into())
    }

    fn sign(&self, payload: &Payload, keys: &KeyRing) -> TxResult<SignedForm> {
        let p = account_payload(payload)?;
        let from = p.from.to_checksum(None);
        let key = keys
            .find(&from, self)
            .ok_or_else(|| KeyError::Missing(vec![from.clone()]))?;
        let signer = PrivateKeySigner::from_bytes(&key.secret().to_b256())
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;

        let tx = p.to_legacy()?;
        let sighash = tx.signature_hash();
        let signature = signer
            .sign_hash_sync(&sighash)
            .map_err(|e| KeyError::InvalidKey(format!("signing failed: {}", e)))?;
        let recovered = signature
            .recover_address_from_prehash(&sighash)
            .map_err(|e| IntegrityError::Malformed(format!("signature recovery failed: {}", e)))?;

        let bytes = self.serialize_signed(payload, signature)?;
        let txid = hex::encode(keccak256(&bytes));

        Ok(SignedForm {
            bytes,
            txid,
            senders: vec![recovered.to_checksum(None)],
            created_contract: p.created_contract().map(|a| a.to_checksum(None)),
        })
    }

    fn compute_txid(&self, signed: &[u8]) -> TxResult<String> {
        Ok(hex::encode(keccak256(signed)))
    }

    fn parse_signed(&self, signed: &[u8]) -> TxResult<ParsedSigned> {
        let envelope = TxEnvelope::decode_2718(&mut &signed[..])
            .map_err(|e| IntegrityError::Malformed(e.to_string()))?;
        let TxEnvelope::Legacy(signed_tx) = envelope else {
            return Err(IntegrityError::Malformed("only legacy transactions are supported".into()).into());
        };

        let tx = signed_tx.tx();
        let chain_id = tx
            .chain_id
            .ok_or_else(|| IntegrityError::Malformed("transaction carries no chain ID".into()))?;
        let sender = signed_tx
            .signature()
            .recover_address_from_prehash(&signed_tx.signature_hash())
            .map_err(|e| IntegrityError::Malformed(format!("signature recovery failed: {}", e)))?;

        let payload = AccountPayload {
            from: sender,
            to: tx.to.to().copied(),
            amount: tx.value,
            gas_price: U256::from(tx.gas_price),
            gas_limit: tx.gas_limit,
            nonce: tx.nonce,
            chain_id,
            data: tx.input.clone(),
            token: None,
        };

        Ok(ParsedSigned {
            payload: Payload::Account(payload),
            txid: hex::encode(signed_tx.hash()),
            senders: vec![sender.to_checksum(None)],
        })
    }

    fn reconcile(&self, recorded: &Payload, parsed: Payload) -> TxResult<Payload> {
        let recorded = account_payload(recorded)?;
        let Payload::Account(mut parsed) = parsed else {
            return Err(IntegrityError::Malformed("expected an account-model payload".into()).into());
        };

        let mismatch = [
            ("from", recorded.from != parsed.from),
            ("to", recorded.to != parsed.to),
            ("amount", recorded.amount != parsed.amount),
            ("gas_price", recorded.gas_price != parsed.gas_price),
            ("gas_limit", recorded.gas_limit != parsed.gas_limit),
            ("nonce", recorded.nonce != parsed.nonce),
            ("chain_id", recorded.chain_id != parsed.chain_id),
            ("data", recorded.data != parsed.data),
        ]
        .into_iter()
        .find(|(_, differs)| *differs);
        if let Some((field, _)) = mismatch {
            return Err(IntegrityError::PayloadMismatch(format!("field '{}' differs", field)).into());
        }

        parsed.token = recorded.token;
        Ok(Payload::Account(parsed))
    }

    fn is_replaceable(&self, payload: &Payload) -> bool {
        matches!(payload, Payload::Account(_))
    }

    fn fee_of(&self, payload: &Payload) -> TxResult<U256> {
        Ok(account_payload(payload)?.fee()?)
    }

    fn pinned_sequence(&self, payload: &Payload) -> (Option<u64>, Option<u64>) {
        match payload {
            Payload::Account(p) => (Some(p.nonce), Some(p.chain_id)),
            Payload::Utxo(_) => (None, None),
        }
    }

    fn chain_id_of(&self, payload: &Payload) -> Option<u64> {
        match payload {
            Payload::Account(p) => Some(p.chain_id),
            Payload::Utxo(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::material::KeyMaterial;
    use crate::keys::SigningId;
    use alloy::primitives::address;

    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const SENDER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn payload() -> Payload {
        Payload::Account(AccountPayload {
            from: address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            to: Some(address!("70997970C51812dc3A010C7d01b50e0d17dc79C8")),
            amount: U256::from(10u64),
            gas_price: U256::from(50_000_000_000u64),
            gas_limit: 21_000,
            nonce: 7,
            chain_id: 1,
            data: Bytes::new(),
            token: None,
        })
    }

    fn ring() -> KeyRing {
        let secret = SecretKey::from_hex(TEST_PRIVATE_KEY).unwrap();
        KeyRing::new(
            vec![KeyMaterial::verified(SigningId::Address(SENDER.into()), SENDER.into(), secret)],
            vec!["test".into()],
        )
    }

    #[test]
    fn test_token_view_names_recipient() {
        let Payload::Account(mut p) = payload() else { unreachable!() };
        let contract = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
        let recipient = address!("3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");
        p.to = Some(contract);
        p.amount = U256::ZERO;
        p.data = encode_transfer(recipient, U256::from(250u64));
        p.token = Some(TokenMeta { decimals: 6 });

        let view = p.view().unwrap();
        assert_eq!(view.senders, vec![(SENDER.to_string(), None)]);
        assert_eq!(view.recipients, vec![(recipient.to_checksum(None), U256::from(250u64))]);

        assert!(p.check_call(&CallSpec::Token { contract, decimals: 6 }).is_ok());
        assert!(p.check_call(&CallSpec::Token { contract, decimals: 18 }).is_err());
        assert!(p.check_call(&CallSpec::None).is_err());
    }

    #[test]
    fn test_contract_creation_view() {
        let Payload::Account(mut p) = payload() else { unreachable!() };
        p.to = None;
        p.amount = U256::ZERO;
        p.data = Bytes::from(vec![0x60, 0x80]);
        assert!(p.view().unwrap().recipients.is_empty());
        assert!(p.check_call(&CallSpec::Data { data: p.data.clone() }).is_ok());

        p.amount = U256::from(3u64);
        assert_eq!(p.view().unwrap().recipients, vec![(String::new(), U256::from(3u64))]);
    }

    #[test]
    fn test_derive_address() {
        let adapter = AccountAdapter::default();
        let secret = SecretKey::from_hex(TEST_PRIVATE_KEY).unwrap();
        assert_eq!(adapter.derive_address(&secret).unwrap(), SENDER);
        assert!(adapter.same_address(SENDER, &SENDER.to_lowercase()));
        assert!(!adapter.same_address(SENDER, "not-an-address"));
    }

    #[test]
    fn test_unsigned_encoding_is_canonical_json() {
        let adapter = AccountAdapter::default();
        let bytes = adapter.serialize_unsigned(&payload()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["nonce"], "7");
        assert_eq!(json["gas_price"], "50000000000");
        assert_eq!(json["data"], "");
        assert_eq!(bytes, adapter.serialize_unsigned(&payload()).unwrap());
    }

    #[test]
    fn test_sign_and_parse_round_trip() {
        let adapter = AccountAdapter::default();
        let signed = adapter.sign(&payload(), &ring()).unwrap();
        assert_eq!(signed.senders, vec![SENDER.to_string()]);
        assert_eq!(signed.txid, adapter.compute_txid(&signed.bytes).unwrap());
        assert_eq!(signed.created_contract, None);

        let parsed = adapter.parse_signed(&signed.bytes).unwrap();
        assert_eq!(parsed.txid, signed.txid);
        assert_eq!(parsed.payload, payload());
        assert_eq!(adapter.reconcile(&payload(), parsed.payload).unwrap(), payload());
    }

    #[test]
    fn test_reconcile_detects_tampering() {
        let adapter = AccountAdapter::default();
        let signed = adapter.sign(&payload(), &ring()).unwrap();
        let parsed = adapter.parse_signed(&signed.bytes).unwrap();

        let Payload::Account(mut recorded) = payload() else { unreachable!() };
        recorded.amount = U256::from(11u64);
        let err = adapter
            .reconcile(&Payload::Account(recorded), parsed.payload)
            .unwrap_err();
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn test_contract_creation_address() {
        let adapter = AccountAdapter::default();
        let Payload::Account(mut p) = payload() else { unreachable!() };
        p.to = None;
        p.data = Bytes::from(vec![0x60, 0x80, 0x60, 0x40]);
        let signed = adapter.sign(&Payload::Account(p.clone()), &ring()).unwrap();
        let expected = p.from.create(7).to_checksum(None);
        assert_eq!(signed.created_contract, Some(expected));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let adapter = AccountAdapter::default();
        assert!(adapter.parse_signed(&[0xde, 0xad]).is_err());
    }

    #[test]
    fn test_sign_without_key_fails() {
        let adapter = AccountAdapter::default();
        let err = adapter.sign(&payload(), &KeyRing::default()).unwrap_err();
        assert!(err.to_string().contains("no key found"));
    }
}
