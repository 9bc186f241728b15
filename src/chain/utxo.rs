//! UTXO-model adapter (Bitcoin legacy P2PKH).
//!
//! # Responsibilities
//! - Byte-size work estimate from input/output counts
//! - Change computation: inputs minus outputs minus fee
//! - Legacy sighash signing, one key per input address
//! - Signature verification on parse; senders come from the script_sig pubkeys
//!
//! # Design Decisions
//! - Inputs always signal replace-by-fee
//! - The wire format does not carry input amounts, so a parsed payload is
//!   reconciled against the record before the fee can be computed

use std::str::FromStr;

use alloy::primitives::U256;
use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::address::NetworkUnchecked;
use bitcoin::consensus::encode::{deserialize, serialize};
use bitcoin::hashes::Hash;
use bitcoin::script::{Instruction, PushBytesBuf};
use bitcoin::secp256k1::{self, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Network, OutPoint, PublicKey, ScriptBuf, Sequence, TxIn, TxOut, Txid, Witness,
};
use serde::{Deserialize, Serialize};

use crate::chain::{
    AddressDeriver, ChainAdapter, ChainFamily, Materialized, ParsedSigned, Payload, PayloadView, SignedForm,
};
use crate::error::{IntegrityError, TxResult, ValidationError};
use crate::keys::{KeyError, KeyResult, KeyRing, SecretKey};
use crate::rpc::NetworkRpc;
use crate::tx::types::{CallSpec, Transaction};
use crate::units::{FeeQuote, UnitError, WorkEstimate};

/// Sequence number signalling opt-in replace-by-fee.
pub const RBF_SEQUENCE: u32 = 0xffff_fffd;

pub const OVERHEAD_BYTES: u64 = 10;
pub const BYTES_PER_INPUT: u64 = 148;
pub const BYTES_PER_OUTPUT: u64 = 34;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoInput {
    pub txid: String,
    pub vout: u32,
    /// Satoshis. Zero when parsed from wire bytes, until reconciled.
    pub amount: u64,
    pub address: String,
    pub script_pubkey: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoOutput {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoPayload {
    pub inputs: Vec<UtxoInput>,
    pub outputs: Vec<UtxoOutput>,
    pub lock_time: u32,
    pub sequence: u32,
}

impl UtxoPayload {
    pub fn view(&self) -> PayloadView {
        PayloadView {
            senders: self
                .inputs
                .iter()
                .map(|i| (i.address.clone(), Some(U256::from(i.amount))))
                .collect(),
            recipients: self
                .outputs
                .iter()
                .map(|o| (o.address.clone(), U256::from(o.amount)))
                .collect(),
        }
    }

    /// Inputs minus outputs. Totals that do not fit in a `u64` are malformed.
    pub fn fee(&self) -> Result<u64, IntegrityError> {
        let inputs = checked_total(self.inputs.iter().map(|i| i.amount), "input")?;
        let outputs = checked_total(self.outputs.iter().map(|o| o.amount), "output")?;
        inputs
            .checked_sub(outputs)
            .ok_or_else(|| IntegrityError::Malformed(format!("outputs ({}) exceed inputs ({})", outputs, inputs)))
    }
}

fn checked_total(mut amounts: impl Iterator<Item = u64>, side: &str) -> Result<u64, IntegrityError> {
    amounts.try_fold(0u64, |total, amount| {
        total
            .checked_add(amount)
            .ok_or_else(|| IntegrityError::Malformed(format!("{} total overflows", side)))
    })
}

/// Adapter for Bitcoin-style chains, P2PKH only.
#[derive(Debug, Clone)]
pub struct UtxoAdapter {
    pub network: Network,
    pub overhead_bytes: u64,
    pub bytes_per_input: u64,
    pub bytes_per_output: u64,
}

impl Default for UtxoAdapter {
    fn default() -> Self {
        Self::new(Network::Bitcoin)
    }
}

fn utxo_payload(payload: &Payload) -> TxResult<&UtxoPayload> {
    match payload {
        Payload::Utxo(p) => Ok(p),
        Payload::Account(_) => Err(IntegrityError::Malformed("expected a UTXO-model payload".into()).into()),
    }
}

fn to_sats(amount: U256) -> Result<u64, UnitError> {
    u64::try_from(amount).map_err(|_| UnitError::Overflow)
}

fn malformed(e: impl std::fmt::Display) -> IntegrityError {
    IntegrityError::Malformed(e.to_string())
}

impl UtxoAdapter {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            overhead_bytes: OVERHEAD_BYTES,
            bytes_per_input: BYTES_PER_INPUT,
            bytes_per_output: BYTES_PER_OUTPUT,
        }
    }

    fn checked_address(&self, address: &str) -> Result<Address, ValidationError> {
        address
            .trim()
            .parse::<Address<NetworkUnchecked>>()
            .ok()
            .and_then(|a| a.require_network(self.network).ok())
            .ok_or_else(|| ValidationError::InvalidAddress(address.to_string()))
    }

    fn p2pkh_address(&self, pk: &PublicKey) -> Address {
        Address::p2pkh(pk.pubkey_hash(), self.network)
    }

    fn build(&self, p: &UtxoPayload) -> TxResult<bitcoin::Transaction> {
        let mut input = Vec::with_capacity(p.inputs.len());
        for i in &p.inputs {
            let txid = Txid::from_str(&i.txid).map_err(malformed)?;
            input.push(TxIn {
                previous_output: OutPoint::new(txid, i.vout),
                script_sig: ScriptBuf::new(),
                sequence: Sequence(p.sequence),
                witness: Witness::new(),
            });
        }
        let mut output = Vec::with_capacity(p.outputs.len());
        for o in &p.outputs {
            output.push(TxOut {
                value: Amount::from_sat(o.amount),
                script_pubkey: self.checked_address(&o.address)?.script_pubkey(),
            });
        }
        Ok(bitcoin::Transaction {
            version: Version::TWO,
            lock_time: LockTime::from_consensus(p.lock_time),
            input,
            output,
        })
    }

    /// Verify every input signature, returning the address each pubkey controls.
    fn verified_senders(&self, tx: &bitcoin::Transaction) -> TxResult<Vec<String>> {
        let secp = Secp256k1::verification_only();
        let cache = SighashCache::new(tx);
        let mut senders = Vec::with_capacity(tx.input.len());

        for (index, txin) in tx.input.iter().enumerate() {
            let pushes: Vec<&[u8]> = txin
                .script_sig
                .instructions()
                .map(|ins| match ins {
                    Ok(Instruction::PushBytes(bytes)) => Ok(bytes.as_bytes()),
                    Ok(Instruction::Op(op)) => Err(malformed(format!("unexpected opcode {} in input {}", op, index))),
                    Err(e) => Err(malformed(e)),
                })
                .collect::<Result<_, _>>()?;
            let [sig_bytes, key_bytes] = pushes.as_slice() else {
                return Err(malformed(format!("input {} is not a P2PKH spend", index)).into());
            };

            let sig = bitcoin::ecdsa::Signature::from_slice(sig_bytes).map_err(malformed)?;
            if sig.sighash_type != EcdsaSighashType::All {
                return Err(malformed(format!("input {} uses sighash type {}", index, sig.sighash_type)).into());
            }
            let pk = PublicKey::from_slice(key_bytes).map_err(malformed)?;
            let script_pubkey = ScriptBuf::new_p2pkh(&pk.pubkey_hash());
            let sighash = cache
                .legacy_signature_hash(index, &script_pubkey, EcdsaSighashType::All.to_u32())
                .map_err(malformed)?;
            let msg = Message::from_digest(sighash.to_byte_array());
            secp.verify_ecdsa(&msg, &sig.signature, &pk.inner)
                .map_err(|_| malformed(format!("bad signature on input {}", index)))?;

            senders.push(self.p2pkh_address(&pk).to_string());
        }
        Ok(senders)
    }
}

impl AddressDeriver for UtxoAdapter {
    fn derive_address(&self, secret: &SecretKey) -> KeyResult<String> {
        let secp = Secp256k1::signing_only();
        let sk = secp256k1::SecretKey::from_slice(secret.as_bytes())
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let pk = PublicKey::new(sk.public_key(&secp));
        Ok(self.p2pkh_address(&pk).to_string())
    }

    fn same_address(&self, a: &str, b: &str) -> bool {
        match (self.checked_address(a), self.checked_address(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    fn parse_address(&self, address: &str) -> Result<String, ValidationError> {
        self.checked_address(address).map(|a| a.to_string())
    }
}

#[async_trait]
impl ChainAdapter for UtxoAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Utxo
    }

    fn check_structure(&self, tx: &Transaction) -> TxResult<()> {
        if tx.inputs.is_empty() {
            return Err(ValidationError::InvalidInputCount {
                expected: 1,
                actual: 0,
            }
            .into());
        }
        if tx.outputs.is_empty() {
            return Err(ValidationError::InvalidOutputCount {
                expected: 1,
                actual: 0,
            }
            .into());
        }
        if !matches!(tx.call, CallSpec::None) {
            return Err(ValidationError::InvalidData("UTXO transactions carry no contract data".into()).into());
        }
        for (n, input) in tx.inputs.iter().enumerate() {
            self.checked_address(&input.address)?;
            let spend = input.spend.as_ref().ok_or_else(|| {
                ValidationError::InvalidData(format!("input {} has no previous-output reference", n))
            })?;
            Txid::from_str(&spend.txid)
                .map_err(|_| ValidationError::InvalidData(format!("input {}: bad txid '{}'", n, spend.txid)))?;
            to_sats(input.amount)?;
        }
        let mut change = 0;
        for output in &tx.outputs {
            self.checked_address(&output.address)?;
            if output.is_change {
                change += 1;
            } else if output.amount.is_zero() {
                return Err(ValidationError::InvalidAmount(format!("zero amount to {}", output.address)).into());
            }
        }
        if change > 1 {
            return Err(ValidationError::InvalidAmount("more than one change output".into()).into());
        }
        Ok(())
    }

    fn estimate_work(&self, tx: &Transaction) -> WorkEstimate {
        self.overhead_bytes
            + self.bytes_per_input * tx.inputs.len() as u64
            + self.bytes_per_output * tx.outputs.len() as u64
    }

    fn fee_check_exempt(&self, _tx: &Transaction) -> bool {
        false
    }

    async fn materialize(
        &self,
        tx: &Transaction,
        quote: &FeeQuote,
        _rpc: &dyn NetworkRpc,
    ) -> TxResult<Materialized> {
        // explicit fees are used as given, not rounded through the rate
        let fee = to_sats(quote.fee)?;

        let mut input_total = 0u64;
        let mut inputs = Vec::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            let amount = to_sats(input.amount)?;
            input_total = input_total.checked_add(amount).ok_or(UnitError::Overflow)?;
            let spend = input
                .spend
                .as_ref()
                .ok_or_else(|| ValidationError::InvalidData(format!("{} has no previous-output reference", input.address)))?;
            let script_pubkey = match &spend.script_pubkey {
                Some(hex) => hex.clone(),
                None => self.checked_address(&input.address)?.script_pubkey().to_hex_string(),
            };
            inputs.push(UtxoInput {
                txid: spend.txid.clone(),
                vout: spend.vout,
                amount,
                address: self.parse_address(&input.address)?,
                script_pubkey,
            });
        }

        let mut send_total = 0u64;
        for output in tx.outputs.iter().filter(|o| !o.is_change) {
            send_total = send_total
                .checked_add(to_sats(output.amount)?)
                .ok_or(UnitError::Overflow)?;
        }
        let required = send_total.checked_add(fee).ok_or(UnitError::Overflow)?;
        let leftover = input_total.checked_sub(required).ok_or(ValidationError::InsufficientFunds {
            available: U256::from(input_total),
            required: U256::from(required),
        })?;

        let mut outputs = tx.outputs.clone();
        match outputs.iter().position(|o| o.is_change) {
            // nodes reject zero-value outputs as dust
            Some(n) if leftover == 0 => {
                outputs.remove(n);
            }
            Some(n) => outputs[n].amount = U256::from(leftover),
            None if leftover > 0 => {
                return Err(ValidationError::MissingChangeOutput {
                    leftover: U256::from(leftover),
                }
                .into())
            }
            None => {}
        }

        let mut payload_outputs = Vec::with_capacity(outputs.len());
        for o in &outputs {
            payload_outputs.push(UtxoOutput {
                address: self.parse_address(&o.address)?,
                amount: to_sats(o.amount)?,
            });
        }

        tracing::debug!(
            inputs = inputs.len(),
            outputs = payload_outputs.len(),
            fee,
            change = leftover,
            "Materialized UTXO payload"
        );

        Ok(Materialized {
            payload: Payload::Utxo(UtxoPayload {
                inputs,
                outputs: payload_outputs,
                lock_time: 0,
                sequence: RBF_SEQUENCE,
            }),
            outputs,
            fee: U256::from(fee),
        })
    }

    fn serialize_unsigned(&self, payload: &Payload) -> TxResult<Vec<u8>> {
        let tx = self.build(utxo_payload(payload)?)?;
        Ok(serialize(&tx))
    }

    fn sign(&self, payload: &Payload, keys: &KeyRing) -> TxResult<SignedForm> {
        let p = utxo_payload(payload)?;
        let mut tx = self.build(p)?;
        let secp = Secp256k1::new();

        let mut script_sigs = Vec::with_capacity(p.inputs.len());
        {
            let cache = SighashCache::new(&tx);
            for (index, input) in p.inputs.iter().enumerate() {
                let key = keys
                    .find(&input.address, self)
                    .ok_or_else(|| KeyError::Missing(vec![input.address.clone()]))?;
                let sk = secp256k1::SecretKey::from_slice(key.secret().as_bytes())
                    .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
                let pk = PublicKey::new(sk.public_key(&secp));

                let script_pubkey = ScriptBuf::from_hex(&input.script_pubkey).map_err(malformed)?;
                if script_pubkey != ScriptBuf::new_p2pkh(&pk.pubkey_hash()) {
                    return Err(IntegrityError::SignatureSenderMismatch {
                        claimed: input.address.clone(),
                        recovered: self.p2pkh_address(&pk).to_string(),
                    }
                    .into());
                }

                let sighash = cache
                    .legacy_signature_hash(index, &script_pubkey, EcdsaSighashType::All.to_u32())
                    .map_err(malformed)?;
                let msg = Message::from_digest(sighash.to_byte_array());
                let sig = bitcoin::ecdsa::Signature::sighash_all(secp.sign_ecdsa(&msg, &sk));
                let sig_push = PushBytesBuf::try_from(sig.to_vec()).map_err(malformed)?;

                script_sigs.push(
                    ScriptBuf::builder()
                        .push_slice(sig_push)
                        .push_key(&pk)
                        .into_script(),
                );
            }
        }
        for (txin, script_sig) in tx.input.iter_mut().zip(script_sigs) {
            txin.script_sig = script_sig;
        }

        let senders = self.verified_senders(&tx)?;
        Ok(SignedForm {
            bytes: serialize(&tx),
            txid: tx.compute_txid().to_string(),
            senders,
            created_contract: None,
        })
    }

    fn compute_txid(&self, signed: &[u8]) -> TxResult<String> {
        let tx: bitcoin::Transaction = deserialize(signed).map_err(malformed)?;
        Ok(tx.compute_txid().to_string())
    }

    fn parse_signed(&self, signed: &[u8]) -> TxResult<ParsedSigned> {
        let tx: bitcoin::Transaction = deserialize(signed).map_err(malformed)?;
        let senders = self.verified_senders(&tx)?;

        let inputs = tx
            .input
            .iter()
            .zip(&senders)
            .map(|(txin, sender)| -> TxResult<UtxoInput> {
                Ok(UtxoInput {
                    txid: txin.previous_output.txid.to_string(),
                    vout: txin.previous_output.vout,
                    amount: 0,
                    address: sender.clone(),
                    script_pubkey: self.checked_address(sender)?.script_pubkey().to_hex_string(),
                })
            })
            .collect::<TxResult<Vec<_>>>()?;
        let outputs = tx
            .output
            .iter()
            .map(|txout| -> TxResult<UtxoOutput> {
                let address = Address::from_script(&txout.script_pubkey, self.network).map_err(malformed)?;
                Ok(UtxoOutput {
                    address: address.to_string(),
                    amount: txout.value.to_sat(),
                })
            })
            .collect::<TxResult<Vec<_>>>()?;
        let sequence = tx.input.first().map(|i| i.sequence.0).unwrap_or(RBF_SEQUENCE);

        Ok(ParsedSigned {
            payload: Payload::Utxo(UtxoPayload {
                inputs,
                outputs,
                lock_time: tx.lock_time.to_consensus_u32(),
                sequence,
            }),
            txid: tx.compute_txid().to_string(),
            senders,
        })
    }

    fn reconcile(&self, recorded: &Payload, parsed: Payload) -> TxResult<Payload> {
        let recorded = utxo_payload(recorded)?;
        let Payload::Utxo(mut parsed) = parsed else {
            return Err(IntegrityError::Malformed("expected a UTXO-model payload".into()).into());
        };

        let mismatch = |what: String| -> TxResult<Payload> { Err(IntegrityError::PayloadMismatch(what).into()) };
        if recorded.inputs.len() != parsed.inputs.len() || recorded.outputs.len() != parsed.outputs.len() {
            return mismatch("input or output count differs".into());
        }
        if recorded.lock_time != parsed.lock_time || recorded.sequence != parsed.sequence {
            return mismatch("lock time or sequence differs".into());
        }
        for (n, (rec, got)) in recorded.inputs.iter().zip(parsed.inputs.iter_mut()).enumerate() {
            if rec.txid != got.txid || rec.vout != got.vout || !self.same_address(&rec.address, &got.address) {
                return mismatch(format!("input {} differs", n));
            }
            got.amount = rec.amount;
            got.script_pubkey = rec.script_pubkey.clone();
        }
        for (n, (rec, got)) in recorded.outputs.iter().zip(&parsed.outputs).enumerate() {
            if rec.amount != got.amount || !self.same_address(&rec.address, &got.address) {
                return mismatch(format!("output {} differs", n));
            }
        }
        Ok(Payload::Utxo(parsed))
    }

    fn is_replaceable(&self, payload: &Payload) -> bool {
        match payload {
            Payload::Utxo(p) => Sequence(p.sequence).is_rbf(),
            Payload::Account(_) => false,
        }
    }

    fn fee_of(&self, payload: &Payload) -> TxResult<U256> {
        Ok(U256::from(utxo_payload(payload)?.fee()?))
    }

    fn pinned_sequence(&self, _payload: &Payload) -> (Option<u64>, Option<u64>) {
        (None, None)
    }

    fn chain_id_of(&self, _payload: &Payload) -> Option<u64> {
        None
    }
}
