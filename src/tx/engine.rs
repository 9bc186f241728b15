//! Transaction lifecycle engine.
//!
//! # Responsibilities
//! - Draft → Unsigned: structure checks, work estimate, fee resolution, ceiling check
//! - Unsigned → Signed: identifier and chain checks, key resolution, sender verification
//! - Re-open stored records, recomputing every identifier from content
//!
//! # Design Decisions
//! - Operations take the transaction by reference and return a new one, so a
//!   failing call leaves the caller's record as it was
//! - Identifiers recorded in a file are compared against, never adopted
//! - Inputs and outputs of a record must say what its payload says; the
//!   payload is what gets signed
//! - Network failures are returned as-is; nothing here retries

use std::sync::Arc;

use alloy::primitives::Bytes;

use crate::chain::{AddressDeriver, ChainAdapter, ChainFamily, Payload, PayloadView};
use crate::error::{IntegrityError, StateError, TxResult, ValidationError};
use crate::keys::{KeyResolver, KeySource, Requirement, SigningId};
use crate::observability::metrics;
use crate::rpc::NetworkRpc;
use crate::tx::options::TxOptions;
use crate::tx::types::{Input, Output, Transaction, TxIdentifier, TxStatus};
use crate::units::{check_bound, describe_fee, rate_from_fee, FeeQuote, FeeSpec, UnitTable, WorkEstimate};

/// Drives transactions through Draft → Unsigned → Signed for one chain.
pub struct TxEngine<R> {
    adapter: Arc<dyn ChainAdapter>,
    rpc: R,
    options: TxOptions,
    expected_chain_id: Option<u64>,
    units: UnitTable,
}

impl<R: NetworkRpc> TxEngine<R> {
    pub fn new(adapter: Arc<dyn ChainAdapter>, rpc: R, options: TxOptions) -> Self {
        let units = UnitTable::for_family(adapter.family());
        Self {
            adapter,
            rpc,
            options,
            expected_chain_id: None,
            units,
        }
    }

    /// Payloads for any other chain are rejected before signing and sending.
    pub fn with_expected_chain_id(mut self, chain_id: Option<u64>) -> Self {
        self.expected_chain_id = chain_id;
        self
    }

    pub fn adapter(&self) -> &dyn ChainAdapter {
        self.adapter.as_ref()
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    pub fn options(&self) -> &TxOptions {
        &self.options
    }

    pub fn units(&self) -> &UnitTable {
        &self.units
    }

    pub fn expected_chain_id(&self) -> Option<u64> {
        self.expected_chain_id
    }

    /// Start a transaction. Addresses are validated and canonicalized here;
    /// shape rules are checked by `materialize`.
    pub fn create_draft(
        &self,
        mut inputs: Vec<Input>,
        mut outputs: Vec<Output>,
        fee_spec: FeeSpec,
    ) -> TxResult<Transaction> {
        if inputs.is_empty() {
            return Err(ValidationError::InvalidInputCount {
                expected: 1,
                actual: 0,
            }
            .into());
        }
        for input in &mut inputs {
            input.address = self.adapter.parse_address(&input.address)?;
        }
        for output in outputs.iter_mut().filter(|o| !o.address.trim().is_empty()) {
            output.address = self.adapter.parse_address(&output.address)?;
        }

        let tx = Transaction::draft(self.adapter.family(), inputs, outputs, fee_spec);
        tracing::info!(
            family = %tx.family,
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            fee_spec = ?tx.fee_spec,
            "Draft created"
        );
        metrics::record_transition(TxStatus::Draft);
        Ok(tx)
    }

    /// Work the fee rate applies to: the override if configured, else the adapter's estimate.
    pub fn work_estimate(&self, tx: &Transaction) -> WorkEstimate {
        match (tx.family, self.options.gas_limit_override) {
            (ChainFamily::Account, Some(work)) => work,
            _ => self.adapter.estimate_work(tx),
        }
    }

    /// Turn the draft's fee spec into a concrete fee for `work`.
    pub async fn quote_fee(&self, tx: &Transaction, work: WorkEstimate) -> TxResult<FeeQuote> {
        let quote = match &tx.fee_spec {
            FeeSpec::Absolute(fee) => FeeQuote::from_fee(*fee, work)?,
            FeeSpec::Rate(rate) => FeeQuote::from_rate(*rate, work)?,
            FeeSpec::Network => {
                let estimate = self.rpc.get_fee_rate_estimate().await?;
                let rate = self.options.fee_adjustment_factor.apply(estimate)?;
                tracing::debug!(
                    estimate = %estimate,
                    adjusted = %rate,
                    factor = %self.options.fee_adjustment_factor,
                    "Network fee rate"
                );
                FeeQuote::from_rate(rate, work)?
            }
        };
        Ok(quote)
    }

    /// Draft → Unsigned.
    pub async fn materialize(&self, draft: &Transaction) -> TxResult<Transaction> {
        if draft.status != TxStatus::Draft {
            return Err(StateError::InvalidTransition {
                operation: "materialize",
                status: draft.status,
            }
            .into());
        }
        self.check_family(draft)?;
        self.adapter.check_structure(draft)?;

        let work = self.work_estimate(draft);
        let quote = self.quote_fee(draft, work).await?;
        let unchecked = self.fee_check_disabled(draft);
        check_bound(quote.fee, self.options.max_tx_fee, unchecked)?;

        let materialized = self.adapter.materialize(draft, &quote, &self.rpc).await?;

        check_bound(materialized.fee, self.options.max_tx_fee, unchecked)?;
        if let Some(replacement) = &draft.replaces {
            if materialized.fee < replacement.minimum_fee {
                return Err(ValidationError::FeeTooSmall {
                    fee: materialized.fee,
                    minimum: replacement.minimum_fee,
                }
                .into());
            }
        }
        self.check_chain(&materialized.payload)?;
        let identifier = self.unsigned_identifier(&materialized.payload)?;

        let mut tx = draft.clone();
        tx.outputs = materialized.outputs;
        tx.fee = materialized.fee;
        tx.fee_rate = Some(rate_from_fee(materialized.fee, work)?);
        tx.payload = Some(materialized.payload);
        tx.identifier = Some(identifier);
        tx.status = TxStatus::Unsigned;

        tracing::info!(
            txid = %tx.id(),
            fee = %describe_fee(tx.fee, &self.units),
            work,
            "Transaction materialized"
        );
        metrics::record_transition(TxStatus::Unsigned);
        Ok(tx)
    }

    /// Unsigned → Signed.
    ///
    /// Keys come from `sources` and are verified against every address they
    /// are claimed for. The signature's recovered sender must equal the input
    /// address. The key ring is dropped before this returns.
    pub fn sign(&self, tx: &Transaction, sources: &[&dyn KeySource]) -> TxResult<Transaction> {
        if tx.status != TxStatus::Unsigned {
            return Err(StateError::InvalidTransition {
                operation: "sign",
                status: tx.status,
            }
            .into());
        }
        self.check_family(tx)?;
        let payload = tx.payload()?;
        let computed = self.unsigned_identifier(payload)?;
        verify_identifier(tx.identifier.as_ref(), &computed)?;
        let view = self.check_binding(tx, payload)?;
        self.check_chain(payload)?;
        check_bound(
            self.adapter.fee_of(payload)?,
            self.options.max_tx_fee,
            self.fee_check_disabled(tx),
        )?;

        let deriver: &dyn AddressDeriver = self.adapter.as_ref();
        let resolver = KeyResolver::new(deriver);
        let ring = resolver.resolve(&input_requirements(tx), sources)?;
        let output_reqs = output_requirements(tx, &view);
        if !output_reqs.is_empty() {
            resolver.verify_output_mappings(&output_reqs, sources)?;
        }

        let signed = self.adapter.sign(payload, &ring)?;
        let sources_used = ring.sources_used().to_vec();
        drop(ring);

        self.verify_senders(tx, &signed.senders)?;
        let recomputed = self.adapter.compute_txid(&signed.bytes)?;
        if recomputed != signed.txid {
            metrics::record_integrity_failure("identifier");
            return Err(IntegrityError::IdentifierMismatch {
                recorded: signed.txid,
                computed: recomputed,
            }
            .into());
        }

        let mut out = tx.clone();
        out.identifier = Some(TxIdentifier::Coin(signed.txid));
        out.signed = Some(Bytes::from(signed.bytes));
        out.created_contract = signed.created_contract;
        out.status = TxStatus::Signed;

        tracing::info!(
            txid = %out.id(),
            draft_id = %computed,
            sources = ?sources_used,
            created_contract = ?out.created_contract,
            "Transaction signed"
        );
        metrics::record_transition(TxStatus::Signed);
        Ok(out)
    }

    /// Re-check a record loaded from storage.
    ///
    /// Unsigned records must carry the checksum of their payload, and their
    /// inputs and outputs must match it. Signed records are decoded from
    /// their wire bytes, which must hash to the recorded identifier, agree
    /// with the recorded payload and carry signatures from the input
    /// addresses. Fee and output addresses and amounts are re-derived from
    /// the decoded payload.
    pub fn reopen(&self, mut tx: Transaction) -> TxResult<Transaction> {
        self.check_family(&tx)?;
        match tx.status {
            TxStatus::Draft => {
                tx.identifier = None;
                tx.payload = None;
                tx.signed = None;
            }
            TxStatus::Unsigned => {
                let payload = tx.payload()?;
                let computed = self.unsigned_identifier(payload)?;
                verify_identifier(tx.identifier.as_ref(), &computed)?;
                self.check_binding(&tx, payload)?;
                tx.fee = self.adapter.fee_of(payload)?;
            }
            TxStatus::Signed | TxStatus::Sent | TxStatus::Confirmed | TxStatus::Failed => {
                let bytes = tx.signed_bytes()?;
                let parsed = self.adapter.parse_signed(bytes)?;
                let computed = TxIdentifier::Coin(self.adapter.compute_txid(bytes)?);
                if parsed.txid != computed.as_str() {
                    metrics::record_integrity_failure("identifier");
                    return Err(IntegrityError::IdentifierMismatch {
                        recorded: parsed.txid,
                        computed: computed.to_string(),
                    }
                    .into());
                }
                verify_identifier(tx.identifier.as_ref(), &computed)?;
                self.verify_senders(&tx, &parsed.senders)?;

                let payload = self.adapter.reconcile(tx.payload()?, parsed.payload)?;
                payload.check_call(&tx.call).inspect_err(|_| payload_failure())?;
                rederive_outputs(&mut tx.outputs, &payload.view()?)?;
                tx.fee = self.adapter.fee_of(&payload)?;
                tx.payload = Some(payload);
            }
        }
        tracing::debug!(txid = %tx.id(), status = %tx.status, "Transaction record reopened");
        Ok(tx)
    }

    pub(crate) fn fee_check_disabled(&self, tx: &Transaction) -> bool {
        self.options.disable_fee_check || self.adapter.fee_check_exempt(tx)
    }

    /// Payload chain ID against the configured one, when both exist.
    pub(crate) fn check_chain(&self, payload: &Payload) -> TxResult<()> {
        if let (Some(expected), Some(actual)) = (self.expected_chain_id, self.adapter.chain_id_of(payload)) {
            if expected != actual {
                tracing::error!(expected, actual, "Chain ID mismatch");
                metrics::record_integrity_failure("chain");
                return Err(IntegrityError::ChainMismatch { expected, actual }.into());
            }
        }
        Ok(())
    }

    pub(crate) fn check_family(&self, tx: &Transaction) -> TxResult<()> {
        let family = self.adapter.family();
        let payload_family = tx.payload.as_ref().map(Payload::family).unwrap_or(tx.family);
        if tx.family != family || payload_family != family {
            return Err(IntegrityError::Malformed(format!(
                "{} transaction given to the {} engine",
                tx.family, family
            ))
            .into());
        }
        Ok(())
    }

    /// Record inputs and outputs against what the payload pays.
    fn check_binding(&self, tx: &Transaction, payload: &Payload) -> TxResult<PayloadView> {
        payload.check_call(&tx.call).inspect_err(|_| payload_failure())?;
        let view = payload.view()?;

        if view.senders.len() != tx.inputs.len() {
            return Err(payload_mismatch(format!(
                "{} input(s) in payload, {} recorded",
                view.senders.len(),
                tx.inputs.len()
            )));
        }
        for (n, (input, (address, amount))) in tx.inputs.iter().zip(&view.senders).enumerate() {
            if !self.adapter.same_address(&input.address, address) {
                return Err(payload_mismatch(format!(
                    "input {} spends from {} in payload, {} recorded",
                    n, address, input.address
                )));
            }
            if amount.is_some_and(|amount| amount != input.amount) {
                return Err(payload_mismatch(format!("input {} amount differs", n)));
            }
        }

        let outputs = paying_outputs(&tx.outputs);
        if outputs.len() != view.recipients.len() {
            return Err(payload_mismatch(format!(
                "{} output(s) in payload, {} recorded",
                view.recipients.len(),
                outputs.len()
            )));
        }
        for (n, (output, (address, amount))) in outputs.iter().zip(&view.recipients).enumerate() {
            let same = match (output.address.trim().is_empty(), address.is_empty()) {
                (true, true) => true,
                (false, false) => self.adapter.same_address(&output.address, address),
                _ => false,
            };
            if !same {
                return Err(payload_mismatch(format!(
                    "output {} pays {} in payload, {} recorded",
                    n, address, output.address
                )));
            }
            if output.amount != *amount {
                return Err(payload_mismatch(format!(
                    "output {} pays {} in payload, {} recorded",
                    n, amount, output.amount
                )));
            }
        }
        Ok(view)
    }

    fn unsigned_identifier(&self, payload: &Payload) -> TxResult<TxIdentifier> {
        Ok(TxIdentifier::checksum(&self.adapter.serialize_unsigned(payload)?))
    }

    fn verify_senders(&self, tx: &Transaction, senders: &[String]) -> TxResult<()> {
        if senders.len() != tx.inputs.len() {
            return Err(IntegrityError::Malformed(format!(
                "{} signature(s) for {} input(s)",
                senders.len(),
                tx.inputs.len()
            ))
            .into());
        }
        for (input, sender) in tx.inputs.iter().zip(senders) {
            if !self.adapter.same_address(&input.address, sender) {
                tracing::error!(claimed = %input.address, recovered = %sender, "Signature sender mismatch");
                metrics::record_integrity_failure("sender");
                return Err(IntegrityError::SignatureSenderMismatch {
                    claimed: input.address.clone(),
                    recovered: sender.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}

fn verify_identifier(recorded: Option<&TxIdentifier>, computed: &TxIdentifier) -> TxResult<()> {
    if recorded == Some(computed) {
        return Ok(());
    }
    let recorded = recorded.map(|id| id.to_string()).unwrap_or_default();
    tracing::error!(recorded = %recorded, computed = %computed, "Identifier mismatch");
    metrics::record_integrity_failure("identifier");
    Err(IntegrityError::IdentifierMismatch {
        recorded,
        computed: computed.to_string(),
    }
    .into())
}

fn signing_id(address: &str, wallet_id: Option<&crate::keys::WalletId>) -> SigningId {
    match wallet_id {
        Some(id) => SigningId::Wallet(id.clone()),
        None => SigningId::Address(address.to_string()),
    }
}

fn input_requirements(tx: &Transaction) -> Vec<Requirement> {
    tx.inputs
        .iter()
        .map(|i| Requirement::new(signing_id(&i.address, i.wallet_id.as_ref()), i.address.clone()))
        .collect()
}

/// A zero-value contract creation records an empty output that pays nobody.
fn is_placeholder(output: &Output) -> bool {
    output.address.trim().is_empty() && output.amount.is_zero()
}

fn paying_outputs(outputs: &[Output]) -> Vec<&Output> {
    outputs.iter().filter(|o| !is_placeholder(o)).collect()
}

fn payload_failure() {
    metrics::record_integrity_failure("payload");
}

fn payload_mismatch(what: String) -> crate::TxError {
    tracing::error!(detail = %what, "Payload does not match record");
    payload_failure();
    IntegrityError::PayloadMismatch(what).into()
}

/// Wallet-ID claims on outputs, checked against the address the payload pays.
fn output_requirements(tx: &Transaction, view: &PayloadView) -> Vec<Requirement> {
    paying_outputs(&tx.outputs)
        .into_iter()
        .zip(&view.recipients)
        .filter_map(|(o, (address, _))| {
            o.wallet_id
                .as_ref()
                .map(|id| Requirement::new(SigningId::Wallet(id.clone()), address.clone()))
        })
        .collect()
}

fn rederive_outputs(outputs: &mut [Output], view: &PayloadView) -> TxResult<()> {
    let mut recorded: Vec<&mut Output> = outputs.iter_mut().filter(|o| !is_placeholder(o)).collect();
    if recorded.len() != view.recipients.len() {
        return Err(payload_mismatch(format!(
            "{} output(s) signed, {} recorded",
            view.recipients.len(),
            recorded.len()
        )));
    }
    for (output, (address, amount)) in recorded.iter_mut().zip(&view.recipients) {
        output.address = address.clone();
        output.amount = *amount;
    }
    Ok(())
}
