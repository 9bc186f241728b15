//! Fee-bump (replace-by-fee) drafts.
//!
//! A bump never edits the signed transaction. It seeds a new Draft with the
//! same inputs, outputs and call data, pins the original sequence number and
//! chain ID, and sets a fee at least the replacement minimum. The new draft
//! then goes through `materialize`, `sign` and `broadcast` like any other.

use alloy::primitives::U256;

use crate::error::{StateError, TxResult, ValidationError};
use crate::observability::metrics;
use crate::rpc::NetworkRpc;
use crate::tx::engine::TxEngine;
use crate::tx::types::{Replacement, Transaction, TxStatus};
use crate::units::fee::ceil_div;
use crate::units::{describe_fee, fee_from_rate, min_replacement_fee, FeeSpec, UnitError};

impl<R: NetworkRpc> TxEngine<R> {
    /// Build a replacement draft for a signed or sent transaction.
    ///
    /// With no `fee_spec` the draft asks for the smallest rate whose fee
    /// reaches the replacement minimum. An explicit spec below the minimum is
    /// rejected here; a network spec is checked once `materialize` knows the rate.
    pub fn bump(&self, tx: &Transaction, fee_spec: Option<FeeSpec>) -> TxResult<Transaction> {
        match tx.status {
            TxStatus::Signed | TxStatus::Sent => {}
            TxStatus::Confirmed => return Err(StateError::AlreadyConfirmed(tx.id().to_string()).into()),
            status => {
                return Err(StateError::InvalidTransition {
                    operation: "bump",
                    status,
                }
                .into())
            }
        }
        self.check_family(tx)?;
        let payload = tx.payload()?;
        if !self.adapter().is_replaceable(payload) {
            return Err(StateError::NotReplaceable(tx.id().to_string()).into());
        }

        let original_fee = self.adapter().fee_of(payload)?;
        let minimum_fee = min_replacement_fee(original_fee)?;
        let (nonce, chain_id) = self.adapter().pinned_sequence(payload);

        let mut draft = Transaction::draft(tx.family, tx.inputs.clone(), tx.outputs.clone(), FeeSpec::Network);
        draft.call = tx.call.clone();
        draft.comment = tx.comment.clone();
        draft.replaces = Some(Replacement {
            original: tx.id().to_string(),
            original_fee,
            minimum_fee,
            nonce,
            chain_id,
        });

        let work = self.work_estimate(&draft);
        if work == 0 {
            return Err(UnitError::ZeroWork.into());
        }
        draft.fee_spec = match fee_spec {
            None => FeeSpec::Rate(ceil_div(minimum_fee, U256::from(work))),
            Some(spec) => {
                let requested = match &spec {
                    FeeSpec::Absolute(fee) => Some(*fee),
                    FeeSpec::Rate(rate) => Some(fee_from_rate(*rate, work)?),
                    FeeSpec::Network => None,
                };
                if let Some(fee) = requested.filter(|fee| *fee < minimum_fee) {
                    return Err(ValidationError::FeeTooSmall {
                        fee,
                        minimum: minimum_fee,
                    }
                    .into());
                }
                spec
            }
        };

        tracing::info!(
            original = %tx.id(),
            original_fee = %describe_fee(original_fee, self.units()),
            minimum_fee = %describe_fee(minimum_fee, self.units()),
            nonce = ?nonce,
            "Replacement draft created"
        );
        metrics::record_transition(TxStatus::Draft);
        Ok(draft)
    }
}
