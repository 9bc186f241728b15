//! Idempotent submission.

use crate::broadcast::{same_txid, Broadcast, BroadcastOutcome, Broadcaster};
use crate::error::{IntegrityError, StateError, TxResult};
use crate::observability::metrics;
use crate::rpc::NetworkRpc;
use crate::tx::types::unix_now;
use crate::tx::{Execution, Transaction, TxStatus};
use crate::units::{check_bound, describe_fee};

impl<'a, R: NetworkRpc> Broadcaster<'a, R> {
    /// Signed → Sent.
    ///
    /// Re-running this on a transaction the network already knows returns
    /// `AlreadyInMempool` or `AlreadyConfirmed` without submitting again.
    ///
    /// # Arguments
    /// * `tx` - A Signed record, or a Sent/Failed one being resent. Its wire
    ///   bytes are decoded and re-checked here; nothing recorded alongside
    ///   them is trusted.
    ///
    /// # Returns
    /// The updated record and what was done. Network errors are returned
    /// unchanged and are safe to retry by calling this again.
    pub async fn broadcast(&self, tx: &Transaction) -> TxResult<Broadcast> {
        // 1. State gate
        match tx.status {
            TxStatus::Signed | TxStatus::Sent | TxStatus::Failed => {}
            TxStatus::Confirmed => {
                tracing::warn!(txid = %tx.id(), "Transaction already confirmed, not sending");
                metrics::record_broadcast(BroadcastOutcome::AlreadyConfirmed.as_str());
                return Ok(Broadcast {
                    tx: tx.clone(),
                    outcome: BroadcastOutcome::AlreadyConfirmed,
                });
            }
            status => {
                return Err(StateError::InvalidTransition {
                    operation: "broadcast",
                    status,
                }
                .into())
            }
        }

        // 2. Decode the bytes that will be submitted: identifier, senders,
        //    payload and outputs all come from them
        let engine = self.engine;
        let adapter = engine.adapter();
        let tx = engine.reopen(tx.clone())?;
        let payload = tx.payload()?;
        let bytes = tx.signed_bytes()?;
        let txid = tx.id().to_string();

        // 3. Fee ceiling and chain, on the decoded payload
        let fee = adapter.fee_of(payload)?;
        check_bound(fee, engine.options().max_tx_fee, engine.fee_check_disabled(&tx))?;

        engine.check_chain(payload)?;
        if let Some(actual) = adapter.chain_id_of(payload) {
            let node = engine.rpc().get_chain_id().await?;
            if node != actual {
                tracing::error!(node, payload = actual, "Node is on a different chain");
                metrics::record_integrity_failure("chain");
                return Err(IntegrityError::ChainMismatch {
                    expected: node,
                    actual,
                }
                .into());
            }
        }

        // 4. Skip anything the network already has
        let pool = engine.rpc().get_pending_pool().await?;
        if pool.iter().any(|id| same_txid(id, &txid)) {
            tracing::warn!(txid = %txid, "Transaction already in mempool, not resubmitting");
            metrics::record_broadcast(BroadcastOutcome::AlreadyInMempool.as_str());
            let mut out = tx.clone();
            out.status = TxStatus::Sent;
            return Ok(Broadcast {
                tx: out,
                outcome: BroadcastOutcome::AlreadyInMempool,
            });
        }

        let receipt = engine.rpc().get_receipt(&txid).await?;
        if receipt.included {
            tracing::warn!(
                txid = %txid,
                block_height = ?receipt.block_height,
                "Transaction already confirmed, not resubmitting"
            );
            metrics::record_broadcast(BroadcastOutcome::AlreadyConfirmed.as_str());
            let mut out = tx.clone();
            out.status = TxStatus::Confirmed;
            out.execution = receipt.execution_status.map(Execution::from_status);
            return Ok(Broadcast {
                tx: out,
                outcome: BroadcastOutcome::AlreadyConfirmed,
            });
        }

        // 5. Submit once, unless simulating
        if self.config.simulate_only {
            tracing::info!(
                txid = %txid,
                fee = %describe_fee(fee, engine.units()),
                "Simulation passed, transaction not sent"
            );
            metrics::record_broadcast(BroadcastOutcome::Simulated.as_str());
            return Ok(Broadcast {
                tx: tx.clone(),
                outcome: BroadcastOutcome::Simulated,
            });
        }

        let returned = engine.rpc().submit(bytes).await?;
        if !same_txid(&returned, &txid) {
            tracing::error!(local = %txid, node = %returned, "Node returned a different transaction ID");
            metrics::record_integrity_failure("identifier");
            return Err(IntegrityError::IdentifierMismatch {
                recorded: txid,
                computed: returned,
            }
            .into());
        }

        // 6. Record when it was sent; a failed height lookup is not an error
        let sent_block = match engine.rpc().get_current_block_height().await {
            Ok(height) => Some(height),
            Err(e) => {
                tracing::warn!(error = %e, "Could not record send block height");
                None
            }
        };

        let mut out = tx.clone();
        out.status = TxStatus::Sent;
        out.timestamps.sent = Some(unix_now());
        out.timestamps.sent_block = sent_block;

        tracing::info!(
            txid = %txid,
            fee = %describe_fee(fee, engine.units()),
            sent_block = ?sent_block,
            "Transaction sent"
        );
        metrics::record_broadcast(BroadcastOutcome::Sent.as_str());
        metrics::record_transition(TxStatus::Sent);
        Ok(Broadcast {
            tx: out,
            outcome: BroadcastOutcome::Sent,
        })
    }
}
