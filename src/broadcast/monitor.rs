//! Confirmation monitoring.

use std::time::Duration;

use tokio::time::{interval, timeout};

use crate::broadcast::{same_txid, Broadcaster, StatusReport};
use crate::error::{StateError, TxResult};
use crate::observability::metrics;
use crate::rpc::{NetworkRpc, RpcError};
use crate::tx::{Execution, Transaction, TxStatus};

impl<'a, R: NetworkRpc> Broadcaster<'a, R> {
    /// One status check. Returns the record updated to what the network reports.
    ///
    /// A Sent transaction that is neither pending nor included becomes Failed,
    /// but only when the node can report its pending pool.
    ///
    /// # Arguments
    /// * `tx` - A record that has been signed; its coin transaction ID is queried
    ///
    /// # Returns
    /// The updated record and the report it was derived from.
    pub async fn poll_status(&self, tx: &Transaction) -> TxResult<(Transaction, StatusReport)> {
        if !tx.status.is_signed() {
            return Err(StateError::InvalidTransition {
                operation: "poll",
                status: tx.status,
            }
            .into());
        }
        let rpc = self.engine.rpc();
        let txid = tx.id().to_string();
        let mut out = tx.clone();

        // 1. Included in a block?
        let receipt = rpc.get_receipt(&txid).await?;
        if receipt.included {
            let current = rpc.get_current_block_height().await?;
            let block_height = receipt.block_height.unwrap_or(current);
            let confirmations = current.saturating_sub(block_height) + 1;
            let execution = receipt.execution_status.map(Execution::from_status);

            if execution == Some(Execution::Failed) {
                tracing::warn!(txid = %txid, block_height, "Transaction confirmed but contract execution failed");
            } else {
                tracing::info!(txid = %txid, block_height, confirmations, "Transaction confirmed");
            }
            if out.status != TxStatus::Confirmed {
                metrics::record_transition(TxStatus::Confirmed);
            }
            out.status = TxStatus::Confirmed;
            out.execution = execution;
            if out.created_contract.is_none() {
                out.created_contract = receipt.contract_address;
            }
            return Ok((
                out,
                StatusReport::Confirmed {
                    block_height,
                    confirmations,
                    execution,
                },
            ));
        }

        // 2. Still pending?
        let pool = rpc.get_pending_pool().await?;
        if pool.iter().any(|id| same_txid(id, &txid)) {
            tracing::debug!(txid = %txid, "Transaction pending");
            if out.status != TxStatus::Confirmed {
                out.status = TxStatus::Sent;
            }
            return Ok((out, StatusReport::InMempool));
        }

        // 3. Neither: dropped, if the node's pool answer can be believed
        if out.status == TxStatus::Sent && rpc.supports_pending_pool() {
            tracing::warn!(txid = %txid, "Transaction neither pending nor confirmed, marking failed");
            out.status = TxStatus::Failed;
            metrics::record_transition(TxStatus::Failed);
        } else {
            tracing::info!(txid = %txid, status = %out.status, "Transaction not found on the network");
        }
        Ok((out, StatusReport::NotFound))
    }

    /// Poll until the configured number of confirmations, a failure, or the timeout.
    ///
    /// # Arguments
    /// * `tx` - A Sent (or later) record
    ///
    /// # Errors
    /// `RpcError::Timeout` for `waitForConfirmation` when the deadline passes;
    /// the last polled state is not returned in that case.
    pub async fn wait_for_confirmation(&self, tx: &Transaction) -> TxResult<(Transaction, StatusReport)> {
        let required = self.config.confirmations.max(1);
        let timeout_secs = self.config.confirm_timeout_secs;
        let poll_interval = Duration::from_secs(self.config.poll_interval_secs.max(1));

        let result: Result<TxResult<_>, _> = timeout(Duration::from_secs(timeout_secs), async {
            let mut ticker = interval(poll_interval);
            let mut current = tx.clone();

            loop {
                ticker.tick().await;

                let (next, report) = self.poll_status(&current).await?;
                current = next;
                match report {
                    StatusReport::Confirmed { confirmations, .. } if confirmations >= required => {
                        return Ok((current, report));
                    }
                    StatusReport::Confirmed { confirmations, .. } => {
                        tracing::debug!(
                            txid = %current.id(),
                            confirmations,
                            required,
                            "Waiting for confirmations"
                        );
                    }
                    _ if current.status == TxStatus::Failed => return Ok((current, report)),
                    _ => {}
                }
            }
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(RpcError::Timeout {
                query: "waitForConfirmation",
                secs: timeout_secs,
            }
            .into()),
        }
    }
}
