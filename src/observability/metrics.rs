//! Engine metrics.
//!
//! # Metrics
//! - `coldtx_transitions_total` (counter): lifecycle transitions by target status
//! - `coldtx_broadcasts_total` (counter): send attempts by outcome
//! - `coldtx_integrity_failures_total` (counter): rejected mappings, signatures, identifiers
//! - `coldtx_rpc_calls_total` (counter): node queries by name and result
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; exporting is the embedder's choice
//! - Label values are static strings, never addresses or amounts

use crate::tx::TxStatus;

pub fn record_transition(status: TxStatus) {
    metrics::counter!("coldtx_transitions_total", "status" => status.as_str()).increment(1);
}

pub fn record_broadcast(outcome: &'static str) {
    metrics::counter!("coldtx_broadcasts_total", "outcome" => outcome).increment(1);
}

pub fn record_integrity_failure(kind: &'static str) {
    metrics::counter!("coldtx_integrity_failures_total", "kind" => kind).increment(1);
}

pub fn record_rpc_call(query: &'static str, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    metrics::counter!("coldtx_rpc_calls_total", "query" => query, "result" => result).increment(1);
}
