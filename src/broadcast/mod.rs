//! Broadcast and status monitoring.
//!
//! # Data Flow
//! ```text
//! Signed transaction
//!     → sender.rs: wire bytes decoded and checked against the record
//!     → fee ceiling and chain ID checked on the decoded payload
//!     → pending pool / receipt lookup (skip if already known to the network)
//!     → submit, unless simulate-only
//!     → Sent (timestamp + block height)
//!     → monitor.rs: poll until Confirmed, Failed or timeout
//! ```
//!
//! # Design Decisions
//! - Inclusion is checked before submitting, so re-running a send after a
//!   partial failure never submits twice
//! - Simulate-only runs every check and stops short of `submit`
//! - A confirmed transaction whose contract execution failed is still
//!   Confirmed, with the execution outcome attached

pub mod monitor;
pub mod sender;

use serde::Serialize;

use crate::config::BroadcastConfig;
use crate::tx::{Execution, Transaction, TxEngine};

/// What a broadcast call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastOutcome {
    /// Submitted to the node.
    Sent,
    /// All checks passed; nothing was submitted.
    Simulated,
    /// Already in the node's pending pool; nothing was submitted.
    AlreadyInMempool,
    /// Already included in a block; nothing was submitted.
    AlreadyConfirmed,
}

impl BroadcastOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastOutcome::Sent => "sent",
            BroadcastOutcome::Simulated => "simulated",
            BroadcastOutcome::AlreadyInMempool => "already_in_mempool",
            BroadcastOutcome::AlreadyConfirmed => "already_confirmed",
        }
    }
}

/// Network state of a transaction as of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusReport {
    InMempool,
    Confirmed {
        block_height: u64,
        confirmations: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        execution: Option<Execution>,
    },
    NotFound,
}

/// Sends and tracks signed transactions through an engine's adapter and node.
pub struct Broadcaster<'a, R> {
    engine: &'a TxEngine<R>,
    config: BroadcastConfig,
}

impl<'a, R> Broadcaster<'a, R> {
    pub fn new(engine: &'a TxEngine<R>, config: BroadcastConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }
}

/// Result of [`Broadcaster::broadcast`]: the updated record and what happened.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub tx: Transaction,
    pub outcome: BroadcastOutcome,
}

/// Transaction IDs compare without prefix or case.
pub(crate) fn same_txid(a: &str, b: &str) -> bool {
    let strip = |s: &str| s.trim().trim_start_matches("0x").to_ascii_lowercase();
    strip(a) == strip(b)
}
