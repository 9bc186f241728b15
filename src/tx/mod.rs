//! Transaction lifecycle.
//!
//! # Data Flow
//! ```text
//! create_draft ──▶ Draft
//!                    │ materialize (fee, nonce, chain ID, change)
//!                    ▼
//!                 Unsigned ── checksum identifier
//!                    │ sign (key resolution, sender check)
//!                    ▼
//!                 Signed ── coin txid ──▶ broadcast ──▶ Sent ──▶ Confirmed | Failed
//!                    │
//!                    └─ bump ──▶ new Draft (same inputs, pinned nonce, higher fee)
//! ```
//!
//! # Design Decisions
//! - The payload and fee of a signed transaction are never edited; a fee
//!   change is a new transaction
//! - Fee options are an explicit value on the engine, not global state
//! - Callers serialize signing sessions per account; the engine holds no
//!   nonce lock

pub mod bump;
pub mod engine;
pub mod options;
pub mod summary;
pub mod types;

pub use engine::TxEngine;
pub use options::TxOptions;
pub use summary::{format_summary, SummaryOutput, TokenSummary, TxSummary};
pub use types::{
    CallSpec, Execution, Input, Output, Replacement, SpendRef, Timestamps, Transaction, TxIdentifier,
    TxStatus,
};
