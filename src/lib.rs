//! Cold-wallet transaction engine.
//!
//! Builds, signs and broadcasts transactions for account-model (Ethereum
//! legacy) and UTXO-model (Bitcoin P2PKH) chains, with signing designed to
//! run on an offline machine.
//!
//! # Architecture Overview
//!
//! ```text
//!   online machine                 air gap                offline machine
//!  ┌──────────────────────┐                          ┌──────────────────────┐
//!  │ create_draft         │                          │                      │
//!  │ materialize ◀── rpc  │ ── Unsigned record ───▶  │ sign ◀── keys        │
//!  │ (nonce, fee, change) │                          │ (resolve + verify)   │
//!  │                      │ ◀── Signed record ─────  │                      │
//!  │ broadcast ──▶ rpc    │                          └──────────────────────┘
//!  │ poll_status / bump   │
//!  └──────────────────────┘
//!
//!  units ─ chain (adapters) ─ keys ─ tx (engine) ─ broadcast
//!                    cross-cutting: config, observability, error
//! ```

// Core model
pub mod chain;
pub mod tx;
pub mod units;

// Signing and network
pub mod broadcast;
pub mod keys;
pub mod rpc;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod observability;

pub use broadcast::{Broadcast, BroadcastOutcome, Broadcaster, StatusReport};
pub use chain::{AccountAdapter, ChainAdapter, ChainFamily, Payload, UtxoAdapter};
pub use config::EngineConfig;
pub use error::{ErrorKind, TxError, TxResult};
pub use tx::{Transaction, TxEngine, TxOptions, TxStatus};
