//! Network collaborator interface.
//!
//! # Responsibilities
//! - Define the queries the lifecycle engine makes against a node
//! - Carry the name of the failing query in every error
//!
//! # Design Decisions
//! - Read queries fail over between providers; submission never does.
//!   Nothing at this layer retries
//! - Transaction IDs cross this boundary in the adapter's own format
//!   (lowercase hex without prefix for account chains)

pub mod client;

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::EthRpcClient;

/// Errors from node queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("{query} timed out after {secs}s")]
    Timeout { query: &'static str, secs: u64 },

    #[error("{query} failed: {message}")]
    Transport { query: &'static str, message: String },

    #[error("{query} returned an unusable response: {message}")]
    Response { query: &'static str, message: String },
}

impl RpcError {
    /// Name of the query that failed.
    pub fn query(&self) -> &'static str {
        match self {
            RpcError::Timeout { query, .. }
            | RpcError::Transport { query, .. }
            | RpcError::Response { query, .. } => query,
        }
    }
}

/// Result type for node queries.
pub type RpcResult<T> = Result<T, RpcError>;

/// Inclusion and execution state of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub included: bool,
    pub block_height: Option<u64>,
    /// `Some(false)` when the chain reports a failed contract execution.
    pub execution_status: Option<bool>,
    pub contract_address: Option<String>,
}

impl Receipt {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn included_at(block_height: u64) -> Self {
        Self {
            included: true,
            block_height: Some(block_height),
            execution_status: None,
            contract_address: None,
        }
    }

    pub fn with_execution(mut self, succeeded: bool) -> Self {
        self.execution_status = Some(succeeded);
        self
    }
}

/// Queries the lifecycle engine makes against a node.
#[async_trait]
pub trait NetworkRpc: Send + Sync {
    async fn get_next_nonce(&self, address: &str) -> RpcResult<u64>;

    async fn get_chain_id(&self) -> RpcResult<u64>;

    /// Current fee rate in base units per unit of work.
    async fn get_fee_rate_estimate(&self) -> RpcResult<U256>;

    /// Submit signed wire bytes; returns the identifier the node assigned.
    async fn submit(&self, signed: &[u8]) -> RpcResult<String>;

    async fn get_receipt(&self, txid: &str) -> RpcResult<Receipt>;

    /// Identifiers currently in the node's pending pool.
    async fn get_pending_pool(&self) -> RpcResult<HashSet<String>>;

    /// Whether an empty pending pool means the transaction is really gone.
    fn supports_pending_pool(&self) -> bool {
        true
    }

    async fn get_current_block_height(&self) -> RpcResult<u64>;
}

#[async_trait]
impl<T: NetworkRpc + ?Sized> NetworkRpc for Arc<T> {
    async fn get_next_nonce(&self, address: &str) -> RpcResult<u64> {
        (**self).get_next_nonce(address).await
    }

    async fn get_chain_id(&self) -> RpcResult<u64> {
        (**self).get_chain_id().await
    }

    async fn get_fee_rate_estimate(&self) -> RpcResult<U256> {
        (**self).get_fee_rate_estimate().await
    }

    async fn submit(&self, signed: &[u8]) -> RpcResult<String> {
        (**self).submit(signed).await
    }

    async fn get_receipt(&self, txid: &str) -> RpcResult<Receipt> {
        (**self).get_receipt(txid).await
    }

    async fn get_pending_pool(&self) -> RpcResult<HashSet<String>> {
        (**self).get_pending_pool().await
    }

    fn supports_pending_pool(&self) -> bool {
        (**self).supports_pending_pool()
    }

    async fn get_current_block_height(&self) -> RpcResult<u64> {
        (**self).get_current_block_height().await
    }
}

/// Stand-in for the air-gapped signing machine: every query fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRpc;

impl OfflineRpc {
    fn unavailable<T>(query: &'static str) -> RpcResult<T> {
        Err(RpcError::Transport {
            query,
            message: "no network access in offline mode".to_string(),
        })
    }
}

#[async_trait]
impl NetworkRpc for OfflineRpc {
    async fn get_next_nonce(&self, _address: &str) -> RpcResult<u64> {
        Self::unavailable("getNextNonce")
    }

    async fn get_chain_id(&self) -> RpcResult<u64> {
        Self::unavailable("getChainId")
    }

    async fn get_fee_rate_estimate(&self) -> RpcResult<U256> {
        Self::unavailable("getFeeRateEstimate")
    }

    async fn submit(&self, _signed: &[u8]) -> RpcResult<String> {
        Self::unavailable("submit")
    }

    async fn get_receipt(&self, _txid: &str) -> RpcResult<Receipt> {
        Self::unavailable("getReceipt")
    }

    async fn get_pending_pool(&self) -> RpcResult<HashSet<String>> {
        Self::unavailable("getPendingPool")
    }

    async fn get_current_block_height(&self) -> RpcResult<u64> {
        Self::unavailable("getCurrentBlockHeight")
    }
}
