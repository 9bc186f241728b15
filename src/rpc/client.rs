//! Ethereum JSON-RPC client with timeout and failover.
//!
//! # Responsibilities
//! - Connect to the primary endpoint plus any failover endpoints
//! - Bound every query with a timeout
//! - Map node responses onto the `NetworkRpc` vocabulary
//!
//! # Design Decisions
//! - Queries try providers in order; the first answer wins
//! - Submission goes to the primary endpoint once. Resending after a timeout
//!   is left to the idempotent broadcast path, which checks the pool first
//! - A query that timed out everywhere is reported as `Timeout`, anything
//!   else as `Transport` with the last provider error

use std::collections::HashSet;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::hex;
use alloy::network::ReceiptResponse;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::transports::TransportError;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::timeout;

use crate::config::RpcConfig;
use crate::observability::metrics;
use crate::rpc::{NetworkRpc, Receipt, RpcError, RpcResult};

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Entry of `parity_pendingTransactions`; only the hash is needed.
#[derive(Debug, Deserialize)]
struct PendingTx {
    hash: B256,
}

/// Node client over one or more HTTP endpoints.
#[derive(Clone)]
pub struct EthRpcClient {
    providers: Vec<DynProvider>,
    timeout_duration: Duration,
    mempool_query: bool,
    url: String,
}

/// Account-chain transaction IDs are lowercase hex without the `0x` prefix.
pub fn normalize_txid(txid: &str) -> String {
    txid.trim().trim_start_matches("0x").to_ascii_lowercase()
}

impl EthRpcClient {
    /// Build a client from configuration. No request is made here.
    ///
    /// # Arguments
    /// * `config` - Primary URL, failover URLs, per-query timeout and whether
    ///   the node answers pending-pool queries
    ///
    /// # Errors
    /// An unparseable primary URL. Bad failover URLs are logged and skipped.
    pub fn new(config: &RpcConfig) -> RpcResult<Self> {
        let mut providers = Vec::new();

        // 1. Primary endpoint

        let primary: url::Url = config.url.parse().map_err(|e| RpcError::Transport {
            query: "connect",
            message: format!("invalid RPC URL '{}': {}", config.url, e),
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary)) as DynProvider);

        // 2. Failovers, in configured order
        for url_str in &config.failover_urls {
            match url_str.parse::<url::Url>() {
                Ok(url) => providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        tracing::info!(
            rpc_url = %config.url,
            failovers = providers.len() - 1,
            timeout_secs = config.timeout_secs,
            "RPC client initialized"
        );

        Ok(Self {
            providers,
            timeout_duration: Duration::from_secs(config.timeout_secs),
            mempool_query: config.mempool_query,
            url: config.url.clone(),
        })
    }

    /// Run a read-only query against each provider in turn until one answers.
    ///
    /// # Arguments
    /// * `query` - Name reported in errors, logs and metrics
    /// * `call` - The request, given a provider
    async fn with_failover<T, F, Fut>(&self, query: &'static str, call: F) -> RpcResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut last_error = None;
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, call(provider.clone())).await {
                Ok(Ok(result)) => {
                    metrics::record_rpc_call(query, true);
                    return Ok(result);
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, query, error = %e, "RPC error, trying next provider");
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, query, "RPC timeout, trying next provider");
                }
            }
        }
        metrics::record_rpc_call(query, false);
        Err(match last_error {
            Some(message) => RpcError::Transport { query, message },
            None => RpcError::Timeout {
                query,
                secs: self.timeout_duration.as_secs(),
            },
        })
    }

    /// Run a request once, against the primary provider only.
    async fn on_primary<T, F, Fut>(&self, query: &'static str, call: F) -> RpcResult<T>
    where
        F: FnOnce(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let Some(provider) = self.providers.first() else {
            return Err(RpcError::Transport {
                query,
                message: "no RPC endpoint configured".to_string(),
            });
        };
        let result = match timeout(self.timeout_duration, call(provider.clone())).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(RpcError::Transport {
                query,
                message: e.to_string(),
            }),
            Err(_) => Err(RpcError::Timeout {
                query,
                secs: self.timeout_duration.as_secs(),
            }),
        };
        metrics::record_rpc_call(query, result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(query, error = %e, "RPC request to primary endpoint failed");
        }
        result
    }
}

#[async_trait]
impl NetworkRpc for EthRpcClient {
    /// Next nonce for `address`, counting pending transactions.
    ///
    /// # Arguments
    /// * `address` - Hex account address; checksum case is not required
    async fn get_next_nonce(&self, address: &str) -> RpcResult<u64> {
        let query = "getNextNonce";
        let address = Address::from_str(address).map_err(|e| RpcError::Response {
            query,
            message: format!("invalid address '{}': {}", address, e),
        })?;
        self.with_failover(query, |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn get_chain_id(&self) -> RpcResult<u64> {
        self.with_failover("getChainId", |p| async move { p.get_chain_id().await })
            .await
    }

    async fn get_fee_rate_estimate(&self) -> RpcResult<U256> {
        let gas_price = self
            .with_failover("getFeeRateEstimate", |p| async move { p.get_gas_price().await })
            .await?;
        Ok(U256::from(gas_price))
    }

    /// Hand signed wire bytes to the primary node.
    ///
    /// # Arguments
    /// * `signed` - Native encoding of a signed transaction
    ///
    /// # Returns
    /// The transaction hash the node reports, lowercase hex without prefix.
    /// There is no failover: after a timeout the transaction may or may not
    /// have reached the node, and only a fresh pool check can tell.
    async fn submit(&self, signed: &[u8]) -> RpcResult<String> {
        let raw = signed.to_vec();
        let hash = self
            .on_primary("submit", |p| async move {
                let pending = p.send_raw_transaction(&raw).await?;
                Ok::<_, TransportError>(*pending.tx_hash())
            })
            .await?;
        Ok(hex::encode(hash))
    }

    /// Inclusion and execution status of one transaction.
    ///
    /// # Arguments
    /// * `txid` - Transaction hash, with or without `0x`
    ///
    /// # Returns
    /// `Receipt::not_found()` for unknown and not-yet-mined transactions.
    async fn get_receipt(&self, txid: &str) -> RpcResult<Receipt> {
        let query = "getReceipt";

        // 1. Parse the hash locally; a bad one never reaches the node
        let hash = B256::from_str(&normalize_txid(txid)).map_err(|e| RpcError::Response {
            query,
            message: format!("invalid transaction hash '{}': {}", txid, e),
        })?;
        // 2. Fetch the receipt
        let receipt = self
            .with_failover(query, |p| async move { p.get_transaction_receipt(hash).await })
            .await?;

        // 3. Only a receipt with a block number counts as included

        Ok(match receipt {
            Some(r) if r.block_number().is_some() => Receipt {
                included: true,
                block_height: r.block_number(),
                execution_status: Some(r.status()),
                contract_address: r.contract_address().map(|a| a.to_checksum(None)),
            },
            _ => Receipt::not_found(),
        })
    }

    /// Hashes in the node's pending pool, via `parity_pendingTransactions`.
    /// Empty when `mempool_query` is off.
    async fn get_pending_pool(&self) -> RpcResult<HashSet<String>> {
        if !self.mempool_query {
            return Ok(HashSet::new());
        }
        let pending: Vec<PendingTx> = self
            .with_failover("getPendingPool", |p| async move {
                p.client()
                    .request_noparams::<Vec<PendingTx>>("parity_pendingTransactions")
                    .await
            })
            .await?;
        Ok(pending.into_iter().map(|tx| hex::encode(tx.hash)).collect())
    }

    fn supports_pending_pool(&self) -> bool {
        self.mempool_query
    }

    async fn get_current_block_height(&self) -> RpcResult<u64> {
        self.with_failover("getCurrentBlockHeight", |p| async move { p.get_block_number().await })
            .await
    }
}

impl std::fmt::Debug for EthRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthRpcClient")
            .field("rpc_url", &self.url)
            .field("providers", &self.providers.len())
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}
