//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use std::sync::Arc;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::chain::{AccountAdapter, ChainAdapter, ChainFamily, UtxoAdapter};
use crate::tx::TxOptions;
use crate::units::{parse_amount, AdjustmentFactor, UnitError, UnitTable};

/// Root configuration for the transaction engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Target chain.
    pub network: NetworkConfig,

    /// Node connection.
    pub rpc: RpcConfig,

    /// Fee policy and work estimates.
    pub fees: FeeConfig,

    /// Send and confirmation behaviour.
    pub broadcast: BroadcastConfig,

    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Denominations of the configured chain family. `network.coin` does not
    /// affect them.
    pub fn units(&self) -> UnitTable {
        UnitTable::for_family(self.network.family)
    }

    /// Chain adapter for the configured family, with configured work constants.
    pub fn adapter(&self) -> Arc<dyn ChainAdapter> {
        match self.network.family {
            ChainFamily::Account => Arc::new(AccountAdapter {
                transfer_gas: self.fees.transfer_gas,
                token_gas: self.fees.token_gas,
                contract_gas: self.fees.contract_gas,
            }),
            ChainFamily::Utxo => Arc::new(UtxoAdapter {
                network: self.network.utxo_network,
                overhead_bytes: self.fees.utxo_overhead_bytes,
                bytes_per_input: self.fees.utxo_bytes_per_input,
                bytes_per_output: self.fees.utxo_bytes_per_output,
            }),
        }
    }

    /// Fee options for the lifecycle engine.
    pub fn tx_options(&self) -> Result<TxOptions, UnitError> {
        Ok(TxOptions {
            disable_fee_check: self.fees.disable_fee_check,
            fee_adjustment_factor: self.fees.fee_adjustment_factor,
            max_tx_fee: self.fees.max_tx_fee(self.network.family)?,
            gas_limit_override: self.fees.gas_limit_override,
        })
    }
}

/// Target chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// `account` or `utxo`.
    pub family: ChainFamily,

    /// Coin symbol shown in logs. Display only: denominations and amount
    /// parsing follow `family`, so an Ethereum-compatible chain with its own
    /// ticker still takes amounts in ETH units (wei, Gwei, ETH).
    pub coin: String,

    /// Expected chain ID. Checked before signing and before sending.
    pub chain_id: Option<u64>,

    /// Address network for UTXO chains.
    pub utxo_network: bitcoin::Network,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            family: ChainFamily::Account,
            coin: "ETH".to_string(),
            chain_id: None,
            utxo_network: bitcoin::Network::Bitcoin,
        }
    }
}

/// Node connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL.
    pub url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// RPC request timeout in seconds.
    pub timeout_secs: u64,

    /// Whether the node answers pending-pool queries.
    pub mempool_query: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            timeout_secs: 10,
            mempool_query: false,
        }
    }
}

/// Fee policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Skip the maximum-fee check entirely.
    pub disable_fee_check: bool,

    /// Multiplier for network fee estimates, e.g. "1.2" or "6/5".
    pub fee_adjustment_factor: AdjustmentFactor,

    /// Fee ceiling in the coin unit. Defaults per chain family when unset.
    pub max_tx_fee: Option<String>,

    /// Replaces the work estimate for every transaction.
    pub gas_limit_override: Option<u64>,

    pub transfer_gas: u64,
    pub token_gas: u64,
    /// Gas for transactions carrying user contract data.
    pub contract_gas: u64,

    pub utxo_overhead_bytes: u64,
    pub utxo_bytes_per_input: u64,
    pub utxo_bytes_per_output: u64,
}

impl FeeConfig {
    /// The fee ceiling in base units.
    pub fn max_tx_fee(&self, family: ChainFamily) -> Result<U256, UnitError> {
        let default = match family {
            ChainFamily::Account => "0.005",
            ChainFamily::Utxo => "0.003",
        };
        let value = self.max_tx_fee.as_deref().unwrap_or(default);
        parse_amount(value, UnitTable::for_family(family).coin())
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            disable_fee_check: false,
            fee_adjustment_factor: AdjustmentFactor::ONE,
            max_tx_fee: None,
            gas_limit_override: None,
            transfer_gas: crate::chain::account::TRANSFER_GAS,
            token_gas: crate::chain::account::TOKEN_GAS,
            contract_gas: crate::chain::account::CONTRACT_GAS,
            utxo_overhead_bytes: crate::chain::utxo::OVERHEAD_BYTES,
            utxo_bytes_per_input: crate::chain::utxo::BYTES_PER_INPUT,
            utxo_bytes_per_output: crate::chain::utxo::BYTES_PER_OUTPUT,
        }
    }
}

/// Send and confirmation behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Run every pre-send check, then stop short of submitting.
    pub simulate_only: bool,

    /// Interval between status polls in seconds.
    pub poll_interval_secs: u64,

    /// Confirmations required before `wait_for_confirmation` returns.
    pub confirmations: u64,

    /// Give up waiting for confirmation after this many seconds.
    pub confirm_timeout_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            simulate_only: false,
            poll_interval_secs: 5,
            confirmations: 1,
            confirm_timeout_secs: 300,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,

    /// JSON output instead of human-readable lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
