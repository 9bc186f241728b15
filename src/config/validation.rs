//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, gas constants > 0)
//! - Check the coin and fee ceiling against the chain family
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::chain::ChainFamily;
use crate::config::schema::EngineConfig;
use crate::units::UnitTable;

/// A single configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Check every section, collecting all problems.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Any ticker is accepted except the coin unit of the other family.
    let other_family = match config.network.family {
        ChainFamily::Account => ChainFamily::Utxo,
        ChainFamily::Utxo => ChainFamily::Account,
    };
    let coin = config.network.coin.as_str();
    let coin_ok = !coin.is_empty()
        && coin.chars().all(|c| c.is_ascii_alphanumeric())
        && !UnitTable::for_family(other_family).coin().name.eq_ignore_ascii_case(coin);
    if !coin_ok {
        errors.push(ValidationError::new(
            "network.coin",
            format!("'{}' is not a {} coin", config.network.coin, config.network.family),
        ));
    }
    if config.network.chain_id == Some(0) {
        errors.push(ValidationError::new("network.chain_id", "must be greater than 0"));
    }
    if config.network.family == ChainFamily::Utxo && config.network.chain_id.is_some() {
        errors.push(ValidationError::new("network.chain_id", "UTXO chains have no chain ID"));
    }

    if let Err(e) = config.rpc.url.parse::<url::Url>() {
        errors.push(ValidationError::new("rpc.url", format!("invalid URL: {}", e)));
    }
    for url in &config.rpc.failover_urls {
        if url.parse::<url::Url>().is_err() {
            errors.push(ValidationError::new("rpc.failover_urls", format!("invalid URL '{}'", url)));
        }
    }
    if config.rpc.timeout_secs == 0 {
        errors.push(ValidationError::new("rpc.timeout_secs", "must be greater than 0"));
    }

    if let Err(e) = config.fees.max_tx_fee(config.network.family) {
        errors.push(ValidationError::new("fees.max_tx_fee", e.to_string()));
    }
    if config.fees.gas_limit_override == Some(0) {
        errors.push(ValidationError::new("fees.gas_limit_override", "must be greater than 0"));
    }
    let work_constants = [
        ("fees.transfer_gas", config.fees.transfer_gas),
        ("fees.token_gas", config.fees.token_gas),
        ("fees.contract_gas", config.fees.contract_gas),
        ("fees.utxo_bytes_per_input", config.fees.utxo_bytes_per_input),
        ("fees.utxo_bytes_per_output", config.fees.utxo_bytes_per_output),
    ];
    for (field, value) in work_constants {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if config.broadcast.poll_interval_secs == 0 {
        errors.push(ValidationError::new("broadcast.poll_interval_secs", "must be greater than 0"));
    }
    if config.broadcast.confirmations == 0 {
        errors.push(ValidationError::new("broadcast.confirmations", "must be at least 1"));
    }
    if config.broadcast.confirm_timeout_secs < config.broadcast.poll_interval_secs {
        errors.push(ValidationError::new(
            "broadcast.confirm_timeout_secs",
            "must not be shorter than the poll interval",
        ));
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "logging.level",
            format!("unknown level '{}'", config.logging.level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
