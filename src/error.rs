//! Error taxonomy for the transaction engine.
//!
//! # Kinds
//! - Validation: bad parameters, detected before any network or signing work
//! - Integrity: mapping, identifier, sender or chain mismatches; always fatal
//! - Network: RPC failures, surfaced with the query that failed
//! - State: an operation was requested in a state that does not allow it
//!
//! No operation in this crate retries on its own. `TxError::is_retryable`
//! tells the caller which failures a retry can fix.

use alloy::primitives::U256;
use thiserror::Error;

use crate::keys::KeyError;
use crate::rpc::RpcError;
use crate::tx::types::TxStatus;
use crate::units::{FeeTooLarge, UnitError};

/// Coarse classification used by callers to pick a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Integrity,
    Network,
    State,
}

/// Errors caused by caller-supplied parameters.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("transaction has {actual} input(s), {expected} required")]
    InvalidInputCount { expected: usize, actual: usize },

    #[error("transaction has {actual} output(s), {expected} required")]
    InvalidOutputCount { expected: usize, actual: usize },

    #[error(transparent)]
    FeeTooLarge(#[from] FeeTooLarge),

    #[error("fee {fee} is below the minimum replacement fee {minimum}")]
    FeeTooSmall { fee: U256, minimum: U256 },

    #[error("insufficient funds: inputs total {available}, outputs plus fee need {required}")]
    InsufficientFunds { available: U256, required: U256 },

    #[error("{leftover} left over after outputs and fee, but no change output was given")]
    MissingChangeOutput { leftover: U256 },

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid contract data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// Errors indicating corrupted or adversarial data.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("address mapping mismatch for {identifier}: claimed {claimed}, key derives {derived}")]
    MappingIntegrity {
        identifier: String,
        claimed: String,
        derived: String,
    },

    #[error("identifier mismatch: recorded {recorded}, computed {computed}")]
    IdentifierMismatch { recorded: String, computed: String },

    #[error("sender recovered from signature ({recovered}) does not match input address ({claimed})")]
    SignatureSenderMismatch { claimed: String, recovered: String },

    #[error("chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("signed data does not match the transaction record: {0}")]
    PayloadMismatch(String),

    #[error("malformed transaction data: {0}")]
    Malformed(String),
}

/// Errors raised when the transaction is in the wrong lifecycle state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot {operation} a transaction in state {status}")]
    InvalidTransition {
        operation: &'static str,
        status: TxStatus,
    },

    #[error("transaction {0} is not fee-replaceable")]
    NotReplaceable(String),

    #[error("transaction {0} is already confirmed")]
    AlreadyConfirmed(String),

    #[error("transaction has no {0}")]
    Missing(&'static str),
}

/// Top-level error returned by every public lifecycle operation.
#[derive(Debug, Error)]
pub enum TxError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Network(#[from] RpcError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Key(#[from] KeyError),
}

impl TxError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TxError::Validation(_) => ErrorKind::Validation,
            TxError::Integrity(_) => ErrorKind::Integrity,
            TxError::Network(_) => ErrorKind::Network,
            TxError::State(_) => ErrorKind::State,
            TxError::Key(KeyError::Integrity(_)) => ErrorKind::Integrity,
            TxError::Key(_) => ErrorKind::Validation,
        }
    }

    /// Only network failures can succeed on a plain retry.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Network
    }
}

impl From<UnitError> for TxError {
    fn from(e: UnitError) -> Self {
        TxError::Validation(ValidationError::Unit(e))
    }
}

impl From<FeeTooLarge> for TxError {
    fn from(e: FeeTooLarge) -> Self {
        TxError::Validation(ValidationError::FeeTooLarge(e))
    }
}

/// Result type for lifecycle operations.
pub type TxResult<T> = Result<T, TxError>;
