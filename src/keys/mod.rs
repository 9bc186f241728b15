//! Key resolution subsystem.
//!
//! # Data Flow
//! ```text
//! transaction inputs (address + optional wallet ID)
//!     → resolver.rs (precedence-ordered lookup)
//!         → sources.rs (key-address file, raw keylist, seed derivation)
//!     → address re-derived from every candidate key and compared
//!     → KeyRing of verified KeyMaterial, dropped right after signing
//! ```
//!
//! # Security Constraints
//! - Addresses embedded in files are claims; only re-derivation is trusted
//! - A mismatch is fatal, never skipped or corrected
//! - Secrets are never logged or serialized

pub mod material;
pub mod resolver;
pub mod sources;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::IntegrityError;

pub use material::{KeyCandidate, KeyMaterial, KeyRing, SecretKey};
pub use resolver::{missing, KeyResolver, Requirement};
pub use sources::{KeyAddrFile, KeySource, RawKeylist, SeedDeriver, SeedSource, SourceKind};

/// Errors raised while obtaining signing keys.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no key found for: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("invalid wallet identifier '{0}'")]
    InvalidWalletId(String),

    #[error("key source '{source_name}' failed: {reason}")]
    Source { source_name: String, reason: String },

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

/// Result type for key operations.
pub type KeyResult<T> = Result<T, KeyError>;

/// Deterministic-wallet path tag: `SEEDID:TYPE:INDEX` (type letter optional).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletId {
    seed_id: String,
    addr_type: Option<char>,
    index: u32,
}

impl WalletId {
    pub fn new(seed_id: &str, addr_type: Option<char>, index: u32) -> KeyResult<Self> {
        let raw = || match addr_type {
            Some(t) => format!("{}:{}:{}", seed_id, t, index),
            None => format!("{}:{}", seed_id, index),
        };
        if seed_id.len() != 8 || !seed_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(KeyError::InvalidWalletId(raw()));
        }
        if index == 0 || addr_type.is_some_and(|t| !t.is_ascii_uppercase()) {
            return Err(KeyError::InvalidWalletId(raw()));
        }
        Ok(Self {
            seed_id: seed_id.to_ascii_uppercase(),
            addr_type,
            index,
        })
    }

    pub fn seed_id(&self) -> &str {
        &self.seed_id
    }

    pub fn addr_type(&self) -> Option<char> {
        self.addr_type
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl FromStr for WalletId {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KeyError::InvalidWalletId(s.to_string());
        let parts: Vec<&str> = s.split(':').collect();
        let (seed_id, addr_type, index) = match parts.as_slice() {
            [seed, idx] => (*seed, None, *idx),
            [seed, t, idx] => {
                let mut chars = t.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => (*seed, Some(c), *idx),
                    _ => return Err(invalid()),
                }
            }
            _ => return Err(invalid()),
        };
        let index = index.parse().map_err(|_| invalid())?;
        Self::new(seed_id, addr_type, index)
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr_type {
            Some(t) => write!(f, "{}:{}:{}", self.seed_id, t, self.index),
            None => write!(f, "{}:{}", self.seed_id, self.index),
        }
    }
}

impl TryFrom<String> for WalletId {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WalletId> for String {
    fn from(id: WalletId) -> Self {
        id.to_string()
    }
}

/// What a key is requested for: a wallet path, or a bare address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SigningId {
    Wallet(WalletId),
    Address(String),
}

impl fmt::Display for SigningId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningId::Wallet(id) => id.fmt(f),
            SigningId::Address(addr) => f.write_str(addr),
        }
    }
}
