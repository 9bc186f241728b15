//! Private keys and verified key material.
//!
//! # Security
//! - `SecretKey` never prints its bytes, not even in `Debug`
//! - `KeyMaterial` can only be built by the resolver, after the address
//!   derived from the key has been checked against the claimed one

use std::fmt;

use alloy::hex;
use alloy::primitives::B256;
use bitcoin::secp256k1;

use crate::chain::AddressDeriver;
use crate::keys::{KeyError, KeyResult, SigningId};

/// A raw secp256k1 private key.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    /// Wrap 32 bytes, rejecting values outside the curve order.
    pub fn from_bytes(bytes: [u8; 32]) -> KeyResult<Self> {
        secp256k1::SecretKey::from_slice(&bytes)
            .map_err(|e| KeyError::InvalidKey(format!("out of range: {}", e)))?;
        Ok(Self(bytes))
    }

    /// Parse a hex-encoded key (with or without 0x prefix).
    pub fn from_hex(key_hex: &str) -> KeyResult<Self> {
        let key_hex = key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);
        let bytes = hex::decode_to_array::<_, 32>(key_hex)
            .map_err(|e| KeyError::InvalidKey(format!("invalid hex key: {}", e)))?;
        Self::from_bytes(bytes)
    }

    /// Parse a Wallet Import Format key.
    pub fn from_wif(wif: &str) -> KeyResult<Self> {
        let key = bitcoin::PrivateKey::from_wif(wif.trim())
            .map_err(|e| KeyError::InvalidKey(format!("invalid WIF key: {}", e)))?;
        Ok(Self(key.inner.secret_bytes()))
    }

    /// Accept either a 64-digit hex key or WIF.
    pub fn parse(key: &str) -> KeyResult<Self> {
        let trimmed = key.trim();
        let bare = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if bare.len() == 64 && bare.chars().all(|c| c.is_ascii_hexdigit()) {
            Self::from_hex(bare)
        } else {
            Self::from_wif(trimmed)
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub(crate) fn to_b256(&self) -> B256 {
        B256::from(self.0)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// A key offered by a source, together with the address the source says it controls.
#[derive(Debug, Clone)]
pub struct KeyCandidate {
    pub secret: SecretKey,
    pub claimed_address: Option<String>,
}

impl KeyCandidate {
    pub fn new(secret: SecretKey, claimed_address: Option<String>) -> Self {
        Self {
            secret,
            claimed_address,
        }
    }
}

/// A private key proven to produce `address`.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    id: SigningId,
    address: String,
    secret: SecretKey,
}

impl KeyMaterial {
    pub(crate) fn verified(id: SigningId, address: String, secret: SecretKey) -> Self {
        Self {
            id,
            address,
            secret,
        }
    }

    pub fn id(&self) -> &SigningId {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

/// Verified keys for one signing operation.
#[derive(Debug, Default)]
pub struct KeyRing {
    keys: Vec<KeyMaterial>,
    sources_used: Vec<String>,
}

impl KeyRing {
    pub(crate) fn new(keys: Vec<KeyMaterial>, sources_used: Vec<String>) -> Self {
        Self { keys, sources_used }
    }

    /// Key controlling `address`, compared with the chain's address rules.
    pub fn find(&self, address: &str, deriver: &dyn AddressDeriver) -> Option<&KeyMaterial> {
        self.keys
            .iter()
            .find(|k| deriver.same_address(k.address(), address))
    }

    pub fn ids(&self) -> impl Iterator<Item = &SigningId> {
        self.keys.iter().map(KeyMaterial::id)
    }

    /// Names of the sources that contributed at least one key.
    pub fn sources_used(&self) -> &[String] {
        &self.sources_used
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
