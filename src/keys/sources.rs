//! Key sources.
//!
//! # Responsibilities
//! - Key-address file: wallet IDs mapped to (address, key) pairs
//! - Raw keylist: bare keys for addresses outside the deterministic wallet
//! - Seed source: keys derived on demand from one or more seeds
//!
//! # Design Decisions
//! - Sources only answer lookups; verification happens in the resolver
//! - Derivation itself is supplied by the embedding application via `SeedDeriver`

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chain::AddressDeriver;
use crate::keys::material::{KeyCandidate, SecretKey};
use crate::keys::{KeyError, KeyResult, SigningId, WalletId};

/// Lookup precedence, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    KeyAddressFile,
    Keylist,
    Seed,
}

/// Anything that can hand out candidate keys.
pub trait KeySource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Label used in log lines and errors.
    fn name(&self) -> &str;

    /// Candidate key for `id`, or `None` if this source does not know it.
    fn lookup(&self, id: &SigningId) -> KeyResult<Option<KeyCandidate>>;
}

/// One line of a key-address file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyAddrEntry {
    pub index: u32,
    pub address: String,
    pub key: String,
}

/// Serialized form of a key-address file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyAddrFileData {
    pub seed_id: String,
    #[serde(default)]
    pub addr_type: Option<char>,
    pub entries: Vec<KeyAddrEntry>,
}

/// Keys and the addresses they are claimed to control, indexed by wallet ID.
pub struct KeyAddrFile {
    name: String,
    entries: HashMap<WalletId, (String, SecretKey)>,
}

impl KeyAddrFile {
    pub fn from_data(name: impl Into<String>, data: KeyAddrFileData) -> KeyResult<Self> {
        let mut entries = HashMap::with_capacity(data.entries.len());
        for entry in data.entries {
            let id = WalletId::new(&data.seed_id, data.addr_type, entry.index)?;
            let secret = SecretKey::parse(&entry.key)?;
            entries.insert(id, (entry.address, secret));
        }
        let name = name.into();
        tracing::debug!(source = %name, keys = entries.len(), seed_id = %data.seed_id, "Loaded key-address file");
        Ok(Self { name, entries })
    }

    pub fn from_json(name: impl Into<String>, json: &str) -> KeyResult<Self> {
        let name = name.into();
        let data: KeyAddrFileData = serde_json::from_str(json).map_err(|e| KeyError::Source {
            source_name: name.clone(),
            reason: e.to_string(),
        })?;
        Self::from_data(name, data)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_secret(&self, secret: &SecretKey) -> bool {
        self.entries.values().any(|(_, s)| s == secret)
    }
}

impl KeySource for KeyAddrFile {
    fn kind(&self) -> SourceKind {
        SourceKind::KeyAddressFile
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, id: &SigningId) -> KeyResult<Option<KeyCandidate>> {
        let SigningId::Wallet(wallet_id) = id else {
            return Ok(None);
        };
        Ok(self
            .entries
            .get(wallet_id)
            .map(|(address, secret)| KeyCandidate::new(secret.clone(), Some(address.clone()))))
    }
}

/// Bare private keys, one per line; addresses are derived at load time.
pub struct RawKeylist {
    name: String,
    keys: Vec<(String, SecretKey)>,
    deriver: Arc<dyn AddressDeriver>,
}

impl RawKeylist {
    /// Parse keylist text. `#` starts a comment; blank lines are ignored.
    pub fn parse(
        name: impl Into<String>,
        text: &str,
        deriver: Arc<dyn AddressDeriver>,
    ) -> KeyResult<Self> {
        let mut keys = Vec::new();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let secret = SecretKey::parse(line)?;
            let address = deriver.derive_address(&secret)?;
            if !keys.iter().any(|(_, s)| s == &secret) {
                keys.push((address, secret));
            }
        }
        let name = name.into();
        tracing::debug!(source = %name, keys = keys.len(), "Generated addresses from keylist");
        Ok(Self {
            name,
            keys,
            deriver,
        })
    }

    /// Drop keys already present in a key-address file. Returns how many were removed.
    pub fn remove_duplicates(&mut self, kafile: &KeyAddrFile) -> usize {
        let before = self.keys.len();
        self.keys.retain(|(_, secret)| !kafile.contains_secret(secret));
        let removed = before - self.keys.len();
        if removed > 0 {
            tracing::info!(source = %self.name, removed, "Removed duplicate keys also in key-address file");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeySource for RawKeylist {
    fn kind(&self) -> SourceKind {
        SourceKind::Keylist
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, id: &SigningId) -> KeyResult<Option<KeyCandidate>> {
        let SigningId::Address(address) = id else {
            return Ok(None);
        };
        Ok(self
            .keys
            .iter()
            .find(|(derived, _)| self.deriver.same_address(derived, address))
            .map(|(derived, secret)| KeyCandidate::new(secret.clone(), Some(derived.clone()))))
    }
}

/// Deterministic key derivation for one seed, provided by the wallet layer.
pub trait SeedDeriver: Send + Sync {
    /// Eight hex digit identifier of the seed.
    fn seed_id(&self) -> &str;

    fn derive(&self, id: &WalletId) -> KeyResult<SecretKey>;
}

/// Seed-backed key source over any number of seeds.
pub struct SeedSource {
    name: String,
    derivers: Vec<Box<dyn SeedDeriver>>,
}

impl SeedSource {
    pub fn new(name: impl Into<String>, derivers: Vec<Box<dyn SeedDeriver>>) -> Self {
        Self {
            name: name.into(),
            derivers,
        }
    }

    pub fn seed_ids(&self) -> Vec<&str> {
        self.derivers.iter().map(|d| d.seed_id()).collect()
    }
}

impl KeySource for SeedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Seed
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, id: &SigningId) -> KeyResult<Option<KeyCandidate>> {
        let SigningId::Wallet(wallet_id) = id else {
            return Ok(None);
        };
        match self
            .derivers
            .iter()
            .find(|d| d.seed_id().eq_ignore_ascii_case(wallet_id.seed_id()))
        {
            Some(deriver) => Ok(Some(KeyCandidate::new(deriver.derive(wallet_id)?, None))),
            None => Ok(None),
        }
    }
}
