//! Key resolution with mapping-integrity checks.
//!
//! # Responsibilities
//! - Query sources in precedence order until every requirement is met
//! - Re-derive the address of every candidate key and compare it to both
//!   the source's claim and the transaction's claim
//! - Report which identifiers have no key and which sources were used
//!
//! # Design Decisions
//! - The first candidate for an identifier wins; later sources are not asked
//! - Verification failures abort the whole resolution, no partial ring is returned

use std::collections::HashSet;

use crate::chain::AddressDeriver;
use crate::error::IntegrityError;
use crate::keys::material::{KeyMaterial, KeyRing};
use crate::keys::sources::KeySource;
use crate::keys::{KeyError, KeyResult, SigningId};

/// A key the signer needs: what to look it up by, and the address it must control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub id: SigningId,
    pub claimed_address: String,
}

impl Requirement {
    pub fn new(id: SigningId, claimed_address: impl Into<String>) -> Self {
        Self {
            id,
            claimed_address: claimed_address.into(),
        }
    }
}

/// Identifiers in `requirements` that `ring` holds no key for.
pub fn missing(requirements: &[Requirement], ring: &KeyRing) -> Vec<String> {
    let have: HashSet<&SigningId> = ring.ids().collect();
    requirements
        .iter()
        .filter(|r| !have.contains(&r.id))
        .map(|r| r.id.to_string())
        .collect()
}

pub struct KeyResolver<'a> {
    deriver: &'a dyn AddressDeriver,
}

impl<'a> KeyResolver<'a> {
    pub fn new(deriver: &'a dyn AddressDeriver) -> Self {
        Self { deriver }
    }

    /// Find and verify a key for every requirement.
    pub fn resolve(
        &self,
        requirements: &[Requirement],
        sources: &[&dyn KeySource],
    ) -> KeyResult<KeyRing> {
        let mut ordered: Vec<&dyn KeySource> = sources.to_vec();
        ordered.sort_by_key(|s| s.kind());

        let mut pending: Vec<&Requirement> = dedup(requirements);
        let mut keys = Vec::with_capacity(pending.len());
        let mut sources_used = Vec::new();

        for source in ordered {
            if pending.is_empty() {
                break;
            }
            let mut found_here = 0usize;
            let mut still_pending = Vec::with_capacity(pending.len());
            for req in pending {
                match source.lookup(&req.id)? {
                    Some(candidate) => {
                        let derived = self.deriver.derive_address(&candidate.secret)?;
                        if let Some(file_claim) = candidate.claimed_address.as_deref() {
                            self.check_mapping(&req.id, file_claim, &derived)?;
                        }
                        self.check_mapping(&req.id, &req.claimed_address, &derived)?;
                        keys.push(KeyMaterial::verified(req.id.clone(), derived, candidate.secret));
                        found_here += 1;
                    }
                    None => still_pending.push(req),
                }
            }
            pending = still_pending;
            if found_here > 0 {
                tracing::debug!(source = %source.name(), keys = found_here, "Resolved signing keys");
                sources_used.push(source.name().to_string());
            }
        }

        if !pending.is_empty() {
            let ids: Vec<String> = pending.iter().map(|r| r.id.to_string()).collect();
            tracing::warn!(missing = ?ids, "Signing keys not found");
            return Err(KeyError::Missing(ids));
        }

        tracing::info!(keys = keys.len(), sources = ?sources_used, "Key resolution complete");
        Ok(KeyRing::new(keys, sources_used))
    }

    /// Check outputs that carry a wallet ID against the same sources.
    ///
    /// Keys found this way are only used for the comparison and then dropped.
    /// Outputs whose ID no source knows are skipped. Returns the number checked.
    pub fn verify_output_mappings(
        &self,
        outputs: &[Requirement],
        sources: &[&dyn KeySource],
    ) -> KeyResult<usize> {
        let mut ordered: Vec<&dyn KeySource> = sources.to_vec();
        ordered.sort_by_key(|s| s.kind());

        let mut verified = 0usize;
        for req in outputs {
            for source in &ordered {
                if let Some(candidate) = source.lookup(&req.id)? {
                    let derived = self.deriver.derive_address(&candidate.secret)?;
                    if let Some(file_claim) = candidate.claimed_address.as_deref() {
                        self.check_mapping(&req.id, file_claim, &derived)?;
                    }
                    self.check_mapping(&req.id, &req.claimed_address, &derived)?;
                    verified += 1;
                    break;
                }
            }
        }
        tracing::debug!(checked = verified, total = outputs.len(), "Verified output address mappings");
        Ok(verified)
    }

    fn check_mapping(&self, id: &SigningId, claimed: &str, derived: &str) -> KeyResult<()> {
        if self.deriver.same_address(claimed, derived) {
            return Ok(());
        }
        tracing::error!(identifier = %id, claimed, derived, "Address mapping mismatch");
        crate::observability::metrics::record_integrity_failure("mapping");
        Err(IntegrityError::MappingIntegrity {
            identifier: id.to_string(),
            claimed: claimed.to_string(),
            derived: derived.to_string(),
        }
        .into())
    }
}

fn dedup(requirements: &[Requirement]) -> Vec<&Requirement> {
    let mut seen = HashSet::new();
    requirements.iter().filter(|r| seen.insert(&r.id)).collect()
}
