// converge-core/src/core/revision.rs
// ============================================================================
// Module: Revisions
// Description: Snapshot of policy, resolution, and users after an apply.
// Purpose: Give external persistence a single round-trippable object and
//          detect policy text changes through a canonical digest.
// Dependencies: serde, serde_jcs, sha2, thiserror
// ============================================================================

//! ## Overview
//! A [`Revision`] bundles everything needed to diff the next run against the
//! last applied state. Storage is external; the only requirement is a
//! lossless serde round trip.
//!
//! [`Revision::policy_digest`] hashes the RFC 8785 canonical JSON form of the
//! policy with SHA-256, so two revisions with equal policies produce equal
//! digests regardless of map ordering in the source documents.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::core::policy::Policy;
use crate::core::policy::User;
use crate::core::resolution::PolicyResolution;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while digesting a revision.
#[derive(Debug, Error)]
pub enum RevisionError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize policy: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Revision
// ============================================================================

/// Applied state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Monotonic revision number, starting at 1.
    pub generation: u64,
    /// Policy the resolution was computed from.
    pub policy: Policy,
    /// Applied resolution.
    pub resolution: PolicyResolution,
    /// Users known at apply time.
    #[serde(default)]
    pub users: Vec<User>,
}

impl Revision {
    /// Builds the revision following `prev`.
    #[must_use]
    pub fn next(
        prev: Option<&Self>,
        policy: Policy,
        resolution: PolicyResolution,
        users: Vec<User>,
    ) -> Self {
        let generation = prev.map_or(1, |revision| revision.generation.saturating_add(1));
        Self {
            generation,
            policy,
            resolution,
            users,
        }
    }

    /// Returns the lowercase hex SHA-256 of the canonical policy JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RevisionError::Canonicalization`] when serialization fails.
    pub fn policy_digest(&self) -> Result<String, RevisionError> {
        let bytes = serde_jcs::to_vec(&self.policy)
            .map_err(|err| RevisionError::Canonicalization(err.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex_encode(&hasher.finalize()))
    }
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
