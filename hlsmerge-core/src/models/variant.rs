//! Variant identity
//!
//! A variant is identified across polls, and across origins, by the exact
//! triple of program id, bandwidth and resolution.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Program id assumed for a variant whose descriptor omits `PROGRAM-ID`.
pub const DEFAULT_PROGRAM_ID: u64 = 1;

/// Number of digest bytes kept for an alias id (64 bits, 16 hex chars).
const ALIAS_ID_BYTES: usize = 8;

/// Identity of one variant stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantKey {
    pub program_id: u64,
    pub bandwidth: u64,
    pub resolution: String,
}

impl VariantKey {
    pub fn new(program_id: u64, bandwidth: u64, resolution: impl Into<String>) -> Self {
        Self {
            program_id,
            bandwidth,
            resolution: resolution.into(),
        }
    }

    /// Canonical text form used for id derivation.
    ///
    /// The two leading fields are integers, so the first two colons always
    /// delimit them even when the resolution contains a colon.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}:{}", self.program_id, self.bandwidth, self.resolution)
    }

    /// Deterministic proxy id for this variant.
    #[must_use]
    pub fn alias_id(&self) -> String {
        derive_alias_id(&self.canonical())
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "program={} bandwidth={} resolution={}",
            self.program_id, self.bandwidth, self.resolution
        )
    }
}

/// Derive an opaque id from a canonical string.
///
/// Truncated SHA-256, hex encoded. Stable across runs and platforms, unlike
/// `std::hash`, so ids can be recomputed offline when debugging.
#[must_use]
pub fn derive_alias_id(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..ALIAS_ID_BYTES])
}
