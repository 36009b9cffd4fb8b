//! Typed content digests.

use crate::base32;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A digest parsed from the `algo:base32` wire form.
///
/// The original string is preserved in `raw` because the narinfo
/// fingerprint embeds it verbatim. Equality is algorithm plus digest bytes,
/// so two spellings of the same digest compare equal even if `raw` differs.
#[derive(Clone, Serialize, Deserialize)]
pub struct Hash {
    /// Digest algorithm name (e.g. "sha256").
    pub algorithm: String,
    /// Raw digest bytes.
    pub digest: Vec<u8>,
    /// The string this hash was parsed from.
    pub raw: String,
}

impl Hash {
    /// Parse from `algo:base32`.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let (algorithm, encoded) = raw
            .split_once(':')
            .ok_or_else(|| crate::Error::InvalidHash(format!("expected 'algo:hash', got: {raw}")))?;
        if algorithm.is_empty() {
            return Err(crate::Error::InvalidHash("empty algorithm".to_string()));
        }
        Ok(Self {
            algorithm: algorithm.to_string(),
            digest: base32::decode(encoded)?,
            raw: raw.to_string(),
        })
    }

    /// Build from an algorithm name and digest bytes.
    pub fn from_digest(algorithm: &str, digest: Vec<u8>) -> Self {
        let raw = format!("{algorithm}:{}", base32::encode(&digest));
        Self {
            algorithm: algorithm.to_string(),
            digest,
            raw,
        }
    }

    /// Render as `algo:base32` from the digest bytes (ignoring `raw`).
    pub fn to_base32(&self) -> String {
        format!("{}:{}", self.algorithm, base32::encode(&self.digest))
    }
}

impl PartialEq for Hash {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.digest == other.digest
    }
}

impl Eq for Hash {}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_base32())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
