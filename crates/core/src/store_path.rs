//! Store path identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A store path hash (the 32-character base32 prefix of a basename).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorePathHash(String);

impl StorePathHash {
    /// Create from a string, validating length and alphabet.
    pub fn new(hash: impl Into<String>) -> crate::Result<Self> {
        let hash = hash.into();
        if hash.len() != 32 {
            return Err(crate::Error::InvalidStorePath(format!(
                "store path hash must be 32 chars, got {}",
                hash.len()
            )));
        }
        for c in hash.chars() {
            if !matches!(c, '0'..='9' | 'a'..='d' | 'f'..='n' | 'p'..='s' | 'v'..='z') {
                return Err(crate::Error::InvalidStorePath(format!(
                    "invalid character in store path hash: {c}"
                )));
            }
        }
        Ok(Self(hash))
    }

    /// Extract the hash from a basename (`<hash>-<name>`) or a bare hash.
    pub fn from_prefix(s: &str) -> crate::Result<Self> {
        if !s.is_ascii() {
            return Err(crate::Error::InvalidStorePath(
                "store path contains non-ASCII characters".to_string(),
            ));
        }
        if s.len() > 32 && s.as_bytes()[32] != b'-' {
            return Err(crate::Error::InvalidStorePath(format!(
                "expected '-' after hash in {s:?}"
            )));
        }
        Self::new(&s[..s.len().min(32)])
    }

    /// Get the hash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StorePathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorePathHash({self})")
    }
}

impl fmt::Display for StorePathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A full store path (`<store dir>/<hash>-<name>`).
///
/// The store directory is carried explicitly rather than assumed, because a
/// cache advertises its own `StoreDir` and the fingerprint depends on it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorePath {
    store_dir: String,
    hash: StorePathHash,
    name: String,
}

impl StorePath {
    /// Parse a full store path string under the given store directory.
    pub fn parse(store_dir: &str, path: &str) -> crate::Result<Self> {
        let rest = path
            .strip_prefix(store_dir)
            .and_then(|p| p.strip_prefix('/'))
            .ok_or_else(|| {
                crate::Error::InvalidStorePath(format!("must start with {store_dir}/"))
            })?;
        Self::from_basename(store_dir, rest)
    }

    /// Parse a basename (`<hash>-<name>`) under the given store directory.
    pub fn from_basename(store_dir: &str, basename: &str) -> crate::Result<Self> {
        if !basename.is_ascii() {
            return Err(crate::Error::InvalidStorePath(
                "store path contains non-ASCII characters".to_string(),
            ));
        }
        if basename.len() < 34 {
            return Err(crate::Error::InvalidStorePath(format!(
                "basename too short: {basename:?}"
            )));
        }
        let hash = StorePathHash::new(&basename[..32])?;
        if basename.as_bytes()[32] != b'-' {
            return Err(crate::Error::InvalidStorePath(
                "expected '-' after hash".to_string(),
            ));
        }
        let name = &basename[33..];
        for c in name.chars() {
            if !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '+') {
                return Err(crate::Error::InvalidStorePath(format!(
                    "invalid character in name: {c}"
                )));
            }
        }
        Ok(Self {
            store_dir: store_dir.to_string(),
            hash,
            name: name.to_string(),
        })
    }

    /// The store directory this path lives under.
    pub fn store_dir(&self) -> &str {
        &self.store_dir
    }

    /// The hash portion.
    pub fn hash(&self) -> &StorePathHash {
        &self.hash
    }

    /// The name portion.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The basename (`<hash>-<name>`) without the store directory.
    pub fn basename(&self) -> String {
        format!("{}-{}", self.hash, self.name)
    }
}

impl fmt::Debug for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorePath({self})")
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{}", self.store_dir, self.hash, self.name)
    }
}
