//! Named Ed25519 public keys and signature verification.

use crate::error::{KeyError, KeyResult};
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use larder_core::NarInfo;
use std::collections::HashMap;
use std::fmt;

/// The published key of cache.nixos.org.
pub const NIXOS_KEY: &str = "cache.nixos.org-1:6NCHdD59X431o0gWypbMrAURkbJ16ZPMQFGspcDShjY=";

/// The result of verifying a signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid,
    Invalid(InvalidReason),
}

impl VerifyOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Why a signature did not verify.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidReason {
    /// No trusted key with the signature's key name.
    NoSuchKey,
    /// The signature does not match the data under the named key.
    InvalidSignature,
    /// The record carries no signature at all.
    MissingSignature,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoSuchKey => "NO_SUCH_KEY",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::MissingSignature => "MISSING_SIGNATURE",
        };
        write!(f, "{s}")
    }
}

fn split_named(raw: &str) -> Option<(&str, &str)> {
    raw.split_once(':').filter(|(name, _)| !name.is_empty())
}

/// A set of trusted, named Ed25519 public keys.
#[derive(Default)]
pub struct Keychain {
    keys: HashMap<String, TrustedKey>,
}

struct TrustedKey {
    key: VerifyingKey,
    raw: String,
}

impl Keychain {
    /// Create an empty keychain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a keychain trusting the given `name:base64` key strings.
    pub fn with_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> KeyResult<Self> {
        let mut keychain = Self::new();
        for raw in keys {
            keychain.trust(raw)?;
        }
        Ok(keychain)
    }

    /// Trust a key in `name:base64(32-byte public key)` form.
    ///
    /// Idempotent: trusting the same string twice is a no-op. Trusting a
    /// different key under an already-trusted name is [`KeyError::KeyConflict`].
    pub fn trust(&mut self, raw: &str) -> KeyResult<()> {
        let (name, encoded) = split_named(raw)
            .ok_or_else(|| KeyError::KeyParsing(format!("expected 'name:base64', got: {raw}")))?;

        if let Some(existing) = self.keys.get(name) {
            if existing.raw != raw {
                return Err(KeyError::KeyConflict(name.to_string()));
            }
            return Ok(());
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| KeyError::KeyParsing(format!("invalid base64: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| KeyError::KeyParsing(format!("expected 32 bytes, got {}", b.len())))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| KeyError::KeyParsing(format!("invalid public key: {e}")))?;

        self.keys.insert(
            name.to_string(),
            TrustedKey {
                key,
                raw: raw.to_string(),
            },
        );
        Ok(())
    }

    /// Verify a `name:base64` signature over `data`.
    ///
    /// A missing key or a non-matching signature is reported in the
    /// outcome; only a structurally malformed signature string is an error.
    pub fn verify(&self, sig: &str, data: &[u8]) -> KeyResult<VerifyOutcome> {
        let (name, encoded) = split_named(sig).ok_or_else(|| {
            KeyError::SignatureParsing(format!("expected 'name:base64', got: {sig}"))
        })?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| KeyError::SignatureParsing(format!("invalid base64: {e}")))?;

        let Some(trusted) = self.keys.get(name) else {
            return Ok(VerifyOutcome::Invalid(InvalidReason::NoSuchKey));
        };

        let Ok(signature) = Signature::from_slice(&bytes) else {
            return Ok(VerifyOutcome::Invalid(InvalidReason::InvalidSignature));
        };

        Ok(match trusted.key.verify(data, &signature) {
            Ok(()) => VerifyOutcome::Valid,
            Err(_) => VerifyOutcome::Invalid(InvalidReason::InvalidSignature),
        })
    }

    /// Verify a narinfo's signature over its fingerprint.
    pub fn verify_narinfo(&self, info: &NarInfo) -> KeyResult<VerifyOutcome> {
        let Some(sig) = &info.sig else {
            return Ok(VerifyOutcome::Invalid(InvalidReason::MissingSignature));
        };
        self.verify(sig, info.fingerprint().as_bytes())
    }
}

impl fmt::Debug for Keychain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keychain")
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}
