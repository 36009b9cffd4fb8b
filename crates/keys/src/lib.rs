//! Trusted-key management for the larder binary cache client.
//!
//! Narinfo records are signed over their fingerprint with Ed25519. This
//! crate holds the consumer half: a keychain of named trusted public keys
//! and verification that never treats an untrusted or non-matching
//! signature as a program error.

pub mod error;
pub mod keychain;

pub use error::{KeyError, KeyResult};
pub use keychain::{InvalidReason, Keychain, NIXOS_KEY, VerifyOutcome};
