//! Keychain error types.

use thiserror::Error;

/// Keychain errors.
///
/// Only structural problems are errors: a missing key or a signature that
/// fails to verify is a [`VerifyOutcome`](crate::VerifyOutcome), not an
/// error.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key parsing error: {0}")]
    KeyParsing(String),

    #[error("key {0} already trusted with different key material")]
    KeyConflict(String),

    #[error("signature parsing error: {0}")]
    SignatureParsing(String),
}

/// Result type for keychain operations.
pub type KeyResult<T> = std::result::Result<T, KeyError>;
