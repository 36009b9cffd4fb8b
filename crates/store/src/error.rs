//! Store and verification error types.

use thiserror::Error;

/// Failure of a verification stage in the fetch pipeline.
///
/// A stream that raised one of these produced no trustworthy output:
/// anything already yielded must be discarded by the consumer.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("{stage} length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        stage: &'static str,
        expected: u64,
        actual: u64,
    },

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),
}

/// Error for one store operation.
///
/// Most variants are recoverable by falling back to the next store in a
/// [`MultiStore`](crate::MultiStore); [`AllStoresFailed`](Self::AllStoresFailed)
/// means the whole chain was exhausted.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP {status} at {url}")]
    Http { status: u16, url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid nar pathname: {0}")]
    InvalidPathname(String),

    #[error(transparent)]
    Decode(#[from] larder_core::Error),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("truncated NAR stream")]
    TruncatedNar,

    #[error("store is not writable")]
    NotWritable,

    #[error("all {} stores failed", .0.len())]
    AllStoresFailed(Vec<StoreError>),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
