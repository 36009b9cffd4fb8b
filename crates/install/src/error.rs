//! Installer error types.

use larder_keys::InvalidReason;
use larder_store::StoreError;
use thiserror::Error;

/// Installation errors.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("invalid store path reference: {0}")]
    InvalidReference(String),

    #[error("invalid signature for {path} ({reason})")]
    InvalidSignature { path: String, reason: InvalidReason },

    #[error("malformed signature for {path}: {source}")]
    BadSignatureFormat {
        path: String,
        #[source]
        source: larder_keys::KeyError,
    },

    #[error("failed to fetch {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to extract {path}: {source}")]
    Extract {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("I/O error installing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("installation cancelled")]
    Cancelled,
}

/// Result type for installer operations.
pub type InstallResult<T> = std::result::Result<T, InstallError>;
