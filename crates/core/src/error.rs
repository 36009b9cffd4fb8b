//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
///
/// Every variant is a decode failure: the input is malformed and retrying
/// the same bytes cannot succeed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid base32 character: {0:?}")]
    InvalidCharacter(char),

    #[error("invalid base32 string: trailing bits")]
    TrailingBits,

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid store path: {0}")]
    InvalidStorePath(String),

    #[error("narinfo parse error: {0}")]
    NarInfoParse(String),

    #[error("cache info parse error: {0}")]
    CacheInfoParse(String),

    #[error("unsupported compression algorithm: {0}")]
    UnsupportedCompression(String),

    #[error("nar listing parse error: {0}")]
    ListingParse(String),

    #[error("unsupported nar listing version: {0}")]
    UnsupportedListingVersion(u32),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
