//! Core domain types for the larder binary cache client.
//!
//! This crate defines the data model shared by every other crate and does
//! no I/O:
//! - Nix base32 decoding/encoding
//! - Typed digests parsed from `algo:base32`
//! - Store path identifiers
//! - Narinfo records, the signing fingerprint, and compression tags
//! - NAR listings and their tree walk

pub mod base32;
pub mod error;
pub mod hash;
pub mod listing;
pub mod narinfo;
pub mod store_path;

pub use error::{Error, Result};
pub use hash::Hash;
pub use listing::{Entry, LISTING_VERSION, NarListing};
pub use narinfo::{Compression, NarInfo};
pub use store_path::{StorePath, StorePathHash};
