//! Store resolution and verified NAR extraction for larder.
//!
//! This crate turns a set of binary caches into a stream of verified file
//! tree entries:
//! - [`Store`]/[`WritableStore`]: the capability interface, with HTTP
//!   ([`BinaryCache`]), filesystem ([`FsCache`]), and fan-out
//!   ([`MultiStore`]) implementations
//! - [`pipeline::fetch_entries`]: the fail-fast verification pipeline
//! - [`codec::NarDecoder`]: offset-guided streaming NAR extraction

pub mod binary_cache;
pub mod codec;
pub mod compression;
pub mod error;
pub mod fs_cache;
pub mod multi;
pub mod pipeline;
pub mod traits;
pub mod verify;

pub use binary_cache::BinaryCache;
pub use codec::{NarDecoder, NarEntry, NarFileBody};
pub use error::{StoreError, StoreResult, VerificationError};
pub use fs_cache::FsCache;
pub use multi::{Located, MultiStore};
pub use pipeline::{FetchOptions, ProgressFn, fetch_entries, fetch_entries_located};
pub use traits::{ByteStream, Store, WritableStore};
