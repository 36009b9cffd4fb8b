//! Store capability traits.

use crate::error::StoreResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use larder_core::{NarInfo, NarListing, StorePathHash};
use std::pin::Pin;

/// A boxed stream of bytes, the currency of every NAR transfer.
pub type ByteStream = Pin<Box<dyn Stream<Item = StoreResult<Bytes>> + Send>>;

/// A source of store path objects: narinfo records, listings, and NAR
/// streams, keyed by store path hash or NAR pathname.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// The store directory this cache serves paths under.
    fn store_dir(&self) -> &str;

    /// Whether bulk queries against this store are cheap. Local stores
    /// return true; remote caches advertise it via `WantMassQuery`.
    fn supports_mass_query(&self) -> bool {
        false
    }

    /// Preference order among peers; lower is preferred.
    fn priority(&self) -> u32 {
        0
    }

    /// Fetch and parse the narinfo record for a store path hash.
    async fn get_info(&self, hash: &StorePathHash) -> StoreResult<NarInfo>;

    /// Fetch and parse the NAR listing for a store path hash.
    async fn get_listing(&self, hash: &StorePathHash) -> StoreResult<NarListing>;

    /// Open the (possibly compressed) NAR byte stream at a pathname
    /// (`nar/<name>`, as carried in a narinfo's `URL` field).
    async fn get_nar(&self, nar_pathname: &str) -> StoreResult<ByteStream>;

    /// Runtime capability probe for write access.
    fn as_writable(&self) -> Option<&dyn WritableStore> {
        None
    }
}

/// A store that can also persist objects.
#[async_trait]
pub trait WritableStore: Store {
    async fn put_info(&self, hash: &StorePathHash, info: &NarInfo) -> StoreResult<()>;

    async fn put_listing(&self, hash: &StorePathHash, listing: &NarListing) -> StoreResult<()>;

    /// Persist a NAR stream under a pathname. The write must be staged so
    /// that concurrent readers never observe a partial file.
    async fn put_nar(&self, nar_pathname: &str, body: ByteStream) -> StoreResult<()>;
}
