//! Fan-out store with fallback and per-object affinity.

use crate::error::{StoreError, StoreResult};
use crate::traits::{ByteStream, Store};
use async_trait::async_trait;
use larder_core::{NarInfo, NarListing, StorePathHash};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A value plus the index of the store that produced it.
///
/// The index routes a follow-up `get_nar` straight to the originating
/// store: once a narinfo came from store `k`, its NAR is known to live
/// there and nowhere else worth asking first.
#[derive(Clone, Debug)]
pub struct Located<T> {
    pub value: T,
    pub source: usize,
}

/// An ordered list of stores tried in sequence; first success wins.
///
/// The order is preference order (ascending [`Store::priority`]). Hit and
/// miss counters are kept per store for observability.
pub struct MultiStore {
    stores: Vec<Arc<dyn Store>>,
    store_dir: String,
    hits: Vec<AtomicU64>,
    misses: AtomicU64,
}

impl MultiStore {
    /// Build from a non-empty list of stores sharing one store directory.
    /// The list is sorted by ascending priority, preserving insertion
    /// order among equals.
    pub fn new(mut stores: Vec<Arc<dyn Store>>) -> StoreResult<Self> {
        let Some(first) = stores.first() else {
            return Err(StoreError::AllStoresFailed(Vec::new()));
        };
        let store_dir = first.store_dir().to_string();
        for store in &stores {
            if store.store_dir() != store_dir {
                return Err(StoreError::InvalidPathname(format!(
                    "store dir mismatch: {} vs {}",
                    store.store_dir(),
                    store_dir
                )));
            }
        }
        stores.sort_by_key(|s| s.priority());

        let hits = stores.iter().map(|_| AtomicU64::new(0)).collect();
        Ok(Self {
            stores,
            store_dir,
            hits,
            misses: AtomicU64::new(0),
        })
    }

    /// The stores in preference order.
    pub fn stores(&self) -> &[Arc<dyn Store>] {
        &self.stores
    }

    /// Per-store hit counts, in preference order.
    pub fn hits(&self) -> Vec<u64> {
        self.hits.iter().map(|h| h.load(Ordering::Relaxed)).collect()
    }

    /// Operations for which every store failed.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// True when every member welcomes bulk queries (or is local).
    pub fn all_support_mass_query(&self) -> bool {
        self.stores.iter().all(|s| s.supports_mass_query())
    }

    async fn find<'a, T, F>(&'a self, op: F) -> StoreResult<Located<T>>
    where
        F: Fn(&'a dyn Store) -> Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>,
    {
        let mut errors = Vec::new();
        for (index, store) in self.stores.iter().enumerate() {
            match op(store.as_ref()).await {
                Ok(value) => {
                    self.hits[index].fetch_add(1, Ordering::Relaxed);
                    return Ok(Located {
                        value,
                        source: index,
                    });
                }
                Err(error) => errors.push(error),
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Err(StoreError::AllStoresFailed(errors))
    }

    /// Fetch a narinfo, remembering which store had it.
    pub async fn get_info(&self, hash: &StorePathHash) -> StoreResult<Located<NarInfo>> {
        self.find(|store| store.get_info(hash)).await
    }

    /// Fetch a listing, remembering which store had it.
    pub async fn get_listing(&self, hash: &StorePathHash) -> StoreResult<Located<NarListing>> {
        self.find(|store| store.get_listing(hash)).await
    }

    /// Open a NAR directly from the store at `source`, with no fallback:
    /// the object is known to live only there, so a miss is a real error.
    pub async fn get_nar_from(&self, source: usize, nar_pathname: &str) -> StoreResult<ByteStream> {
        let store = self
            .stores
            .get(source)
            .ok_or_else(|| StoreError::NotFound(format!("no store at index {source}")))?;
        let stream = store.get_nar(nar_pathname).await?;
        self.hits[source].fetch_add(1, Ordering::Relaxed);
        Ok(stream)
    }
}

#[async_trait]
impl Store for MultiStore {
    fn store_dir(&self) -> &str {
        &self.store_dir
    }

    fn supports_mass_query(&self) -> bool {
        self.all_support_mass_query()
    }

    async fn get_info(&self, hash: &StorePathHash) -> StoreResult<NarInfo> {
        Ok(MultiStore::get_info(self, hash).await?.value)
    }

    async fn get_listing(&self, hash: &StorePathHash) -> StoreResult<NarListing> {
        Ok(MultiStore::get_listing(self, hash).await?.value)
    }

    /// Fallback across every store, for callers without affinity.
    async fn get_nar(&self, nar_pathname: &str) -> StoreResult<ByteStream> {
        Ok(self
            .find(|store| store.get_nar(nar_pathname))
            .await?
            .value)
    }
}
