//! Shared application state.

use dashmap::DashMap;
use larder_store::{FsCache, MultiStore};
use std::sync::Arc;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Upstream fan-out, in priority order.
    pub store: Arc<MultiStore>,
    /// Optional local write-through cache.
    pub local: Option<Arc<FsCache>>,
    /// NAR pathname -> upstream index, recorded when a narinfo response is
    /// served so the NAR request that follows goes to the same upstream.
    pub affinity: Arc<DashMap<String, usize>>,
    /// Priority advertised in `nix-cache-info`.
    pub priority: u32,
}

impl AppState {
    pub fn new(store: Arc<MultiStore>, local: Option<Arc<FsCache>>, priority: u32) -> Self {
        Self {
            store,
            local,
            affinity: Arc::new(DashMap::new()),
            priority,
        }
    }
}
