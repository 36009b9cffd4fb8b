//! larder proxy server.
//!
//! An HTTP surface speaking the binary cache wire protocol
//! (`nix-cache-info`, `<hash>.narinfo`, `<hash>.ls`, `nar/<name>`), backed
//! by a fan-out of upstream caches and an optional local write-through
//! cache.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
