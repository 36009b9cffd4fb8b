//! Proxy server configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for `larderd`.
///
/// Loaded from a TOML file merged with `LARDER_`-prefixed environment
/// variables (`LARDER_SERVER__BIND=...` style).
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g. "127.0.0.1:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Priority this proxy advertises in `nix-cache-info`.
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Optional local cache directory; when set, fetched objects are
    /// written through and served from disk on later requests.
    #[serde(default)]
    pub local_cache: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Upstream binary cache URLs, tried in priority order.
    #[serde(default = "default_upstreams")]
    pub urls: Vec<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_priority() -> u32 {
    10
}

fn default_upstreams() -> Vec<String> {
    vec!["https://cache.nixos.org".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            priority: default_priority(),
            local_cache: None,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            urls: default_upstreams(),
        }
    }
}
