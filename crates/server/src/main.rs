//! larder proxy server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use larder_server::{AppConfig, AppState, create_router};
use larder_store::{BinaryCache, FsCache, MultiStore, Store};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// larder proxy - a caching front for Nix binary caches
#[derive(Parser, Debug)]
#[command(name = "larderd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "LARDER_CONFIG", default_value = "config/larderd.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("larderd v{}", env!("CARGO_PKG_VERSION"));

    // Config file is optional; env vars can provide everything.
    let mut figment = Figment::new();
    if std::path::Path::new(&args.config).exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    }
    let config: AppConfig = figment
        .merge(Env::prefixed("LARDER_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    let client = reqwest::Client::new();
    let mut stores: Vec<Arc<dyn Store>> = Vec::new();
    for raw in &config.upstream.urls {
        let url: Url = raw.parse().with_context(|| format!("invalid upstream URL: {raw}"))?;
        let cache = BinaryCache::open(client.clone(), url)
            .await
            .with_context(|| format!("failed to open upstream: {raw}"))?;
        tracing::info!(upstream = %raw, priority = cache.priority(), "Upstream opened");
        stores.push(Arc::new(cache));
    }
    let store = Arc::new(MultiStore::new(stores).context("failed to assemble upstream stores")?);

    let local = match &config.server.local_cache {
        Some(dir) => {
            let cache = FsCache::open(dir)
                .await
                .with_context(|| format!("failed to open local cache: {}", dir.display()))?;
            tracing::info!(dir = %dir.display(), "Local write-through cache enabled");
            Some(Arc::new(cache))
        }
        None => None,
    };

    let state = AppState::new(store, local, config.server.priority);
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
