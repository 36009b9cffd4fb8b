//! larder - install store path closures from binary caches.

use anyhow::{Context, Result, bail};
use clap::Parser;
use larder_core::StorePathHash;
use larder_install::{ClosureInstaller, InstallOptions};
use larder_keys::{Keychain, NIXOS_KEY};
use larder_store::{BinaryCache, MultiStore, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

const DEFAULT_SUBSTITUTER: &str = "https://cache.nixos.org";

/// Install store path closures from binary caches.
#[derive(Parser, Debug)]
#[command(name = "larder")]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory to install store paths into
    #[arg(long, default_value = "./out")]
    dest: PathBuf,

    /// Additional binary cache URLs to use
    #[arg(long = "substituter")]
    substituters: Vec<String>,

    /// Additional trusted public keys (name:base64)
    #[arg(long = "trust")]
    trusted_keys: Vec<String>,

    /// Override the download concurrency bound
    #[arg(long)]
    jobs: Option<usize>,

    /// Store paths to install: basenames (<hash>-<name>) or bare hashes
    #[arg(required = true)]
    paths: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Reject malformed arguments before any network round-trip, listing
    // every bad one rather than stopping at the first.
    let invalid: Vec<&String> = args
        .paths
        .iter()
        .filter(|p| StorePathHash::from_prefix(p).is_err())
        .collect();
    if !invalid.is_empty() {
        bail!(
            "not store paths: {}\n(expected <hash>-<name> basenames or bare 32-character hashes)",
            invalid
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let mut keychain = Keychain::new();
    keychain.trust(NIXOS_KEY).context("failed to trust built-in key")?;
    for key in &args.trusted_keys {
        keychain
            .trust(key)
            .with_context(|| format!("failed to trust key: {key}"))?;
    }

    let client = reqwest::Client::new();
    let default_substituter = DEFAULT_SUBSTITUTER.to_string();
    let mut stores: Vec<Arc<dyn Store>> = Vec::new();
    for raw in std::iter::once(&default_substituter).chain(args.substituters.iter()) {
        let url: Url = raw
            .parse()
            .with_context(|| format!("invalid substituter URL: {raw}"))?;
        let cache = BinaryCache::open(client.clone(), url)
            .await
            .with_context(|| format!("failed to open substituter: {raw}"))?;
        tracing::debug!(substituter = %raw, priority = cache.priority(), "substituter opened");
        stores.push(Arc::new(cache));
    }
    let store =
        Arc::new(MultiStore::new(stores).context("failed to assemble substituters")?);

    // SIGINT cancels in-flight work; extraction rolls back before exiting.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    let installer = ClosureInstaller::new(
        store.clone(),
        keychain,
        &args.dest,
        cancel,
        InstallOptions { jobs: args.jobs },
    );
    installer
        .run(args.paths.clone())
        .await
        .context("installation failed")?;

    tracing::info!(
        dest = %args.dest.display(),
        hits = ?store.hits(),
        misses = store.misses(),
        "done"
    );
    Ok(())
}
