//! HTTP-backed binary cache store.

use crate::error::{StoreError, StoreResult};
use crate::traits::{ByteStream, Store};
use async_trait::async_trait;
use futures::TryStreamExt;
use larder_core::{Error as CoreError, NarInfo, NarListing, StorePathHash};
use url::Url;

/// A remote binary cache reached over HTTP.
///
/// Opened by fetching `nix-cache-info`, which advertises the store
/// directory, whether the cache welcomes mass queries, and its preference
/// priority (lower is more preferred).
#[derive(Clone, Debug)]
pub struct BinaryCache {
    client: reqwest::Client,
    url: Url,
    store_dir: String,
    want_mass_query: bool,
    priority: u32,
}

impl BinaryCache {
    /// Open a cache at `url`, failing unless `nix-cache-info` is served
    /// with a 2xx status.
    pub async fn open(client: reqwest::Client, mut url: Url) -> StoreResult<Self> {
        if !url.path().ends_with('/') {
            url.set_path(&format!("{}/", url.path()));
        }

        let info_url = join(&url, "nix-cache-info")?;
        let response = fetch(&client, info_url).await?;
        let text = response_text(response).await?;

        let mut store_dir = None;
        let mut want_mass_query = false;
        let mut priority = 0;
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(": ")
                .ok_or_else(|| CoreError::CacheInfoParse(format!("invalid line: {line}")))?;
            match key {
                "StoreDir" => store_dir = Some(value.to_string()),
                "WantMassQuery" => want_mass_query = value == "1",
                "Priority" => {
                    priority = value
                        .parse()
                        .map_err(|e| CoreError::CacheInfoParse(format!("invalid Priority: {e}")))?
                }
                _ => {}
            }
        }

        Ok(Self {
            client,
            url,
            store_dir: store_dir
                .ok_or_else(|| CoreError::CacheInfoParse("missing StoreDir".to_string()))?,
            want_mass_query,
            priority,
        })
    }

    /// The cache's base URL (always ending in `/`).
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn want_mass_query(&self) -> bool {
        self.want_mass_query
    }

    async fn fetch(&self, path: &str) -> StoreResult<reqwest::Response> {
        fetch(&self.client, join(&self.url, path)?).await
    }
}

fn join(base: &Url, path: &str) -> StoreResult<Url> {
    base.join(path)
        .map_err(|e| StoreError::InvalidPathname(format!("{path}: {e}")))
}

/// Issue a GET, surfacing transport failures and non-2xx statuses as
/// errors carrying the URL.
async fn fetch(client: &reqwest::Client, url: Url) -> StoreResult<reqwest::Response> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|source| StoreError::Transport {
            url: url.to_string(),
            source,
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(StoreError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response)
}

async fn response_text(response: reqwest::Response) -> StoreResult<String> {
    let url = response.url().to_string();
    response
        .text()
        .await
        .map_err(|source| StoreError::Transport { url, source })
}

#[async_trait]
impl Store for BinaryCache {
    fn store_dir(&self) -> &str {
        &self.store_dir
    }

    fn supports_mass_query(&self) -> bool {
        self.want_mass_query || self.url.scheme() == "file"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn get_info(&self, hash: &StorePathHash) -> StoreResult<NarInfo> {
        let response = self.fetch(&format!("{hash}.narinfo")).await?;
        let text = response_text(response).await?;
        Ok(NarInfo::parse(&text, &self.store_dir, hash.clone())?)
    }

    async fn get_listing(&self, hash: &StorePathHash) -> StoreResult<NarListing> {
        let response = self.fetch(&format!("{hash}.ls")).await?;
        let json = response_text(response).await?;
        Ok(NarListing::from_json(&json)?)
    }

    async fn get_nar(&self, nar_pathname: &str) -> StoreResult<ByteStream> {
        let response = self.fetch(nar_pathname).await?;
        let url = response.url().to_string();
        let stream = response.bytes_stream().map_err(move |source| {
            StoreError::Transport {
                url: url.clone(),
                source,
            }
        });
        Ok(Box::pin(stream))
    }
}
