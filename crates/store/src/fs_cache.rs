//! Filesystem-backed cache store.
//!
//! Lays objects out the way an HTTP cache does: `<hash>.narinfo`,
//! `<hash>.ls`, and `nar/<name>`. Writable; writes are staged to a
//! temporary path and renamed into place so a concurrent reader never
//! observes a partial object.

use crate::error::{StoreError, StoreResult};
use crate::traits::{ByteStream, Store, WritableStore};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use larder_core::{NarInfo, NarListing, StorePathHash};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// A writable, filesystem-backed binary cache.
pub struct FsCache {
    dir: PathBuf,
    store_dir: String,
}

impl FsCache {
    /// Open (creating if needed) a cache directory.
    pub async fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join("nar")).await?;
        Ok(Self {
            dir,
            store_dir: "/nix/store".to_string(),
        })
    }

    /// Resolve a NAR pathname, rejecting anything outside `nar/`.
    fn nar_path(&self, nar_pathname: &str) -> StoreResult<PathBuf> {
        let name = nar_pathname
            .strip_prefix("nar/")
            .ok_or_else(|| StoreError::InvalidPathname(nar_pathname.to_string()))?;
        if name.is_empty()
            || !Path::new(name)
                .components()
                .all(|c| matches!(c, std::path::Component::Normal(_)))
            || name.contains('/')
        {
            return Err(StoreError::InvalidPathname(nar_pathname.to_string()));
        }
        Ok(self.dir.join("nar").join(name))
    }

    /// Write `data` to `path` via a staged temp file and atomic rename.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> StoreResult<()> {
        let temp_path = temp_sibling(path);
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, path).await?;
        Ok(())
    }

    fn map_not_found(err: std::io::Error, key: String) -> StoreError {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(key)
        } else {
            StoreError::Io(err)
        }
    }
}

/// Unique temp name next to the final path, so rename stays on one
/// filesystem and concurrent writers cannot collide.
fn temp_sibling(path: &Path) -> PathBuf {
    let temp_name = format!(".tmp.{}", Uuid::new_v4());
    path.with_file_name(
        path.file_name()
            .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
            .unwrap_or(temp_name),
    )
}

#[async_trait]
impl Store for FsCache {
    fn store_dir(&self) -> &str {
        &self.store_dir
    }

    fn supports_mass_query(&self) -> bool {
        true // local disk, querying is cheap
    }

    #[instrument(skip(self), fields(store = "fs"))]
    async fn get_info(&self, hash: &StorePathHash) -> StoreResult<NarInfo> {
        let key = format!("{hash}.narinfo");
        let text = fs::read_to_string(self.dir.join(&key))
            .await
            .map_err(|e| Self::map_not_found(e, key))?;
        Ok(NarInfo::parse(&text, &self.store_dir, hash.clone())?)
    }

    #[instrument(skip(self), fields(store = "fs"))]
    async fn get_listing(&self, hash: &StorePathHash) -> StoreResult<NarListing> {
        let key = format!("{hash}.ls");
        let json = fs::read_to_string(self.dir.join(&key))
            .await
            .map_err(|e| Self::map_not_found(e, key))?;
        Ok(NarListing::from_json(&json)?)
    }

    #[instrument(skip(self), fields(store = "fs"))]
    async fn get_nar(&self, nar_pathname: &str) -> StoreResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.nar_path(nar_pathname)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| Self::map_not_found(e, nar_pathname.to_string()))?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };
        Ok(Box::pin(stream))
    }

    fn as_writable(&self) -> Option<&dyn WritableStore> {
        Some(self)
    }
}

#[async_trait]
impl WritableStore for FsCache {
    #[instrument(skip(self, info), fields(store = "fs"))]
    async fn put_info(&self, hash: &StorePathHash, info: &NarInfo) -> StoreResult<()> {
        let path = self.dir.join(format!("{hash}.narinfo"));
        self.write_atomic(&path, info.to_text().as_bytes()).await
    }

    #[instrument(skip(self, listing), fields(store = "fs"))]
    async fn put_listing(&self, hash: &StorePathHash, listing: &NarListing) -> StoreResult<()> {
        let path = self.dir.join(format!("{hash}.ls"));
        self.write_atomic(&path, listing.to_json().as_bytes()).await
    }

    #[instrument(skip(self, body), fields(store = "fs"))]
    async fn put_nar(&self, nar_pathname: &str, mut body: ByteStream) -> StoreResult<()> {
        let path = self.nar_path(nar_pathname)?;
        let temp_path = temp_sibling(&path);

        let result: StoreResult<()> = async {
            let mut file = fs::File::create(&temp_path).await?;
            while let Some(chunk) = body.next().await {
                file.write_all(&chunk?).await?;
            }
            file.sync_all().await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                fs::rename(&temp_path, &path).await?;
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }
}
