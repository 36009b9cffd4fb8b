//! Closure traversal and extraction.
//!
//! Walks the reference graph of the requested store paths, fetching each
//! path's metadata once, and extracts every path into the destination
//! directory exactly once. Store paths are immutable: a target directory
//! that already exists is taken as already installed and skipped.

use crate::error::{InstallError, InstallResult};
use crate::queue::{Band, TaskQueue};
use dashmap::DashSet;
use larder_core::StorePathHash;
use larder_keys::{Keychain, VerifyOutcome};
use larder_store::{FetchOptions, Located, MultiStore, NarEntry, StoreError, fetch_entries_located};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Concurrency when every store is local or welcomes mass queries.
const HIGH_CONCURRENCY: usize = 32;
/// Concurrency when some remote store does not want bulk traffic.
const LOW_CONCURRENCY: usize = 4;

/// Installer options.
#[derive(Clone, Debug, Default)]
pub struct InstallOptions {
    /// Override the concurrency bound chosen from store capabilities.
    pub jobs: Option<usize>,
}

/// Concurrency-bounded installer of store path closures.
pub struct ClosureInstaller {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<MultiStore>,
    keychain: Keychain,
    dest: PathBuf,
    seen: DashSet<String>,
    queue: TaskQueue,
    cancel: CancellationToken,
    errors: Mutex<Vec<InstallError>>,
}

impl ClosureInstaller {
    /// Create an installer extracting under `dest`.
    ///
    /// `cancel` propagates to every in-flight fetch; an extraction that is
    /// cancelled still rolls back its partial output before stopping.
    pub fn new(
        store: Arc<MultiStore>,
        keychain: Keychain,
        dest: impl Into<PathBuf>,
        cancel: CancellationToken,
        options: InstallOptions,
    ) -> Self {
        let permits = options.jobs.unwrap_or(if store.all_support_mass_query() {
            HIGH_CONCURRENCY
        } else {
            LOW_CONCURRENCY
        });
        Self {
            inner: Arc::new(Inner {
                store,
                keychain,
                dest: dest.into(),
                seen: DashSet::new(),
                queue: TaskQueue::new(permits),
                cancel,
                errors: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Install the closures of `roots` (store path basenames or bare
    /// hashes) and wait for completion.
    ///
    /// A failure in one path's discovery or extraction does not cancel
    /// work already scheduled for its siblings; the first error is
    /// returned once the queue drains.
    pub async fn run(&self, roots: impl IntoIterator<Item = String>) -> InstallResult<()> {
        fs::create_dir_all(&self.inner.dest)
            .await
            .map_err(|source| InstallError::Io {
                path: self.inner.dest.display().to_string(),
                source,
            })?;

        for root in roots {
            schedule_discover(&self.inner, root);
        }
        self.inner.queue.idle().await;

        if self.inner.cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }
        let mut errors = self.inner.errors.lock().expect("error list poisoned");
        match errors.is_empty() {
            true => Ok(()),
            false => Err(errors.remove(0)),
        }
    }
}

fn record(inner: &Inner, err: InstallError) {
    error!("{err}");
    inner.errors.lock().expect("error list poisoned").push(err);
}

/// Queue discovery of one store path unless it was already seen.
///
/// The seen-set insert is the at-most-once gate: whichever task inserts
/// first owns the path's whole lifecycle, so no two tasks ever touch the
/// same target directory.
fn schedule_discover(inner: &Arc<Inner>, reference: String) {
    let hash = match StorePathHash::from_prefix(&reference) {
        Ok(hash) => hash,
        Err(_) => {
            record(inner, InstallError::InvalidReference(reference));
            return;
        }
    };
    if !inner.seen.insert(hash.as_str().to_string()) {
        return;
    }

    let inner = inner.clone();
    let queue = inner.queue.clone();
    queue.spawn(Band::Discover, async move {
        if inner.cancel.is_cancelled() {
            return;
        }
        match inner.store.get_info(&hash).await {
            Ok(located) => {
                for reference in &located.value.references {
                    schedule_discover(&inner, reference.clone());
                }
                let install_inner = inner.clone();
                inner.queue.spawn(Band::Install, async move {
                    install_one(&install_inner, located).await;
                });
            }
            Err(source) => record(
                &inner,
                InstallError::Fetch {
                    path: hash.to_string(),
                    source,
                },
            ),
        }
    });
}

async fn install_one(inner: &Inner, located: Located<larder_core::NarInfo>) {
    if inner.cancel.is_cancelled() {
        return;
    }
    let info = &located.value;
    let basename = info.basename();
    let target = inner.dest.join(&basename);

    // Store paths are immutable once present.
    if fs::symlink_metadata(&target).await.is_ok() {
        debug!(path = %basename, "already installed, skipping");
        return;
    }

    match inner.keychain.verify_narinfo(info) {
        Ok(VerifyOutcome::Valid) => {}
        Ok(VerifyOutcome::Invalid(reason)) => {
            record(
                inner,
                InstallError::InvalidSignature {
                    path: basename,
                    reason,
                },
            );
            return;
        }
        Err(source) => {
            record(
                inner,
                InstallError::BadSignatureFormat {
                    path: basename,
                    source,
                },
            );
            return;
        }
    }

    info!(path = %basename, "installing");
    match extract(inner, &located, &target).await {
        Ok(()) => info!(path = %basename, "installed"),
        Err(err) => record(inner, err),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CreatedKind {
    Dir,
    File,
    Symlink,
}

/// Stream the verified entry sequence to disk.
///
/// Every created path is tracked; on any error (including cancellation)
/// the partial output is rolled back before the error propagates, so the
/// target directory either appears complete or not at all.
async fn extract(
    inner: &Inner,
    located: &Located<larder_core::NarInfo>,
    target: &Path,
) -> InstallResult<()> {
    let basename = located.value.basename();
    let io_err = |source| InstallError::Io {
        path: basename.clone(),
        source,
    };

    let mut decoder = fetch_entries_located(&inner.store, located, FetchOptions::default())
        .await
        .map_err(|source| InstallError::Fetch {
            path: basename.clone(),
            source,
        })?;

    let mut created: Vec<(PathBuf, CreatedKind)> = Vec::new();

    let result: InstallResult<()> = async {
        loop {
            if inner.cancel.is_cancelled() {
                return Err(InstallError::Cancelled);
            }
            let Some(entry) = decoder
                .next_entry()
                .await
                .map_err(|source| InstallError::Extract {
                    path: basename.clone(),
                    source,
                })?
            else {
                break;
            };

            let path = entry_path(target, entry.path())
                .map_err(|source| InstallError::Extract {
                    path: basename.clone(),
                    source,
                })?;

            match entry {
                NarEntry::Directory { .. } => {
                    fs::create_dir(&path).await.map_err(io_err)?;
                    created.push((path, CreatedKind::Dir));
                }
                NarEntry::Symlink { target: link, .. } => {
                    fs::symlink(&link, &path).await.map_err(io_err)?;
                    created.push((path, CreatedKind::Symlink));
                }
                NarEntry::Regular {
                    executable,
                    mut body,
                    ..
                } => {
                    use tokio::io::AsyncWriteExt;

                    let mut file = fs::File::create(&path).await.map_err(io_err)?;
                    created.push((path.clone(), CreatedKind::File));
                    loop {
                        let chunk = body.next_chunk().await.map_err(|source| {
                            InstallError::Extract {
                                path: basename.clone(),
                                source,
                            }
                        })?;
                        match chunk {
                            Some(chunk) => file.write_all(&chunk).await.map_err(io_err)?,
                            None => break,
                        }
                    }
                    file.flush().await.map_err(io_err)?;
                    drop(file);
                    let mode = if executable { 0o555 } else { 0o444 };
                    set_mode(&path, mode).await.map_err(io_err)?;
                }
            }
        }

        // Tighten directories only after the whole tree is written.
        for (path, kind) in created.iter().rev() {
            if *kind == CreatedKind::Dir {
                set_mode(path, 0o555).await.map_err(io_err)?;
            }
        }
        Ok(())
    }
    .await;

    if let Err(err) = result {
        rollback(&created, target).await;
        return Err(err);
    }
    Ok(())
}

/// Resolve an entry path under the target, rejecting anything that would
/// escape it.
fn entry_path(target: &Path, relative: &str) -> Result<PathBuf, StoreError> {
    if relative.is_empty() {
        return Ok(target.to_path_buf());
    }
    let path = Path::new(relative);
    if !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(StoreError::InvalidPathname(relative.to_string()));
    }
    Ok(target.join(path))
}

async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

/// Remove everything `extract` created, in reverse creation order.
///
/// Directories were made read-only on success paths, so write permission
/// is restored first; unlinking needs a writable parent.
async fn rollback(created: &[(PathBuf, CreatedKind)], target: &Path) {
    for (path, kind) in created {
        if *kind == CreatedKind::Dir {
            let _ = set_mode(path, 0o755).await;
        }
    }
    for (path, kind) in created.iter().rev() {
        let result = match kind {
            CreatedKind::Dir => fs::remove_dir(path).await,
            CreatedKind::File | CreatedKind::Symlink => fs::remove_file(path).await,
        };
        if let Err(e) = result {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!(path = %path.display(), "rollback failed to remove: {e}");
            }
        }
    }
    // The target directory itself must not survive a failed install.
    let _ = fs::remove_dir(target).await;
}
