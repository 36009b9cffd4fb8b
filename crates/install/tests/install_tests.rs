//! Closure installer behavior: ordering, idempotence, trust, rollback.

mod common;

use common::{MemoryStore, make_package, test_public_key};
use larder_install::{ClosureInstaller, InstallError, InstallOptions};
use larder_keys::Keychain;
use larder_store::{MultiStore, Store};
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const ROOT_HASH: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const DEP_HASH: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

fn keychain() -> Keychain {
    Keychain::with_keys([test_public_key().as_str()]).unwrap()
}

fn closure_fixtures() -> (common::Package, common::Package) {
    let dep = make_package(
        DEP_HASH,
        "libdep-1.2",
        &[("lib/libdep.so", b"elf bytes", false)],
        &[],
        &[],
    );
    let root = make_package(
        ROOT_HASH,
        "app-1.0",
        &[("bin/app", b"#!/bin/sh\nexec libdep\n", true)],
        &[("bin/app-alias", "app")],
        &[&dep.basename],
    );
    (root, dep)
}

fn installer(
    store: Arc<MemoryStore>,
    dest: &std::path::Path,
    cancel: CancellationToken,
) -> ClosureInstaller {
    let multi = MultiStore::new(vec![store as Arc<dyn Store>]).unwrap();
    ClosureInstaller::new(
        Arc::new(multi),
        keychain(),
        dest,
        cancel,
        InstallOptions::default(),
    )
}

#[tokio::test]
async fn test_installs_whole_closure() {
    let (root, dep) = closure_fixtures();
    let mut store = MemoryStore::new();
    store.add(&root);
    store.add(&dep);
    let store = Arc::new(store);
    let dest = tempfile::tempdir().unwrap();

    installer(store.clone(), dest.path(), CancellationToken::new())
        .run([root.basename.clone()])
        .await
        .unwrap();

    // The reference was discovered and installed, not just the root.
    let app = dest.path().join(&root.basename).join("bin/app");
    let lib = dest.path().join(&dep.basename).join("lib/libdep.so");
    assert_eq!(std::fs::read(&app).unwrap(), b"#!/bin/sh\nexec libdep\n");
    assert_eq!(std::fs::read(&lib).unwrap(), b"elf bytes");

    // Read-only permission policy: 0o555 for executables and directories,
    // 0o444 for plain files.
    let mode = |p: &std::path::Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode(&app), 0o555);
    assert_eq!(mode(&lib), 0o444);
    assert_eq!(mode(&dest.path().join(&root.basename)), 0o555);

    let alias = dest.path().join(&root.basename).join("bin/app-alias");
    assert_eq!(std::fs::read_link(&alias).unwrap().to_str().unwrap(), "app");

    assert_eq!(store.nar_fetches(), 2);
}

#[tokio::test]
async fn test_second_install_is_a_noop() {
    let (root, dep) = closure_fixtures();
    let mut store = MemoryStore::new();
    store.add(&root);
    store.add(&dep);
    let store = Arc::new(store);
    let dest = tempfile::tempdir().unwrap();

    installer(store.clone(), dest.path(), CancellationToken::new())
        .run([root.basename.clone()])
        .await
        .unwrap();
    assert_eq!(store.nar_fetches(), 2);

    // A fresh installer over the same destination: the directory-exists
    // short-circuit must skip extraction without re-fetching any NAR.
    installer(store.clone(), dest.path(), CancellationToken::new())
        .run([root.basename.clone()])
        .await
        .unwrap();
    assert_eq!(store.nar_fetches(), 2);
}

#[tokio::test]
async fn test_bare_hash_roots_are_accepted() {
    let (root, dep) = closure_fixtures();
    let mut store = MemoryStore::new();
    store.add(&root);
    store.add(&dep);
    let dest = tempfile::tempdir().unwrap();

    installer(Arc::new(store), dest.path(), CancellationToken::new())
        .run([ROOT_HASH.to_string()])
        .await
        .unwrap();
    assert!(dest.path().join(&root.basename).is_dir());
}

#[tokio::test]
async fn test_invalid_signature_installs_nothing() {
    let (root, _) = closure_fixtures();
    let mut tampered = root.clone();
    // Flip the signature by replacing it with a signature over different
    // data (reuse the dep fingerprint signer on garbage).
    tampered.info_text = tampered
        .info_text
        .lines()
        .map(|l| {
            if l.starts_with("Sig: ") {
                format!("Sig: {}", common::sign("1;not;the;fingerprint;"))
            } else {
                l.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut store = MemoryStore::new();
    store.add(&tampered);
    let store = Arc::new(store);
    let dest = tempfile::tempdir().unwrap();

    let err = installer(store.clone(), dest.path(), CancellationToken::new())
        .run([root.basename.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, InstallError::InvalidSignature { .. }));
    assert!(!dest.path().join(&root.basename).exists());
    // Rejected before any byte was downloaded.
    assert_eq!(store.nar_fetches(), 0);
}

#[tokio::test]
async fn test_untrusted_key_is_rejected() {
    let (root, dep) = closure_fixtures();
    let mut store = MemoryStore::new();
    store.add(&root);
    store.add(&dep);
    let dest = tempfile::tempdir().unwrap();

    let multi = MultiStore::new(vec![Arc::new(store) as Arc<dyn Store>]).unwrap();
    let empty_keychain = Keychain::new();
    let err = ClosureInstaller::new(
        Arc::new(multi),
        empty_keychain,
        dest.path(),
        CancellationToken::new(),
        InstallOptions::default(),
    )
    .run([root.basename.clone()])
    .await
    .unwrap_err();
    assert!(matches!(err, InstallError::InvalidSignature { .. }));
}

#[tokio::test]
async fn test_rollback_removes_everything() {
    let (root, _) = closure_fixtures();
    let mut store = MemoryStore::new();
    store.add(&root);
    // Serve a truncated NAR so extraction fails after the tree starts
    // landing on disk. The narinfo still promises the full length.
    let truncated = root.nar[..root.nar.len() - 30].to_vec();
    store.nars.insert(root.nar_pathname.clone(), truncated);
    let dest = tempfile::tempdir().unwrap();

    let err = installer(Arc::new(store), dest.path(), CancellationToken::new())
        .run([root.basename.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, InstallError::Extract { .. }));

    // Not a half-written store path: the target directory itself is gone.
    assert!(!dest.path().join(&root.basename).exists());
    // The destination root survives for other paths.
    assert!(dest.path().is_dir());
}

#[tokio::test]
async fn test_missing_dependency_fails_but_installs_root() {
    let (root, dep) = closure_fixtures();
    let mut store = MemoryStore::new();
    store.add(&root); // dep's narinfo is missing
    let dest = tempfile::tempdir().unwrap();

    let err = installer(Arc::new(store), dest.path(), CancellationToken::new())
        .run([root.basename.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, InstallError::Fetch { .. }));

    // The root itself was already scheduled and still installs.
    assert!(dest.path().join(&root.basename).is_dir());
    assert!(!dest.path().join(&dep.basename).exists());
}

#[tokio::test]
async fn test_invalid_root_reference() {
    let store = Arc::new(MemoryStore::new());
    let dest = tempfile::tempdir().unwrap();

    let err = installer(store, dest.path(), CancellationToken::new())
        .run(["not-a-store-path".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, InstallError::InvalidReference(_)));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let (root, dep) = closure_fixtures();
    let mut store = MemoryStore::new();
    store.add(&root);
    store.add(&dep);
    let dest = tempfile::tempdir().unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = installer(Arc::new(store), dest.path(), cancel)
        .run([root.basename.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, InstallError::Cancelled));
    assert!(!dest.path().join(&root.basename).exists());
}
