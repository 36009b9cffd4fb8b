//! Shared test support: an in-memory store, NAR fixtures, and a test
//! signing key.
#![allow(dead_code)]

use base64::Engine;
use bytes::Bytes;
use ed25519_dalek::{Signer, SigningKey};
use larder_core::{NarInfo, NarListing, StorePathHash};
use larder_store::{ByteStream, Store, StoreError, StoreResult};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub const TEST_KEY_NAME: &str = "larder-test-1";

fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

/// The `name:base64` public key matching [`sign`].
pub fn test_public_key() -> String {
    let key = signing_key().verifying_key();
    format!(
        "{TEST_KEY_NAME}:{}",
        base64::engine::general_purpose::STANDARD.encode(key.as_bytes())
    )
}

/// Sign a fingerprint with the test key, returning the `Sig:` value.
pub fn sign(fingerprint: &str) -> String {
    let sig = signing_key().sign(fingerprint.as_bytes());
    format!(
        "{TEST_KEY_NAME}:{}",
        base64::engine::general_purpose::STANDARD.encode(sig.to_bytes())
    )
}

/// An in-memory store tracking fetch counts.
#[derive(Default)]
pub struct MemoryStore {
    pub infos: HashMap<String, String>,
    pub listings: HashMap<String, String>,
    pub nars: HashMap<String, Vec<u8>>,
    pub nar_fetches: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, package: &Package) {
        self.infos.insert(package.hash.clone(), package.info_text.clone());
        self.listings
            .insert(package.hash.clone(), package.listing_json.clone());
        self.nars
            .insert(package.nar_pathname.clone(), package.nar.clone());
    }

    pub fn nar_fetches(&self) -> u64 {
        self.nar_fetches.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    fn store_dir(&self) -> &str {
        "/nix/store"
    }

    fn supports_mass_query(&self) -> bool {
        true
    }

    async fn get_info(&self, hash: &StorePathHash) -> StoreResult<NarInfo> {
        let text = self
            .infos
            .get(hash.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("{hash}.narinfo")))?;
        Ok(NarInfo::parse(text, "/nix/store", hash.clone())?)
    }

    async fn get_listing(&self, hash: &StorePathHash) -> StoreResult<NarListing> {
        let json = self
            .listings
            .get(hash.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("{hash}.ls")))?;
        Ok(NarListing::from_json(json)?)
    }

    async fn get_nar(&self, nar_pathname: &str) -> StoreResult<ByteStream> {
        self.nar_fetches.fetch_add(1, Ordering::Relaxed);
        let bytes = self
            .nars
            .get(nar_pathname)
            .ok_or_else(|| StoreError::NotFound(nar_pathname.to_string()))?;
        let chunks: Vec<StoreResult<Bytes>> = bytes
            .chunks(13)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// A complete signed synthetic store path.
#[derive(Clone, Debug)]
pub struct Package {
    pub hash: String,
    pub basename: String,
    pub nar_pathname: String,
    pub info_text: String,
    pub listing_json: String,
    pub nar: Vec<u8>,
}

/// Build a synthetic package signed with the test key.
pub fn make_package(
    hash: &str,
    name: &str,
    files: &[(&str, &[u8], bool)],
    symlinks: &[(&str, &str)],
    references: &[&str],
) -> Package {
    let mut nar = vec![0u8; 64];
    let mut placed = Vec::new();
    for (path, contents, executable) in files {
        let offset = nar.len() as u64;
        nar.extend_from_slice(contents);
        nar.extend_from_slice(&[0u8; 8]);
        placed.push((*path, offset, contents.len() as u64, *executable));
    }
    nar.extend_from_slice(&[0u8; 16]);

    let mut root = json!({ "type": "directory", "entries": {} });
    for (path, offset, size, executable) in &placed {
        let mut entry = json!({ "type": "regular", "narOffset": offset, "size": size });
        if *executable {
            entry["executable"] = json!(true);
        }
        insert_entry(&mut root, path, entry);
    }
    for (path, target) in symlinks {
        insert_entry(&mut root, path, json!({ "type": "symlink", "target": target }));
    }
    let listing_json = json!({ "root": root, "version": 1 }).to_string();

    let digest = Sha256::digest(&nar).to_vec();
    let nar_hash = larder_core::Hash::from_digest("sha256", digest);
    let nar_pathname = format!("nar/{hash}.nar");

    let fingerprint = format!(
        "1;/nix/store/{hash}-{name};{raw};{size};{refs}",
        raw = nar_hash.raw,
        size = nar.len(),
        refs = references
            .iter()
            .map(|r| format!("/nix/store/{r}"))
            .collect::<Vec<_>>()
            .join(","),
    );

    let mut info_text = format!(
        "StorePath: /nix/store/{hash}-{name}\n\
         URL: {nar_pathname}\n\
         Compression: none\n\
         FileHash: {raw}\n\
         FileSize: {size}\n\
         NarHash: {raw}\n\
         NarSize: {size}\n",
        raw = nar_hash.raw,
        size = nar.len(),
    );
    if !references.is_empty() {
        info_text.push_str(&format!("References: {}\n", references.join(" ")));
    }
    info_text.push_str(&format!("Sig: {}\n", sign(&fingerprint)));

    Package {
        hash: hash.to_string(),
        basename: format!("{hash}-{name}"),
        nar_pathname,
        info_text,
        listing_json,
        nar,
    }
}

fn insert_entry(root: &mut serde_json::Value, path: &str, entry: serde_json::Value) {
    let mut node = root;
    let segments: Vec<&str> = path.split('/').collect();
    for segment in &segments[..segments.len() - 1] {
        let entries = node["entries"].as_object_mut().unwrap();
        node = entries
            .entry(segment.to_string())
            .or_insert_with(|| json!({ "type": "directory", "entries": {} }));
    }
    node["entries"]
        .as_object_mut()
        .unwrap()
        .insert(segments[segments.len() - 1].to_string(), entry);
}
