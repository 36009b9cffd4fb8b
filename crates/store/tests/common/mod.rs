//! Shared test support: an in-memory store and NAR fixtures.
#![allow(dead_code)]

use bytes::Bytes;
use larder_core::{NarInfo, NarListing, StorePathHash};
use larder_store::{ByteStream, Store, StoreError, StoreResult};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory store for driving the pipeline without I/O.
#[derive(Default)]
pub struct MemoryStore {
    pub infos: HashMap<String, String>,
    pub listings: HashMap<String, String>,
    pub nars: HashMap<String, Vec<u8>>,
    pub info_fetches: AtomicU64,
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

    pub fn info_fetches(&self) -> u64 {
        self.info_fetches.load(Ordering::Relaxed)
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
        self.info_fetches.fetch_add(1, Ordering::Relaxed);
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
            .chunks(11)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// A complete synthetic store path: NAR bytes, listing, and narinfo.
#[derive(Clone, Debug)]
pub struct Package {
    pub hash: String,
    pub basename: String,
    pub nar_pathname: String,
    pub info_text: String,
    pub listing_json: String,
    pub nar: Vec<u8>,
    pub fingerprint: String,
}

impl Package {
    pub fn store_path_hash(&self) -> StorePathHash {
        StorePathHash::new(&self.hash).unwrap()
    }

    pub fn parse_info(&self) -> NarInfo {
        NarInfo::parse(&self.info_text, "/nix/store", self.store_path_hash()).unwrap()
    }
}

/// Build a synthetic package.
///
/// `files` are `(path, contents, executable)`; `symlinks` are
/// `(path, target)`. Paths may be nested (`bin/tool`); intermediate
/// directories are created in the listing. The NAR is file bodies spliced
/// between structural filler bytes, hashed for real so the pipeline's
/// checks pass.
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

    Package {
        hash: hash.to_string(),
        basename: format!("{hash}-{name}"),
        nar_pathname,
        info_text,
        listing_json,
        nar,
        fingerprint,
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
