//! The verified fetch pipeline.
//!
//! Composes length checks, content-hash checks, decompression, and the NAR
//! codec into one fail-fast stream:
//!
//! ```text
//! nar body -> length(file_size) -> hash(file_hash) -> decompress
//!          -> length(nar_size) -> hash(nar_hash) -> NarDecoder
//! ```
//!
//! Any stage failing aborts the whole stream with that stage's error.
//! Entries already yielded are not retracted: a consumer that saw an error
//! must treat everything it extracted as contaminated.

use crate::codec::NarDecoder;
use crate::error::StoreResult;
use crate::multi::{Located, MultiStore};
use crate::traits::{ByteStream, Store};
use crate::{compression, verify};
use bytes::Bytes;
use futures::StreamExt;
use larder_core::{NarInfo, NarListing};
use std::sync::Arc;

/// Progress callback, invoked with cumulative compressed bytes received.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Options for a verified fetch.
#[derive(Clone, Default)]
pub struct FetchOptions {
    /// Optional transfer-progress side channel. Not part of the
    /// correctness contract.
    pub progress: Option<ProgressFn>,
}

/// Fetch the listing and NAR for `info` from `store` and return a decoder
/// over the fully verified stream.
///
/// The listing and NAR body are fetched concurrently. Nothing is yielded
/// unless every verification stage holds for the bytes seen so far.
pub async fn fetch_entries(
    store: &dyn Store,
    info: &NarInfo,
    options: FetchOptions,
) -> StoreResult<NarDecoder> {
    let (listing, nar) = tokio::try_join!(
        store.get_listing(&info.hash),
        store.get_nar(&info.nar_pathname)
    )?;
    build(info, &listing, nar, options)
}

/// Like [`fetch_entries`], but for a narinfo resolved through a
/// [`MultiStore`]: the NAR is fetched from the store that produced the
/// narinfo, with no fallback.
pub async fn fetch_entries_located(
    store: &MultiStore,
    info: &Located<NarInfo>,
    options: FetchOptions,
) -> StoreResult<NarDecoder> {
    let (listing, nar) = tokio::try_join!(
        MultiStore::get_listing(store, &info.value.hash),
        store.get_nar_from(info.source, &info.value.nar_pathname)
    )?;
    build(&info.value, &listing.value, nar, options)
}

fn build(
    info: &NarInfo,
    listing: &NarListing,
    nar: ByteStream,
    options: FetchOptions,
) -> StoreResult<NarDecoder> {
    let mut stream = nar;
    if let Some(progress) = options.progress {
        stream = report_progress(stream, progress);
    }
    let stream = verify::length(stream, info.file_size, "compressed file");
    let stream = verify::hash(stream, &info.file_hash)?;
    let stream = compression::decompress(info.compression, stream);
    let stream = verify::length(stream, info.nar_size, "nar");
    let stream = verify::hash(stream, &info.nar_hash)?;
    NarDecoder::new(listing, stream)
}

fn report_progress(input: ByteStream, progress: ProgressFn) -> ByteStream {
    Box::pin(async_stream::try_stream! {
        let mut input = input;
        let mut transferred: u64 = 0;
        while let Some(chunk) = input.next().await {
            let chunk: Bytes = chunk?;
            transferred += chunk.len() as u64;
            progress(transferred);
            yield chunk;
        }
    })
}
