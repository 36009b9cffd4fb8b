//! Streaming NAR decompression.
//!
//! Decompression is a pluggable byte transform keyed by the narinfo's
//! compression tag. Codecs run in-process on top of a buffered stream
//! reader; upstream errors tunnel through the reader layer and come back
//! out as their original [`StoreError`](crate::StoreError).

use crate::error::StoreError;
use crate::traits::ByteStream;
use async_compression::tokio::bufread::{BzDecoder, GzipDecoder, XzDecoder, ZstdDecoder};
use futures::StreamExt;
use larder_core::Compression;
use tokio::io::AsyncRead;
use tokio_util::io::{ReaderStream, StreamReader};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Wrap `input` in a streaming decoder for `algorithm`.
///
/// `Compression::None` is the identity transform. A corrupt compressed
/// stream surfaces as [`StoreError::Decompression`] from the returned
/// stream, not as a panic or a silent truncation.
pub fn decompress(algorithm: Compression, input: ByteStream) -> ByteStream {
    let reader = StreamReader::new(input.map(|chunk| chunk.map_err(std::io::Error::other)));

    let decoder: Box<dyn AsyncRead + Send + Unpin> = match algorithm {
        Compression::None => Box::new(reader),
        Compression::Gzip => Box::new(GzipDecoder::new(reader)),
        Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
        Compression::Zstd => Box::new(ZstdDecoder::new(reader)),
        Compression::Xz => Box::new(XzDecoder::new(reader)),
    };

    Box::pin(ReaderStream::with_capacity(decoder, READ_CHUNK_SIZE).map(|c| c.map_err(unwrap_io)))
}

/// Recover a [`StoreError`] tunneled through the reader layer; anything
/// else genuinely came from the codec.
fn unwrap_io(err: std::io::Error) -> StoreError {
    match err.downcast::<StoreError>() {
        Ok(inner) => inner,
        Err(err) => StoreError::Decompression(err.to_string()),
    }
}
