//! Listing-guided NAR extraction.
//!
//! The NAR wire format lays file bodies out in one forward-only sequence.
//! Given a listing with byte offsets, the decoder carves each regular
//! file's range `[nar_offset, nar_offset + size)` out of the stream in
//! ascending offset order, without seeking and without buffering bodies.
//!
//! Directory and symlink entries carry no payload and are emitted first
//! (directories in preorder, so parents always precede children), then
//! regular files as their bytes arrive. A file's body is a lazy, single-pass
//! sub-stream; whatever the consumer leaves unread is skipped when the next
//! entry is requested.

use crate::error::{StoreError, StoreResult};
use crate::traits::ByteStream;
use bytes::{Buf, Bytes};
use futures::StreamExt;
use larder_core::listing::{Entry, NarListing};
use larder_core::{Error as CoreError, LISTING_VERSION};
use std::collections::VecDeque;

/// A regular file flattened out of a listing.
#[derive(Clone, Debug)]
struct RegularFile {
    path: String,
    nar_offset: u64,
    size: u64,
    executable: bool,
}

/// One entry produced by the decoder.
pub enum NarEntry<'a> {
    Directory {
        path: String,
    },
    Symlink {
        path: String,
        target: String,
    },
    Regular {
        path: String,
        executable: bool,
        size: u64,
        body: NarFileBody<'a>,
    },
}

impl NarEntry<'_> {
    /// The entry's path relative to the NAR root ("" for the root itself).
    pub fn path(&self) -> &str {
        match self {
            Self::Directory { path } => path,
            Self::Symlink { path, .. } => path,
            Self::Regular { path, .. } => path,
        }
    }
}

/// Streaming NAR decoder over an uncompressed, verified byte stream.
pub struct NarDecoder {
    input: ByteStream,
    /// Unconsumed bytes from the most recent input chunk.
    pending: Bytes,
    /// Absolute offset of the next unconsumed byte.
    cursor: u64,
    dirs: VecDeque<String>,
    symlinks: VecDeque<(String, String)>,
    files: VecDeque<RegularFile>,
    drained: bool,
}

impl NarDecoder {
    /// Flatten `listing` and prepare to decode `input`.
    ///
    /// Fails on an unsupported listing version or regular-file ranges that
    /// overlap (the stream is forward-only, so overlapping ranges cannot be
    /// satisfied).
    pub fn new(listing: &NarListing, input: ByteStream) -> StoreResult<Self> {
        if listing.version != LISTING_VERSION {
            return Err(CoreError::UnsupportedListingVersion(listing.version).into());
        }

        let mut dirs = VecDeque::new();
        let mut symlinks = VecDeque::new();
        let mut files = Vec::new();

        for (path, entry) in listing.walk() {
            match entry {
                Entry::Directory { .. } => dirs.push_back(path),
                Entry::Symlink { target } => symlinks.push_back((path, target.clone())),
                Entry::Regular {
                    nar_offset,
                    size,
                    executable,
                } => files.push(RegularFile {
                    path,
                    nar_offset: *nar_offset,
                    size: *size,
                    executable: *executable,
                }),
            }
        }

        files.sort_by_key(|f| f.nar_offset);
        for pair in files.windows(2) {
            if pair[0].nar_offset + pair[0].size > pair[1].nar_offset {
                return Err(CoreError::ListingParse(format!(
                    "overlapping file ranges at {} and {}",
                    pair[0].path, pair[1].path
                ))
                .into());
            }
        }

        Ok(Self {
            input,
            pending: Bytes::new(),
            cursor: 0,
            dirs,
            symlinks,
            files: files.into(),
            drained: false,
        })
    }

    /// Produce the next entry, or `None` once the listing is exhausted.
    ///
    /// Requesting the next entry skips whatever the previous file body left
    /// unread. After the last file, the remaining structural bytes are
    /// drained (discarded) so that enclosing verification stages observe
    /// end-of-stream and run their final checks.
    pub async fn next_entry(&mut self) -> StoreResult<Option<NarEntry<'_>>> {
        if let Some(path) = self.dirs.pop_front() {
            return Ok(Some(NarEntry::Directory { path }));
        }
        if let Some((path, target)) = self.symlinks.pop_front() {
            return Ok(Some(NarEntry::Symlink { path, target }));
        }
        if let Some(file) = self.files.pop_front() {
            self.skip_to(file.nar_offset).await?;
            let size = file.size;
            return Ok(Some(NarEntry::Regular {
                path: file.path,
                executable: file.executable,
                size,
                body: NarFileBody {
                    remaining: size,
                    decoder: self,
                },
            }));
        }

        if !self.drained {
            // Trailing NAR structural bytes; not an error.
            while self.fill().await?.is_some() {
                let len = self.pending.len();
                self.pending.advance(len);
                self.cursor += len as u64;
            }
            self.drained = true;
        }
        Ok(None)
    }

    /// Ensure `pending` holds at least one byte. `None` means end of input.
    async fn fill(&mut self) -> StoreResult<Option<()>> {
        while self.pending.is_empty() {
            match self.input.next().await {
                Some(chunk) => self.pending = chunk?,
                None => return Ok(None),
            }
        }
        Ok(Some(()))
    }

    /// Discard bytes until the cursor reaches `target`.
    async fn skip_to(&mut self, target: u64) -> StoreResult<()> {
        while self.cursor < target {
            if self.fill().await?.is_none() {
                return Err(StoreError::TruncatedNar);
            }
            let take = self.pending.len().min((target - self.cursor) as usize);
            self.pending.advance(take);
            self.cursor += take as u64;
        }
        Ok(())
    }
}

/// The lazy body of one regular file: finite, single-pass, not restartable.
pub struct NarFileBody<'a> {
    decoder: &'a mut NarDecoder,
    remaining: u64,
}

impl NarFileBody<'_> {
    /// Bytes of this file not yet read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read the next chunk of the body, or `None` when it is complete.
    ///
    /// End of input mid-file is [`StoreError::TruncatedNar`].
    pub async fn next_chunk(&mut self) -> StoreResult<Option<Bytes>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if self.decoder.fill().await?.is_none() {
            return Err(StoreError::TruncatedNar);
        }
        let take = self.decoder.pending.len().min(self.remaining as usize);
        let chunk = self.decoder.pending.split_to(take);
        self.decoder.cursor += take as u64;
        self.remaining -= take as u64;
        Ok(Some(chunk))
    }

    /// Read the whole body into memory. Test and small-file convenience.
    pub async fn collect(&mut self) -> StoreResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.remaining as usize);
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::NarListing;

    /// A fake NAR: file contents spliced between structural filler bytes.
    fn fixture() -> (NarListing, Vec<u8>) {
        let mut nar = vec![0u8; 64];
        let tool_offset = nar.len() as u64;
        nar.extend_from_slice(b"#!tool!#v");
        nar.extend_from_slice(&[0u8; 31]);
        let readme_offset = nar.len() as u64;
        nar.extend_from_slice(b"hello");
        nar.extend_from_slice(&[0u8; 16]); // trailing structural bytes

        let listing = NarListing::from_json(&format!(
            r#"{{
                "version": 1,
                "root": {{
                    "type": "directory",
                    "entries": {{
                        "bin": {{
                            "type": "directory",
                            "entries": {{
                                "tool": {{
                                    "type": "regular",
                                    "narOffset": {tool_offset},
                                    "size": 9,
                                    "executable": true
                                }}
                            }}
                        }},
                        "link": {{ "type": "symlink", "target": "bin/tool" }},
                        "readme": {{ "type": "regular", "narOffset": {readme_offset}, "size": 5 }}
                    }}
                }}
            }}"#
        ))
        .unwrap();

        (listing, nar)
    }

    fn stream_chunked(data: &[u8], chunk_size: usize) -> ByteStream {
        let chunks: Vec<StoreResult<Bytes>> = data
            .chunks(chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Box::pin(futures::stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_decode_in_order() {
        let (listing, nar) = fixture();
        // Deliberately tiny chunks to exercise chunk-boundary handling.
        let mut decoder = NarDecoder::new(&listing, stream_chunked(&nar, 7)).unwrap();

        let mut dirs = Vec::new();
        let mut symlinks = Vec::new();
        let mut files = Vec::new();
        while let Some(entry) = decoder.next_entry().await.unwrap() {
            match entry {
                NarEntry::Directory { path } => dirs.push(path),
                NarEntry::Symlink { path, target } => symlinks.push((path, target)),
                NarEntry::Regular {
                    path,
                    executable,
                    mut body,
                    ..
                } => {
                    let content = body.collect().await.unwrap();
                    files.push((path, executable, content));
                }
            }
        }

        assert_eq!(dirs, ["", "bin"]);
        assert_eq!(symlinks, [("link".to_string(), "bin/tool".to_string())]);
        assert_eq!(
            files,
            [
                ("bin/tool".to_string(), true, b"#!tool!#v".to_vec()),
                ("readme".to_string(), false, b"hello".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unread_body_is_skipped() {
        let (listing, nar) = fixture();
        let mut decoder = NarDecoder::new(&listing, stream_chunked(&nar, 16)).unwrap();

        let mut seen = Vec::new();
        while let Some(entry) = decoder.next_entry().await.unwrap() {
            // Never read any body; the decoder must still advance.
            seen.push(entry.path().to_string());
        }
        assert_eq!(seen, ["", "bin", "link", "bin/tool", "readme"]);
    }

    #[tokio::test]
    async fn test_truncated_mid_file() {
        let (listing, nar) = fixture();
        // Cut inside the second file's body.
        let truncated = &nar[..nar.len() - 19];
        let mut decoder = NarDecoder::new(&listing, stream_chunked(truncated, 16)).unwrap();

        let result = loop {
            match decoder.next_entry().await {
                Ok(Some(NarEntry::Regular { mut body, .. })) => {
                    if let Err(e) = body.collect().await {
                        break Err(e);
                    }
                }
                Ok(Some(_)) => continue,
                other => break other.map(|_| ()),
            }
        };
        assert!(matches!(result, Err(StoreError::TruncatedNar)));
    }

    #[tokio::test]
    async fn test_truncated_before_file_starts() {
        let (listing, nar) = fixture();
        // Cut before the second file's offset.
        let truncated = &nar[..100];
        let mut decoder = NarDecoder::new(&listing, stream_chunked(truncated, 16)).unwrap();

        let mut result = Ok(());
        while let Some(entry) = match decoder.next_entry().await {
            Ok(e) => e,
            Err(e) => {
                result = Err(e);
                None
            }
        } {
            drop(entry);
        }
        assert!(matches!(result, Err(StoreError::TruncatedNar)));
    }

    #[tokio::test]
    async fn test_trailing_bytes_are_discarded() {
        let (listing, mut nar) = fixture();
        nar.extend_from_slice(&[0u8; 200]); // more trailing padding
        let mut decoder = NarDecoder::new(&listing, stream_chunked(&nar, 32)).unwrap();
        while let Some(entry) = decoder.next_entry().await.unwrap() {
            if let NarEntry::Regular { mut body, .. } = entry {
                body.collect().await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_overlapping_ranges_rejected() {
        let listing = NarListing::from_json(
            r#"{
                "version": 1,
                "root": {
                    "type": "directory",
                    "entries": {
                        "a": { "type": "regular", "narOffset": 10, "size": 20 },
                        "b": { "type": "regular", "narOffset": 25, "size": 5 }
                    }
                }
            }"#,
        )
        .unwrap();
        let result = NarDecoder::new(&listing, stream_chunked(&[], 1));
        assert!(matches!(
            result.err(),
            Some(StoreError::Decode(CoreError::ListingParse(_)))
        ));
    }

    #[tokio::test]
    async fn test_version_rejected() {
        let mut listing = fixture().0;
        listing.version = 3;
        let result = NarDecoder::new(&listing, stream_chunked(&[], 1));
        assert!(matches!(
            result.err(),
            Some(StoreError::Decode(CoreError::UnsupportedListingVersion(3)))
        ));
    }
}
