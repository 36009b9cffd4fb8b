//! Narinfo records: detached metadata for one store path.

use crate::hash::Hash;
use crate::store_path::{StorePath, StorePathHash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compression algorithm of a stored NAR.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Bzip2,
    Zstd,
    Xz,
}

impl Compression {
    /// Parse the `Compression:` field value.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            "bzip2" => Ok(Self::Bzip2),
            "zstd" => Ok(Self::Zstd),
            "xz" => Ok(Self::Xz),
            _ => Err(crate::Error::UnsupportedCompression(s.to_string())),
        }
    }

    /// Sniff the algorithm from a NAR pathname extension.
    pub fn from_extension(name: &str) -> Self {
        if name.ends_with("gz") {
            Self::Gzip
        } else if name.ends_with("bz2") {
            Self::Bzip2
        } else if name.ends_with("zst") {
            Self::Zstd
        } else if name.ends_with("xz") {
            Self::Xz
        } else {
            Self::None
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Zstd => "zstd",
            Self::Xz => "xz",
        };
        write!(f, "{s}")
    }
}

/// A parsed narinfo record.
///
/// Value type: cheap to clone, no shared state. Tests clone and mutate a
/// copy to induce verification failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NarInfo {
    /// Store directory of the cache this record came from.
    pub store_dir: String,
    /// Hash the record was fetched under.
    pub hash: StorePathHash,
    /// Full store path (`<store_dir>/<hash>-<name>`).
    pub store_path: StorePath,
    /// NAR location relative to the cache root (the `URL` field).
    pub nar_pathname: String,
    pub compression: Compression,
    /// Hash of the (possibly compressed) file as stored.
    pub file_hash: Hash,
    /// Size of the (possibly compressed) file as stored.
    pub file_size: u64,
    /// Hash of the uncompressed NAR.
    pub nar_hash: Hash,
    /// Size of the uncompressed NAR.
    pub nar_size: u64,
    /// References to other store paths, as basenames.
    pub references: Vec<String>,
    /// Optional deriver basename.
    pub deriver: Option<String>,
    /// Optional `keyname:base64` signature over the fingerprint.
    pub sig: Option<String>,
}

impl NarInfo {
    /// Parse the `Key: value` wire format.
    ///
    /// One field per line, first `": "` is the separator, blank lines are
    /// ignored, unknown keys are ignored. `References` is whitespace-split
    /// with empty tokens filtered, so a bare `References:` line yields zero
    /// references rather than one empty string.
    pub fn parse(text: &str, store_dir: &str, hash: StorePathHash) -> crate::Result<Self> {
        let mut store_path = None;
        let mut nar_pathname = None;
        let mut compression = None;
        let mut file_hash = None;
        let mut file_size = None;
        let mut nar_hash = None;
        let mut nar_size = None;
        let mut references = Vec::new();
        let mut deriver = None;
        let mut sig = None;

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(": ")
                .ok_or_else(|| crate::Error::NarInfoParse(format!("invalid line: {line}")))?;

            match key {
                "StorePath" => store_path = Some(StorePath::parse(store_dir, value)?),
                "URL" => nar_pathname = Some(value.to_string()),
                "Compression" => compression = Some(Compression::parse(value)?),
                "FileHash" => file_hash = Some(Hash::parse(value)?),
                "FileSize" => {
                    file_size = Some(value.parse().map_err(|e| {
                        crate::Error::NarInfoParse(format!("invalid FileSize: {e}"))
                    })?)
                }
                "NarHash" => nar_hash = Some(Hash::parse(value)?),
                "NarSize" => {
                    nar_size = Some(value.parse().map_err(|e| {
                        crate::Error::NarInfoParse(format!("invalid NarSize: {e}"))
                    })?)
                }
                "References" => {
                    references.extend(value.split_whitespace().map(str::to_string));
                }
                "Deriver" => deriver = Some(value.to_string()),
                "Sig" => sig = Some(value.to_string()),
                _ => {} // Ignore unknown fields
            }
        }

        let missing = |field: &str| crate::Error::NarInfoParse(format!("missing {field}"));
        Ok(Self {
            store_dir: store_dir.to_string(),
            hash,
            store_path: store_path.ok_or_else(|| missing("StorePath"))?,
            nar_pathname: nar_pathname.ok_or_else(|| missing("URL"))?,
            compression: compression.ok_or_else(|| missing("Compression"))?,
            file_hash: file_hash.ok_or_else(|| missing("FileHash"))?,
            file_size: file_size.ok_or_else(|| missing("FileSize"))?,
            nar_hash: nar_hash.ok_or_else(|| missing("NarHash"))?,
            nar_size: nar_size.ok_or_else(|| missing("NarSize"))?,
            references,
            deriver,
            sig,
        })
    }

    /// Serialize back to the wire format in canonical field order.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("StorePath: {}", self.store_path));
        lines.push(format!("URL: {}", self.nar_pathname));
        lines.push(format!("Compression: {}", self.compression));
        lines.push(format!("FileHash: {}", self.file_hash));
        lines.push(format!("FileSize: {}", self.file_size));
        lines.push(format!("NarHash: {}", self.nar_hash));
        lines.push(format!("NarSize: {}", self.nar_size));
        if !self.references.is_empty() {
            lines.push(format!("References: {}", self.references.join(" ")));
        }
        if let Some(deriver) = &self.deriver {
            lines.push(format!("Deriver: {deriver}"));
        }
        if let Some(sig) = &self.sig {
            lines.push(format!("Sig: {sig}"));
        }
        lines.join("\n") + "\n"
    }

    /// The store path basename (`<hash>-<name>`).
    pub fn basename(&self) -> String {
        self.store_path.basename()
    }

    /// The canonical string that is signed and verified.
    ///
    /// `1;<store path>;<nar hash raw>;<nar size>;<refs as full paths, comma
    /// separated>` — byte-for-byte the string real Nix signs. References
    /// are joined in wire order; the wire format already carries them
    /// sorted, and re-sorting here would be another place to diverge.
    pub fn fingerprint(&self) -> String {
        let references = self
            .references
            .iter()
            .map(|r| format!("{}/{}", self.store_dir, r))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "1;{};{};{};{}",
            self.store_path, self.nar_hash.raw, self.nar_size, references
        )
    }
}
