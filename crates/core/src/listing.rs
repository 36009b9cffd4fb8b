//! NAR listings: a byte-offset index into a NAR stream.
//!
//! A listing describes the file tree serialized in a NAR and, for every
//! regular file, where its body lives in the uncompressed stream. It is
//! what lets the decoder extract files from a forward-only stream without
//! parsing NAR framing or seeking backwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The listing format version this crate understands.
pub const LISTING_VERSION: u32 = 1;

/// One node of a NAR file tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entry {
    Regular {
        #[serde(rename = "narOffset")]
        nar_offset: u64,
        size: u64,
        #[serde(default, skip_serializing_if = "is_false")]
        executable: bool,
    },
    Symlink {
        target: String,
    },
    Directory {
        entries: BTreeMap<String, Entry>,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A versioned NAR listing, fetched as `<hash>.ls` JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarListing {
    pub root: Entry,
    pub version: u32,
}

impl NarListing {
    /// Parse from JSON, rejecting unknown versions.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let listing: NarListing = serde_json::from_str(json)
            .map_err(|e| crate::Error::ListingParse(e.to_string()))?;
        if listing.version != LISTING_VERSION {
            return Err(crate::Error::UnsupportedListingVersion(listing.version));
        }
        Ok(listing)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("listing serialization cannot fail")
    }

    /// Walk the tree in preorder, yielding `(path, entry)` pairs.
    ///
    /// The root is yielded with an empty path. An explicit worklist is used
    /// instead of recursion so pathological depth cannot overflow the stack.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(String::new(), &self.root)],
        }
    }
}

/// Iterator over `(path, entry)` pairs of a listing, preorder.
pub struct Walk<'a> {
    stack: Vec<(String, &'a Entry)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (String, &'a Entry);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, entry) = self.stack.pop()?;
        if let Entry::Directory { entries } = entry {
            // Reverse so the first child comes off the stack first.
            for (name, child) in entries.iter().rev() {
                let child_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{path}/{name}")
                };
                self.stack.push((child_path, child));
            }
        }
        Some((path, entry))
    }
}
