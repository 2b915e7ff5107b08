//! Type definitions for the patch catalog JSON format.
//!
//! The document is a two-level object: category -> id -> entry.
//!
//! ```json
//! {
//!     "hacks": {
//!         "1234": {
//!             "filename": ["part1.ips", "part2.ips"],
//!             "game": "Super Mario World",
//!             "modified": "12 March 2021",
//!             "name": "Some Hack",
//!             "platform": "snes",
//!             "sha1": "6B47BB75D16514B6A476AA0C73A683A2A4C18765",
//!             "version": "1.1"
//!         }
//!     }
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One known patch (hack or translation).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PatchEntry {
    /// Patch files applied in order. The first consumes the source ROM,
    /// each later one consumes the previous output.
    #[serde(default, deserialize_with = "string_or_list")]
    pub filename: Vec<String>,

    /// Target game title.
    #[serde(default)]
    pub game: String,

    /// Last-modified date as shown by the catalog site (opaque).
    #[serde(default)]
    pub modified: String,

    /// Patch display name.
    #[serde(default)]
    pub name: String,

    /// Platform code (e.g., "nes", "snes", "gbc").
    #[serde(default)]
    pub platform: String,

    /// SHA-1 of the unpatched source ROM.
    #[serde(default)]
    pub sha1: String,

    /// Patch version (opaque, compared for equality only).
    #[serde(default)]
    pub version: String,

    /// Fields this tool doesn't know about, kept so write-back is lossless.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PatchEntry {
    /// Number of patcher invocations needed for this entry.
    pub fn chain_len(&self) -> usize {
        self.filename.len()
    }
}

/// Borrowed view of an entry together with its keys.
#[derive(Debug, Clone, Copy)]
pub struct EntryRef<'a> {
    pub category: &'a str,
    pub id: &'a str,
    pub entry: &'a PatchEntry,
}

impl EntryRef<'_> {
    /// Short label used in log and error lines: `hacks/1234`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.category, self.id)
    }
}

/// Older catalogs stored a single patch file as a bare string.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}
