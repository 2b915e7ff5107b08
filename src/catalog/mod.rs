//! Patch catalog loading and write-back.
//!
//! The catalog is loaded once per run and then only read. It is passed by
//! reference to the matcher and chain applier; nothing holds it globally.

pub mod check;
mod types;

pub use check::{check_catalog, Finding};
pub use types::{EntryRef, PatchEntry};

use crate::hash;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Catalog errors. All of them are fatal before any work begins.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog file not found: {0}")]
    NotFound(PathBuf),

    #[error("Catalog file is empty: {0}")]
    Empty(PathBuf),

    #[error("Failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed catalog {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write catalog {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SHA-1 {sha1} is claimed by both {first} and {second}")]
    DuplicateHash {
        sha1: String,
        first: String,
        second: String,
    },
}

/// In-memory catalog: category -> id -> entry, in stable key order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    categories: BTreeMap<String, BTreeMap<String, PatchEntry>>,
}

impl Catalog {
    /// Load a catalog from a JSON file.
    ///
    /// Missing, empty (no bytes, only whitespace, or no entries) and
    /// malformed documents are all errors.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        if content.trim().is_empty() {
            return Err(CatalogError::Empty(path.to_path_buf()));
        }

        let catalog: Catalog =
            serde_json::from_str(&content).map_err(|source| CatalogError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        if catalog.is_empty() {
            return Err(CatalogError::Empty(path.to_path_buf()));
        }

        debug!(
            "Loaded catalog {} ({} categories, {} entries)",
            path.display(),
            catalog.categories.len(),
            catalog.len()
        );

        Ok(catalog)
    }

    /// Parse a catalog from a JSON string (no emptiness check).
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize in canonical form: sorted keys, four-space indent,
    /// uppercase hashes, trailing newline.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        let mut normalized = self.clone();
        for entries in normalized.categories.values_mut() {
            for entry in entries.values_mut() {
                entry.sha1 = hash::normalize_hash(&entry.sha1);
            }
        }

        // Going through Value sorts every object's keys, flattened extras included.
        let value = serde_json::to_value(&normalized)?;

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        value.serialize(&mut ser)?;
        buf.push(b'\n');

        // serde_json only emits valid UTF-8
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Write the catalog back to disk in canonical form.
    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        let json = self.to_canonical_json().map_err(|source| CatalogError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

        fs::write(path, json).map_err(|source| CatalogError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Total number of entries across all categories.
    pub fn len(&self) -> usize {
        self.categories.values().map(|c| c.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Category names in stable order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(|k| k.as_str())
    }

    /// Entries of one category, if it exists.
    pub fn category(&self, name: &str) -> Option<&BTreeMap<String, PatchEntry>> {
        self.categories.get(name)
    }

    /// Look up a single entry.
    pub fn get(&self, category: &str, id: &str) -> Option<&PatchEntry> {
        self.categories.get(category)?.get(id)
    }

    /// Insert or replace an entry, creating the category if needed.
    pub fn insert(&mut self, category: &str, id: &str, entry: PatchEntry) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .insert(id.to_string(), entry);
    }

    /// Iterate every entry in (category, id) order.
    pub fn entries(&self) -> impl Iterator<Item = EntryRef<'_>> {
        self.categories.iter().flat_map(|(category, entries)| {
            entries.iter().map(move |(id, entry)| EntryRef {
                category,
                id,
                entry,
            })
        })
    }

    /// Build a lookup from source-ROM hash to entry.
    ///
    /// Entries without a hash can't match anything and are left out.
    /// Two entries claiming the same hash is an error.
    pub fn hash_index(&self) -> Result<HashIndex<'_>, CatalogError> {
        let mut by_hash: HashMap<String, EntryRef<'_>> = HashMap::new();

        for entry_ref in self.entries() {
            if entry_ref.entry.sha1.trim().is_empty() {
                continue;
            }

            let sha1 = hash::normalize_hash(&entry_ref.entry.sha1);
            if let Some(existing) = by_hash.get(&sha1) {
                return Err(CatalogError::DuplicateHash {
                    sha1,
                    first: existing.key(),
                    second: entry_ref.key(),
                });
            }
            by_hash.insert(sha1, entry_ref);
        }

        Ok(HashIndex { by_hash })
    }
}

/// Read-only hash -> entry lookup built from a [`Catalog`].
#[derive(Debug)]
pub struct HashIndex<'a> {
    by_hash: HashMap<String, EntryRef<'a>>,
}

impl<'a> HashIndex<'a> {
    /// Find the entry whose source hash equals `hash` (case-insensitive).
    pub fn lookup(&self, hash: &str) -> Option<EntryRef<'a>> {
        self.by_hash.get(&hash::normalize_hash(hash)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "translations": {
            "77": {
                "filename": ["t.ips"],
                "game": "Mother 3",
                "name": "English",
                "platform": "gba",
                "sha1": "4f0b3a8e8f0e1a6b4c2d9e7f1a3b5c7d9e1f2a4b",
                "version": "1.2"
            }
        },
        "hacks": {
            "9": {
                "filename": ["a.ips", "b.ips"],
                "game": "G",
                "name": "H",
                "platform": "snes",
                "sha1": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                "version": "1.0"
            },
            "10": {
                "filename": [""],
                "game": "Placeholder",
                "name": "No hash yet"
            }
        }
    }"#;

    fn write_catalog(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_and_iterate_in_key_order() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::load(&write_catalog(&dir, SAMPLE)).unwrap();

        assert_eq!(catalog.len(), 3);
        let keys: Vec<String> = catalog.entries().map(|e| e.key()).collect();
        assert_eq!(keys, vec!["hacks/10", "hacks/9", "translations/77"]);
        assert_eq!(catalog.get("hacks", "9").unwrap().chain_len(), 2);
        assert_eq!(catalog.get("hacks", "10").unwrap().platform, "");
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Catalog::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn test_empty_documents() {
        let dir = TempDir::new().unwrap();
        for content in ["", "  \n", "{}", r#"{"hacks": {}}"#] {
            let err = Catalog::load(&write_catalog(&dir, content)).unwrap_err();
            assert!(matches!(err, CatalogError::Empty(_)), "content {:?}", content);
        }
    }

    #[test]
    fn test_malformed_documents() {
        let dir = TempDir::new().unwrap();
        for content in ["{not json", "[1, 2]", r#"{"hacks": {"1": {"sha1": 5}}}"#] {
            let err = Catalog::load(&write_catalog(&dir, content)).unwrap_err();
            assert!(matches!(err, CatalogError::Malformed { .. }), "content {:?}", content);
        }
    }

    #[test]
    fn test_hash_index_lookup_is_case_insensitive() {
        let catalog = Catalog::from_json_str(SAMPLE).unwrap();
        let index = catalog.hash_index().unwrap();

        // placeholder entry without a hash is not indexed
        assert_eq!(index.len(), 2);

        let found = index.lookup("4F0B3A8E8F0E1A6B4C2D9E7F1A3B5C7D9E1F2A4B").unwrap();
        assert_eq!(found.key(), "translations/77");
        assert!(index.lookup(&"B".repeat(40)).is_none());
    }

    #[test]
    fn test_duplicate_hash_is_rejected() {
        let mut catalog = Catalog::from_json_str(SAMPLE).unwrap();
        let mut dup = catalog.get("hacks", "9").unwrap().clone();
        dup.sha1 = dup.sha1.to_lowercase();
        catalog.insert("translations", "5", dup);

        match catalog.hash_index().unwrap_err() {
            CatalogError::DuplicateHash { first, second, .. } => {
                assert_eq!(first, "hacks/9");
                assert_eq!(second, "translations/5");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_save_is_canonical_and_stable() {
        let dir = TempDir::new().unwrap();
        let path = write_catalog(&dir, SAMPLE);
        let catalog = Catalog::load(&path).unwrap();

        catalog.save(&path).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        Catalog::load(&path).unwrap().save(&path).unwrap();
        let second = fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        assert!(first.contains("\n    \"hacks\": {"));
        assert!(first.contains("4F0B3A8E8F0E1A6B4C2D9E7F1A3B5C7D9E1F2A4B"));
        assert!(first.find("\"hacks\"").unwrap() < first.find("\"translations\"").unwrap());
        assert!(first.find("\"filename\"").unwrap() < first.find("\"game\"").unwrap());
        assert!(first.ends_with("}\n"));
    }
}
