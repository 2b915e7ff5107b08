//! Catalog consistency checks.
//!
//! Catches the mistakes that creep in while maintaining the catalog by hand:
//! entries added before their hash or patch files were known, patch files
//! dropped into the patches directory but never referenced, and two entries
//! claiming the same source ROM.

use super::{Catalog, EntryRef};
use crate::hash;
use crate::paths;
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

/// Patch formats looked at when searching for unreferenced files.
pub const PATCH_EXTENSIONS: &[&str] = &["ips", "bps", "ups"];

/// A single problem found in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    EmptyCatalog,
    MissingSha1 { key: String, name: String },
    MalformedSha1 { key: String, name: String, sha1: String },
    NoPatchFiles { key: String, name: String },
    BlankPatchFilename { key: String, name: String },
    MissingPatchFile { key: String, name: String, file: String },
    DuplicateSha1 { sha1: String, first: String, second: String },
    UnknownPatchFile { file: String },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::EmptyCatalog => write!(f, "Empty catalog"),
            Finding::MissingSha1 { key, name } => {
                write!(f, "Missing sha1: {} ({})", name, key)
            }
            Finding::MalformedSha1 { key, name, sha1 } => {
                write!(f, "Malformed sha1: {} ({}) {:?}", name, key, sha1)
            }
            Finding::NoPatchFiles { key, name } | Finding::BlankPatchFilename { key, name } => {
                write!(f, "Missing patch filename: {} ({})", name, key)
            }
            Finding::MissingPatchFile { key, name, file } => {
                write!(f, "Missing patch file: {} ({}) {}", name, key, file)
            }
            Finding::DuplicateSha1 { sha1, first, second } => {
                write!(f, "Duplicate sha1 {}: {} and {}", sha1, first, second)
            }
            Finding::UnknownPatchFile { file } => write!(f, "Unknown patch file: {}", file),
        }
    }
}

/// Run every check against `catalog`, resolving patch files in `patches_dir`.
///
/// Returns all findings in a stable order; an empty list means the catalog
/// is consistent.
pub fn check_catalog(catalog: &Catalog, patches_dir: &Path) -> Result<Vec<Finding>> {
    if catalog.is_empty() {
        return Ok(vec![Finding::EmptyCatalog]);
    }

    let mut findings = Vec::new();
    let mut seen_hashes: HashMap<String, String> = HashMap::new();
    let mut referenced: BTreeSet<&str> = BTreeSet::new();

    for entry_ref in catalog.entries() {
        check_entry(entry_ref, patches_dir, &mut findings);

        let sha1 = hash::normalize_hash(&entry_ref.entry.sha1);
        if !sha1.is_empty() {
            if let Some(first) = seen_hashes.get(&sha1) {
                findings.push(Finding::DuplicateSha1 {
                    sha1: sha1.clone(),
                    first: first.clone(),
                    second: entry_ref.key(),
                });
            } else {
                seen_hashes.insert(sha1, entry_ref.key());
            }
        }

        referenced.extend(entry_ref.entry.filename.iter().map(|f| f.as_str()));
    }

    for file in unreferenced_patch_files(patches_dir, &referenced)? {
        findings.push(Finding::UnknownPatchFile { file });
    }

    Ok(findings)
}

fn check_entry(entry_ref: EntryRef<'_>, patches_dir: &Path, findings: &mut Vec<Finding>) {
    let key = entry_ref.key();
    let entry = entry_ref.entry;
    let name = entry.name.clone();

    if entry.sha1.trim().is_empty() {
        findings.push(Finding::MissingSha1 { key: key.clone(), name: name.clone() });
    } else if !hash::is_valid_sha1(entry.sha1.trim()) {
        findings.push(Finding::MalformedSha1 {
            key: key.clone(),
            name: name.clone(),
            sha1: entry.sha1.clone(),
        });
    }

    if entry.filename.is_empty() {
        findings.push(Finding::NoPatchFiles { key: key.clone(), name: name.clone() });
    }

    for file in &entry.filename {
        if file.trim().is_empty() {
            findings.push(Finding::BlankPatchFilename { key: key.clone(), name: name.clone() });
            continue;
        }
        if !patches_dir.join(file).is_file() {
            findings.push(Finding::MissingPatchFile {
                key: key.clone(),
                name: name.clone(),
                file: file.clone(),
            });
        }
    }
}

/// Patch files sitting in `patches_dir` (top level only) that no entry names.
fn unreferenced_patch_files(patches_dir: &Path, referenced: &BTreeSet<&str>) -> Result<Vec<String>> {
    if !patches_dir.is_dir() {
        return Ok(Vec::new());
    }

    let allowed: Vec<String> = PATCH_EXTENSIONS.iter().map(|e| e.to_string()).collect();
    let mut unknown = Vec::new();

    for dir_entry in fs::read_dir(patches_dir)
        .with_context(|| format!("Failed to list patches directory: {}", patches_dir.display()))?
    {
        let path = dir_entry?.path();
        if !path.is_file() || !paths::has_extension_in(&path, &allowed) {
            continue;
        }
        let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        if !referenced.contains(file_name.as_str()) {
            unknown.push(file_name);
        }
    }

    unknown.sort();
    Ok(unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog(json: &str) -> Catalog {
        Catalog::from_json_str(json).unwrap()
    }

    #[test]
    fn test_clean_catalog_has_no_findings() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("a.ips"), b"PATCH")?;
        fs::write(dir.path().join("readme.txt"), b"not a patch")?;

        let cat = catalog(&format!(
            r#"{{"hacks": {{"1": {{"filename": ["a.ips"], "name": "A", "sha1": "{}"}}}}}}"#,
            "ab".repeat(20)
        ));

        assert!(check_catalog(&cat, dir.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_empty_catalog() -> Result<()> {
        let dir = TempDir::new()?;
        assert_eq!(check_catalog(&Catalog::default(), dir.path())?, vec![Finding::EmptyCatalog]);
        Ok(())
    }

    #[test]
    fn test_reports_every_problem() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("present.ips"), b"PATCH")?;
        fs::write(dir.path().join("stray.bps"), b"PATCH")?;

        let cat = catalog(&format!(
            r#"{{
                "hacks": {{
                    "1": {{"filename": [""], "name": "Placeholder"}},
                    "2": {{"filename": ["present.ips", "gone.ips"], "name": "Two", "sha1": "{hash}"}},
                    "3": {{"filename": [], "name": "Three", "sha1": "xyz"}}
                }},
                "translations": {{
                    "4": {{"filename": ["present.ips"], "name": "Four", "sha1": "{lower}"}}
                }}
            }}"#,
            hash = "C".repeat(40),
            lower = "c".repeat(40),
        ));

        let findings = check_catalog(&cat, dir.path())?;
        assert_eq!(
            findings,
            vec![
                Finding::MissingSha1 { key: "hacks/1".into(), name: "Placeholder".into() },
                Finding::BlankPatchFilename { key: "hacks/1".into(), name: "Placeholder".into() },
                Finding::MissingPatchFile {
                    key: "hacks/2".into(),
                    name: "Two".into(),
                    file: "gone.ips".into(),
                },
                Finding::MalformedSha1 {
                    key: "hacks/3".into(),
                    name: "Three".into(),
                    sha1: "xyz".into(),
                },
                Finding::NoPatchFiles { key: "hacks/3".into(), name: "Three".into() },
                Finding::DuplicateSha1 {
                    sha1: "C".repeat(40),
                    first: "hacks/2".into(),
                    second: "translations/4".into(),
                },
                Finding::UnknownPatchFile { file: "stray.bps".into() },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_display_lines() {
        let finding = Finding::MissingPatchFile {
            key: "hacks/2".into(),
            name: "Two".into(),
            file: "gone.ips".into(),
        };
        assert_eq!(finding.to_string(), "Missing patch file: Two (hacks/2) gone.ips");
    }
}
