//! Hash-based ROM matching.
//!
//! Walks the ROMs directory, hashes every candidate (unzipping first when
//! needed) and pairs each ROM with the catalog entry that expects it.
//! Nothing is cached between runs; every run re-hashes the whole tree.

use crate::archive::{self, ArchiveType, ScratchRom};
use crate::cancel::Cancellation;
use crate::catalog::{EntryRef, HashIndex};
use crate::hash;
use crate::paths;
use crate::pipeline::PatchError;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extension treated as an archive container.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// A ROM found on disk.
#[derive(Debug)]
pub struct RomFile {
    /// Location on disk (the zip itself for archived ROMs)
    pub path: PathBuf,
    /// SHA-1 of the ROM bytes (after extraction), uppercase hex
    pub content_hash: String,
    /// Suffix of the ROM itself with its dot, e.g. `.sfc`
    pub extension: String,
    /// Extracted copy, kept alive while the ROM is in use
    scratch: Option<ScratchRom>,
}

impl RomFile {
    /// File to feed to the patcher: the extracted copy for archives,
    /// otherwise the file itself.
    pub fn patch_input(&self) -> &Path {
        match &self.scratch {
            Some(scratch) => scratch.path(),
            None => &self.path,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.scratch.is_some()
    }
}

/// A catalog entry paired with the ROM it applies to.
#[derive(Debug)]
pub struct RomMatch<'a> {
    pub entry: EntryRef<'a>,
    pub rom: RomFile,
}

/// List candidate ROM files under `root`, sorted by path.
///
/// Candidates are files whose extension is in `rom_extensions` plus zips.
pub fn list_candidates(root: &Path, rom_extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        anyhow::bail!("ROMs directory not found: {}", root.display());
    }

    let mut candidates = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to scan {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let is_archive = paths::extension_lower(path).as_deref() == Some(ARCHIVE_EXTENSION);
        if is_archive || paths::has_extension_in(path, rom_extensions) {
            candidates.push(path.to_path_buf());
        }
    }

    Ok(candidates)
}

/// Hash one candidate. Returns `Ok(None)` for archives without a ROM inside.
pub fn hash_rom(path: &Path, rom_extensions: &[String]) -> Result<Option<RomFile>> {
    let is_zip = paths::extension_lower(path).as_deref() == Some(ARCHIVE_EXTENSION);

    if is_zip {
        if archive::detect_archive_type(path)? != ArchiveType::Zip {
            warn!("Not a valid zip, skipping: {}", path.display());
            return Ok(None);
        }

        let Some(scratch) = archive::extract_first_rom(path, rom_extensions)? else {
            debug!("No ROM inside archive: {}", path.display());
            return Ok(None);
        };

        debug!("Hashing {} from {}", scratch.entry_name(), path.display());
        let content_hash = hash::compute_file_hash(scratch.path())?;
        return Ok(Some(RomFile {
            path: path.to_path_buf(),
            content_hash,
            extension: paths::dotted_extension(scratch.path()),
            scratch: Some(scratch),
        }));
    }

    Ok(Some(RomFile {
        path: path.to_path_buf(),
        content_hash: hash::compute_file_hash(path)?,
        extension: paths::dotted_extension(path),
        scratch: None,
    }))
}

/// Hash every candidate and pair it with its catalog entry.
///
/// ROMs that match nothing are dropped silently (their scratch copies are
/// deleted right away). Unreadable files are logged and skipped. When two
/// ROMs have the same content, the first one in walk order is used.
/// The result is ordered by catalog key.
///
/// Cancellation is checked before each candidate; a cancelled run returns
/// [`PatchError::Cancelled`] and drops every match found so far.
pub fn match_roms<'a>(
    index: &HashIndex<'a>,
    candidates: &[PathBuf],
    rom_extensions: &[String],
    cancel: &Cancellation,
    pb: &ProgressBar,
) -> Result<Vec<RomMatch<'a>>> {
    pb.set_length(candidates.len() as u64);
    pb.set_position(0);

    let mut by_entry: HashMap<String, RomMatch<'a>> = HashMap::new();

    for path in candidates {
        if cancel.is_cancelled() {
            debug!("Hashing interrupted before {}", path.display());
            return Err(PatchError::Cancelled.into());
        }

        pb.set_message(
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        );

        let rom = match hash_rom(path, rom_extensions) {
            Ok(Some(rom)) => rom,
            Ok(None) => {
                pb.inc(1);
                continue;
            }
            Err(e) => {
                warn!("Skipping {}: {:#}", path.display(), e);
                pb.inc(1);
                continue;
            }
        };
        pb.inc(1);

        let Some(entry) = index.lookup(&rom.content_hash) else {
            debug!("No patch for {} ({})", path.display(), rom.content_hash);
            continue;
        };

        let key = entry.key();
        if let Some(existing) = by_entry.get(&key) {
            info!(
                "{} has the same content as {}, keeping the first",
                path.display(),
                existing.rom.path.display()
            );
            continue;
        }

        debug!("Matched {} -> {}", path.display(), key);
        by_entry.insert(key, RomMatch { entry, rom });
    }

    let mut matches: Vec<RomMatch<'a>> = by_entry.into_values().collect();
    matches.sort_by(|a, b| {
        (a.entry.category, a.entry.id).cmp(&(b.entry.category, b.entry.id))
    });
    Ok(matches)
}
