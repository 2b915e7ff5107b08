//! Zipped ROM handling.
//!
//! ROM dumps are often distributed as a zip holding the ROM plus a readme.
//! The first entry with a ROM extension is extracted into a private scratch
//! directory, which lives exactly as long as the returned [`ScratchRom`].

use crate::paths;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Archive type detected by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    /// ZIP archive (PK signature)
    Zip,
    /// Anything else, treated as a raw ROM
    NotArchive,
}

/// Detect archive type by reading magic bytes.
///
/// A `.zip` that isn't really a zip is reported as `NotArchive` so callers
/// can log and skip it instead of failing the whole scan.
pub fn detect_archive_type(path: &Path) -> Result<ArchiveType> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;

    let mut magic = [0u8; 4];
    let bytes_read = file.read(&mut magic).unwrap_or(0);

    // ZIP: PK\x03\x04 or PK\x05\x06 (empty)
    if bytes_read == 4 && (&magic == b"PK\x03\x04" || &magic == b"PK\x05\x06") {
        return Ok(ArchiveType::Zip);
    }

    Ok(ArchiveType::NotArchive)
}

/// A ROM extracted from an archive. Dropping it deletes the scratch directory.
#[derive(Debug)]
pub struct ScratchRom {
    /// Extracted file inside the scratch directory
    path: PathBuf,
    /// Entry name as stored in the archive
    entry_name: String,
    _dir: TempDir,
}

impl ScratchRom {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }
}

/// Extract the first entry of a zip whose extension is in `rom_extensions`.
///
/// Returns `Ok(None)` when the archive holds no ROM. Any further matching
/// entries are ignored.
pub fn extract_first_rom(archive_path: &Path, rom_extensions: &[String]) -> Result<Option<ScratchRom>> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open ZIP: {}", archive_path.display()))?;
    let reader = BufReader::new(file);
    let mut archive = zip::ZipArchive::new(reader)
        .with_context(|| format!("Failed to read ZIP: {}", archive_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }

        // Skip entries with unsafe paths (absolute, `..`)
        let Some(enclosed) = entry.enclosed_name() else {
            debug!("Skipping unsafe entry '{}' in {}", entry.name(), archive_path.display());
            continue;
        };

        if !paths::has_extension_in(&enclosed, rom_extensions) {
            continue;
        }

        let Some(file_name) = enclosed.file_name().map(|n| n.to_os_string()) else {
            continue;
        };

        let dir = tempfile::Builder::new()
            .prefix(".rompatch_")
            .tempdir()
            .context("Failed to create scratch directory")?;
        let out_path = dir.path().join(file_name);

        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create extracted file: {}", out_path.display()))?;
        std::io::copy(&mut entry, &mut out).with_context(|| {
            format!("Failed to extract '{}' from {}", entry.name(), archive_path.display())
        })?;

        debug!("Extracted '{}' from {}", entry.name(), archive_path.display());

        return Ok(Some(ScratchRom {
            path: out_path,
            entry_name: entry.name().to_string(),
            _dir: dir,
        }));
    }

    Ok(None)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hash;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Write a zip with the given (name, contents) entries.
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
        let file = File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options)?;
            zip.write_all(data)?;
        }
        zip.finish()?;
        Ok(())
    }

    fn exts() -> Vec<String> {
        vec!["gb".to_string(), "sfc".to_string()]
    }

    #[test]
    fn test_detects_zip_by_magic() -> Result<()> {
        let dir = TempDir::new()?;
        let zip_path = dir.path().join("game.zip");
        write_zip(&zip_path, &[("game.gb", b"ROMDATA")])?;
        assert_eq!(detect_archive_type(&zip_path)?, ArchiveType::Zip);

        let fake = dir.path().join("fake.zip");
        std::fs::write(&fake, b"not a zip at all")?;
        assert_eq!(detect_archive_type(&fake)?, ArchiveType::NotArchive);
        Ok(())
    }

    #[test]
    fn test_extracts_first_matching_entry() -> Result<()> {
        let dir = TempDir::new()?;
        let zip_path = dir.path().join("game.zip");
        write_zip(
            &zip_path,
            &[
                ("readme.txt", b"hello"),
                ("roms/first.sfc", b"FIRST ROM"),
                ("second.gb", b"SECOND ROM"),
            ],
        )?;

        let rom = extract_first_rom(&zip_path, &exts())?.expect("rom in zip");
        assert_eq!(rom.entry_name(), "roms/first.sfc");
        assert_eq!(rom.path().file_name().unwrap(), "first.sfc");
        assert_eq!(hash::compute_file_hash(rom.path())?, hash::hash_bytes(b"FIRST ROM"));
        assert_ne!(hash::compute_file_hash(rom.path())?, hash::compute_file_hash(&zip_path)?);
        Ok(())
    }

    #[test]
    fn test_no_rom_in_archive() -> Result<()> {
        let dir = TempDir::new()?;
        let zip_path = dir.path().join("docs.zip");
        write_zip(&zip_path, &[("readme.txt", b"hello")])?;

        assert!(extract_first_rom(&zip_path, &exts())?.is_none());
        Ok(())
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() -> Result<()> {
        let dir = TempDir::new()?;
        let zip_path = dir.path().join("game.zip");
        write_zip(&zip_path, &[("game.gb", b"ROMDATA")])?;

        let rom = extract_first_rom(&zip_path, &exts())?.expect("rom in zip");
        let scratch = rom.path().parent().unwrap().to_path_buf();
        assert!(scratch.is_dir());

        drop(rom);
        assert!(!scratch.exists());
        Ok(())
    }
}
