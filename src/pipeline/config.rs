//! Pipeline configuration
//!
//! Defines the configuration structure for a patching run.

use super::patcher::DEFAULT_PATCHER;
use std::path::PathBuf;
use std::time::Duration;

/// ROM suffixes scanned by default.
pub const DEFAULT_ROM_EXTENSIONS: &[&str] = &["gb", "gbc", "gba", "nes", "sfc", "smc"];

/// Configuration for a patching run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to the catalog JSON
    pub catalog_path: PathBuf,

    /// Directory scanned (recursively) for source ROMs
    pub roms_dir: PathBuf,

    /// Directory holding the patch files named in the catalog
    pub patches_dir: PathBuf,

    /// Root of the patched output tree
    pub output_dir: PathBuf,

    /// Patcher binary
    pub patcher: PathBuf,

    /// Per-invocation patcher timeout (None = wait forever)
    pub patcher_timeout: Option<Duration>,

    /// ROM extensions to scan, lowercase without dots
    pub rom_extensions: Vec<String>,
}

impl PipelineConfig {
    /// Config with default patcher, no timeout and default extensions.
    pub fn new(
        catalog_path: impl Into<PathBuf>,
        roms_dir: impl Into<PathBuf>,
        patches_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog_path: catalog_path.into(),
            roms_dir: roms_dir.into(),
            patches_dir: patches_dir.into(),
            output_dir: output_dir.into(),
            patcher: PathBuf::from(DEFAULT_PATCHER),
            patcher_timeout: None,
            rom_extensions: default_rom_extensions(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.catalog_path.is_file() {
            return Err(ConfigError::CatalogNotFound(self.catalog_path.clone()));
        }

        if !self.roms_dir.is_dir() {
            return Err(ConfigError::RomsDirNotFound(self.roms_dir.clone()));
        }

        if !self.patches_dir.is_dir() {
            return Err(ConfigError::PatchesDirNotFound(self.patches_dir.clone()));
        }

        if self.rom_extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }

        if self.patcher_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }
}

pub fn default_rom_extensions() -> Vec<String> {
    DEFAULT_ROM_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Catalog file not found: {0}")]
    CatalogNotFound(PathBuf),

    #[error("ROMs directory not found: {0}")]
    RomsDirNotFound(PathBuf),

    #[error("Patches directory not found: {0}")]
    PatchesDirNotFound(PathBuf),

    #[error("At least one ROM extension is required")]
    NoExtensions,

    #[error("Patcher timeout must be greater than zero")]
    ZeroTimeout,
}
