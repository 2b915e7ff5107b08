//! Patching run orchestrator
//!
//! Coordinates the phases of a run:
//! 1. Validate: config paths, catalog hash index
//! 2. Scan    : find candidate ROMs and hash them
//! 3. Match   : pair ROMs with catalog entries by hash
//! 4. Patch   : apply each entry's chain, one entry at a time
//!
//! Entries whose inputs are missing are skipped. A patcher failure stops the
//! whole batch and is returned to the caller as a [`PatchError`].

pub mod chain;
pub mod config;
pub mod patcher;

pub use chain::{ChainApplier, ChainPlan, ChainState};
pub use config::{ConfigError, PipelineConfig};
pub use patcher::{PatchCommand, PatchError, Patcher};

use crate::cancel::Cancellation;
use crate::catalog::Catalog;
use crate::matcher::{self, RomMatch};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A chain that ran to completion.
#[derive(Debug, Clone)]
pub struct CompletedChain {
    /// `category/id`
    pub key: String,
    pub source: PathBuf,
    pub output: PathBuf,
    pub steps: usize,
}

/// An entry that matched a ROM but could not be patched.
#[derive(Debug, Clone)]
pub struct SkippedEntry {
    pub key: String,
    pub reason: String,
}

/// Run summary
#[derive(Debug, Default, Clone)]
pub struct PipelineReport {
    pub roms_scanned: usize,
    pub matched: usize,
    pub completed: Vec<CompletedChain>,
    pub skipped: Vec<SkippedEntry>,
}

/// Progress bar in the style used for the hashing phase
pub fn hashing_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] Hashing [{bar:40.cyan/blue}] {pos}/{len} | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

/// Scan and match without patching.
///
/// Returns [`PatchError::Cancelled`] if `cancel` fires while ROMs are hashed.
pub fn scan<'a>(
    catalog: &'a Catalog,
    config: &PipelineConfig,
    cancel: &Cancellation,
    pb: &ProgressBar,
) -> Result<(usize, Vec<RomMatch<'a>>)> {
    let index = catalog.hash_index()?;
    if index.is_empty() {
        warn!("No catalog entry has a sha1, nothing can match");
    }
    let candidates = matcher::list_candidates(&config.roms_dir, &config.rom_extensions)?;
    info!(
        "Found {} candidate ROMs in {} for {} known hashes",
        candidates.len(),
        config.roms_dir.display(),
        index.len()
    );

    let matches = matcher::match_roms(&index, &candidates, &config.rom_extensions, cancel, pb);
    pb.finish_and_clear();
    let matches = matches?;

    Ok((candidates.len(), matches))
}

/// Run the whole pipeline against an already loaded catalog, printing one
/// `Success!` line per finished chain to stdout.
///
/// Returns `Err` carrying a [`PatchError`] when the patcher fails, times out
/// or the run is cancelled; the caller is expected to stop there.
pub async fn run(
    config: &PipelineConfig,
    catalog: &Catalog,
    cancel: &Cancellation,
    pb: &ProgressBar,
) -> Result<PipelineReport> {
    run_with_output(config, catalog, cancel, pb, &mut io::stdout()).await
}

/// Same as [`run`], with `Success!` lines written to `out`.
pub async fn run_with_output<W: Write>(
    config: &PipelineConfig,
    catalog: &Catalog,
    cancel: &Cancellation,
    pb: &ProgressBar,
    out: &mut W,
) -> Result<PipelineReport> {
    let started = Instant::now();
    config.validate()?;

    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!("Failed to create output directory: {}", config.output_dir.display())
    })?;

    let (roms_scanned, matches) = scan(catalog, config, cancel, pb)?;
    if cancel.is_cancelled() {
        return Err(PatchError::Cancelled.into());
    }
    let mut report = PipelineReport {
        roms_scanned,
        matched: matches.len(),
        ..Default::default()
    };
    info!("{} of {} ROMs have a known patch", report.matched, roms_scanned);

    let patcher = Patcher::new(&config.patcher, config.patcher_timeout);

    // Each match keeps its scratch copy alive until its chain is done
    for rom_match in matches {
        if cancel.is_cancelled() {
            return Err(PatchError::Cancelled.into());
        }

        let key = rom_match.entry.key();
        let entry = rom_match.entry.entry;

        let plan = match ChainPlan::new(
            entry,
            rom_match.rom.patch_input(),
            &rom_match.rom.extension,
            &config.patches_dir,
            &config.output_dir,
        ) {
            Ok(plan) => plan,
            Err(e) => {
                debug!("Skipping {} ({}): {}", entry.name, key, e);
                eprintln!("Skipping {} ({}): {}", entry.name, key, e);
                report.skipped.push(SkippedEntry { key, reason: e.to_string() });
                continue;
            }
        };

        let steps = plan.steps.len();
        let mut applier = ChainApplier::new(plan);

        match applier.apply(&patcher, cancel).await {
            Ok(output) => {
                writeln!(out, "Success! {}", output.display())
                    .context("Failed to write result line")?;
                report.completed.push(CompletedChain {
                    key,
                    source: rom_match.rom.path.clone(),
                    output,
                    steps,
                });
            }
            Err(e) if e.is_skippable() => {
                debug!("Skipping {} ({}): {}", entry.name, key, e);
                eprintln!("Skipping {} ({}): {}", entry.name, key, e);
                report.skipped.push(SkippedEntry { key, reason: e.to_string() });
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        "Run done: completed={} skipped={} elapsed_ms={}",
        report.completed.len(),
        report.skipped.len(),
        started.elapsed().as_millis()
    );

    Ok(report)
}
