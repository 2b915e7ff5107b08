//! Patch chain application.
//!
//! An entry lists one or more patch files. The first is applied to the
//! source ROM, each later one to the previous step's output. Intermediate
//! results are written as `output<N>.tmp` in the platform directory and
//! removed when the chain finishes, whichever way it finishes.

use super::patcher::{PatchError, Patcher};
use crate::cancel::Cancellation;
use crate::catalog::PatchEntry;
use crate::paths;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a chain currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Pending,
    /// Running step N (1-based)
    Applying(usize),
    Done,
    Failed,
}

/// One patcher invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStep {
    pub input: PathBuf,
    pub patch: PathBuf,
    pub output: PathBuf,
}

/// All the paths a chain will touch, worked out before anything runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPlan {
    pub steps: Vec<ChainStep>,
    pub platform_dir: PathBuf,
    pub final_output: PathBuf,
}

impl ChainPlan {
    /// Plan the chain for `entry` applied to `source`.
    ///
    /// `extension` is the source ROM's dotted suffix, carried over to the
    /// final file name.
    pub fn new(
        entry: &PatchEntry,
        source: &Path,
        extension: &str,
        patches_dir: &Path,
        output_dir: &Path,
    ) -> Result<Self, PatchError> {
        if entry.filename.is_empty() {
            return Err(PatchError::EmptyChain);
        }

        let platform_dir = paths::platform_dir(output_dir, &entry.platform);
        let final_output = platform_dir.join(paths::patched_file_name(
            &entry.game,
            &entry.name,
            &entry.version,
            extension,
        ));

        let last = entry.filename.len();
        let mut steps = Vec::with_capacity(last);
        let mut input = source.to_path_buf();

        for (i, patch_name) in entry.filename.iter().enumerate() {
            let step = i + 1;
            let output = if step == last {
                final_output.clone()
            } else {
                temp_output_path(&platform_dir, step)
            };
            steps.push(ChainStep {
                input,
                patch: patches_dir.join(patch_name),
                output: output.clone(),
            });
            input = output;
        }

        Ok(Self {
            steps,
            platform_dir,
            final_output,
        })
    }

    /// Intermediate files of this chain (every output but the last).
    pub fn temporaries(&self) -> impl Iterator<Item = &Path> {
        let n = self.steps.len().saturating_sub(1);
        self.steps[..n].iter().map(|s| s.output.as_path())
    }
}

/// `<platform_dir>/output<step>.tmp`
pub fn temp_output_path(platform_dir: &Path, step: usize) -> PathBuf {
    platform_dir.join(format!("output{}.tmp", step))
}

fn is_chain_temporary(name: &str) -> bool {
    name.strip_prefix("output")
        .and_then(|rest| rest.strip_suffix(".tmp"))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Remove `output<N>.tmp` files left in `dir` by an earlier, interrupted run.
/// Returns how many were removed.
pub fn sweep_temporaries(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_tmp = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_chain_temporary);
        if is_tmp && path.is_file() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove stale {}: {}", path.display(), e),
            }
        }
    }
    removed
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// Runs one [`ChainPlan`] step by step.
#[derive(Debug)]
pub struct ChainApplier {
    plan: ChainPlan,
    state: ChainState,
}

impl ChainApplier {
    pub fn new(plan: ChainPlan) -> Self {
        Self {
            plan,
            state: ChainState::Pending,
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Apply every step in order and return the final output path.
    ///
    /// On success only the final file remains. On failure nothing of this
    /// chain remains: temporaries are always removed, and for patcher
    /// failures the final output is removed too so no half-patched ROM is
    /// left behind.
    pub async fn apply(
        &mut self,
        patcher: &Patcher,
        cancel: &Cancellation,
    ) -> Result<PathBuf, PatchError> {
        if self.state != ChainState::Pending {
            return Err(PatchError::io(
                "Chain already ran",
                std::io::Error::other(format!("{:?}", self.state)),
            ));
        }

        fs::create_dir_all(&self.plan.platform_dir).map_err(|e| {
            PatchError::io(
                format!("Failed to create directory {}", self.plan.platform_dir.display()),
                e,
            )
        })?;

        let swept = sweep_temporaries(&self.plan.platform_dir);
        if swept > 0 {
            debug!("Removed {} stale temporaries in {}", swept, self.plan.platform_dir.display());
        }

        match self.run_steps(patcher, cancel).await {
            Ok(()) => {
                self.cleanup_temporaries();
                self.state = ChainState::Done;
                Ok(self.plan.final_output.clone())
            }
            Err(e) => {
                self.cleanup_temporaries();
                if !e.is_skippable() {
                    remove_if_exists(&self.plan.final_output);
                }
                self.state = ChainState::Failed;
                Err(e)
            }
        }
    }

    async fn run_steps(&mut self, patcher: &Patcher, cancel: &Cancellation) -> Result<(), PatchError> {
        let total = self.plan.steps.len();

        for (i, step) in self.plan.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PatchError::Cancelled);
            }

            self.state = ChainState::Applying(i + 1);

            if !step.input.is_file() {
                return Err(PatchError::UnresolvedInput { path: step.input.clone() });
            }
            if !step.patch.is_file() {
                return Err(PatchError::UnresolvedInput { path: step.patch.clone() });
            }

            debug!(
                "Step {}/{}: {} + {}",
                i + 1,
                total,
                step.input.display(),
                step.patch.display()
            );

            if let Err(e) = patcher.apply(&step.input, &step.patch, &step.output, cancel).await {
                remove_if_exists(&step.output);
                return Err(e);
            }
        }

        // The patcher exited cleanly but may still not have written anything
        if !self.plan.final_output.is_file() {
            return Err(PatchError::UnresolvedInput {
                path: self.plan.final_output.clone(),
            });
        }

        Ok(())
    }

    fn cleanup_temporaries(&self) {
        for tmp in self.plan.temporaries() {
            remove_if_exists(tmp);
        }
    }
}
