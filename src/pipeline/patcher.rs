//! External patcher invocation.
//!
//! The patcher (Floating IPS by default) is called as
//! `<patcher> --apply <patch> <input> <output>`. Stdout and stderr are
//! captured and only shown when the call fails.

use crate::cancel::Cancellation;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default patcher binary, looked up on PATH.
pub const DEFAULT_PATCHER: &str = "flips";

/// Errors from applying a patch or a patch chain.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: PatchCommand,
        #[source]
        source: std::io::Error,
    },

    #[error("Patch failed ({status}): {command}")]
    Execution {
        command: PatchCommand,
        status: String,
        output: String,
    },

    #[error("Patcher timed out after {}s: {command}", .after.as_secs())]
    Timeout { command: PatchCommand, after: Duration },

    #[error("Interrupted")]
    Cancelled,

    #[error("Input not found: {}", .path.display())]
    UnresolvedInput { path: PathBuf },

    #[error("No patch files listed")]
    EmptyChain,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    /// Whether the batch may continue with the next entry.
    ///
    /// Only missing inputs are skippable. Anything the patcher itself
    /// reports stops the whole batch.
    pub fn is_skippable(&self) -> bool {
        matches!(self, PatchError::UnresolvedInput { .. } | PatchError::EmptyChain)
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PatchError::Io { context: context.into(), source }
    }
}

/// One patcher command line, kept for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchCommand {
    pub program: PathBuf,
    pub patch: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl PatchCommand {
    pub fn args(&self) -> [&OsStr; 4] {
        [
            OsStr::new("--apply"),
            self.patch.as_os_str(),
            self.input.as_os_str(),
            self.output.as_os_str(),
        ]
    }
}

impl fmt::Display for PatchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} --apply {:?} {:?} {:?}",
            self.program.display(),
            self.patch.display().to_string(),
            self.input.display().to_string(),
            self.output.display().to_string()
        )
    }
}

/// Runs the external patcher.
#[derive(Debug, Clone)]
pub struct Patcher {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl Patcher {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Build the command line for one step.
    pub fn command(&self, input: &Path, patch: &Path, output: &Path) -> PatchCommand {
        PatchCommand {
            program: self.program.clone(),
            patch: patch.to_path_buf(),
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        }
    }

    /// Apply `patch` to `input`, writing `output`. Blocks the chain until the
    /// patcher exits, the timeout expires, or `cancel` fires; in the last two
    /// cases the child is killed.
    pub async fn apply(
        &self,
        input: &Path,
        patch: &Path,
        output: &Path,
        cancel: &Cancellation,
    ) -> Result<(), PatchError> {
        let command = self.command(input, patch, output);
        debug!("Running: {}", command);

        let child = Command::new(&command.program)
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(source) => return Err(PatchError::Spawn { command, source }),
        };

        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        // Dropping the wait future on the other branches kills the child.
        let result = tokio::select! {
            result = child.wait_with_output() => result,
            _ = deadline => {
                return Err(PatchError::Timeout {
                    command,
                    after: timeout.unwrap_or_default(),
                });
            }
            _ = cancel.cancelled() => return Err(PatchError::Cancelled),
        };

        let output = match result {
            Ok(output) => output,
            Err(source) => return Err(PatchError::Spawn { command, source }),
        };

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(PatchError::Execution {
                command,
                status: output.status.to_string(),
                output: combined,
            });
        }

        Ok(())
    }
}
