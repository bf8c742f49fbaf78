//! The boundary to whatever owns the index.
//!
//! [`PatchBackend`] is the only thing the staging session talks to: it hands
//! out raw diff text and accepts patches. [`GitCli`] implements it by running
//! git; tests substitute an in-memory backend.

use crate::config::Config;
use error_set::error_set;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

error_set! {
    /// Errors from running git
    GitCommandError := {
        #[display("Failed to run git diff: {message}")]
        DiffFailed { message: String },
        #[display("git diff failed: {stderr}")]
        DiffExitError { stderr: String },
        #[display("Invalid UTF-8 in git diff output: {message}")]
        InvalidUtf8 { message: String },
        #[display("Failed to spawn git apply: {message}")]
        ApplySpawnFailed { message: String },
        #[display("Failed to get stdin handle for git apply")]
        ApplyStdinFailed,
        #[display("Failed to write patch to git apply: {message}")]
        ApplyWriteFailed { message: String },
        #[display("Failed to wait for git apply: {message}")]
        ApplyWaitFailed { message: String },
        /// The patch was rejected; the index is unchanged
        #[display("git apply failed: {stderr}")]
        ApplyExitError { stderr: String },
    }
}

/// Flags for one apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyMode {
    /// Apply the patch in reverse
    pub reverse: bool,
    /// Apply to the index rather than the working tree
    pub cached: bool,
}

impl ApplyMode {
    /// Index-only apply, optionally reversed
    #[must_use]
    pub fn cached(reverse: bool) -> Self {
        Self {
            reverse,
            cached: true,
        }
    }
}

/// Source of diffs and sink of patches for one repository
pub trait PatchBackend {
    /// Raw unified diff of `path`: working tree vs. index, or index vs. HEAD
    /// when `staged`. Empty text means no changes.
    ///
    /// # Errors
    ///
    /// Returns [`GitCommandError`] when the diff cannot be produced.
    fn diff(&self, path: &str, staged: bool) -> Result<String, GitCommandError>;

    /// Apply a unified diff atomically: fully or not at all.
    ///
    /// # Errors
    ///
    /// [`GitCommandError::ApplyExitError`] when the patch is rejected.
    fn apply(&self, patch: &str, mode: ApplyMode) -> Result<(), GitCommandError>;
}

impl<B: PatchBackend + ?Sized> PatchBackend for &B {
    fn diff(&self, path: &str, staged: bool) -> Result<String, GitCommandError> {
        (**self).diff(path, staged)
    }

    fn apply(&self, patch: &str, mode: ApplyMode) -> Result<(), GitCommandError> {
        (**self).apply(patch, mode)
    }
}

/// Backend that shells out to `git`
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
    git: PathBuf,
    context_lines: u32,
}

impl GitCli {
    /// Git on `PATH` for the repository at `repo`, three lines of context
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self::from_config(&Config::for_repo(repo))
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            repo: config.repo.clone(),
            git: config.git.clone(),
            context_lines: config.context_lines,
        }
    }

    /// Raw diff of `paths`, or of every changed file when empty
    ///
    /// # Errors
    ///
    /// Returns [`GitCommandError`] when git cannot be run or fails.
    pub fn raw_diff<S: AsRef<str>>(
        &self,
        paths: &[S],
        staged: bool,
    ) -> Result<String, GitCommandError> {
        let mut command = self.command();
        command
            .args(["diff", "--no-ext-diff", "--no-color"])
            .arg(format!("-U{}", self.context_lines));
        if staged {
            command.arg("--cached");
        }
        command.arg("--").args(paths.iter().map(AsRef::as_ref));

        tracing::debug!(paths = paths.len(), staged, "fetching diff");
        let output = command.output().map_err(|e| GitCommandError::DiffFailed {
            message: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitCommandError::DiffExitError {
                stderr: stderr.into_owned(),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| GitCommandError::InvalidUtf8 {
            message: e.to_string(),
        })
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.git);
        command.arg("-C").arg(&self.repo);
        command
    }
}

impl PatchBackend for GitCli {
    fn diff(&self, path: &str, staged: bool) -> Result<String, GitCommandError> {
        self.raw_diff(&[path], staged)
    }

    fn apply(&self, patch: &str, mode: ApplyMode) -> Result<(), GitCommandError> {
        let mut command = self.command();
        command.arg("apply");
        if mode.cached {
            command.arg("--cached");
        }
        if mode.reverse {
            command.arg("--reverse");
        }
        command.args(["--unidiff-zero", "-"]);

        tracing::debug!(?mode, %patch, "applying patch");
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GitCommandError::ApplySpawnFailed {
                message: e.to_string(),
            })?;

        child
            .stdin
            .take()
            .ok_or(GitCommandError::ApplyStdinFailed)?
            .write_all(patch.as_bytes())
            .map_err(|e| GitCommandError::ApplyWriteFailed {
                message: e.to_string(),
            })?;

        let output = child
            .wait_with_output()
            .map_err(|e| GitCommandError::ApplyWaitFailed {
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(stderr = %stderr.trim_end(), "git apply rejected patch");
            return Err(GitCommandError::ApplyExitError {
                stderr: stderr.into_owned(),
            });
        }

        Ok(())
    }
}

/// Single-writer lock over one repository's index.
///
/// Clones share the same flag; hand one to every session of a repository.
#[derive(Debug, Clone, Default)]
pub struct ApplyGate {
    held: Arc<AtomicBool>,
}

impl ApplyGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate, or `None` if another mutation holds it
    #[must_use]
    pub fn try_enter(&self) -> Option<GateGuard> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| GateGuard {
                held: Arc::clone(&self.held),
            })
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the [`ApplyGate`] on drop
#[derive(Debug)]
pub struct GateGuard {
    held: Arc<AtomicBool>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
