//! Per-file staging session.
//!
//! A [`StagingSession`] owns everything mutable about staging one file: the
//! backend handle, the last [`Snapshot`] shown to the user and the undo
//! history. Every mutation re-fetches both diffs and checks that the hunk the
//! caller addressed is still the hunk it saw before anything is applied.

use crate::diff::{FileDiff, ParseError};
use crate::gateway::{ApplyGate, ApplyMode, GateGuard, GitCommandError, PatchBackend};
use crate::history::{HistoryEntry, HistoryError, StagingHistory, StagingOperation};
use crate::patch::{Mode, PatchDocument, SynthesisError, all_lines, synthesize_patch};
use crate::state::{FileStaging, Side, StageStatus, classify};
use error_set::error_set;
use std::collections::BTreeSet;
use std::fmt::Write;

error_set! {
    /// Errors from a staging session
    StagingError := {
        /// Another mutation of the same repository is in flight
        #[display("Another staging operation is in progress")]
        Busy,
        /// The addressed hunk differs from the one in the last snapshot
        #[display("Hunk {hunk_index} changed since the diff was last read; refresh and retry")]
        StaleHunk { hunk_index: usize },
        ParseError(ParseError),
        SynthesisError(SynthesisError),
        GitCommandError(GitCommandError),
        HistoryError(HistoryError),
    }
}

/// Both diffs of a file and their classification at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Working tree vs. index
    pub unstaged: FileDiff,
    /// Index vs. HEAD
    pub staged: FileDiff,
    pub staging: FileStaging,
}

impl Snapshot {
    #[must_use]
    pub fn diff(&self, side: Side) -> &FileDiff {
        match side {
            Side::Unstaged => &self.unstaged,
            Side::Staged => &self.staged,
        }
    }
}

/// Render the classification of a snapshot, one line per hunk
#[must_use]
pub fn format_status(snapshot: &Snapshot) -> String {
    let staging = &snapshot.staging;
    let mut result = String::new();
    let _ = writeln!(
        result,
        "{}: {} staged, {} unstaged",
        staging.path,
        staging.staged_count(),
        staging.unstaged_count()
    );

    for (side, label) in [(Side::Unstaged, "unstaged"), (Side::Staged, "staged")] {
        for (h, hunk) in snapshot.diff(side).hunks.iter().enumerate() {
            let status = match staging.status(side, h) {
                Some(StageStatus::Staged) => "staged",
                Some(StageStatus::Unstaged) => "unstaged",
                Some(StageStatus::PartiallyStaged) => "partially staged",
                None => "unchanged",
            };
            let _ = writeln!(
                result,
                "  {label:<8} [{h}] {} +{} -{} {status}",
                hunk.header_line(),
                hunk.added(),
                hunk.deleted()
            );
        }
    }

    result
}

struct Target {
    hunk_index: usize,
    /// `None` selects the whole hunk
    lines: Option<BTreeSet<usize>>,
}

pub struct StagingSession<B: PatchBackend> {
    backend: B,
    path: String,
    history: StagingHistory,
    snapshot: Option<Snapshot>,
    gate: ApplyGate,
}

impl<B: PatchBackend> StagingSession<B> {
    /// Session with a gate of its own
    pub fn new(backend: B, path: impl Into<String>) -> Self {
        Self::with_gate(backend, path, ApplyGate::new())
    }

    /// Session sharing `gate` with the other sessions of the same repository
    pub fn with_gate(backend: B, path: impl Into<String>, gate: ApplyGate) -> Self {
        Self {
            backend,
            path: path.into(),
            history: StagingHistory::new(),
            snapshot: None,
            gate,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn history(&self) -> &StagingHistory {
        &self.history
    }

    /// The snapshot hunk indices currently refer to
    #[must_use]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Re-read both diffs and reclassify.
    ///
    /// # Errors
    ///
    /// Propagates backend and parse failures.
    pub fn refresh(&mut self) -> Result<&Snapshot, StagingError> {
        let snapshot = self.fetch()?;
        Ok(self.snapshot.insert(snapshot))
    }

    /// Stage every change of unstaged hunk `hunk_index`.
    ///
    /// # Errors
    ///
    /// [`StagingError::Busy`], [`StagingError::StaleHunk`],
    /// [`SynthesisError::HunkNotFound`] or a rejected apply.
    pub fn stage_hunk(&mut self, hunk_index: usize) -> Result<&Snapshot, StagingError> {
        self.mutate(
            Side::Unstaged,
            vec![Target {
                hunk_index,
                lines: None,
            }],
            StagingOperation::StageHunk {
                file: self.path.clone(),
                hunk_index,
            },
        )
    }

    /// Remove every change of staged hunk `hunk_index` from the index.
    ///
    /// # Errors
    ///
    /// As [`StagingSession::stage_hunk`].
    pub fn unstage_hunk(&mut self, hunk_index: usize) -> Result<&Snapshot, StagingError> {
        self.mutate(
            Side::Staged,
            vec![Target {
                hunk_index,
                lines: None,
            }],
            StagingOperation::DiscardHunk {
                file: self.path.clone(),
                hunk_index,
            },
        )
    }

    /// Stage the selected lines of unstaged hunk `hunk_index`.
    ///
    /// # Errors
    ///
    /// As [`StagingSession::stage_hunk`], plus
    /// [`SynthesisError::LineOutOfRange`].
    pub fn stage_lines(
        &mut self,
        hunk_index: usize,
        line_indices: BTreeSet<usize>,
    ) -> Result<&Snapshot, StagingError> {
        let operation = StagingOperation::StageLines {
            file: self.path.clone(),
            hunk_index,
            line_indices: line_indices.clone(),
        };
        self.mutate(
            Side::Unstaged,
            vec![Target {
                hunk_index,
                lines: Some(line_indices),
            }],
            operation,
        )
    }

    /// Remove the selected lines of staged hunk `hunk_index` from the index.
    ///
    /// # Errors
    ///
    /// As [`StagingSession::stage_lines`].
    pub fn discard_lines(
        &mut self,
        hunk_index: usize,
        line_indices: BTreeSet<usize>,
    ) -> Result<&Snapshot, StagingError> {
        let operation = StagingOperation::DiscardLines {
            file: self.path.clone(),
            hunk_index,
            line_indices: line_indices.clone(),
        };
        self.mutate(
            Side::Staged,
            vec![Target {
                hunk_index,
                lines: Some(line_indices),
            }],
            operation,
        )
    }

    /// Stage several unstaged hunks as one undoable step.
    ///
    /// # Errors
    ///
    /// As [`StagingSession::stage_hunk`]; on failure every hunk applied so
    /// far is rolled back.
    pub fn stage_all(&mut self, hunk_indices: &[usize]) -> Result<&Snapshot, StagingError> {
        let operation = StagingOperation::StageAll {
            file: self.path.clone(),
            hunk_indices: hunk_indices.to_vec(),
        };
        self.mutate(Side::Unstaged, whole_hunks(hunk_indices), operation)
    }

    /// Unstage several staged hunks as one undoable step.
    ///
    /// # Errors
    ///
    /// As [`StagingSession::stage_all`].
    pub fn unstage_all(&mut self, hunk_indices: &[usize]) -> Result<&Snapshot, StagingError> {
        let operation = StagingOperation::UnstageAll {
            file: self.path.clone(),
            hunk_indices: hunk_indices.to_vec(),
        };
        self.mutate(Side::Staged, whole_hunks(hunk_indices), operation)
    }

    /// Revert the most recent operation.
    ///
    /// # Errors
    ///
    /// [`HistoryError::NoHistory`] when there is nothing to undo; a rejected
    /// apply leaves history where it was.
    pub fn undo(&mut self) -> Result<&Snapshot, StagingError> {
        let _guard = self.enter()?;
        let backend = &self.backend;
        let operation = self.history.undo(|entry| apply_entry(backend, entry))?;
        tracing::info!(%operation, "undo");
        self.refresh()
    }

    /// Reapply the most recently undone operation.
    ///
    /// # Errors
    ///
    /// As [`StagingSession::undo`].
    pub fn redo(&mut self) -> Result<&Snapshot, StagingError> {
        let _guard = self.enter()?;
        let backend = &self.backend;
        let operation = self.history.redo(|entry| apply_entry(backend, entry))?;
        tracing::info!(%operation, "redo");
        self.refresh()
    }

    fn enter(&self) -> Result<GateGuard, StagingError> {
        self.gate.try_enter().ok_or_else(|| {
            tracing::warn!(path = %self.path, "index is busy");
            StagingError::Busy
        })
    }

    fn fetch(&self) -> Result<Snapshot, StagingError> {
        let unstaged = FileDiff::parse_for(&self.path, &self.backend.diff(&self.path, false)?)?;
        let staged = FileDiff::parse_for(&self.path, &self.backend.diff(&self.path, true)?)?;
        let staging = classify(&unstaged, &staged);
        tracing::debug!(
            path = %self.path,
            unstaged_hunks = unstaged.hunks.len(),
            staged_hunks = staged.hunks.len(),
            "read diffs"
        );
        Ok(Snapshot {
            unstaged,
            staged,
            staging,
        })
    }

    fn mutate(
        &mut self,
        side: Side,
        mut targets: Vec<Target>,
        operation: StagingOperation,
    ) -> Result<&Snapshot, StagingError> {
        let _guard = self.enter()?;

        let seen = match self.snapshot.take() {
            Some(snapshot) => snapshot,
            None => self.fetch()?,
        };
        let expected = seen.diff(side).clone();
        self.snapshot = Some(seen);

        // Later hunks first so earlier indices stay valid between applies
        targets.sort_by(|a, b| b.hunk_index.cmp(&a.hunk_index));
        targets.dedup_by_key(|t| t.hunk_index);

        let mode = match side {
            Side::Unstaged => Mode::Stage,
            Side::Staged => Mode::Unstage,
        };

        let mut applied: Vec<PatchDocument> = Vec::new();
        for target in targets {
            let outcome = self.apply_target(side, mode, &expected, &target);
            match outcome {
                Ok(Some(patch)) => applied.push(patch),
                Ok(None) => {}
                Err(err) => {
                    rollback(&self.backend, &applied);
                    return Err(err);
                }
            }
        }

        if applied.is_empty() {
            tracing::debug!(%operation, "nothing to apply");
        } else {
            tracing::info!(%operation, patches = applied.len(), "applied");
            self.history.record(HistoryEntry {
                operation,
                patches: applied,
            });
        }

        self.refresh()
    }

    fn apply_target(
        &self,
        side: Side,
        mode: Mode,
        expected: &FileDiff,
        target: &Target,
    ) -> Result<Option<PatchDocument>, StagingError> {
        let current = self.fetch()?;
        let file = current.diff(side);
        let hunk_index = target.hunk_index;

        let Some(hunk) = file.hunks.get(hunk_index) else {
            return Err(SynthesisError::HunkNotFound {
                hunk_index,
                count: file.hunks.len(),
            }
            .into());
        };
        if expected.hunks.get(hunk_index) != Some(hunk) {
            tracing::warn!(path = %self.path, hunk_index, "hunk is stale");
            return Err(StagingError::StaleHunk { hunk_index });
        }

        let selected = match &target.lines {
            Some(lines) => lines.clone(),
            None => all_lines(hunk),
        };
        let mut patch = synthesize_patch(file, hunk_index, &selected, mode)?;
        if patch.is_empty() {
            return Ok(None);
        }
        patch.path.clone_from(&self.path);

        apply_patch(&self.backend, &patch)?;
        Ok(Some(patch))
    }
}

fn whole_hunks(hunk_indices: &[usize]) -> Vec<Target> {
    hunk_indices
        .iter()
        .map(|&hunk_index| Target {
            hunk_index,
            lines: None,
        })
        .collect()
}

fn apply_patch<B: PatchBackend>(backend: &B, patch: &PatchDocument) -> Result<(), GitCommandError> {
    backend.apply(&patch.to_string(), ApplyMode::cached(patch.mode.reverse()))
}

/// Apply the patches of `entry` in order, all or nothing
fn apply_entry<B: PatchBackend>(backend: &B, entry: &HistoryEntry) -> Result<(), StagingError> {
    for (done, patch) in entry.patches.iter().enumerate() {
        if let Err(err) = apply_patch(backend, patch) {
            rollback(backend, &entry.patches[..done]);
            return Err(err.into());
        }
    }
    Ok(())
}

/// Best effort: revert `applied` newest first
fn rollback<B: PatchBackend>(backend: &B, applied: &[PatchDocument]) {
    for patch in applied.iter().rev() {
        if let Err(err) = apply_patch(backend, &patch.inverted()) {
            tracing::error!(%err, path = %patch.path, "could not roll back patch");
        }
    }
}
