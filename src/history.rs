//! Undo/redo log of applied staging operations.
//!
//! Each [`HistoryEntry`] keeps the exact patches that were applied, so undo
//! replays them reversed and redo replays them as they were, independently of
//! how hunk indices have shifted since.

use crate::patch::PatchDocument;
use error_set::error_set;
use std::collections::BTreeSet;
use std::fmt;

error_set! {
    HistoryError := {
        /// Nothing to undo or redo
        #[display("No history to move through")]
        NoHistory,
    }
}

/// A mutation the user asked for, as recorded in history
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingOperation {
    StageHunk {
        file: String,
        hunk_index: usize,
    },
    /// Remove a hunk's changes from the index
    DiscardHunk {
        file: String,
        hunk_index: usize,
    },
    StageLines {
        file: String,
        hunk_index: usize,
        line_indices: BTreeSet<usize>,
    },
    DiscardLines {
        file: String,
        hunk_index: usize,
        line_indices: BTreeSet<usize>,
    },
    StageAll {
        file: String,
        hunk_indices: Vec<usize>,
    },
    UnstageAll {
        file: String,
        hunk_indices: Vec<usize>,
    },
}

impl StagingOperation {
    /// The operation that undoes this one
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self.clone() {
            Self::StageHunk { file, hunk_index } => Self::DiscardHunk { file, hunk_index },
            Self::DiscardHunk { file, hunk_index } => Self::StageHunk { file, hunk_index },
            Self::StageLines {
                file,
                hunk_index,
                line_indices,
            } => Self::DiscardLines {
                file,
                hunk_index,
                line_indices,
            },
            Self::DiscardLines {
                file,
                hunk_index,
                line_indices,
            } => Self::StageLines {
                file,
                hunk_index,
                line_indices,
            },
            Self::StageAll { file, hunk_indices } => Self::UnstageAll { file, hunk_indices },
            Self::UnstageAll { file, hunk_indices } => Self::StageAll { file, hunk_indices },
        }
    }

    #[must_use]
    pub fn file(&self) -> &str {
        match self {
            Self::StageHunk { file, .. }
            | Self::DiscardHunk { file, .. }
            | Self::StageLines { file, .. }
            | Self::DiscardLines { file, .. }
            | Self::StageAll { file, .. }
            | Self::UnstageAll { file, .. } => file,
        }
    }
}

impl fmt::Display for StagingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageHunk { file, hunk_index } => write!(f, "stage {file} hunk {hunk_index}"),
            Self::DiscardHunk { file, hunk_index } => {
                write!(f, "unstage {file} hunk {hunk_index}")
            }
            Self::StageLines {
                file,
                hunk_index,
                line_indices,
            } => write!(f, "stage {file} hunk {hunk_index} lines {line_indices:?}"),
            Self::DiscardLines {
                file,
                hunk_index,
                line_indices,
            } => write!(f, "unstage {file} hunk {hunk_index} lines {line_indices:?}"),
            Self::StageAll { file, hunk_indices } => {
                write!(f, "stage {file} hunks {hunk_indices:?}")
            }
            Self::UnstageAll { file, hunk_indices } => {
                write!(f, "unstage {file} hunks {hunk_indices:?}")
            }
        }
    }
}

/// An operation together with the patches applied for it, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub operation: StagingOperation,
    pub patches: Vec<PatchDocument>,
}

impl HistoryEntry {
    /// Entry that reverts this one: inverse operation, patches reversed in
    /// both order and direction
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            operation: self.operation.inverse(),
            patches: self.patches.iter().rev().map(PatchDocument::inverted).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StagingHistory {
    entries: Vec<HistoryEntry>,
    /// Last applied entry, `None` before the first
    cursor: Option<usize>,
}

impl StagingHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, discarding anything that had been undone
    pub fn record(&mut self, entry: HistoryEntry) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.entries.truncate(keep);
        self.entries.push(entry);
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Revert the entry at the cursor through `apply`.
    ///
    /// The cursor only moves back when `apply` succeeds.
    ///
    /// # Errors
    ///
    /// [`HistoryError::NoHistory`] when there is nothing to undo, otherwise
    /// whatever `apply` returns.
    pub fn undo<E, F>(&mut self, apply: F) -> Result<StagingOperation, E>
    where
        E: From<HistoryError>,
        F: FnOnce(&HistoryEntry) -> Result<(), E>,
    {
        let Some(cursor) = self.cursor else {
            return Err(HistoryError::NoHistory.into());
        };
        let inverse = self.entries[cursor].inverse();
        apply(&inverse)?;
        self.cursor = cursor.checked_sub(1);
        Ok(inverse.operation)
    }

    /// Reapply the entry after the cursor through `apply`.
    ///
    /// The cursor only moves forward when `apply` succeeds.
    ///
    /// # Errors
    ///
    /// [`HistoryError::NoHistory`] when there is nothing to redo, otherwise
    /// whatever `apply` returns.
    pub fn redo<E, F>(&mut self, apply: F) -> Result<StagingOperation, E>
    where
        E: From<HistoryError>,
        F: FnOnce(&HistoryEntry) -> Result<(), E>,
    {
        let next = self.cursor.map_or(0, |c| c + 1);
        let Some(entry) = self.entries.get(next) else {
            return Err(HistoryError::NoHistory.into());
        };
        apply(entry)?;
        let operation = entry.operation.clone();
        self.cursor = Some(next);
        Ok(operation)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor.is_some()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor.map_or(0, |c| c + 1) < self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}
