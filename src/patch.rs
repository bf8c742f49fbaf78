//! Partial patch synthesis.
//!
//! Given a [`Hunk`] and a set of selected line indices, [`synthesize`] builds
//! a new hunk that applies exactly the selected changes and nothing else.
//!
//! For staging (forward application against the index) context lines are
//! copied, unselected additions are dropped and unselected deletions become
//! context.
//!
//! Unstaging (reverse application) swaps the roles of additions and
//! deletions. In both modes the header counts are recomputed from the
//! emitted lines and checked against the body before the hunk is returned.
//! The start of the side being applied to is kept; the other start is
//! rebased onto it, so the patch also reverses cleanly on its own.
//!
//! # Examples
//!
//! ```
//! use git_chunks::diff::Hunk;
//! use git_chunks::patch::{Mode, synthesize};
//! use std::collections::BTreeSet;
//!
//! let hunk = Hunk::parse("@@ -10,3 +10,4 @@\n a\n-b\n+x\n+y\n c").unwrap();
//! let partial = synthesize(&hunk, &BTreeSet::from([2]), Mode::Stage)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(partial.to_string(), "@@ -10,3 +10,3 @@\n a\n b\n+x\n c\n");
//! ```

use crate::diff::{DiffLine, FileDiff, Hunk, LineKind};
use crate::diff::file::write_patch;
use error_set::error_set;
use std::collections::BTreeSet;
use std::fmt;

error_set! {
    /// Errors from building a partial patch
    SynthesisError := {
        /// The synthesized hunk disagrees with its own header counts
        #[display("Synthesized hunk '{header}' does not match its body")]
        InvariantViolation { header: String },
        /// A selected index does not address a line of the hunk
        #[display("Line index {index} is out of range for a hunk of {len} lines")]
        LineOutOfRange { index: usize, len: usize },
        /// The targeted hunk is not part of the diff
        #[display("Hunk {hunk_index} does not exist ({count} hunks in diff)")]
        HunkNotFound { hunk_index: usize, count: usize },
    }
}

/// Direction the synthesized patch will be applied in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Forward application of a working tree vs. index hunk
    Stage,
    /// Reverse application of an index vs. HEAD hunk
    Unstage,
}

impl Mode {
    /// Whether the patch must be applied with `--reverse`
    #[must_use]
    pub fn reverse(self) -> bool {
        matches!(self, Mode::Unstage)
    }

    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Mode::Stage => Mode::Unstage,
            Mode::Unstage => Mode::Stage,
        }
    }

    /// What an unselected line of `kind` turns into, `None` meaning dropped
    fn unselected(self, kind: LineKind) -> Option<LineKind> {
        match (self, kind) {
            (_, LineKind::Context) => Some(LineKind::Context),
            (Mode::Stage, LineKind::Added) | (Mode::Unstage, LineKind::Deleted) => None,
            (Mode::Stage, LineKind::Deleted) | (Mode::Unstage, LineKind::Added) => {
                Some(LineKind::Context)
            }
        }
    }
}

/// Every line index of `hunk`
#[must_use]
pub fn all_lines(hunk: &Hunk) -> BTreeSet<usize> {
    (0..hunk.lines.len()).collect()
}

/// Start of the opposite side for a single-hunk patch whose known side
/// starts at `start` with `count` lines. Zero counts name the preceding line.
fn rebase(start: u32, count: u32, other_count: u32) -> u32 {
    let first = if count == 0 { start.saturating_add(1) } else { start };
    if other_count == 0 {
        first.saturating_sub(1)
    } else {
        first
    }
}

/// A line lacking its newline must be the last line of every side it is on.
///
/// Demoting a change to context can put such a line in front of later lines
/// on the side the patch produces (new side when staging, old side when
/// unstaging). That side then gets the line with its newline restored: the
/// change kind loses the marker, a context line splits into a `-`/`+` pair
/// keeping the marker on the other side only. Header counts are unchanged.
fn end_sides_at_missing_newline(lines: Vec<DiffLine>, mode: Mode) -> Vec<DiffLine> {
    let produced = match mode {
        Mode::Stage => LineKind::Added,
        Mode::Unstage => LineKind::Deleted,
    };
    let on_produced = |kind: LineKind| kind == LineKind::Context || kind == produced;

    let mut settled = Vec::with_capacity(lines.len() + 1);
    let mut continued = false;
    for mut line in lines.into_iter().rev() {
        let on_side = on_produced(line.kind);
        if line.missing_newline && on_side && continued {
            if line.kind == LineKind::Context {
                let mut deleted = line.clone();
                deleted.kind = LineKind::Deleted;
                line.kind = LineKind::Added;
                match mode {
                    Mode::Stage => line.missing_newline = false,
                    Mode::Unstage => deleted.missing_newline = false,
                }
                // Pushed in reverse: `-` ends up before `+`
                settled.push(line);
                settled.push(deleted);
                continue;
            }
            line.missing_newline = false;
        }
        continued |= on_side;
        settled.push(line);
    }
    settled.reverse();
    settled
}

/// Build a hunk applying only the `selected` lines of `hunk`.
///
/// Returns `Ok(None)` when the selection contains no additions or deletions;
/// callers treat that as a no-op. Selecting every line reproduces `hunk`
/// itself, save for a canonical header.
///
/// # Errors
///
/// - [`SynthesisError::LineOutOfRange`] if an index exceeds the hunk
/// - [`SynthesisError::InvariantViolation`] if the result fails its own
///   count check, which indicates a bug rather than bad input
pub fn synthesize(
    hunk: &Hunk,
    selected: &BTreeSet<usize>,
    mode: Mode,
) -> Result<Option<Hunk>, SynthesisError> {
    if let Some(&index) = selected.range(hunk.lines.len()..).next() {
        return Err(SynthesisError::LineOutOfRange {
            index,
            len: hunk.lines.len(),
        });
    }

    let mut lines = Vec::with_capacity(hunk.lines.len());
    let mut old_count = 0u32;
    let mut new_count = 0u32;

    for (i, line) in hunk.lines.iter().enumerate() {
        let kind = if selected.contains(&i) {
            Some(line.kind)
        } else {
            mode.unselected(line.kind)
        };
        let Some(kind) = kind else {
            continue;
        };

        old_count += u32::from(kind.on_old_side());
        new_count += u32::from(kind.on_new_side());
        lines.push(DiffLine {
            kind,
            text: line.text.clone(),
            old_line_no: None,
            new_line_no: None,
            missing_newline: line.missing_newline,
        });
    }

    let lines = end_sides_at_missing_newline(lines, mode);
    if !lines.iter().any(|line| line.kind.is_change()) {
        return Ok(None);
    }

    let (old_start, new_start) = match mode {
        Mode::Stage => (
            hunk.old_start,
            rebase(hunk.old_start, old_count, new_count),
        ),
        Mode::Unstage => (
            rebase(hunk.new_start, new_count, old_count),
            hunk.new_start,
        ),
    };

    let mut partial = Hunk {
        header: String::new(),
        old_start,
        old_count,
        new_start,
        new_count,
        section: None,
        lines,
    };
    partial.renumber();
    partial.header = partial.header_line();

    if !partial.check_counts() {
        tracing::error!(
            source = %hunk.header,
            synthesized = %partial.header,
            "synthesized hunk fails its count check"
        );
        return Err(SynthesisError::InvariantViolation {
            header: partial.header,
        });
    }

    tracing::debug!(
        source = %hunk.header,
        synthesized = %partial.header,
        ?mode,
        "synthesized partial hunk"
    );
    Ok(Some(partial))
}

/// A single-file patch ready to hand to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchDocument {
    pub path: String,
    pub hunks: Vec<Hunk>,
    pub mode: Mode,
}

impl PatchDocument {
    /// An empty patch applies nothing and must not be sent to the backend
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// The same hunks applied in the other direction
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            path: self.path.clone(),
            hunks: self.hunks.clone(),
            mode: self.mode.opposite(),
        }
    }
}

impl fmt::Display for PatchDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        write_patch(f, &self.path, &self.hunks)
    }
}

/// Synthesize a patch for the selected lines of one hunk of `file`.
///
/// # Errors
///
/// [`SynthesisError::HunkNotFound`] if `hunk_index` is outside the diff, plus
/// everything [`synthesize`] reports.
pub fn synthesize_patch(
    file: &FileDiff,
    hunk_index: usize,
    selected: &BTreeSet<usize>,
    mode: Mode,
) -> Result<PatchDocument, SynthesisError> {
    let hunk = file
        .hunks
        .get(hunk_index)
        .ok_or(SynthesisError::HunkNotFound {
            hunk_index,
            count: file.hunks.len(),
        })?;

    Ok(PatchDocument {
        path: file.path.clone(),
        hunks: synthesize(hunk, selected, mode)?.into_iter().collect(),
        mode,
    })
}
