pub mod file;
pub mod full;
pub mod hunk;
pub mod line;

pub use file::FileDiff;
pub use full::Diff;
pub use hunk::{Hunk, HunkHeader};
pub use line::{DiffLine, LineKind};

use error_set::error_set;
use std::fmt::Write;

error_set! {
    /// Errors from reading unified diff text
    ParseError := {
        /// A line starting with `@@` that is not a valid hunk header
        #[display("Invalid hunk header at line {line_no}: '{header}'")]
        InvalidHunkHeader { line_no: usize, header: String },
        /// A hunk body line with an unknown leading marker
        #[display("Unrecognized diff line {line_no}: '{line}'")]
        UnrecognizedLine { line_no: usize, line: String },
        /// Diff body lines before the first hunk header
        #[display("Diff line {line_no} is outside of any hunk")]
        OrphanLine { line_no: usize },
        /// Header counts disagree with the hunk body
        #[display("Hunk '{header}' has {old} old and {new} new lines")]
        CountMismatch { header: String, old: u32, new: u32 },
        /// Line numbers of the hunk do not fit in a `u32`
        #[display("Hunk '{header}' runs past the largest line number")]
        LineOverflow { header: String },
    }
}

/// Split diff text on `\n` only, so a `\r` ending a line stays part of it
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n')
        .map(|line| line.strip_suffix('\n').unwrap_or(line))
        .collect()
}

/// Format a git diff for user display with explicit hunk and line indices.
///
/// Each hunk is prefixed with its index; each line with its index within the
/// hunk and the line number on the side it belongs to (new side for context
/// and additions, old side for deletions).
///
/// ```text
/// flake.nix:
///   [0] @@ -136,2 +136,3 @@
///     0:  136:	  inputs = {
///     1: +137:	    debug = true;
/// ```
#[must_use]
pub fn format_diff(diff: &Diff) -> String {
    let mut result = String::new();

    for file_diff in &diff.files {
        if !result.is_empty() {
            result.push('\n');
        }
        let _ = writeln!(result, "{}:", file_diff.path);

        for (h, hunk) in file_diff.hunks.iter().enumerate() {
            let _ = writeln!(result, "  [{}] {}", h, hunk.header_line());
            for (i, line) in hunk.lines.iter().enumerate() {
                let number = match line.kind {
                    LineKind::Deleted => line.old_line_no,
                    LineKind::Added | LineKind::Context => line.new_line_no,
                };
                let _ = writeln!(
                    result,
                    "    {}: {}{}:\t{}",
                    i,
                    line.kind.marker(),
                    number.unwrap_or_default(),
                    line.text
                );
            }
        }
    }

    result
}
