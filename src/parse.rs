//! Selection references for the command line.
//!
//! A reference string like `notes.txt:10,15,-20` is parsed into
//! [`FileLineRefs`] and then resolved against a [`FileDiff`] into per-hunk
//! sets of line indices, the selection shape the patch synthesizer takes.
//!
//! # Syntax
//!
//! `FILE:REFS`, with REFS a comma-separated list of:
//!
//! - `N` - added line at new line number N
//! - `-N` - deleted line at old line number N
//! - `N..M` - added lines N through M
//! - `-N..-M` - deleted lines N through M
//! - `hN` - every line of hunk N, as numbered by `git-chunks diff`
//!
//! # Examples
//!
//! ```
//! use git_chunks::parse::{parse_file_refs, LineRef};
//! use std::num::NonZeroU32;
//!
//! let refs = parse_file_refs("flake.nix:-10,12,h3").unwrap();
//! assert_eq!(refs.file, "flake.nix");
//! assert_eq!(refs.refs, vec![
//!     LineRef::Delete(NonZeroU32::new(10).unwrap()),
//!     LineRef::Add(NonZeroU32::new(12).unwrap()),
//!     LineRef::Hunk(3),
//! ]);
//! ```

use crate::diff::{FileDiff, LineKind};
use error_set::error_set;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::NonZeroU32;

error_set! {
    /// Errors from parsing or resolving selection references
    RefParseError := {
        /// Input string does not contain a colon separator
        #[display("Invalid format '{input}': expected 'file:refs'")]
        InvalidFormat { input: String },
        #[display("Invalid format '{input}': file name cannot be empty")]
        EmptyFileName { input: String },
        #[display("No line references provided")]
        EmptyRefs,
        /// Line number could not be parsed as a non-zero u32
        #[display("Invalid line number '{value}'")]
        InvalidLineNumber { value: String },
        #[display("Invalid range {start}..{end}: start must be <= end")]
        InvalidRange { start: u32, end: u32 },
        /// Deletion range end without the '-' prefix
        #[display("Delete reference must start with '-', got '{value}'")]
        InvalidDeleteRef { value: String },
        #[display("Invalid hunk reference '{value}'")]
        InvalidHunkRef { value: String },
        /// Reference names a hunk the current diff does not have
        #[display("Hunk {hunk_index} does not exist ({count} hunks in diff)")]
        UnknownHunk { hunk_index: usize, count: usize },
        /// Reference names no changed line of the current diff
        #[display("'{reference}' does not match any changed line of {file}")]
        UnmatchedRef { reference: String, file: String },
    }
}

/// Line indices to apply, keyed by hunk index
pub type Selection = BTreeMap<usize, BTreeSet<usize>>;

/// A reference to lines of a diff.
///
/// Additions are addressed by new line number, deletions by old line number.
#[derive(Debug, Clone, PartialEq)]
pub enum LineRef {
    Add(NonZeroU32),
    /// Inclusive on both ends
    AddRange(NonZeroU32, NonZeroU32),
    Delete(NonZeroU32),
    /// Inclusive on both ends
    DeleteRange(NonZeroU32, NonZeroU32),
    /// Whole hunk by index
    Hunk(usize),
}

impl LineRef {
    fn matches(&self, kind: LineKind, old: Option<u32>, new: Option<u32>) -> bool {
        let within = |n: Option<u32>, start: NonZeroU32, end: NonZeroU32| {
            n.is_some_and(|n| (start.get()..=end.get()).contains(&n))
        };
        match (self, kind) {
            (LineRef::Add(n), LineKind::Added) => within(new, *n, *n),
            (LineRef::AddRange(start, end), LineKind::Added) => within(new, *start, *end),
            (LineRef::Delete(n), LineKind::Deleted) => within(old, *n, *n),
            (LineRef::DeleteRange(start, end), LineKind::Deleted) => within(old, *start, *end),
            _ => false,
        }
    }
}

impl fmt::Display for LineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineRef::Add(n) => write!(f, "{n}"),
            LineRef::AddRange(start, end) => write!(f, "{start}..{end}"),
            LineRef::Delete(n) => write!(f, "-{n}"),
            LineRef::DeleteRange(start, end) => write!(f, "-{start}..-{end}"),
            LineRef::Hunk(h) => write!(f, "h{h}"),
        }
    }
}

/// Parsed `file:refs` argument
#[derive(Debug, Clone, PartialEq)]
pub struct FileLineRefs {
    pub file: String,
    pub refs: Vec<LineRef>,
}

/// Parse a `file:refs` string.
///
/// # Errors
///
/// Returns [`RefParseError`] if the colon is missing, the file name is blank,
/// no references follow the colon, or a reference is malformed.
pub fn parse_file_refs(input: &str) -> Result<FileLineRefs, RefParseError> {
    let Some((file, refs)) = input.split_once(':') else {
        return Err(RefParseError::InvalidFormat {
            input: input.to_string(),
        });
    };

    let file = file.trim();
    if file.is_empty() {
        return Err(RefParseError::EmptyFileName {
            input: input.to_string(),
        });
    }

    Ok(FileLineRefs {
        file: file.to_string(),
        refs: parse_line_refs(refs)?,
    })
}

fn parse_line_refs(input: &str) -> Result<Vec<LineRef>, RefParseError> {
    let refs = input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_single_ref)
        .collect::<Result<Vec<_>, _>>()?;

    if refs.is_empty() {
        return Err(RefParseError::EmptyRefs);
    }

    Ok(refs)
}

fn parse_single_ref(input: &str) -> Result<LineRef, RefParseError> {
    if let Some(index) = input.strip_prefix('h') {
        return index
            .parse::<usize>()
            .map(LineRef::Hunk)
            .map_err(|_| RefParseError::InvalidHunkRef {
                value: input.to_string(),
            });
    }

    let Some((start, end)) = input.split_once("..") else {
        return match input.strip_prefix('-') {
            Some(number) => Ok(LineRef::Delete(parse_number(number, input)?)),
            None => Ok(LineRef::Add(parse_number(input, input)?)),
        };
    };

    let (start, end, deletion) = match start.strip_prefix('-') {
        Some(start) => {
            let Some(end) = end.strip_prefix('-') else {
                return Err(RefParseError::InvalidDeleteRef {
                    value: end.to_string(),
                });
            };
            (parse_number(start, input)?, parse_number(end, input)?, true)
        }
        None => (parse_number(start, input)?, parse_number(end, input)?, false),
    };

    if start > end {
        return Err(RefParseError::InvalidRange {
            start: start.get(),
            end: end.get(),
        });
    }

    Ok(if deletion {
        LineRef::DeleteRange(start, end)
    } else {
        LineRef::AddRange(start, end)
    })
}

fn parse_number(digits: &str, input: &str) -> Result<NonZeroU32, RefParseError> {
    digits
        .parse::<NonZeroU32>()
        .map_err(|_| RefParseError::InvalidLineNumber {
            value: input.to_string(),
        })
}

/// Resolve references against the diff they were read from.
///
/// Every reference must match at least one changed line (or name an
/// existing hunk); an unmatched reference is an error rather than a silent
/// no-op.
///
/// # Errors
///
/// Returns [`RefParseError::UnknownHunk`] or [`RefParseError::UnmatchedRef`].
pub fn resolve(refs: &[LineRef], file: &FileDiff) -> Result<Selection, RefParseError> {
    let mut selection = Selection::new();

    for line_ref in refs {
        if let LineRef::Hunk(hunk_index) = line_ref {
            let Some(hunk) = file.hunks.get(*hunk_index) else {
                return Err(RefParseError::UnknownHunk {
                    hunk_index: *hunk_index,
                    count: file.hunks.len(),
                });
            };
            selection
                .entry(*hunk_index)
                .or_default()
                .extend(0..hunk.lines.len());
            continue;
        }

        let mut matched = false;
        for (h, hunk) in file.hunks.iter().enumerate() {
            for (i, line) in hunk.lines.iter().enumerate() {
                if line_ref.matches(line.kind, line.old_line_no, line.new_line_no) {
                    selection.entry(h).or_default().insert(i);
                    matched = true;
                }
            }
        }
        if !matched {
            return Err(RefParseError::UnmatchedRef {
                reference: line_ref.to_string(),
                file: file.path.clone(),
            });
        }
    }

    Ok(selection)
}
