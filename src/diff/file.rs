use super::{ParseError, split_lines};
use super::hunk::Hunk;
use std::borrow::Cow;
use std::fmt;

/// A complete diff for a single file.
///
/// Contains all hunks (change blocks) for one file from a git diff, in file
/// order. A `FileDiff` is a snapshot: it has no identity across diff requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    /// File path, taken from the `+++ b/` header (or `--- a/` for deletions)
    pub path: String,
    /// All hunks for this file
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    /// Parse the unified diff of exactly one file.
    ///
    /// File headers are optional. Text made of hunks only yields an empty
    /// `path`; empty text yields a diff without hunks.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] for a malformed hunk header, an unknown line
    /// marker, body lines outside any hunk, or counts that disagree with
    /// the body.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        parse_lines(&split_lines(text), 0)
    }

    /// Parse like [`FileDiff::parse`], falling back to `path` when the text
    /// carries no file header of its own.
    pub fn parse_for(path: &str, text: &str) -> Result<Self, ParseError> {
        let mut diff = Self::parse(text)?;
        if diff.path.is_empty() {
            diff.path = path.to_string();
        }
        Ok(diff)
    }

    /// Total added lines over all hunks
    #[must_use]
    pub fn added(&self) -> usize {
        self.hunks.iter().map(Hunk::added).sum()
    }

    /// Total deleted lines over all hunks
    #[must_use]
    pub fn deleted(&self) -> usize {
        self.hunks.iter().map(Hunk::deleted).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }
}

/// Undo git's C-style quoting of paths with special or non-ASCII bytes
fn unquote(path: &str) -> Cow<'_, str> {
    let Some(inner) = path.strip_prefix('"').and_then(|p| p.strip_suffix('"')) else {
        return Cow::Borrowed(path);
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut rest = inner.bytes().peekable();
    while let Some(byte) = rest.next() {
        if byte != b'\\' {
            bytes.push(byte);
            continue;
        }
        let Some(escape) = rest.next() else {
            bytes.push(byte);
            break;
        };
        let decoded = match escape {
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            b'0'..=b'7' => {
                // Up to three octal digits name one byte
                let mut value = u32::from(escape - b'0');
                for _ in 0..2 {
                    match rest.peek() {
                        Some(&(digit @ b'0'..=b'7')) => {
                            value = value * 8 + u32::from(digit - b'0');
                            rest.next();
                        }
                        _ => break,
                    }
                }
                u8::try_from(value).unwrap_or(u8::MAX)
            }
            other => other,
        };
        bytes.push(decoded);
    }
    Cow::Owned(String::from_utf8_lossy(&bytes).into_owned())
}

fn strip_side(path: &str, prefix: &str) -> Option<String> {
    let path = path.split('\t').next().unwrap_or(path);
    if path == "/dev/null" {
        return None;
    }
    let path = unquote(path);
    Some(path.strip_prefix(prefix).unwrap_or(&*path).to_string())
}

/// Parse a single-file section; `base` is the number of lines preceding it
/// in the enclosing text, for error positions.
pub(crate) fn parse_lines(lines: &[&str], base: usize) -> Result<FileDiff, ParseError> {
    let mut git_path: Option<String> = None;
    let mut old_path: Option<String> = None;
    let mut new_path: Option<String> = None;

    let mut idx = 0;
    while idx < lines.len() && !lines[idx].starts_with("@@") {
        let line = lines[idx];
        if let Some(rest) = line.strip_prefix("diff --git ") {
            git_path = match rest.rsplit_once(" \"b/") {
                Some((_, b)) => Some(unquote(&format!("\"{b}")).into_owned()),
                None => rest.rsplit_once(" b/").map(|(_, b)| b.to_string()),
            };
        } else if let Some(rest) = line.strip_prefix("--- ") {
            old_path = strip_side(rest, "a/");
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            new_path = strip_side(rest, "b/");
        } else if line.starts_with([' ', '+', '-']) {
            return Err(ParseError::OrphanLine {
                line_no: base + idx + 1,
            });
        }
        // index, mode and similarity lines carry nothing needed here
        idx += 1;
    }

    let path = new_path.or(old_path).or(git_path).unwrap_or_default();

    let mut hunks = Vec::new();
    while idx < lines.len() {
        let start = idx;
        idx += 1;
        while idx < lines.len() && !lines[idx].starts_with("@@") {
            idx += 1;
        }
        hunks.push(Hunk::parse_body(
            base + start + 1,
            lines[start],
            &lines[start + 1..idx],
        )?);
    }

    Ok(FileDiff { path, hunks })
}

/// Write file headers followed by `hunks` as a patch `git apply` accepts
pub(crate) fn write_patch(f: &mut fmt::Formatter<'_>, path: &str, hunks: &[Hunk]) -> fmt::Result {
    writeln!(f, "diff --git a/{} b/{}", path, path)?;
    writeln!(f, "--- a/{}", path)?;
    writeln!(f, "+++ b/{}", path)?;

    for hunk in hunks {
        write!(f, "{}", hunk)?;
    }

    Ok(())
}

impl fmt::Display for FileDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_patch(f, &self.path, &self.hunks)
    }
}
