use super::{ParseError, split_lines};
use super::file::{FileDiff, parse_lines};

/// A complete git diff containing changes for multiple files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub files: Vec<FileDiff>,
}

impl Diff {
    /// Parse a complete git diff output into file diffs.
    ///
    /// Sections start at each `diff --git` line. Text without any such line
    /// is treated as a single file.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let lines = split_lines(text);

        let mut starts: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.starts_with("diff --git "))
            .map(|(i, _)| i)
            .collect();

        if starts.is_empty() {
            if text.trim().is_empty() {
                return Ok(Diff::default());
            }
            starts.push(0);
        }

        let mut files = Vec::with_capacity(starts.len());
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(lines.len());
            let file_diff = parse_lines(&lines[start..end], start)?;
            // Mode-only and binary sections carry no hunks
            if !file_diff.hunks.is_empty() {
                files.push(file_diff);
            }
        }

        Ok(Diff { files })
    }

    /// Look up the diff of one file
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&FileDiff> {
        self.files.iter().find(|f| f.path == path)
    }
}

impl std::fmt::Display for Diff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for file_diff in &self.files {
            write!(f, "{}", file_diff)?;
        }
        Ok(())
    }
}
