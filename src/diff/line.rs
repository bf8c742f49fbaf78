use std::fmt;

/// Role of a line within a hunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LineKind {
    /// Present on both sides
    Context,
    /// Present only on the new side
    Added,
    /// Present only on the old side
    Deleted,
}

impl LineKind {
    /// Unified diff marker for this kind
    #[must_use]
    pub fn marker(self) -> char {
        match self {
            LineKind::Context => ' ',
            LineKind::Added => '+',
            LineKind::Deleted => '-',
        }
    }

    /// Classify a body line by its leading marker
    #[must_use]
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            ' ' => Some(LineKind::Context),
            '+' => Some(LineKind::Added),
            '-' => Some(LineKind::Deleted),
            _ => None,
        }
    }

    /// Whether the line exists in the old version
    #[must_use]
    pub fn on_old_side(self) -> bool {
        matches!(self, LineKind::Context | LineKind::Deleted)
    }

    /// Whether the line exists in the new version
    #[must_use]
    pub fn on_new_side(self) -> bool {
        matches!(self, LineKind::Context | LineKind::Added)
    }

    #[must_use]
    pub fn is_change(self) -> bool {
        !matches!(self, LineKind::Context)
    }
}

/// A single addressable line of a hunk.
///
/// `text` never carries the marker; it is re-derived from `kind` on output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: LineKind,
    pub text: String,
    /// Line number in the old version (context and deleted lines)
    pub old_line_no: Option<u32>,
    /// Line number in the new version (context and added lines)
    pub new_line_no: Option<u32>,
    /// Followed by `\ No newline at end of file`
    pub missing_newline: bool,
}

impl DiffLine {
    pub fn context(text: impl Into<String>, old_line_no: u32, new_line_no: u32) -> Self {
        Self {
            kind: LineKind::Context,
            text: text.into(),
            old_line_no: Some(old_line_no),
            new_line_no: Some(new_line_no),
            missing_newline: false,
        }
    }

    pub fn added(text: impl Into<String>, new_line_no: u32) -> Self {
        Self {
            kind: LineKind::Added,
            text: text.into(),
            old_line_no: None,
            new_line_no: Some(new_line_no),
            missing_newline: false,
        }
    }

    pub fn deleted(text: impl Into<String>, old_line_no: u32) -> Self {
        Self {
            kind: LineKind::Deleted,
            text: text.into(),
            old_line_no: Some(old_line_no),
            new_line_no: None,
            missing_newline: false,
        }
    }
}

impl fmt::Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{}", self.kind.marker(), self.text)?;
        if self.missing_newline {
            writeln!(f, "\\ No newline at end of file")?;
        }
        Ok(())
    }
}
