use super::{ParseError, split_lines};
use super::line::{DiffLine, LineKind};
use nom::{
    IResult, Parser,
    bytes::complete::tag,
    character::complete::{char, u32 as number},
    combinator::opt,
    sequence::preceded,
};
use std::fmt;

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Ranges parsed from an `@@ -A,B +C,D @@ section` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    pub section: Option<String>,
}

/// `start[,count]`, the count defaulting to 1
fn range(input: &str) -> IResult<&str, (u32, u32)> {
    let (rest, (start, count)) = (number, opt(preceded(char(','), number))).parse(input)?;
    Ok((rest, (start, count.unwrap_or(1))))
}

fn header(input: &str) -> IResult<&str, ((u32, u32), (u32, u32))> {
    let (rest, (_, old, _, new, _)) =
        (tag("@@ -"), range, tag(" +"), range, tag(" @@")).parse(input)?;
    Ok((rest, (old, new)))
}

impl HunkHeader {
    /// Parse a hunk header line.
    ///
    /// Returns `None` unless the line matches `@@ -A[,B] +C[,D] @@`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let (rest, ((old_start, old_count), (new_start, new_count))) = header(line).ok()?;
        let section = rest.strip_prefix(' ').unwrap_or(rest);
        Some(Self {
            old_start,
            old_count,
            new_start,
            new_count,
            section: (!section.is_empty()).then(|| section.to_string()),
        })
    }
}

/// One contiguous block of a unified diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// Header line as it was read (or as it was computed, for synthesized hunks)
    pub header: String,
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    /// Function context trailing the closing `@@`
    pub section: Option<String>,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    /// Build a hunk from lines, deriving the counts and the header.
    ///
    /// Line numbers are reassigned from the two start positions.
    #[must_use]
    pub fn from_lines(old_start: u32, new_start: u32, lines: Vec<DiffLine>) -> Self {
        let mut hunk = Hunk {
            header: String::new(),
            old_start,
            old_count: 0,
            new_start,
            new_count: 0,
            section: None,
            lines,
        };
        hunk.renumber();
        let (old_count, new_count) = hunk.counted();
        hunk.old_count = old_count;
        hunk.new_count = new_count;
        hunk.header = hunk.header_line();
        hunk
    }

    /// Parse a hunk from diff text (header + body lines)
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let lines = split_lines(text);
        let (head, body) = lines.split_first().map_or(("", &[][..]), |(h, b)| (*h, b));
        Self::parse_body(1, head, body)
    }

    /// Parse a hunk whose header sits at `line_no` (1-based, for error reporting)
    pub(crate) fn parse_body(line_no: usize, head: &str, body: &[&str]) -> Result<Self, ParseError> {
        let parsed = HunkHeader::parse(head).ok_or_else(|| ParseError::InvalidHunkHeader {
            line_no,
            header: head.to_string(),
        })?;

        let fits = |no: u64| {
            u32::try_from(no).map_err(|_| ParseError::LineOverflow {
                header: head.to_string(),
            })
        };
        let mut old_no = u64::from(parsed.old_start);
        let mut new_no = u64::from(parsed.new_start);
        let mut old_seen = 0u32;
        let mut new_seen = 0u32;
        let mut lines: Vec<DiffLine> = Vec::with_capacity(body.len());

        for (offset, raw) in body.iter().enumerate() {
            let body_line_no = line_no + offset + 1;
            let satisfied = old_seen >= parsed.old_count && new_seen >= parsed.new_count;

            if raw.starts_with(NO_NEWLINE_MARKER) {
                match lines.last_mut() {
                    Some(last) => last.missing_newline = true,
                    None => {
                        return Err(ParseError::UnrecognizedLine {
                            line_no: body_line_no,
                            line: raw.to_string(),
                        });
                    }
                }
                continue;
            }

            // Editors strip the lone space of empty context lines
            let (kind, text) = if raw.is_empty() {
                if satisfied {
                    continue;
                }
                (LineKind::Context, "")
            } else {
                let mut chars = raw.chars();
                let kind = chars
                    .next()
                    .and_then(LineKind::from_marker)
                    .ok_or_else(|| ParseError::UnrecognizedLine {
                        line_no: body_line_no,
                        line: raw.to_string(),
                    })?;
                (kind, chars.as_str())
            };

            let line = match kind {
                LineKind::Context => DiffLine::context(text, fits(old_no)?, fits(new_no)?),
                LineKind::Added => DiffLine::added(text, fits(new_no)?),
                LineKind::Deleted => DiffLine::deleted(text, fits(old_no)?),
            };
            if kind.on_old_side() {
                old_no += 1;
                old_seen = old_seen.saturating_add(1);
            }
            if kind.on_new_side() {
                new_no += 1;
                new_seen = new_seen.saturating_add(1);
            }
            lines.push(line);
        }

        let hunk = Hunk {
            header: head.to_string(),
            old_start: parsed.old_start,
            old_count: parsed.old_count,
            new_start: parsed.new_start,
            new_count: parsed.new_count,
            section: parsed.section,
            lines,
        };

        if !hunk.check_counts() {
            let (old, new) = hunk.counted();
            return Err(ParseError::CountMismatch {
                header: hunk.header,
                old,
                new,
            });
        }

        Ok(hunk)
    }

    /// Count `(context + deleted, context + added)` lines
    #[must_use]
    pub fn counted(&self) -> (u32, u32) {
        self.lines.iter().fold((0, 0), |(old, new), line| {
            (
                old + u32::from(line.kind.on_old_side()),
                new + u32::from(line.kind.on_new_side()),
            )
        })
    }

    /// Whether the header counts agree with the body
    #[must_use]
    pub fn check_counts(&self) -> bool {
        self.counted() == (self.old_count, self.new_count)
    }

    /// Canonical header line, always with explicit counts
    #[must_use]
    pub fn header_line(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )
    }

    /// Number of added lines
    #[must_use]
    pub fn added(&self) -> usize {
        self.lines.iter().filter(|l| l.kind == LineKind::Added).count()
    }

    /// Number of deleted lines
    #[must_use]
    pub fn deleted(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.kind == LineKind::Deleted)
            .count()
    }

    /// Whether any line is an addition or deletion
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.lines.iter().any(|l| l.kind.is_change())
    }

    /// Indices of added and deleted lines
    pub fn change_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.kind.is_change())
            .map(|(i, _)| i)
    }

    /// Reassign line numbers from `old_start` / `new_start`
    pub(crate) fn renumber(&mut self) {
        let mut old_no = self.old_start;
        let mut new_no = self.new_start;
        for line in &mut self.lines {
            line.old_line_no = line.kind.on_old_side().then_some(old_no);
            line.new_line_no = line.kind.on_new_side().then_some(new_no);
            old_no = old_no.saturating_add(u32::from(line.kind.on_old_side()));
            new_no = new_no.saturating_add(u32::from(line.kind.on_new_side()));
        }
    }
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.section {
            Some(section) => writeln!(f, "{} {}", self.header_line(), section)?,
            None => writeln!(f, "{}", self.header_line())?,
        }
        for line in &self.lines {
            write!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn header_with_counts() {
        let header = HunkHeader::parse("@@ -10,4 +10,5 @@").unwrap();
        assert_eq!(
            header,
            HunkHeader {
                old_start: 10,
                old_count: 4,
                new_start: 10,
                new_count: 5,
                section: None,
            }
        );
    }

    #[test]
    fn header_omitted_counts_default_to_one() {
        let header = HunkHeader::parse("@@ -5 +5 @@").unwrap();
        assert_eq!((header.old_count, header.new_count), (1, 1));
    }

    #[test]
    fn header_keeps_section_text() {
        let header = HunkHeader::parse("@@ -38,0 +39,5 @@ fn main() {").unwrap();
        assert_eq!(header.section.as_deref(), Some("fn main() {"));
        assert_eq!((header.old_count, header.new_count), (0, 5));
    }

    #[test]
    fn header_rejects_garbage() {
        assert!(HunkHeader::parse("@@ -a,1 +1 @@").is_none());
        assert!(HunkHeader::parse("@@ -1,1 +1").is_none());
        assert!(HunkHeader::parse("-1,1 +1,1").is_none());
    }

    #[test]
    fn parse_assigns_line_numbers() {
        let hunk = Hunk::parse("@@ -10,4 +10,5 @@\n a\n-b\n+x\n+y\n c\n d").unwrap();
        let numbers: Vec<_> = hunk
            .lines
            .iter()
            .map(|l| (l.kind, l.old_line_no, l.new_line_no))
            .collect();
        assert_eq!(
            numbers,
            vec![
                (LineKind::Context, Some(10), Some(10)),
                (LineKind::Deleted, Some(11), None),
                (LineKind::Added, None, Some(11)),
                (LineKind::Added, None, Some(12)),
                (LineKind::Context, Some(12), Some(13)),
                (LineKind::Context, Some(13), Some(14)),
            ]
        );
    }

    #[test]
    fn parse_pure_insertion() {
        let hunk = Hunk::parse("@@ -10,0 +11 @@\n+new line here").unwrap();
        assert_eq!(hunk.lines, vec![DiffLine::added("new line here", 11)]);
        assert_eq!((hunk.old_count, hunk.new_count), (0, 1));
    }

    #[test]
    fn parse_pure_deletion() {
        let hunk = Hunk::parse("@@ -10 +9,0 @@\n-old line removed").unwrap();
        assert_eq!(hunk.lines, vec![DiffLine::deleted("old line removed", 10)]);
    }

    #[test]
    fn parse_content_with_diff_markers() {
        let hunk = Hunk::parse(
            "@@ -5,0 +6,3 @@\n++++ starts with plus\n+--- starts with minus\n+@@ looks like a header",
        )
        .unwrap();
        let texts: Vec<_> = hunk.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "+++ starts with plus",
                "--- starts with minus",
                "@@ looks like a header"
            ]
        );
    }

    #[test]
    fn parse_stripped_empty_context_line() {
        let hunk = Hunk::parse("@@ -1,3 +1,3 @@\n a\n\n-b\n+c").unwrap();
        assert_eq!(hunk.lines[1], DiffLine::context("", 2, 2));
        assert!(hunk.check_counts());
    }

    #[test]
    fn parse_rejects_unknown_marker() {
        let result = Hunk::parse("@@ -1 +1 @@\n*bogus");
        assert!(matches!(
            result,
            Err(ParseError::UnrecognizedLine { line_no: 2, .. })
        ));
    }

    #[test]
    fn parse_rejects_count_mismatch() {
        let result = Hunk::parse("@@ -1,2 +1,2 @@\n-a\n+b");
        assert!(matches!(
            result,
            Err(ParseError::CountMismatch { old: 1, new: 1, .. })
        ));
    }

    #[test]
    fn parse_missing_newline_marks_previous_line() {
        let hunk = Hunk::parse(
            "@@ -3 +3,2 @@\n-last line\n\\ No newline at end of file\n+last line\n+new final line",
        )
        .unwrap();
        assert!(hunk.lines[0].missing_newline);
        assert!(!hunk.lines[1].missing_newline);
        assert!(!hunk.lines[2].missing_newline);
    }

    #[test]
    fn render_uses_explicit_counts() {
        let hunk = Hunk::parse("@@ -10 +10 @@\n-old version\n+new version").unwrap();
        assert_eq!(
            hunk.to_string(),
            "@@ -10,1 +10,1 @@\n-old version\n+new version\n"
        );
    }

    #[test]
    fn roundtrip_canonical_hunk() {
        let original = "@@ -10,2 +10,3 @@ impl Foo\n ctx\n-first old\n+first new\n+second new\n";
        let hunk = Hunk::parse(original).unwrap();
        assert_eq!(hunk.to_string(), original);
    }

    #[test]
    fn roundtrip_missing_newline() {
        let original = "@@ -3,1 +3,1 @@\n-old version\n\\ No newline at end of file\n+new version\n\\ No newline at end of file\n";
        let hunk = Hunk::parse(original).unwrap();
        assert_eq!(hunk.to_string(), original);
    }

    #[test]
    fn from_lines_derives_counts_and_numbers() {
        let hunk = Hunk::from_lines(
            7,
            7,
            vec![
                DiffLine::context("a", 0, 0),
                DiffLine::deleted("b", 0),
                DiffLine::added("c", 0),
            ],
        );
        assert_eq!(hunk.header, "@@ -7,2 +7,2 @@");
        assert_eq!(hunk.lines[2].new_line_no, Some(8));
        assert_eq!(hunk.lines[1].old_line_no, Some(8));
        assert!(hunk.check_counts());
    }

    #[test]
    fn carriage_returns_stay_in_line_text() {
        let original = "@@ -1,2 +1,2 @@\n a\r\n-b\r\n+c\r\n";
        let hunk = Hunk::parse(original).unwrap();
        assert_eq!(hunk.lines[1].text, "b\r");
        assert_eq!(hunk.to_string(), original);
    }

    #[test]
    fn line_numbers_past_u32_are_rejected() {
        let result = Hunk::parse("@@ -4294967295,2 +1,2 @@\n a\n b");
        assert!(matches!(result, Err(ParseError::LineOverflow { .. })));

        let last = Hunk::parse("@@ -4294967295,1 +1,1 @@\n a").unwrap();
        assert_eq!(last.lines[0].old_line_no, Some(u32::MAX));
    }

    #[test]
    fn change_indices_skip_context() {
        let hunk = Hunk::parse("@@ -1,3 +1,3 @@\n a\n-b\n+c\n d").unwrap();
        assert_eq!(hunk.change_indices().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!((hunk.added(), hunk.deleted()), (1, 1));
    }
}
