//! Staged/unstaged classification of a file's changes.
//!
//! The unstaged diff (working tree vs. index) and the staged diff (index vs.
//! HEAD) share the index as a common side: the old side of the former and
//! the new side of the latter. Every hunk's changed lines are projected onto
//! that side, and hunks whose projections touch are grouped into one
//! [`Region`], the unit a user thinks of as "a change".

use crate::diff::{FileDiff, Hunk};
use std::collections::BTreeSet;

/// Which of the two diffs a hunk belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    /// Working tree vs. index
    Unstaged,
    /// Index vs. HEAD
    Staged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageStatus {
    Staged,
    Unstaged,
    PartiallyStaged,
}

/// Half-open range of index line positions, `start == end` marking an
/// insertion point before line `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    fn touches(self, other: Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    fn union(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Project the changed lines of `hunk` onto the index.
///
/// Returns `None` for hunks without changes.
#[must_use]
pub fn index_span(hunk: &Hunk, side: Side) -> Option<Span> {
    let (start, count) = match side {
        Side::Unstaged => (hunk.old_start, hunk.old_count),
        Side::Staged => (hunk.new_start, hunk.new_count),
    };
    // A zero count names the line the change follows
    let mut pos = if count == 0 { start.saturating_add(1) } else { start };
    let mut span: Option<Span> = None;

    for line in &hunk.lines {
        let on_index = match side {
            Side::Unstaged => line.kind.on_old_side(),
            Side::Staged => line.kind.on_new_side(),
        };
        if line.kind.is_change() {
            let here = Span {
                start: pos,
                end: if on_index { pos.saturating_add(1) } else { pos },
            };
            span = Some(span.map_or(here, |s| s.union(here)));
        }
        if on_index {
            pos = pos.saturating_add(1);
        }
    }

    span
}

/// Staging state of the changed lines of one hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkState {
    pub side: Side,
    pub hunk_index: usize,
    /// Index into [`FileStaging::regions`], `None` for hunks without changes
    pub region: Option<usize>,
    pub staged_lines: BTreeSet<usize>,
    pub unstaged_lines: BTreeSet<usize>,
}

/// A group of touching hunks from either diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub span: Span,
    /// Hunk indices in the unstaged diff
    pub unstaged_hunks: Vec<usize>,
    /// Hunk indices in the staged diff
    pub staged_hunks: Vec<usize>,
    pub staged_lines: usize,
    pub unstaged_lines: usize,
    pub status: StageStatus,
}

/// Classification of one file, valid until the next apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStaging {
    pub path: String,
    pub regions: Vec<Region>,
    pub unstaged: Vec<HunkState>,
    pub staged: Vec<HunkState>,
}

impl FileStaging {
    fn hunk(&self, side: Side, hunk_index: usize) -> Option<&HunkState> {
        match side {
            Side::Unstaged => self.unstaged.get(hunk_index),
            Side::Staged => self.staged.get(hunk_index),
        }
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Status of the region the hunk belongs to
    #[must_use]
    pub fn status(&self, side: Side, hunk_index: usize) -> Option<StageStatus> {
        let region = self.hunk(side, hunk_index)?.region?;
        self.regions.get(region).map(|r| r.status)
    }

    /// Line indices of the hunk whose change is in the index
    #[must_use]
    pub fn staged_lines(&self, side: Side, hunk_index: usize) -> Option<&BTreeSet<usize>> {
        self.hunk(side, hunk_index).map(|h| &h.staged_lines)
    }

    /// Line indices of the hunk whose change is only in the working tree
    #[must_use]
    pub fn unstaged_lines(&self, side: Side, hunk_index: usize) -> Option<&BTreeSet<usize>> {
        self.hunk(side, hunk_index).map(|h| &h.unstaged_lines)
    }

    #[must_use]
    pub fn staged_count(&self) -> usize {
        self.regions.iter().map(|r| r.staged_lines).sum()
    }

    #[must_use]
    pub fn unstaged_count(&self) -> usize {
        self.regions.iter().map(|r| r.unstaged_lines).sum()
    }

    /// No changes on either side
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.regions.is_empty()
    }
}

struct Projected {
    side: Side,
    hunk_index: usize,
    span: Span,
    changes: usize,
}

fn hunk_states(diff: &FileDiff, side: Side) -> Vec<HunkState> {
    diff.hunks
        .iter()
        .enumerate()
        .map(|(hunk_index, hunk)| {
            let changed: BTreeSet<usize> = hunk.change_indices().collect();
            let (staged_lines, unstaged_lines) = match side {
                Side::Staged => (changed, BTreeSet::new()),
                Side::Unstaged => (BTreeSet::new(), changed),
            };
            HunkState {
                side,
                hunk_index,
                region: None,
                staged_lines,
                unstaged_lines,
            }
        })
        .collect()
}

fn project(diff: &FileDiff, side: Side) -> impl Iterator<Item = Projected> + '_ {
    diff.hunks
        .iter()
        .enumerate()
        .filter_map(move |(hunk_index, hunk)| {
            index_span(hunk, side).map(|span| Projected {
                side,
                hunk_index,
                span,
                changes: hunk.added() + hunk.deleted(),
            })
        })
}

/// Classify every hunk of both diffs of one file.
///
/// A region is [`StageStatus::Staged`] when all of its changed lines come
/// from the staged diff, [`StageStatus::Unstaged`] when none do, and
/// [`StageStatus::PartiallyStaged`] otherwise. Pure; re-run after every apply.
#[must_use]
pub fn classify(unstaged: &FileDiff, staged: &FileDiff) -> FileStaging {
    let mut projected: Vec<Projected> = project(unstaged, Side::Unstaged)
        .chain(project(staged, Side::Staged))
        .collect();
    projected.sort_by_key(|p| (p.span.start, p.span.end, p.side, p.hunk_index));

    let mut unstaged_states = hunk_states(unstaged, Side::Unstaged);
    let mut staged_states = hunk_states(staged, Side::Staged);
    let mut regions: Vec<Region> = Vec::new();

    for p in projected {
        let merge = regions.last().is_some_and(|r| r.span.touches(p.span));
        if !merge {
            regions.push(Region {
                span: p.span,
                unstaged_hunks: Vec::new(),
                staged_hunks: Vec::new(),
                staged_lines: 0,
                unstaged_lines: 0,
                status: StageStatus::Unstaged,
            });
        }
        let region_index = regions.len() - 1;
        let Some(region) = regions.last_mut() else {
            continue;
        };
        region.span = region.span.union(p.span);

        let state = match p.side {
            Side::Unstaged => {
                region.unstaged_hunks.push(p.hunk_index);
                region.unstaged_lines += p.changes;
                unstaged_states.get_mut(p.hunk_index)
            }
            Side::Staged => {
                region.staged_hunks.push(p.hunk_index);
                region.staged_lines += p.changes;
                staged_states.get_mut(p.hunk_index)
            }
        };
        if let Some(state) = state {
            state.region = Some(region_index);
        }
    }

    for region in &mut regions {
        region.status = match (region.staged_lines, region.unstaged_lines) {
            (_, 0) => StageStatus::Staged,
            (0, _) => StageStatus::Unstaged,
            _ => StageStatus::PartiallyStaged,
        };
    }

    FileStaging {
        path: if unstaged.path.is_empty() {
            staged.path.clone()
        } else {
            unstaged.path.clone()
        },
        regions,
        unstaged: unstaged_states,
        staged: staged_states,
    }
}
