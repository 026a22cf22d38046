//! Lazily built list of screen lines.
//!
//! The index covers a prefix of the buffer: fold groups are built in order until a query
//! needs a row that isn't indexed yet, or until [`DisplayIndex::do_background_work`] runs
//! out of time. Groups live in a [`SumTree`] whose summaries count buffer rows and screen
//! rows, so finding a row and splicing in rebuilt groups are logarithmic. A group stores
//! its buffer positions relative to its own first row and never moves when rows above it
//! change.
//!
//! ```text
//! buffer rows   screen lines              indexed_buffer_row_count = 3
//! 0  abc def    0  "abc "   group of 1 row, 2 lines
//!               1  "def"
//! 1  ghi        2  "g⋯jk"   group of 2 rows, 1 line
//! 2  jk
//! 3  lmn        (not indexed)
//! ```

use crate::{
    coords::{DisplayPoint, Point},
    error::Result,
    screen_line::ScreenLine,
    screen_line_builder::{build_group, BuildContext, BuildState, BuiltGroup},
};
use std::{
    cmp::Ordering,
    ops::{Range, RangeInclusive},
    time::{Duration, Instant},
};
use sum_tree::{self, Bias, SumTree};
use tracing::{debug, trace};

/// Source of remaining time for [`DisplayIndex::do_background_work`].
pub trait Deadline {
    /// Remaining budget. Work stops once this is zero or negative.
    fn time_remaining(&mut self) -> f64;
}

impl<F: FnMut() -> f64> Deadline for F {
    fn time_remaining(&mut self) -> f64 {
        self()
    }
}

/// Wall-clock deadline reporting milliseconds remaining.
#[derive(Debug, Clone, Copy)]
pub struct TimeDeadline {
    until: Instant,
}

impl TimeDeadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            until: Instant::now() + budget,
        }
    }
}

impl Deadline for TimeDeadline {
    fn time_remaining(&mut self) -> f64 {
        self.until
            .saturating_duration_since(Instant::now())
            .as_secs_f64()
            * 1000.0
    }
}

/// A screen line and the buffer position it starts at.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IndexedLine<'a> {
    pub buffer_start: Point,
    pub line: &'a ScreenLine,
}

/// The screen lines built for one fold group.
#[derive(Debug, Clone)]
struct FoldGroup {
    row_count: u32,
    lines: Vec<GroupLine>,
}

#[derive(Debug, Clone)]
struct GroupLine {
    /// Row relative to the group's first buffer row.
    start: Point,
    line: ScreenLine,
}

impl FoldGroup {
    fn new(group: BuiltGroup) -> Self {
        let first_row = group.start_row;
        Self {
            row_count: group.end_row - first_row + 1,
            lines: group
                .lines
                .into_iter()
                .map(|built| {
                    let start = built.buffer_start;
                    GroupLine {
                        start: Point::new(start.row - first_row, start.column),
                        line: built.line,
                    }
                })
                .collect(),
        }
    }

    fn line(&self, ix: usize, first_row: u32) -> Option<IndexedLine<'_>> {
        self.lines.get(ix).map(|group_line| IndexedLine {
            buffer_start: Point::new(first_row + group_line.start.row, group_line.start.column),
            line: &group_line.line,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GroupSummary {
    buffer_rows: u32,
    screen_rows: u32,
    /// End of the first widest line, with the row counted from the subtree's first line.
    rightmost: DisplayPoint,
}

impl sum_tree::ContextLessSummary for GroupSummary {
    fn zero() -> Self {
        Self {
            buffer_rows: 0,
            screen_rows: 0,
            rightmost: DisplayPoint::ZERO,
        }
    }

    fn add_summary(&mut self, other: &Self) {
        if other.rightmost.column > self.rightmost.column {
            self.rightmost = DisplayPoint::new(
                self.screen_rows + other.rightmost.row,
                other.rightmost.column,
            );
        }
        self.buffer_rows += other.buffer_rows;
        self.screen_rows += other.screen_rows;
    }
}

impl sum_tree::Item for FoldGroup {
    type Summary = GroupSummary;

    fn summary(&self, _: ()) -> Self::Summary {
        let mut rightmost = DisplayPoint::ZERO;
        for (row, group_line) in self.lines.iter().enumerate() {
            if group_line.line.screen_extent > rightmost.column {
                rightmost = DisplayPoint::new(row as u32, group_line.line.screen_extent);
            }
        }
        GroupSummary {
            buffer_rows: self.row_count,
            screen_rows: self.lines.len() as u32,
            rightmost,
        }
    }
}

/// Where a group starts: the buffer and screen rows of every group before it.
#[derive(Debug, Clone, Copy, Default)]
struct GroupStart {
    buffer_row: u32,
    screen_row: u32,
}

impl<'a> sum_tree::Dimension<'a, GroupSummary> for GroupStart {
    fn zero(_: ()) -> Self {
        Self::default()
    }

    fn add_summary(&mut self, summary: &'a GroupSummary, _: ()) {
        self.buffer_row += summary.buffer_rows;
        self.screen_row += summary.screen_rows;
    }
}

struct BufferRow(u32);

impl<'a> sum_tree::SeekTarget<'a, GroupSummary, GroupStart> for BufferRow {
    fn cmp(&self, cursor_location: &GroupStart, _: ()) -> Ordering {
        self.0.cmp(&cursor_location.buffer_row)
    }
}

struct ScreenRow(u32);

impl<'a> sum_tree::SeekTarget<'a, GroupSummary, GroupStart> for ScreenRow {
    fn cmp(&self, cursor_location: &GroupStart, _: ()) -> Ordering {
        self.0.cmp(&cursor_location.screen_row)
    }
}

/// Screen rows `start..start + old_count` were replaced by `new_count` fresh rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RowSplice {
    pub start: u32,
    pub old_count: u32,
    pub new_count: u32,
}

pub(crate) struct DisplayIndex {
    groups: SumTree<FoldGroup>,
    build: BuildState,
}

impl DisplayIndex {
    pub fn new() -> Self {
        Self {
            groups: SumTree::new(()),
            build: BuildState::default(),
        }
    }

    pub fn line_count(&self) -> u32 {
        self.groups.summary().screen_rows
    }

    pub fn indexed_buffer_row_count(&self) -> u32 {
        self.groups.summary().buffer_rows
    }

    pub fn is_complete(&self, ctx: &BuildContext<'_>) -> bool {
        self.indexed_buffer_row_count() >= ctx.buffer.line_count()
    }

    /// Drops every line. Ids keep counting so rebuilt lines never reuse an id.
    pub fn clear(&mut self) {
        self.groups = SumTree::new(());
        self.build.invalidate();
    }

    /// Screen line `row`, if indexed.
    pub fn line(&self, row: u32) -> Option<IndexedLine<'_>> {
        let mut cursor = self.groups.cursor::<GroupStart>(());
        cursor.seek(&ScreenRow(row), Bias::Right);
        let group = cursor.item()?;
        let start = *cursor.start();
        group.line((row - start.screen_row) as usize, start.buffer_row)
    }

    /// The indexed screen lines among `rows`.
    pub fn lines(&self, rows: Range<u32>) -> Vec<IndexedLine<'_>> {
        let mut lines = Vec::new();
        let mut cursor = self.groups.cursor::<GroupStart>(());
        cursor.seek(&ScreenRow(rows.start), Bias::Right);
        while let Some(group) = cursor.item() {
            let start = *cursor.start();
            if start.screen_row >= rows.end {
                break;
            }
            let skip = rows.start.saturating_sub(start.screen_row) as usize;
            let take = (rows.end - start.screen_row) as usize;
            lines.extend(
                (skip..group.lines.len().min(take))
                    .filter_map(|ix| group.line(ix, start.buffer_row)),
            );
            cursor.next();
        }
        lines
    }

    /// The first screen row and the lines of the fold group covering buffer `row`.
    pub fn group_containing(&self, row: u32) -> Option<(u32, Vec<IndexedLine<'_>>)> {
        let mut cursor = self.groups.cursor::<GroupStart>(());
        cursor.seek(&BufferRow(row), Bias::Right);
        let group = cursor.item()?;
        let start = *cursor.start();
        let lines = (0..group.lines.len())
            .filter_map(|ix| group.line(ix, start.buffer_row))
            .collect();
        Some((start.screen_row, lines))
    }

    /// Builds the next fold group. Returns `false` if the buffer is fully indexed.
    pub fn index_next_group(&mut self, ctx: &BuildContext<'_>) -> Result<bool> {
        if self.is_complete(ctx) {
            return Ok(false);
        }
        let group = build_group(ctx, self.indexed_buffer_row_count(), &mut self.build)?;
        self.groups.push(FoldGroup::new(group), ());
        Ok(true)
    }

    /// Indexes until buffer `row` is covered or the buffer is exhausted.
    pub fn index_through_buffer_row(&mut self, ctx: &BuildContext<'_>, row: u32) -> Result<()> {
        while self.indexed_buffer_row_count() <= row && self.index_next_group(ctx)? {}
        Ok(())
    }

    /// Indexes until `screen_row` exists or the buffer is exhausted.
    pub fn index_through_screen_row(
        &mut self,
        ctx: &BuildContext<'_>,
        screen_row: u32,
    ) -> Result<()> {
        while self.line_count() <= screen_row && self.index_next_group(ctx)? {}
        Ok(())
    }

    pub fn index_all(&mut self, ctx: &BuildContext<'_>) -> Result<()> {
        while self.index_next_group(ctx)? {}
        Ok(())
    }

    /// Indexes whole fold groups while `deadline` has time left. Returns `true` if work
    /// remains.
    pub fn do_background_work(
        &mut self,
        ctx: &BuildContext<'_>,
        deadline: &mut dyn Deadline,
    ) -> Result<bool> {
        while !self.is_complete(ctx) {
            if deadline.time_remaining() <= 0.0 {
                trace!(
                    "DisplayIndex.do_background_work: paused at buffer row {}",
                    self.indexed_buffer_row_count()
                );
                return Ok(true);
            }
            self.index_next_group(ctx)?;
        }
        Ok(false)
    }

    /// Screen row count extrapolated from the indexed prefix.
    pub fn approximate_screen_line_count(&self, buffer_line_count: u32) -> u32 {
        let indexed_rows = u64::from(self.indexed_buffer_row_count());
        if indexed_rows == 0 {
            return buffer_line_count;
        }
        let lines = u64::from(self.line_count());
        if indexed_rows >= u64::from(buffer_line_count) {
            return lines as u32;
        }
        (lines * u64::from(buffer_line_count)).div_ceil(indexed_rows) as u32
    }

    /// End of the widest indexed row; the first such row on ties.
    pub fn rightmost_screen_position(&self) -> DisplayPoint {
        self.groups.summary().rightmost
    }

    /// Rebuilds the screen lines for buffer rows `start_row..=old_end_row`, where
    /// `old_end_row` is in pre-edit coordinates and the edit changed the row count by
    /// `row_delta`. Both ends are widened to whole fold groups, old and new.
    pub fn splice_buffer_rows(
        &mut self,
        ctx: &BuildContext<'_>,
        start_row: u32,
        old_end_row: u32,
        row_delta: i64,
    ) -> Result<RowSplice> {
        self.build.invalidate();
        if start_row >= self.indexed_buffer_row_count() {
            trace!("DisplayIndex.splice: rows from {start_row} are not indexed");
            return Ok(RowSplice {
                start: self.line_count(),
                old_count: 0,
                new_count: 0,
            });
        }

        let mut start_row = start_row;
        loop {
            let widened = self
                .old_group_rows(start_row)
                .map_or(start_row, |rows| *rows.start())
                .min(ctx.folds.group_start_row(start_row));
            if widened == start_row {
                break;
            }
            start_row = widened;
        }
        let last_row = ctx.buffer.last_row();

        let mut old_end = self.old_group_end(old_end_row.max(start_row));
        let mut built = Vec::new();
        let mut new_count = 0;
        let mut next_row = start_row;
        loop {
            let target = shift_row(old_end, row_delta).min(last_row);
            while next_row <= target {
                let group = build_group(ctx, next_row, &mut self.build)?;
                next_row = group.end_row + 1;
                new_count += group.lines.len() as u32;
                built.push(FoldGroup::new(group));
            }
            let built_end = next_row.saturating_sub(1);
            if built_end <= target {
                break;
            }
            old_end = self.old_group_end(shift_row(built_end, -row_delta));
        }

        let mut cursor = self.groups.cursor::<GroupStart>(());
        let mut groups = cursor.slice(&BufferRow(start_row), Bias::Right);
        let start = cursor.start().screen_row;
        cursor.seek_forward(&BufferRow(old_end.saturating_add(1)), Bias::Right);
        let old_count = cursor.start().screen_row - start;
        let suffix = cursor.suffix();
        drop(cursor);

        groups.append(SumTree::from_iter(built, ()), ());
        groups.append(suffix, ());
        self.groups = groups;

        let splice = RowSplice {
            start,
            old_count,
            new_count,
        };
        debug!(
            "DisplayIndex.splice: buffer rows {start_row}..={old_end} (delta {row_delta}) \
             -> screen rows {}: -{} +{}",
            splice.start, splice.old_count, splice.new_count
        );
        Ok(splice)
    }

    /// Buffer rows of the indexed fold group containing `row`. Reads pre-edit state.
    fn old_group_rows(&self, row: u32) -> Option<RangeInclusive<u32>> {
        let mut cursor = self.groups.cursor::<GroupStart>(());
        cursor.seek(&BufferRow(row), Bias::Right);
        let group = cursor.item()?;
        let first_row = cursor.start().buffer_row;
        Some(first_row..=first_row + group.row_count - 1)
    }

    /// Last row of the indexed fold group containing `row`, or `row` itself when it is
    /// not indexed.
    fn old_group_end(&self, row: u32) -> u32 {
        self.old_group_rows(row).map_or(row, |rows| *rows.end())
    }
}

fn shift_row(row: u32, delta: i64) -> u32 {
    (i64::from(row) + delta).clamp(0, i64::from(u32::MAX)) as u32
}
